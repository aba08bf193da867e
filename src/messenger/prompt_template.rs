use chrono::{DateTime, Duration, Local, Utc};

use crate::messenger::history::HistoryRecord;

/// 提示词模板构建器
pub struct PromptTemplate;

impl PromptTemplate {
    /// 告状整理的系统提示词
    pub fn complaint_system_prompt() -> String {
        let mut prompt = String::new();
        prompt.push_str("你是群聊管理助手，负责把群成员的投诉整理成一段给管理员看的简报。\n");
        prompt.push_str("要求：\n");
        prompt.push_str("• 使用纯文本，不要包含markdown格式、颜文字和emoji\n");
        prompt.push_str("• 先用一句话概括投诉内容，再列出聊天记录中与投诉相关的事实\n");
        prompt.push_str("• 只陈述记录中出现的内容，不要编造，也不要替管理员做处理决定\n");
        prompt.push_str("• 总长度不超过300字\n");
        prompt
    }

    /// 构建告状整理请求
    ///
    /// # 参数
    /// - `complainant`: 投诉人描述
    /// - `content`: 投诉原文
    /// - `context`: 群内最近的聊天记录（按时间先后）
    pub fn build_complaint_prompt(
        complainant: &str,
        content: &str,
        context: &[HistoryRecord],
    ) -> String {
        let now = Local::now();
        let mut prompt = String::new();

        prompt.push_str(&format!("📅 当前时间：{}\n\n", now.format("%Y-%m-%d %H:%M:%S")));
        prompt.push_str(&format!("投诉人：{}\n", complainant));
        prompt.push_str(&format!("投诉内容：{}\n\n", content));

        if context.is_empty() {
            prompt.push_str("（没有可参考的群聊记录）\n");
        } else {
            prompt.push_str("最近的群聊记录：\n");
            prompt.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
            for record in context {
                prompt.push_str(&Self::format_history_item(record));
                prompt.push('\n');
            }
        }

        prompt
    }

    /// 格式化单条聊天记录
    fn format_history_item(record: &HistoryRecord) -> String {
        let local_time: DateTime<Local> = record.timestamp.into();
        format!(
            "[{}] ({}) {}: {}",
            local_time.format("%H:%M:%S"),
            Self::format_relative_time(record.timestamp),
            record.sender,
            record.message
        )
    }

    /// 计算相对时间
    fn format_relative_time(timestamp: DateTime<Utc>) -> String {
        let duration = Utc::now().signed_duration_since(timestamp);

        if duration < Duration::zero() {
            "未来".to_string()
        } else if duration < Duration::minutes(1) {
            "刚才".to_string()
        } else if duration < Duration::hours(1) {
            format!("{}分钟前", duration.num_minutes())
        } else if duration < Duration::days(1) {
            format!("{}小时前", duration.num_hours())
        } else {
            format!("{}天前", duration.num_days())
        }
    }
}
