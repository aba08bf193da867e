use std::path::PathBuf;
use std::sync::Arc;

use crate::messenger::config::{Config, ConfigStore};
use crate::messenger::dispatcher::Dispatcher;
use crate::messenger::error::DispatchError;
use crate::messenger::event::EventSource;
use crate::messenger::history::GroupHistory;
use crate::messenger::intent::{Intent, IntentRouter};
use crate::messenger::interceptor::ErrorInterceptor;
use crate::messenger::llm::{LlmClient, LlmProvider};
use crate::messenger::prompt_template::PromptTemplate;
use crate::messenger::transport::Transport;

/// 传话服务
/// 封装插件对外提供的全部功能：私聊、群发、联系管理员、告状、配置重载和错误拦截
pub struct Courier {
    config: Arc<ConfigStore>,
    config_path: Option<PathBuf>,
    dispatcher: Dispatcher,
    history: Arc<GroupHistory>,
    llm: Option<Arc<dyn LlmProvider>>,
}

impl Courier {
    /// 创建传话服务
    ///
    /// 配置中启用了 LLM 时会尝试初始化客户端，失败则降级为直接转发原文。
    pub fn new(
        config: Arc<ConfigStore>,
        transport: Arc<dyn Transport>,
        history: Arc<GroupHistory>,
    ) -> Self {
        let current = config.get_config();
        let llm: Option<Arc<dyn LlmProvider>> = if current.llm.enabled {
            match LlmClient::new(&current.llm) {
                Ok(client) => {
                    log::info!(
                        "✅ LLM 已启用: {} ({})",
                        current.llm.provider,
                        current.llm.model
                    );
                    Some(Arc::new(client))
                }
                Err(e) => {
                    log::error!("❌ LLM 客户端初始化失败: {:#}", e);
                    log::warn!("   告状内容将直接转发原文");
                    None
                }
            }
        } else {
            None
        };

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&config), transport),
            config,
            config_path: None,
            history,
            llm,
        }
    }

    /// 指定文本生成服务
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 指定配置文件路径，用于重载
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.get_config()
    }

    /// 入站消息入口
    ///
    /// 命中功能时返回经过错误拦截的回复；未命中的群消息记入历史，
    /// 触发词本身不会进入告状上下文。
    pub async fn on_message(&self, event: &dyn EventSource, text: &str) -> Option<String> {
        match self.handle(event, text).await {
            Some(reply) => Some(self.render_reply(&reply)),
            None => {
                self.record_group_message(event, text);
                None
            }
        }
    }

    /// 处理一条用户消息，命中功能时返回回复文本
    pub async fn handle(&self, event: &dyn EventSource, text: &str) -> Option<String> {
        let router = IntentRouter::from_config(&self.config());
        let intent = router.route(text)?;
        log::info!("🎯 {} 触发功能: {:?}", event.describe_sender(), intent);

        let reply = match intent {
            Intent::AdminInfo => self.get_admin_info(),
            Intent::ReloadConfig => self.reload_config(event),
            Intent::MessageAdmin { content } => self.message_to_admin(event, &content).await,
            Intent::SueAdmin { content } => self.sue_to_admin(event, &content).await,
            Intent::PrivateMessage { target, content } => {
                self.private_message(event, &target, &content).await
            }
            Intent::GroupMessage { group, content } => {
                self.group_message(event, &group, &content).await
            }
            Intent::Usage { kind, trigger } => kind.usage(&trigger),
        };
        Some(reply)
    }

    /// 私聊指定用户
    pub async fn private_message(
        &self,
        event: &dyn EventSource,
        user_id: &str,
        content: &str,
    ) -> String {
        match self.dispatcher.send_private(user_id, content, Some(event)).await {
            Ok(()) => "私聊消息已成功发送。".to_string(),
            Err(e) => e.user_message().to_string(),
        }
    }

    /// 给管理员留言
    pub async fn message_to_admin(&self, event: &dyn EventSource, content: &str) -> String {
        let config = self.config();
        if config.admin_id.is_empty() {
            log::warn!("⚠️  尝试向管理员发送消息失败：未配置 admin_id");
            return "发送失败：系统未配置管理员联系方式。".to_string();
        }

        let message = format!("【留言】来自 {}\n{}", event.describe_sender(), content);
        match self
            .dispatcher
            .send_private(&config.admin_id, &message, Some(event))
            .await
        {
            Ok(()) => "消息已成功发送给管理员。".to_string(),
            Err(e) => Self::admin_failure(e),
        }
    }

    /// 向管理员告状
    pub async fn sue_to_admin(&self, event: &dyn EventSource, content: &str) -> String {
        let config = self.config();
        if !config.enable_sue {
            return "告状失败：系统当前未开启告状功能。".to_string();
        }
        if config.admin_id.is_empty() {
            log::warn!("⚠️  尝试告状失败：未配置 admin_id");
            return "告状失败：系统未配置管理员联系方式。".to_string();
        }

        let body = self.compose_complaint(&config, event, content).await;
        let origin = match event.group_id() {
            Some(group) => format!("来自 {}（群 {}）", event.describe_sender(), group),
            None => format!("来自 {}", event.describe_sender()),
        };
        let message = format!("【告状】{}\n{}", origin, body);

        match self
            .dispatcher
            .send_private(&config.admin_id, &message, Some(event))
            .await
        {
            Ok(()) => "告状消息已成功发送给管理员。".to_string(),
            Err(e) => Self::admin_failure(e),
        }
    }

    fn admin_failure(error: DispatchError) -> String {
        match error {
            DispatchError::RateLimited(_) => {
                "发送失败：您的发送频率过高，触发了系统的防刷屏保护。".to_string()
            }
            other => other.user_message().to_string(),
        }
    }

    /// 使用 LLM 结合群聊记录整理告状内容，失败时返回原文
    async fn compose_complaint(
        &self,
        config: &Config,
        event: &dyn EventSource,
        content: &str,
    ) -> String {
        let llm = match (&self.llm, config.llm.enabled) {
            (Some(llm), true) => llm,
            _ => return content.to_string(),
        };

        let context = event
            .group_id()
            .map(|group| self.history.recent(&group, config.history_context))
            .unwrap_or_default();
        let prompt =
            PromptTemplate::build_complaint_prompt(&event.describe_sender(), content, &context);
        let system_prompt = PromptTemplate::complaint_system_prompt();

        match llm.text_chat(&prompt, Some(&system_prompt)).await {
            Ok(summary) if summary.trim().is_empty() => content.to_string(),
            Ok(summary) => match ErrorInterceptor::classify(summary.trim()) {
                // 模型把上游错误当作回答返回
                Some(matched) => {
                    log::warn!("⚠️  LLM 返回了错误信息（{}），直接转发原文", matched.rule);
                    content.to_string()
                }
                None => format!("{}\n\n原文：{}", summary.trim(), content),
            },
            Err(e) => {
                log::warn!("⚠️  LLM 整理告状内容失败: {:#}，直接转发原文", e);
                content.to_string()
            }
        }
    }

    /// 查看管理员信息
    pub fn get_admin_info(&self) -> String {
        let config = self.config();
        let display_admin_id = if config.admin_id.is_empty() {
            "未配置"
        } else {
            config.admin_id.as_str()
        };
        let on_off = |flag: bool| if flag { "开启" } else { "关闭" };

        format!(
            "管理员ID: {}\n告状功能: {}\n自定义错误消息: {}\n启用自定义错误: {}",
            display_admin_id,
            on_off(config.enable_sue),
            config.custom_error_message,
            on_off(config.enable_custom_error)
        )
    }

    /// 发送群消息
    pub async fn group_message(
        &self,
        event: &dyn EventSource,
        group_id: &str,
        content: &str,
    ) -> String {
        match self.dispatcher.send_group(group_id, content, Some(event)).await {
            Ok(()) => "群消息发送成功".to_string(),
            Err(DispatchError::RateLimited(_)) => {
                "群消息发送失败：您调用工具的频率过高，请稍后再试。".to_string()
            }
            Err(DispatchError::Transport(_)) => {
                "群消息发送失败：系统暂时无法发送消息，请稍后再试".to_string()
            }
            Err(e) => e.user_message().to_string(),
        }
    }

    /// 重新读取配置文件，仅管理员可用
    pub fn reload_config(&self, event: &dyn EventSource) -> String {
        let config = self.config();
        let is_admin = !config.admin_id.is_empty()
            && event.sender_id().as_deref() == Some(config.admin_id.as_str());
        if !is_admin {
            return "重载失败：只有管理员可以重载配置。".to_string();
        }

        let Some(path) = self.config_path.as_ref() else {
            return "重载失败：未指定配置文件。".to_string();
        };

        match self.config.reload_from_file(path) {
            Ok(true) => {
                log::info!("🔄 配置已重新加载: {:?}", path);
                "配置已重新加载。".to_string()
            }
            Ok(false) => "配置未发生变化。".to_string(),
            Err(e) => {
                log::error!("❌ 重载配置失败: {:#}", e);
                "重载失败：配置文件读取错误，详情见日志。".to_string()
            }
        }
    }

    /// 出站钩子：回复发出前执行错误拦截
    pub fn render_reply(&self, text: &str) -> String {
        ErrorInterceptor::intercept(text, &self.config()).unwrap_or_else(|| text.to_string())
    }

    /// 记录群消息，私聊消息忽略
    pub fn record_group_message(&self, event: &dyn EventSource, text: &str) {
        if let Some(group) = event.group_id() {
            let sender = event.describe_sender();
            self.history.record(&group, &sender, text);
        }
    }

    /// 获取统计信息
    pub fn get_stats(&self) -> CourierStats {
        let config = self.config();
        CourierStats {
            admin_configured: !config.admin_id.is_empty(),
            llm_enabled: self.llm.is_some() && config.llm.enabled,
            history_groups: self.history.group_count(),
        }
    }
}

/// 统计信息
#[derive(Debug)]
pub struct CourierStats {
    pub admin_configured: bool,
    pub llm_enabled: bool,
    pub history_groups: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::config::save_config;
    use crate::messenger::event::testing::MockEvent;
    use crate::messenger::llm::testing::MockLlm;
    use crate::messenger::transport::testing::MockTransport;
    use crate::messenger::transport::MessageKind;
    use serde_json::json;

    fn new_courier(raw: serde_json::Value) -> (Courier, Arc<MockTransport>) {
        let store = Arc::new(ConfigStore::new(Config::default(), raw));
        let transport = Arc::new(MockTransport::default());
        let history = Arc::new(GroupHistory::new(100));
        (Courier::new(store, transport.clone(), history), transport)
    }

    #[tokio::test]
    async fn test_message_to_admin() {
        let (courier, transport) = new_courier(json!({ "admin_id": "10000" }));
        let mut event = MockEvent::private("10001");
        event.name = Some("小明".to_string());

        let reply = courier.handle(&event, "告诉管理员 服务器挂了").await;
        assert_eq!(reply.as_deref(), Some("消息已成功发送给管理员。"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.session_id, "10000");
        assert_eq!(sent[0].0.kind, MessageKind::Private);
        assert_eq!(sent[0].1, "【留言】来自 小明(10001)\n服务器挂了");
    }

    #[tokio::test]
    async fn test_admin_not_configured() {
        let (courier, transport) = new_courier(json!({}));
        let event = MockEvent::private("10001");

        assert_eq!(
            courier.message_to_admin(&event, "hi").await,
            "发送失败：系统未配置管理员联系方式。"
        );
        assert_eq!(
            courier.sue_to_admin(&event, "hi").await,
            "告状失败：系统未配置管理员联系方式。"
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sue_disabled() {
        let (courier, transport) = new_courier(json!({ "admin_id": "10000", "enable_sue": false }));
        let event = MockEvent::private("10001");

        assert_eq!(
            courier.sue_to_admin(&event, "有人刷屏").await,
            "告状失败：系统当前未开启告状功能。"
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_sue_without_llm_forwards_raw_text() {
        let (courier, transport) = new_courier(json!({ "admin_id": "10000" }));
        let event = MockEvent::group("10001", "555");

        let reply = courier.handle(&event, "告状 小明刷屏").await;
        assert_eq!(reply.as_deref(), Some("告状消息已成功发送给管理员。"));
        assert_eq!(transport.sent()[0].1, "【告状】来自 10001（群 555）\n小明刷屏");
    }

    #[tokio::test]
    async fn test_sue_with_llm_uses_group_history() {
        let store = Arc::new(ConfigStore::new(
            Config::default(),
            json!({ "admin_id": "10000", "llm": { "enabled": true }, "history_context": 2 }),
        ));
        let transport = Arc::new(MockTransport::default());
        let history = Arc::new(GroupHistory::new(100));
        let llm = Arc::new(MockLlm::replying("小明在群里连续刷屏。"));
        let courier = Courier::new(store, transport.clone(), history).with_llm(llm.clone());

        let spammer = MockEvent::group("20002", "555");
        for text in ["广告1", "广告2", "广告3"] {
            courier.record_group_message(&spammer, text);
        }

        let event = MockEvent::group("10001", "555");
        let reply = courier.sue_to_admin(&event, "小明刷屏").await;
        assert_eq!(reply, "告状消息已成功发送给管理员。");

        let prompts = llm.prompts.lock().unwrap().clone();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("广告1"));
        assert!(prompts[0].contains("20002: 广告3"));
        assert_eq!(
            transport.sent()[0].1,
            "【告状】来自 10001（群 555）\n小明在群里连续刷屏。\n\n原文：小明刷屏"
        );
    }

    #[tokio::test]
    async fn test_sue_llm_failure_falls_back() {
        let store = Arc::new(ConfigStore::new(
            Config::default(),
            json!({ "admin_id": "10000", "llm": { "enabled": true } }),
        ));
        let transport = Arc::new(MockTransport::default());
        let courier = Courier::new(store, transport.clone(), Arc::new(GroupHistory::new(100)))
            .with_llm(Arc::new(MockLlm::failing("Error code: 429 - rate limited")));

        let event = MockEvent::private("10001");
        assert_eq!(
            courier.sue_to_admin(&event, "有人骂人").await,
            "告状消息已成功发送给管理员。"
        );
        assert_eq!(transport.sent()[0].1, "【告状】来自 10001\n有人骂人");
    }

    #[tokio::test]
    async fn test_sue_llm_error_reply_falls_back() {
        let store = Arc::new(ConfigStore::new(
            Config::default(),
            json!({ "admin_id": "10000", "llm": { "enabled": true } }),
        ));
        let transport = Arc::new(MockTransport::default());
        let courier = Courier::new(store, transport.clone(), Arc::new(GroupHistory::new(100)))
            .with_llm(Arc::new(MockLlm::replying("Error code: 429 - rate limited")));

        let event = MockEvent::private("10001");
        assert_eq!(
            courier.sue_to_admin(&event, "有人骂人").await,
            "告状消息已成功发送给管理员。"
        );
        assert_eq!(transport.sent()[0].1, "【告状】来自 10001\n有人骂人");
    }

    #[tokio::test]
    async fn test_trigger_text_stays_out_of_history() {
        let store = Arc::new(ConfigStore::new(
            Config::default(),
            json!({ "admin_id": "10000", "llm": { "enabled": true } }),
        ));
        let transport = Arc::new(MockTransport::default());
        let history = Arc::new(GroupHistory::new(100));
        let llm = Arc::new(MockLlm::replying("小明在群里刷屏。"));
        let courier = Courier::new(store, transport.clone(), Arc::clone(&history))
            .with_llm(llm.clone());

        let spammer = MockEvent::group("20002", "555");
        assert_eq!(courier.on_message(&spammer, "广告广告").await, None);

        let event = MockEvent::group("10001", "555");
        let reply = courier.on_message(&event, "告状 小明刷屏").await;
        assert_eq!(reply.as_deref(), Some("告状消息已成功发送给管理员。"));

        let prompts = llm.prompts.lock().unwrap().clone();
        assert!(prompts[0].contains("20002: 广告广告"));
        assert!(!prompts[0].contains("告状 小明刷屏"));

        let recorded: Vec<String> = history
            .recent("555", 10)
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(recorded, vec!["广告广告"]);

        // 私聊消息不记录
        courier.on_message(&MockEvent::private("10001"), "在吗").await;
        assert_eq!(history.group_count(), 1);
    }

    #[tokio::test]
    async fn test_admin_rate_limit_message() {
        let (courier, transport) = new_courier(json!({ "admin_id": "10000", "rate_limit_max": 1 }));
        let event = MockEvent::private("10001");

        assert_eq!(
            courier.message_to_admin(&event, "第一条").await,
            "消息已成功发送给管理员。"
        );
        assert_eq!(
            courier.message_to_admin(&event, "第二条").await,
            "发送失败：您的发送频率过高，触发了系统的防刷屏保护。"
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_private_and_group_messages() {
        let (courier, transport) = new_courier(json!({
            "allowed_users": ["20002"],
            "allowed_groups": ["30003"],
        }));
        let event = MockEvent::private("10001");

        assert_eq!(
            courier.handle(&event, "私聊 20002 你好").await.as_deref(),
            Some("私聊消息已成功发送。")
        );
        assert_eq!(
            courier.handle(&event, "私聊 40004 你好").await.as_deref(),
            Some("发送失败：目标不在允许发送的名单中。")
        );
        assert_eq!(
            courier.handle(&event, "群发 30003 开会").await.as_deref(),
            Some("群消息发送成功")
        );
        assert_eq!(
            courier.handle(&event, "私聊 20002").await.as_deref(),
            Some("用法：私聊 <QQ号> <内容>")
        );
        assert_eq!(courier.handle(&event, "今天吃什么").await, None);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_group_message_transport_failure() {
        let store = Arc::new(ConfigStore::new(
            Config::default(),
            json!({ "unrestricted_send": true }),
        ));
        let courier = Courier::new(
            store,
            Arc::new(MockTransport::failing()),
            Arc::new(GroupHistory::new(100)),
        );
        let event = MockEvent::private("10001");

        assert_eq!(
            courier.group_message(&event, "30003", "开会").await,
            "群消息发送失败：系统暂时无法发送消息，请稍后再试"
        );
    }

    #[test]
    fn test_get_admin_info() {
        let (courier, _) = new_courier(json!({ "admin_id": "10000", "enable_sue": false }));
        let info = courier.get_admin_info();
        assert!(info.contains("管理员ID: 10000"));
        assert!(info.contains("告状功能: 关闭"));
        assert!(info.contains("启用自定义错误: 开启"));

        let (courier, _) = new_courier(json!({}));
        assert!(courier.get_admin_info().contains("管理员ID: 未配置"));
    }

    #[test]
    fn test_reload_config_is_admin_only() {
        let path = std::env::temp_dir().join(format!("admin_courier_reload_{}.json", std::process::id()));
        let mut config = Config {
            admin_id: "10000".to_string(),
            ..Config::default()
        };
        save_config(&path, &config).unwrap();

        let store = Arc::new(ConfigStore::from_file(&path));
        let courier = Courier::new(
            store,
            Arc::new(MockTransport::default()),
            Arc::new(GroupHistory::new(100)),
        )
        .with_config_path(&path);

        assert_eq!(
            courier.reload_config(&MockEvent::private("10001")),
            "重载失败：只有管理员可以重载配置。"
        );

        let admin = MockEvent::private("10000");
        assert_eq!(courier.reload_config(&admin), "配置未发生变化。");

        config.enable_sue = false;
        save_config(&path, &config).unwrap();
        assert_eq!(courier.reload_config(&admin), "配置已重新加载。");
        assert!(!courier.config().enable_sue);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_render_reply_intercepts_errors() {
        let (courier, _) = new_courier(json!({ "custom_error_message": "出错了 {error_code}" }));
        assert_eq!(courier.render_reply("Error code: 429 - rate limited"), "出错了 429");
        assert_eq!(courier.render_reply("今天也要开心"), "今天也要开心");
    }
}
