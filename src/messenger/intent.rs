use crate::messenger::config::Config;

/// 触发的功能类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    AdminInfo,
    ReloadConfig,
    MessageAdmin,
    SueAdmin,
    PrivateMessage,
    GroupMessage,
}

impl IntentKind {
    /// 使用说明
    pub fn usage(&self, trigger: &str) -> String {
        match self {
            IntentKind::AdminInfo | IntentKind::ReloadConfig => trigger.to_string(),
            IntentKind::MessageAdmin | IntentKind::SueAdmin => format!("用法：{} <内容>", trigger),
            IntentKind::PrivateMessage => format!("用法：{} <QQ号> <内容>", trigger),
            IntentKind::GroupMessage => format!("用法：{} <群号> <内容>", trigger),
        }
    }
}

/// 解析后的用户意图
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AdminInfo,
    ReloadConfig,
    MessageAdmin { content: String },
    SueAdmin { content: String },
    PrivateMessage { target: String, content: String },
    GroupMessage { group: String, content: String },
    /// 命中了关键词但参数不完整
    Usage { kind: IntentKind, trigger: String },
}

/// 按前缀匹配的关键词匹配器
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    kind: IntentKind,
    triggers: Vec<String>,
}

impl KeywordMatcher {
    pub fn new(kind: IntentKind, triggers: &[String]) -> Self {
        let mut triggers: Vec<String> = triggers
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        // 长关键词优先，避免 "私聊" 抢先匹配 "私聊管理员" 之类的前缀
        triggers.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
        Self { kind, triggers }
    }

    /// 命中时返回触发词和剩余文本
    fn strip<'a>(&self, text: &'a str) -> Option<(&str, &'a str)> {
        self.triggers.iter().find_map(|trigger| {
            text.strip_prefix(trigger.as_str())
                .map(|rest| (trigger.as_str(), rest.trim()))
        })
    }

    pub fn parse(&self, text: &str) -> Option<Intent> {
        let (trigger, rest) = self.strip(text)?;
        let usage = || Intent::Usage {
            kind: self.kind,
            trigger: trigger.to_string(),
        };

        let intent = match self.kind {
            IntentKind::AdminInfo if rest.is_empty() => Intent::AdminInfo,
            IntentKind::ReloadConfig if rest.is_empty() => Intent::ReloadConfig,
            // 带多余文本的查询类关键词视为普通聊天
            IntentKind::AdminInfo | IntentKind::ReloadConfig => return None,
            IntentKind::MessageAdmin | IntentKind::SueAdmin if rest.is_empty() => usage(),
            IntentKind::MessageAdmin => Intent::MessageAdmin {
                content: rest.to_string(),
            },
            IntentKind::SueAdmin => Intent::SueAdmin {
                content: rest.to_string(),
            },
            IntentKind::PrivateMessage | IntentKind::GroupMessage => {
                match split_target(rest) {
                    Some((target, content)) if self.kind == IntentKind::PrivateMessage => {
                        Intent::PrivateMessage { target, content }
                    }
                    Some((group, content)) => Intent::GroupMessage { group, content },
                    None => usage(),
                }
            }
        };
        Some(intent)
    }
}

/// 拆分 "<数字ID> <内容>"
fn split_target(rest: &str) -> Option<(String, String)> {
    let (target, content) = rest.split_once(char::is_whitespace)?;
    let content = content.trim();
    if target.is_empty() || !target.chars().all(|c| c.is_ascii_digit()) || content.is_empty() {
        return None;
    }
    Some((target.to_string(), content.to_string()))
}

/// 意图路由：有序的匹配器列表，先命中者生效
pub struct IntentRouter {
    matchers: Vec<KeywordMatcher>,
}

impl IntentRouter {
    pub fn new(matchers: Vec<KeywordMatcher>) -> Self {
        Self { matchers }
    }

    /// 根据配置中的关键词构建默认顺序的路由
    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            KeywordMatcher::new(IntentKind::ReloadConfig, &config.reload_keywords),
            KeywordMatcher::new(IntentKind::AdminInfo, &config.info_keywords),
            KeywordMatcher::new(IntentKind::SueAdmin, &config.sue_keywords),
            KeywordMatcher::new(IntentKind::MessageAdmin, &config.admin_keywords),
            KeywordMatcher::new(IntentKind::PrivateMessage, &config.private_keywords),
            KeywordMatcher::new(IntentKind::GroupMessage, &config.group_keywords),
        ])
    }

    pub fn route(&self, text: &str) -> Option<Intent> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.matchers.iter().find_map(|matcher| matcher.parse(text))
    }
}
