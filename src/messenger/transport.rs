use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// 会话类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Private,
    Group,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Private => "私聊",
            MessageKind::Group => "群聊",
        }
    }
}

/// 发送目标：平台 + 会话类型 + 会话 ID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSession {
    pub platform: String,
    pub kind: MessageKind,
    pub session_id: String,
}

impl fmt::Display for MessageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.platform, self.kind.as_str(), self.session_id)
    }
}

/// 宿主提供的消息发送通道
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, session: &MessageSession, text: &str) -> Result<()>;
}
