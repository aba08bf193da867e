//! kovi 宿主适配：消息事件与 OneBot 发送接口

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use kovi::{MsgEvent, RuntimeBot};
use std::sync::Arc;

use crate::messenger::{EventSource, MessageKind, MessageSession, Transport};

/// 当前适配器对应的平台名称
pub const PLATFORM: &str = "qq";

/// kovi 消息事件适配
pub struct KoviEvent {
    event: Arc<MsgEvent>,
}

impl KoviEvent {
    pub fn new(event: Arc<MsgEvent>) -> Self {
        Self { event }
    }
}

impl EventSource for KoviEvent {
    fn sender_id(&self) -> Option<String> {
        Some(self.event.sender.user_id.to_string())
    }

    // OneBot 事件不携带平台信息，由适配器名称兜底
    fn platform_id(&self) -> Option<String> {
        None
    }

    fn adapter_name(&self) -> Option<String> {
        Some(PLATFORM.to_string())
    }

    fn group_id(&self) -> Option<String> {
        if self.event.is_group() {
            self.event.group_id.map(|id| id.to_string())
        } else {
            None
        }
    }

    // 优先使用群名片，其次昵称
    fn sender_name(&self) -> Option<String> {
        self.event
            .sender
            .card
            .clone()
            .filter(|card| !card.is_empty())
            .or_else(|| self.event.sender.nickname.clone())
    }
}

/// OneBot 发送接口
///
/// 调用会等待协议端的返回，发送被拒绝时返回错误。
#[async_trait]
pub trait OneBotSender: Send + Sync {
    async fn deliver_private(&self, user_id: i64, text: String) -> Result<()>;
    async fn deliver_group(&self, group_id: i64, text: String) -> Result<()>;
}

#[async_trait]
impl OneBotSender for RuntimeBot {
    async fn deliver_private(&self, user_id: i64, text: String) -> Result<()> {
        let message_id = self
            .send_private_msg_return(user_id, text)
            .await
            .map_err(|e| anyhow!("OneBot 返回错误: {}", e))?;
        log::debug!("📤 私聊消息已送达 {}，消息 ID {}", user_id, message_id);
        Ok(())
    }

    async fn deliver_group(&self, group_id: i64, text: String) -> Result<()> {
        let message_id = self
            .send_group_msg_return(group_id, text)
            .await
            .map_err(|e| anyhow!("OneBot 返回错误: {}", e))?;
        log::debug!("📤 群消息已送达 {}，消息 ID {}", group_id, message_id);
        Ok(())
    }
}

/// kovi 发送通道适配
pub struct KoviTransport<S: OneBotSender> {
    sender: Arc<S>,
    platform: String,
}

impl<S: OneBotSender> KoviTransport<S> {
    pub fn new(sender: Arc<S>, platform: impl Into<String>) -> Self {
        Self {
            sender,
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl<S: OneBotSender> Transport for KoviTransport<S> {
    async fn send_message(&self, session: &MessageSession, text: &str) -> Result<()> {
        if session.platform != self.platform {
            anyhow::bail!(
                "平台 {} 不由当前适配器 {} 处理",
                session.platform,
                self.platform
            );
        }

        let id: i64 = session
            .session_id
            .parse()
            .with_context(|| format!("无效的会话 ID: {}", session.session_id))?;

        let sent = match session.kind {
            MessageKind::Private => self.sender.deliver_private(id, text.to_string()).await,
            MessageKind::Group => self.sender.deliver_group(id, text.to_string()).await,
        };
        sent.with_context(|| format!("{}消息发送到 {} 失败", session.kind.as_str(), id))
    }
}
