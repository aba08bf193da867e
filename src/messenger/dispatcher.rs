use std::sync::Arc;
use std::time::Duration;

use crate::messenger::config::{Config, ConfigStore};
use crate::messenger::error::DispatchError;
use crate::messenger::event::EventSource;
use crate::messenger::rate_limit::RateLimiter;
use crate::messenger::transport::{MessageKind, MessageSession, Transport};

/// 无触发事件（插件主动下发）时使用的来源
pub const SYSTEM_SOURCE: &str = "system";

const TRUNCATION_MARKER: &str = "...";

/// 消息下发器
///
/// 依次完成：内容校验与截断、来源识别、频率限制、目标授权、平台解析，
/// 最后交给宿主通道发送。
pub struct Dispatcher {
    limiter: RateLimiter,
    config: Arc<ConfigStore>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// 创建下发器，频率限制参数取自当前配置
    pub fn new(config: Arc<ConfigStore>, transport: Arc<dyn Transport>) -> Self {
        let current = config.get_config();
        let limiter = RateLimiter::new(
            Duration::from_secs(current.rate_limit_window),
            current.rate_limit_max,
        );
        Self {
            limiter,
            config,
            transport,
        }
    }

    /// 发送私聊消息
    pub async fn send_private(
        &self,
        target_id: &str,
        message: &str,
        event: Option<&dyn EventSource>,
    ) -> Result<(), DispatchError> {
        self.dispatch(MessageKind::Private, target_id, message, event)
            .await
    }

    /// 发送群消息
    pub async fn send_group(
        &self,
        group_id: &str,
        message: &str,
        event: Option<&dyn EventSource>,
    ) -> Result<(), DispatchError> {
        self.dispatch(MessageKind::Group, group_id, message, event)
            .await
    }

    async fn dispatch(
        &self,
        kind: MessageKind,
        target_id: &str,
        message: &str,
        event: Option<&dyn EventSource>,
    ) -> Result<(), DispatchError> {
        if message.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }

        let config = self.config.get_config();
        let message = truncate_message(message, config.max_message_length);
        let target_id = target_id.trim();

        let source_id = resolve_source(event)?;
        let limit_key = match kind {
            MessageKind::Private => format!("user_{}", source_id),
            MessageKind::Group => format!("group_{}", source_id),
        };
        if !self.limiter.allow(&limit_key) {
            log::warn!("⚠️  {}频率限制：调用来源 {} 触发频率过高", kind.as_str(), source_id);
            return Err(DispatchError::RateLimited(source_id));
        }

        authorize(&config, kind, target_id)?;

        let platform = resolve_platform(&config, event)?;
        let session = MessageSession {
            platform,
            kind,
            session_id: target_id.to_string(),
        };

        log::info!(
            "📤 发送{}消息：来源 [{}] -> 目标 [{}]，消息长度 {}",
            kind.as_str(),
            source_id,
            target_id,
            message.chars().count()
        );

        self.transport
            .send_message(&session, &message)
            .await
            .map_err(|e| {
                log::error!(
                    "❌ 消息底层发送失败 | 平台: {} | 目标: '{}' | 异常: {:#}",
                    session.platform,
                    session.session_id,
                    e
                );
                DispatchError::Transport(e)
            })
    }
}

/// 超出长度的消息截断并追加省略标记
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// 有事件时必须能拿到发送者 ID，否则拒绝，避免多个用户共用同一个限流桶
fn resolve_source(event: Option<&dyn EventSource>) -> Result<String, DispatchError> {
    match event {
        None => Ok(SYSTEM_SOURCE.to_string()),
        Some(event) => match event.sender_id() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => {
                log::warn!("⚠️  无法从事件中获取调用来源 ID，拒绝发送");
                Err(DispatchError::UnknownSender)
            }
        },
    }
}

fn authorize(config: &Config, kind: MessageKind, target_id: &str) -> Result<(), DispatchError> {
    if config.unrestricted_send {
        return Ok(());
    }

    let allowed = match kind {
        MessageKind::Private => {
            (!config.admin_id.is_empty() && config.admin_id == target_id)
                || config.allowed_users.iter().any(|id| id == target_id)
        }
        MessageKind::Group => config.allowed_groups.iter().any(|id| id == target_id),
    };

    if allowed {
        Ok(())
    } else {
        log::warn!("⚠️  {}目标 {} 不在允许列表中", kind.as_str(), target_id);
        Err(DispatchError::Unauthorized(target_id.to_string()))
    }
}

/// 解析目标平台
///
/// 有事件时只信任事件自身的平台信息，不回退到默认平台，防止多平台环境下串线。
fn resolve_platform(
    config: &Config,
    event: Option<&dyn EventSource>,
) -> Result<String, DispatchError> {
    let platform = match event {
        Some(event) => event
            .platform_id()
            .filter(|p| !p.is_empty())
            .or_else(|| event.adapter_name().filter(|p| !p.is_empty())),
        None => Some(config.default_platform.clone()).filter(|p| !p.is_empty()),
    };

    platform.ok_or_else(|| {
        log::warn!("⚠️  无法确定消息所属平台，拒绝发送");
        DispatchError::UnresolvedPlatform
    })
}
