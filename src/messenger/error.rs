use thiserror::Error;

/// 消息下发失败的原因
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("消息内容为空")]
    EmptyMessage,
    #[error("无法确定调用来源")]
    UnknownSender,
    #[error("来源 {0} 发送频率过高")]
    RateLimited(String),
    #[error("目标 {0} 不在允许列表中")]
    Unauthorized(String),
    #[error("无法确定目标平台")]
    UnresolvedPlatform,
    #[error("底层发送失败: {0:#}")]
    Transport(anyhow::Error),
}

impl DispatchError {
    /// 面向用户的失败提示
    pub fn user_message(&self) -> &'static str {
        match self {
            DispatchError::EmptyMessage => "发送失败：消息内容不能为空。",
            DispatchError::UnknownSender => "发送失败：无法识别您的身份，已拒绝发送。",
            DispatchError::RateLimited(_) => "发送失败：您的发送频率过高，请稍后再试。",
            DispatchError::Unauthorized(_) => "发送失败：目标不在允许发送的名单中。",
            DispatchError::UnresolvedPlatform => "发送失败：无法确定消息所属平台，已拒绝发送。",
            DispatchError::Transport(_) => "发送失败：系统暂时无法发送消息，请稍后再试。",
        }
    }
}
