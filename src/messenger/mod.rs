//! # Messenger - 管理员传话与消息下发
//!
//! `messenger` 与宿主框架无关，只依赖 [`EventSource`] 和 [`Transport`] 两个适配接口：
//! - **频率限制**：按来源的滑动窗口限流，惰性全局清理
//! - **消息下发**：内容校验、来源识别、目标授权、平台解析
//! - **配置存储**：默认配置合并、缓存与热重载
//! - **错误拦截**：回复发出前识别系统错误并替换为自定义提示
//! - **关键词触发**：私聊、群发、联系管理员、告状
//! - **群消息历史**：为 LLM 整理告状内容提供上下文

// 核心模块
mod config;
mod courier;
mod dispatcher;
mod error;
mod event;
mod history;
mod intent;
mod interceptor;
mod llm;
mod prompt_template;
mod rate_limit;
mod transport;

// 公开导出
pub use config::{load_config, merge_config, save_config, Config, ConfigStore, LlmConfig};
pub use courier::{Courier, CourierStats};
pub use dispatcher::{truncate_message, Dispatcher, SYSTEM_SOURCE};
pub use error::DispatchError;
pub use event::EventSource;
pub use history::{GroupHistory, HistoryRecord};
pub use intent::{Intent, IntentKind, IntentRouter, KeywordMatcher};
pub use interceptor::{ErrorInterceptor, ErrorMatch};
pub use llm::{LlmClient, LlmProvider, Provider};
pub use rate_limit::RateLimiter;
pub use transport::{MessageKind, MessageSession, Transport};


/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
