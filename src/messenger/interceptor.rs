//! 错误消息拦截
//!
//! 在回复离开插件前检查文本是否为系统错误（模型服务报错、鉴权失败、异常堆栈等），
//! 命中时替换为配置的自定义提示。

use lazy_regex::{lazy_regex, Lazy};
use regex::Regex;

use crate::messenger::config::Config;

static RE_LLM_RESPONSE: Lazy<Regex> = lazy_regex!(r"(?i)^(?:\[[^\]]*\]\s*)?LLM\s*响应错误");
static RE_ALL_MODELS_FAILED: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:\[[^\]]*\]\s*)?All chat models failed");
static RE_ERROR_CODE_PREFIX: Lazy<Regex> = lazy_regex!(r"(?i)^Error code:\s*\d+\s*-");
static RE_AUTHENTICATION: Lazy<Regex> = lazy_regex!(r"(?i)AuthenticationError");
static RE_INVALID_API_KEY: Lazy<Regex> = lazy_regex!(r"(?i)API key is invalid");
static RE_TRACEBACK: Lazy<Regex> =
    lazy_regex!(r"(?i)^(?:Exception|Traceback).*?(?:most recent call last)");

static RE_ERROR_CODE: Lazy<Regex> = lazy_regex!(r"(?i)Error code:\s*(\d+)");

/// 按顺序匹配，先命中者生效
fn error_patterns() -> [(&'static str, &'static Regex); 6] {
    [
        ("llm_response_error", &*RE_LLM_RESPONSE),
        ("all_models_failed", &*RE_ALL_MODELS_FAILED),
        ("error_code_prefix", &*RE_ERROR_CODE_PREFIX),
        ("authentication_error", &*RE_AUTHENTICATION),
        ("invalid_api_key", &*RE_INVALID_API_KEY),
        ("traceback", &*RE_TRACEBACK),
    ]
}

/// 命中的错误规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMatch {
    pub rule: &'static str,
    pub code: Option<String>,
}

pub struct ErrorInterceptor;

impl ErrorInterceptor {
    /// 判断文本是否为系统错误
    pub fn classify(text: &str) -> Option<ErrorMatch> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let (rule, pattern) = error_patterns()
            .into_iter()
            .find(|(_, pattern)| pattern.is_match(text))?;

        log::debug!("拦截到系统错误，匹配规则: {}", pattern.as_str());
        let code = RE_ERROR_CODE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        Some(ErrorMatch { rule, code })
    }

    /// 出站钩子：命中错误时返回替换后的文本，未命中返回 None
    pub fn intercept(text: &str, config: &Config) -> Option<String> {
        if !config.enable_custom_error {
            return None;
        }

        let matched = Self::classify(text)?;
        log::info!("🛡️  已拦截系统错误消息（规则: {}）", matched.rule);
        Some(Self::render_template(
            &config.custom_error_message,
            text.trim(),
            matched.code.as_deref().unwrap_or(""),
        ))
    }

    /// 替换模板中的 {error_message} 和 {error_code}
    pub fn render_template(template: &str, error_message: &str, error_code: &str) -> String {
        template
            .replace("{error_message}", error_message)
            .replace("{error_code}", error_code)
    }
}
