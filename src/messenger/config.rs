use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

/// 插件配置
///
/// 扁平结构，缺失的键一律回退到 [`Config::default`] 中的硬编码默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 管理员 QQ 号，为空表示未配置
    pub admin_id: String,
    /// 是否开启告状功能
    pub enable_sue: bool,
    /// 自定义错误消息模板，支持 {error_message} 和 {error_code}
    pub custom_error_message: String,
    /// 是否启用错误消息拦截
    pub enable_custom_error: bool,
    /// 无触发事件时（插件主动下发）使用的平台
    pub default_platform: String,
    /// 关闭目标白名单检查
    pub unrestricted_send: bool,
    /// 允许私聊的目标用户
    pub allowed_users: Vec<String>,
    /// 允许发送群消息的目标群
    pub allowed_groups: Vec<String>,

    // 触发关键词，按前缀匹配
    pub admin_keywords: Vec<String>,
    pub sue_keywords: Vec<String>,
    pub private_keywords: Vec<String>,
    pub group_keywords: Vec<String>,
    pub info_keywords: Vec<String>,
    pub reload_keywords: Vec<String>,

    /// 频率限制窗口（秒）
    pub rate_limit_window: u64,
    /// 窗口内最大发送次数
    pub rate_limit_max: usize,
    /// 单条消息最大字符数，超出部分截断
    pub max_message_length: usize,

    /// 每个群保留的历史消息条数
    pub history_limit: usize,
    /// 生成告状内容时参考的历史消息条数
    pub history_context: usize,
    /// 配置热重载间隔（秒），0 表示关闭后台重载
    pub reload_interval: u64,
    /// 群消息历史落盘间隔（秒），0 表示只在卸载时保存
    pub history_save_interval: u64,

    pub llm: LlmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// 是否使用 LLM 润色告状内容
    pub enabled: bool,
    /// "openai" 或 "claude"
    pub provider: String,
    pub model: String,
    pub url: String,
    pub apikey: String,
    /// 温度参数（0-2），设为 None 使用 API 默认值
    pub temperature: Option<f32>,
    /// 最大输出 token 数，设为 None 使用 API 默认值
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            model: String::new(),
            url: "https://api.openai.com/v1".to_string(),
            apikey: String::new(),
            temperature: None,
            max_tokens: None,
        }
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            admin_id: String::new(),
            enable_sue: true,
            custom_error_message: "系统出现异常，请联系管理员处理。{error_message}".to_string(),
            enable_custom_error: true,
            default_platform: "qq".to_string(),
            unrestricted_send: false,
            allowed_users: Vec::new(),
            allowed_groups: Vec::new(),
            admin_keywords: keywords(&["告诉管理员", "联系管理员"]),
            sue_keywords: keywords(&["告状", "投诉"]),
            private_keywords: keywords(&["私聊"]),
            group_keywords: keywords(&["群发"]),
            info_keywords: keywords(&["管理员信息"]),
            reload_keywords: keywords(&["重载配置"]),
            rate_limit_window: 60,
            rate_limit_max: 5,
            max_message_length: 4000,
            history_limit: 100,
            history_context: 10,
            reload_interval: 30,
            history_save_interval: 300,
            llm: LlmConfig::default(),
        }
    }
}

/// 将覆盖配置逐键合并到默认配置上
///
/// - 非对象的覆盖配置被忽略，直接返回默认配置
/// - 未知键被忽略
/// - 类型不匹配的键跳过并保留默认值
pub fn merge_config(defaults: &Config, raw: &Value) -> Config {
    let overrides = match raw {
        Value::Object(map) => map,
        Value::Null => return defaults.clone(),
        other => {
            log::warn!("⚠️  插件配置格式错误（期望对象，实际为 {}），已回退至默认配置", json_kind(other));
            return defaults.clone();
        }
    };

    let mut merged = match serde_json::to_value(defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults.clone(),
    };
    let mut config = defaults.clone();

    for (key, value) in overrides {
        if !merged.contains_key(key) {
            log::debug!("忽略未知配置项: {}", key);
            continue;
        }

        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        match serde_json::from_value::<Config>(Value::Object(candidate.clone())) {
            Ok(parsed) => {
                merged = candidate;
                config = parsed;
            }
            Err(e) => {
                log::warn!("⚠️  配置项 {} 格式错误，已回退至默认值: {}", key, e);
            }
        }
    }

    config
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct CachedConfig {
    snapshot: Value,
    merged: Arc<Config>,
}

/// 配置存储
///
/// 持有默认配置和宿主推送/文件读取的原始覆盖配置。合并结果连同原始配置的
/// 快照一起缓存，只有原始配置发生变化时才重新合并。
pub struct ConfigStore {
    defaults: Config,
    raw: RwLock<Value>,
    cache: Mutex<Option<CachedConfig>>,
}

impl ConfigStore {
    pub fn new(defaults: Config, raw: Value) -> Self {
        Self {
            defaults,
            raw: RwLock::new(raw),
            cache: Mutex::new(None),
        }
    }

    /// 从配置文件构建，读取失败时使用默认配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let raw = match read_raw_config(path.as_ref()) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("❌ 读取配置失败: {:#}，使用默认配置", e);
                Value::Null
            }
        };
        Self::new(Config::default(), raw)
    }

    /// 获取最新配置
    pub fn get_config(&self) -> Arc<Config> {
        let raw = self.raw.read().unwrap_or_else(|e| e.into_inner());
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = cache.as_ref() {
            if cached.snapshot == *raw {
                return Arc::clone(&cached.merged);
            }
        }

        let merged = Arc::new(merge_config(&self.defaults, &raw));
        *cache = Some(CachedConfig {
            snapshot: raw.clone(),
            merged: Arc::clone(&merged),
        });
        log::debug!("已重新加载并缓存最新配置");
        merged
    }

    /// 替换原始覆盖配置（宿主推送）
    pub fn set_override(&self, raw: Value) {
        let mut current = self.raw.write().unwrap_or_else(|e| e.into_inner());
        *current = raw;
    }

    /// 重新读取配置文件，返回配置是否发生变化
    pub fn reload_from_file<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let raw = read_raw_config(path.as_ref())?;
        let mut current = self.raw.write().unwrap_or_else(|e| e.into_inner());
        if *current == raw {
            return Ok(false);
        }
        *current = raw;
        Ok(true)
    }
}

/// 读取原始配置 JSON
/// 如果配置文件不存在，会创建一个默认配置文件
fn read_raw_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        let default_config = Config::default();
        save_config(path, &default_config)?;
        return Ok(serde_json::to_value(default_config)?);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
    let raw = serde_json::from_str(&content)
        .with_context(|| format!("解析配置文件 {} 失败", path.display()))?;
    Ok(raw)
}

/// 加载配置文件
/// 如果配置文件不存在，会创建一个默认配置文件
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let raw = read_raw_config(path.as_ref())?;
    Ok(merge_config(&Config::default(), &raw))
}

/// 保存配置文件
pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let path = path.as_ref();

    // 确保父目录存在
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // 将配置序列化为格式化的JSON
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("admin_courier_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn test_empty_override_keeps_all_defaults() {
        let defaults = Config::default();
        assert_eq!(merge_config(&defaults, &json!({})), defaults);
        assert_eq!(merge_config(&defaults, &Value::Null), defaults);
    }

    #[test]
    fn test_malformed_override_falls_back_to_defaults() {
        let defaults = Config::default();
        assert_eq!(merge_config(&defaults, &json!("admin_id=1")), defaults);
        assert_eq!(merge_config(&defaults, &json!([1, 2, 3])), defaults);
    }

    #[test]
    fn test_override_merges_per_key() {
        let defaults = Config::default();
        let merged = merge_config(
            &defaults,
            &json!({
                "admin_id": "10001",
                "enable_sue": "yes",
                "rate_limit_max": 3,
                "not_a_key": true,
            }),
        );

        assert_eq!(merged.admin_id, "10001");
        assert_eq!(merged.rate_limit_max, 3);
        // 类型错误的键保留默认值
        assert!(merged.enable_sue);
        assert_eq!(merged.default_platform, "qq");
    }

    #[test]
    fn test_store_caches_until_override_changes() {
        let store = ConfigStore::new(Config::default(), json!({ "admin_id": "1" }));

        let first = store.get_config();
        let second = store.get_config();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.admin_id, "1");

        store.set_override(json!({ "admin_id": "2" }));
        let third = store.get_config();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.admin_id, "2");
    }

    #[test]
    fn test_reload_from_file() {
        let path = temp_path("reload");
        let mut config = Config::default();
        config.admin_id = "42".to_string();
        save_config(&path, &config).unwrap();

        let store = ConfigStore::from_file(&path);
        assert_eq!(store.get_config().admin_id, "42");

        config.admin_id = "43".to_string();
        save_config(&path, &config).unwrap();
        assert!(store.reload_from_file(&path).unwrap());
        assert!(!store.reload_from_file(&path).unwrap());
        assert_eq!(store.get_config().admin_id, "43");

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_and_load_config() {
        let path = temp_path("roundtrip");

        let mut config = Config::default();
        config.admin_id = "123456".to_string();
        config.allowed_groups = vec!["789".to_string()];
        config.llm.enabled = true;
        config.llm.model = "gpt-4o-mini".to_string();
        config.llm.temperature = Some(0.5);

        save_config(&path, &config).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_creates_defaults() {
        let path = temp_path("missing");
        fs::remove_file(&path).ok();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(path.exists());

        fs::remove_file(&path).ok();
    }
}
