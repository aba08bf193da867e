use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct LimiterState {
    /// 来源 -> 窗口内放行记录的时间
    buckets: HashMap<String, Vec<Instant>>,
    last_sweep: Instant,
}

/// 按来源的滑动窗口频率限制器
///
/// 每次检查先清理调用者自己的过期记录；距离上次全局清理超过一个窗口时，
/// 顺带清理所有来源并删除空记录，避免字典无限增长。检查和记录在同一把锁内完成。
pub struct RateLimiter {
    state: Mutex<LimiterState>,
    window: Duration,
    max_calls: usize,
}

impl RateLimiter {
    /// 创建频率限制器
    ///
    /// # 参数
    /// - `window`: 时间窗口
    /// - `max_calls`: 窗口内允许的最大次数
    pub fn new(window: Duration, max_calls: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                buckets: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            window,
            max_calls,
        }
    }

    /// 检查来源是否可以继续发送，放行时记录本次调用
    pub fn allow(&self, source_id: &str) -> bool {
        self.allow_at(source_id, Instant::now())
    }

    /// 以指定时间点执行检查
    pub fn allow_at(&self, source_id: &str, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;
        let is_valid = |ts: &Instant| now.saturating_duration_since(*ts) < window;

        if let Some(timestamps) = state.buckets.get_mut(source_id) {
            timestamps.retain(is_valid);
        }

        if now.saturating_duration_since(state.last_sweep) > window {
            let before = state.buckets.len();
            state.buckets.retain(|sid, timestamps| {
                if sid != source_id {
                    timestamps.retain(is_valid);
                }
                sid == source_id || !timestamps.is_empty()
            });
            state.last_sweep = now;
            log::debug!(
                "已执行全局频率限制清理，移除 {} 个来源",
                before - state.buckets.len()
            );
        }

        let timestamps = state.buckets.entry(source_id.to_string()).or_default();
        if timestamps.len() >= self.max_calls {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// 当前跟踪的来源数量
    pub fn tracked_sources(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.buckets.len()
    }
}
