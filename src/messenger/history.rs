use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 单条群消息记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub sender: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 群消息历史
///
/// 每个群保留最近 `limit` 条消息，整体以 JSON 形式保存到本地文件。
pub struct GroupHistory {
    groups: Mutex<HashMap<String, VecDeque<HistoryRecord>>>,
    limit: usize,
    // 自上次保存以来是否有新消息
    dirty: AtomicBool,
}

impl GroupHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            limit,
            dirty: AtomicBool::new(false),
        }
    }

    /// 从文件加载历史，文件不存在或损坏时返回空历史
    pub fn load<P: AsRef<Path>>(path: P, limit: usize) -> Self {
        let history = Self::new(limit);
        let path = path.as_ref();
        if !path.exists() {
            return history;
        }

        let loaded = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| {
                serde_json::from_str::<HashMap<String, VecDeque<HistoryRecord>>>(&content)
                    .map_err(anyhow::Error::from)
            });

        match loaded {
            Ok(mut groups) => {
                for records in groups.values_mut() {
                    trim_front(records, limit);
                }
                log::info!("📚 已加载 {} 个群的历史消息", groups.len());
                *history.groups.lock().unwrap_or_else(|e| e.into_inner()) = groups;
            }
            Err(e) => {
                log::warn!("⚠️  群消息历史文件 {} 解析失败: {}，已忽略", path.display(), e);
            }
        }
        history
    }

    /// 记录一条群消息
    pub fn record(&self, group_id: &str, sender: &str, message: &str) {
        if message.trim().is_empty() {
            return;
        }

        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let records = groups.entry(group_id.to_string()).or_default();
        records.push_back(HistoryRecord {
            sender: sender.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
        trim_front(records, self.limit);
        self.dirty.store(true, Ordering::Release);
    }

    /// 获取最近 `count` 条消息，按时间先后排列
    pub fn recent(&self, group_id: &str, count: usize) -> Vec<HistoryRecord> {
        let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        groups
            .get(group_id)
            .map(|records| {
                let skip = records.len().saturating_sub(count);
                records.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// 整体写入文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = {
            let groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
            self.dirty.store(false, Ordering::Release);
            serde_json::to_string_pretty(&*groups)?
        };

        let written = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, content));
        if written.is_err() {
            // 写入失败，留给下一次保存
            self.dirty.store(true, Ordering::Release);
        }
        Ok(written?)
    }

    /// 有新消息时才写入文件，返回是否写入
    pub fn save_if_dirty<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        if !self.dirty.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.save(path)?;
        Ok(true)
    }

    pub fn group_count(&self) -> usize {
        self.groups.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn trim_front(records: &mut VecDeque<HistoryRecord>, limit: usize) {
    while records.len() > limit {
        records.pop_front();
    }
}
