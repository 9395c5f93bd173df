//! 已回复帖子台账，避免对同一条帖子重复回复
//!
//! 纯文本文件，每行一个帖子 ID，只保留最近的 `max_entries` 条。

use crate::bot::error::Result;
use crate::bot::storage::{read_optional, write_bytes_atomic};
use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct ReplyLedger {
    path: PathBuf,
    max_entries: usize,
    entries: VecDeque<String>,
}

impl ReplyLedger {
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self> {
        let path = path.into();
        let mut entries = VecDeque::new();
        if let Some(content) = read_optional(&path)? {
            for id in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if !entries.iter().any(|e| e == id) {
                    entries.push_back(id.to_string());
                }
            }
        }
        while entries.len() > max_entries {
            entries.pop_front();
        }
        debug!("[Ledger] 已加载 {} 条已回复帖子 ID", entries.len());
        Ok(Self {
            path,
            max_entries,
            entries,
        })
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.entries.iter().any(|e| e == post_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 记录已回复的帖子；重复 ID 忽略，返回是否为新记录
    pub fn record(&mut self, post_id: &str) -> Result<bool> {
        if self.contains(post_id) {
            return Ok(false);
        }
        self.entries.push_back(post_id.to_string());
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }

        let mut body = String::new();
        for id in &self.entries {
            body.push_str(id);
            body.push('\n');
        }
        write_bytes_atomic(&self.path, body.as_bytes())?;
        info!(
            "[Ledger] 记录已回复帖子 {}（共 {} 条，上限 {}）",
            post_id,
            self.entries.len(),
            self.max_entries
        );
        Ok(true)
    }
}
