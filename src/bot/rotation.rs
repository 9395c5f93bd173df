//! 轮换选择器：决定下一次互动的目标用户
//!
//! - `Sequential`：持久化下标，按注册表顺序循环，每次调用无条件前进
//! - `AlwaysHead`：始终取注册表第一条。前提：调用方在两轮之间已对注册表重排
//!   （见 [`crate::bot::user::ranking`]），选择器本身不排序、不记账

use crate::bot::error::{BotError, Result};
use crate::bot::storage::{read_optional, write_bytes_atomic};
use crate::bot::user::{UserRecord, UserRegistry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 轮换策略（配置项，不自动推断）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RotationPolicy {
    #[default]
    Sequential,
    AlwaysHead,
}

/// 轮换选择器
pub struct RotationSelector {
    policy: RotationPolicy,
    index_path: PathBuf,
}

impl RotationSelector {
    pub fn new(policy: RotationPolicy, index_path: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            index_path: index_path.into(),
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// 选择下一个用户；注册表为空时返回 `EmptyRegistry`
    pub fn next(&self, registry: &UserRegistry) -> Result<UserRecord> {
        let records = registry.all();
        if records.is_empty() {
            warn!("[Rotation] ❌ 注册表为空，本轮无法选择用户");
            return Err(BotError::EmptyRegistry);
        }

        match self.policy {
            RotationPolicy::AlwaysHead => {
                let head = records[0].clone();
                info!(
                    "[Rotation] 始终取表头: @{}（共 {} 个用户）",
                    head.username,
                    records.len()
                );
                Ok(head)
            }
            RotationPolicy::Sequential => {
                let count = records.len();
                let index = self.load_index() % count;
                let selected = records[index].clone();
                self.save_index((index + 1) % count)?;
                info!(
                    "[Rotation] 顺序轮换: @{}（位置 {}/{}）",
                    selected.username,
                    index + 1,
                    count
                );
                Ok(selected)
            }
        }
    }

    /// 读取下标；文件缺失或内容非法时从 0 开始
    pub fn load_index(&self) -> usize {
        match read_optional(&self.index_path) {
            Ok(Some(content)) => content.trim().parse().unwrap_or_else(|_| {
                warn!(
                    "[Rotation] 下标文件内容非法 '{}'，从 0 开始",
                    content.trim()
                );
                0
            }),
            Ok(None) => 0,
            Err(e) => {
                warn!("[Rotation] 读取下标文件失败，从 0 开始: {}", e);
                0
            }
        }
    }

    fn save_index(&self, index: usize) -> Result<()> {
        write_bytes_atomic(&self.index_path, index.to_string().as_bytes())?;
        debug!("[Rotation] 已保存下一轮下标: {}", index);
        Ok(())
    }
}
