//! 增量搜索水位线
//!
//! 单个时间戳，表示“此刻及之前的回复都已处理过”。
//! 文件格式：`{ "lastCheckedTimestamp": "<RFC3339>", "updatedAt": "<本地时间>" }`

use crate::bot::error::{BotError, Result};
use crate::bot::storage::{read_optional, write_bytes_atomic};
use chrono::{DateTime, Duration, Local, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 水位线字段名；发帖组件使用同格式的兄弟文件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkKey {
    LastChecked,
    LastPosted,
}

impl WatermarkKey {
    pub fn as_str(self) -> &'static str {
        match self {
            WatermarkKey::LastChecked => "lastCheckedTimestamp",
            WatermarkKey::LastPosted => "lastPostedTimestamp",
        }
    }
}

/// 水位线存储（最后写入者生效）
pub struct WatermarkStore {
    path: PathBuf,
    key: WatermarkKey,
    max_lookback: Duration,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>, max_lookback: Duration) -> Self {
        Self::with_key(path, WatermarkKey::LastChecked, max_lookback)
    }

    pub fn with_key(path: impl Into<PathBuf>, key: WatermarkKey, max_lookback: Duration) -> Self {
        Self {
            path: path.into(),
            key,
            max_lookback,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取水位线；首次运行或文件不可读时返回 `now - max_lookback`
    pub fn load(&self) -> DateTime<Utc> {
        match self.try_load() {
            Ok(Some(ts)) => {
                debug!("[Watermark] 读取水位线: {}", ts.to_rfc3339());
                ts
            }
            Ok(None) => {
                let fallback = self.default_watermark();
                info!(
                    "[Watermark] 首次运行，使用最大回看窗口起点: {}",
                    fallback.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
                fallback
            }
            Err(e) => {
                let fallback = self.default_watermark();
                warn!(
                    "[Watermark] 读取水位线失败，回退到最大回看窗口起点 {}: {}",
                    fallback.to_rfc3339_opts(SecondsFormat::Secs, true),
                    e
                );
                fallback
            }
        }
    }

    fn default_watermark(&self) -> DateTime<Utc> {
        let now = Utc::now();
        now.checked_sub_signed(self.max_lookback).unwrap_or(now)
    }

    fn try_load(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let raw = value
            .get(self.key.as_str())
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                BotError::Config(format!(
                    "{} 缺少字段 {}",
                    self.path.display(),
                    self.key.as_str()
                ))
            })?;
        let ts = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| BotError::Config(format!("非法时间戳 '{}': {}", raw, e)))?;
        Ok(Some(ts.with_timezone(&Utc)))
    }

    /// 无条件覆盖保存
    pub fn save(&self, ts: DateTime<Utc>) -> Result<()> {
        let mut body = serde_json::Map::new();
        body.insert(
            self.key.as_str().to_string(),
            serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        body.insert(
            "updatedAt".to_string(),
            serde_json::Value::String(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        let bytes = serde_json::to_vec_pretty(&serde_json::Value::Object(body))?;
        write_bytes_atomic(&self.path, &bytes)?;
        info!(
            "[Watermark] 已更新水位线: {}",
            ts.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        Ok(())
    }
}
