//! 机器人配置
//!
//! JSON 配置文件（camelCase），缺省字段使用默认值；
//! 凭据可由环境变量 `BOT_BEARER_TOKEN` / `BOT_HANDLE` 覆盖。

use crate::bot::error::{BotError, Result};
use crate::bot::rotation::RotationPolicy;
use crate::bot::storage::read_optional;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_BEARER_TOKEN: &str = "BOT_BEARER_TOKEN";
pub const ENV_BOT_HANDLE: &str = "BOT_HANDLE";

/// recent search 只覆盖最近 7 天
pub const MAX_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotConfig {
    /// X API v2 基础地址
    pub api_base_url: String,
    /// 机器人自己的账号（不带 @）
    pub bot_handle: String,
    /// App-only bearer token
    #[serde(skip_serializing)]
    pub bearer_token: String,
    /// 所有状态文件所在目录
    pub data_dir: PathBuf,
    pub registry_file: String,
    pub watermark_file: String,
    pub rotation_index_file: String,
    pub replied_ledger_file: String,
    /// 首次运行和搜索允许的最大回看天数（recent search 上限为 7 天）
    pub max_lookback_days: i64,
    pub request_timeout_secs: u64,
    /// 单次搜索返回条数（10..=100）
    pub max_results: u32,
    /// 搜索使用的标签公共前缀
    pub tag_prefix: String,
    pub rotation_policy: RotationPolicy,
    pub max_replied_posts: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.x.com/2".to_string(),
            bot_handle: String::new(),
            bearer_token: String::new(),
            data_dir: PathBuf::from("."),
            registry_file: "user_data.csv".to_string(),
            watermark_file: "last_add_check.json".to_string(),
            rotation_index_file: "account_index.txt".to_string(),
            replied_ledger_file: "replied_tweets.txt".to_string(),
            max_lookback_days: 7,
            request_timeout_secs: 30,
            max_results: 100,
            tag_prefix: "[[ADD".to_string(),
            rotation_policy: RotationPolicy::Sequential,
            max_replied_posts: 500,
        }
    }
}

impl BotConfig {
    /// 读取配置文件（不存在则使用默认值），再应用环境变量覆盖
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = match read_optional(path)? {
            Some(content) => {
                info!("[Config] 读取配置文件: {}", path.display());
                serde_json::from_str::<BotConfig>(&content)?
            }
            None => {
                info!("[Config] 配置文件不存在，使用默认配置: {}", path.display());
                BotConfig::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ENV_BEARER_TOKEN) {
            if !token.trim().is_empty() {
                debug!("[Config] 使用环境变量 {} 中的 token", ENV_BEARER_TOKEN);
                self.bearer_token = token.trim().to_string();
            }
        }
        if let Ok(handle) = std::env::var(ENV_BOT_HANDLE) {
            if !handle.trim().is_empty() {
                self.bot_handle = handle.trim().trim_start_matches('@').to_string();
            }
        }
    }

    /// 本地状态相关配置校验
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.max_lookback_days) {
            return Err(BotError::Config(format!(
                "maxLookbackDays 必须在 1..={} 之间，当前: {}",
                MAX_LOOKBACK_DAYS, self.max_lookback_days
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(BotError::Config("requestTimeoutSecs 必须大于 0".into()));
        }
        if !(10..=100).contains(&self.max_results) {
            return Err(BotError::Config(format!(
                "maxResults 必须在 10..=100 之间，当前: {}",
                self.max_results
            )));
        }
        if self.tag_prefix.trim().is_empty() {
            return Err(BotError::Config("tagPrefix 不能为空".into()));
        }
        Ok(())
    }

    /// 需要访问网络时额外校验凭据
    pub fn validate_for_network(&self) -> Result<()> {
        self.validate()?;
        if self.bot_handle.trim().is_empty() {
            return Err(BotError::Config(format!(
                "缺少 botHandle（可通过 {} 设置）",
                ENV_BOT_HANDLE
            )));
        }
        if self.bearer_token.trim().is_empty() {
            return Err(BotError::Config(format!(
                "缺少 bearer token（可通过 {} 设置）",
                ENV_BEARER_TOKEN
            )));
        }
        Ok(())
    }

    /// 未校验的配置也不会超出搜索窗口
    pub fn max_lookback(&self) -> Duration {
        Duration::days(self.max_lookback_days.clamp(1, MAX_LOOKBACK_DAYS))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(&self.registry_file)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.data_dir.join(&self.watermark_file)
    }

    pub fn rotation_index_path(&self) -> PathBuf {
        self.data_dir.join(&self.rotation_index_file)
    }

    pub fn replied_ledger_path(&self) -> PathBuf {
        self.data_dir.join(&self.replied_ledger_file)
    }
}
