//! 机器人核心错误类型
//!
//! 各模块统一返回 [`BotError`]，HTTP 层内部仍使用 anyhow，在边界处转换为 `Transport`。

use std::path::PathBuf;

/// 核心子系统的错误分类
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    /// 搜索调用失败（网络、鉴权、限流），本轮中止，水位线保持不变
    #[error("传输失败 [{operation}]: {reason}")]
    Transport {
        /// 失败的操作名
        operation: String,
        /// 失败原因（含完整上下文链）
        reason: String,
    },

    /// 注册表中不存在该用户名
    #[error("用户不存在: @{username}")]
    NotFound { username: String },

    /// CSV 行缺列或字段无法解析
    #[error("第 {line} 行数据损坏: {reason}")]
    CorruptRow { line: u64, reason: String },

    /// 搜索结果中的资料快照不完整，该条跳过
    #[error("帖子 {item_id} 的资料快照不完整: {reason}")]
    MalformedProfile { item_id: String, reason: String },

    /// 轮换时注册表为空
    #[error("用户注册表为空，无法选择下一个用户")]
    EmptyRegistry,

    /// 完整性检查发现重复用户名
    #[error("发现重复用户名: @{username}")]
    DuplicateUsername { username: String },

    /// 非法的分类标签
    #[error("非法分类: '{0}'，可选值为 friend / foe / jokster / snark 或空")]
    InvalidClassification(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    #[error("文件读写失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BotError {
    /// 包装 IO 错误并附带文件路径
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BotError::Io {
            path: path.into(),
            source,
        }
    }

    /// 将 anyhow 错误链转换为传输失败
    pub fn transport(operation: &str, err: anyhow::Error) -> Self {
        BotError::Transport {
            operation: operation.to_string(),
            reason: format!("{:#}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
