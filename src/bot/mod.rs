pub mod compose;
pub mod config;
pub mod error;
pub mod ledger;
pub mod profile;
pub mod rotation;
pub mod search;
pub mod storage;
pub mod tag;
pub mod types;
pub mod user;
pub mod watermark;

// 重新导出配置与错误类型
pub use config::BotConfig;
pub use error::{BotError, Result};

// 重新导出标签处理相关类型
pub use tag::{EmptyTagListener, TagKind, TagListener, TagProcessor, TagSummary, TagVariant};

// 重新导出注册表、轮换与回复上下文
pub use compose::ReplyContext;
pub use ledger::ReplyLedger;
pub use profile::{ProfileCapability, ProfileRefresher};
pub use rotation::{RotationPolicy, RotationSelector};
pub use user::{Classification, EngagementOutcome, ProfileSnapshot, UserRecord, UserRegistry};
pub use watermark::{WatermarkKey, WatermarkStore};
