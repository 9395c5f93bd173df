pub mod bot;

// 重新导出常用类型和函数，方便外部使用
pub use bot::{
    config::BotConfig,
    error::{BotError, Result},
    rotation::{RotationPolicy, RotationSelector},
    search::{IncrementalFetcher, SearchCapability, XApiClient},
    tag::{parse_tag, TagKind, TagListener, TagProcessor, TagSummary},
    user::{Classification, UserRecord, UserRegistry},
    watermark::WatermarkStore,
};
