//! 用户注册表模块
//!
//! 以 CSV 平面文件保存被追踪账号的资料、分类和互动计数

pub mod dao;
pub mod models;
pub mod ranking;

pub use dao::UserRegistry;
pub use models::{
    normalize_username, Classification, Counter, EngagementOutcome, IntegrityReport,
    ProfileSnapshot, UserRecord,
};
pub use ranking::{resort_registry, sort_by_engagement};
