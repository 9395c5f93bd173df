//! 控制标签模块
//!
//! 解析机器人回复中的 `[[ADD...]]` 标签，并据此修改用户注册表

pub mod listener;
pub mod parser;
pub mod service;

pub use listener::{EmptyTagListener, TagListener};
pub use parser::{parse_tag, TagKind, TagVariant, TAG_PREFIX};
pub use service::{TagProcessor, TagSummary};
