//! 增量搜索模块
//!
//! 按水位线搜索机器人自己发出的带标签回复

pub mod api;
pub mod fetcher;
pub mod types;

pub use api::XApiClient;
pub use fetcher::{IncrementalFetcher, SearchCapability};
pub use types::{FetchedItem, Post, SearchPage, SearchQuery};
