//! 增量抓取：水位线之后、最大回看窗口之内的带标签回复
//!
//! 无论标签有多少种变体，每轮只发出一次宽前缀搜索；
//! 变体区分完全交给标签解析器。资料快照来自搜索结果的内联展开，
//! 不会再逐个用户发请求。

use crate::bot::error::Result;
use crate::bot::search::types::{FetchedItem, SearchPage, SearchQuery};
use crate::bot::types::XUser;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// 外部搜索能力（具体传输由实现方决定）
#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// 执行一次搜索；失败返回 `BotError::Transport`，调用方不在本轮重试
    async fn search_recent(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// recent search 拒绝恰好落在窗口边界上的起始时间，留一点余量
const LOOKBACK_SAFETY_MARGIN_SECS: i64 = 60;

/// 增量抓取器
pub struct IncrementalFetcher {
    capability: Arc<dyn SearchCapability>,
    bot_handle: String,
    tag_prefix: String,
    max_lookback: Duration,
    max_results: u32,
}

impl IncrementalFetcher {
    pub fn new(
        capability: Arc<dyn SearchCapability>,
        bot_handle: String,
        tag_prefix: String,
        max_lookback: Duration,
        max_results: u32,
    ) -> Self {
        Self {
            capability,
            bot_handle,
            tag_prefix,
            max_lookback,
            max_results,
        }
    }

    /// 起始时间不得早于最大回看窗口
    pub fn clamp_since(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let earliest = now - self.max_lookback + Duration::seconds(LOOKBACK_SAFETY_MARGIN_SECS);
        if since < earliest {
            debug!(
                "[Fetcher] 起始时间 {} 超出最大回看窗口，调整为 {}",
                since.to_rfc3339(),
                earliest.to_rfc3339()
            );
            earliest
        } else {
            since
        }
    }

    pub fn build_query(&self, since: DateTime<Utc>) -> SearchQuery {
        SearchQuery {
            author: self.bot_handle.clone(),
            phrase: self.tag_prefix.clone(),
            since: self.clamp_since(since, Utc::now()),
            replies_only: true,
            exclude_reshares: true,
            max_results: self.max_results,
        }
    }

    /// 抓取 `since` 之后的带标签回复，保持接口返回顺序
    pub async fn fetch(&self, since: DateTime<Utc>) -> Result<Vec<FetchedItem>> {
        let query = self.build_query(since);
        info!(
            "[Fetcher] 🔍 搜索 {} 之后的标签回复",
            query.start_time()
        );

        let page = self.capability.search_recent(&query).await?;
        let items = join_page(page);

        if items.is_empty() {
            info!("[Fetcher] 没有新的标签回复");
        } else {
            info!("[Fetcher] 找到 {} 条标签回复", items.len());
        }
        Ok(items)
    }
}

/// 把帖子与内联用户按 in_reply_to_user_id 关联起来
fn join_page(page: SearchPage) -> Vec<FetchedItem> {
    let Some(posts) = page.data else {
        return Vec::new();
    };

    let users: HashMap<String, XUser> = page
        .includes
        .users
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    posts
        .into_iter()
        .filter_map(|post| {
            let Some(target_id) = post.in_reply_to_user_id.as_deref() else {
                debug!("[Fetcher] 帖子 {} 不是回复，跳过", post.id);
                return None;
            };
            let Some(user) = users.get(target_id) else {
                debug!(
                    "[Fetcher] 帖子 {} 的回复对象 {} 不在内联用户中，跳过",
                    post.id, target_id
                );
                return None;
            };
            Some(FetchedItem {
                item_id: post.id,
                text: post.text,
                target_username: user.username.clone(),
                target_profile: user.to_snapshot(),
            })
        })
        .collect()
}
