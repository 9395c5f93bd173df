//! X API v2 客户端：recent search 与按用户名查询资料
//!
//! 负责实际的网络请求，不做重试；失败统一转换为 `BotError::Transport`

use crate::bot::config::BotConfig;
use crate::bot::error::{BotError, Result};
use crate::bot::profile::ProfileCapability;
use crate::bot::search::fetcher::SearchCapability;
use crate::bot::search::types::{SearchPage, SearchQuery};
use crate::bot::types::{handle_http_response, ApiResponse, XUser};
use crate::bot::user::ProfileSnapshot;
use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

const TWEET_FIELDS: &str = "id,text,created_at,in_reply_to_user_id,author_id";
const USER_FIELDS: &str = "username,id,name,created_at,description,location,\
profile_image_url,protected,public_metrics,url,verified,verified_type";
const EXPANSIONS: &str = "in_reply_to_user_id";

/// X API HTTP 客户端
pub struct XApiClient {
    client: reqwest::Client,
    api_base_url: String,
}

impl XApiClient {
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 按配置创建带 bearer token 和超时的客户端
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        let client = build_http_client(config)
            .map_err(|e| BotError::Config(format!("创建 HTTP 客户端失败: {:#}", e)))?;
        Ok(Self::new(client, config.api_base_url.clone()))
    }

    async fn search_recent_inner(&self, query: &SearchQuery) -> anyhow::Result<SearchPage> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/tweets/search/recent", self.api_base_url);
        let rendered = query.render();

        info!("[XApi] 📡 请求标签回复搜索");
        debug!("[XApi]   请求URL: {}", url);
        debug!(
            "[XApi]   查询: {}, 起始时间: {}, 操作ID: {}",
            rendered,
            query.start_time(),
            operation_id
        );

        let response = self
            .client
            .get(&url)
            .header("X-Request-Id", &operation_id)
            .query(&[
                ("query", rendered),
                ("start_time", query.start_time()),
                ("max_results", query.max_results.to_string()),
                ("tweet.fields", TWEET_FIELDS.to_string()),
                ("expansions", EXPANSIONS.to_string()),
                ("user.fields", USER_FIELDS.to_string()),
            ])
            .send()
            .await
            .context("请求失败")?;

        let page: SearchPage = handle_http_response(response, "标签回复搜索").await?;

        info!(
            "[XApi] ✅ 标签回复搜索响应，帖子数: {}, 内联用户数: {}",
            page.data.as_ref().map(|d| d.len()).unwrap_or(0),
            page.includes.users.len()
        );
        Ok(page)
    }

    async fn fetch_user_inner(&self, username: &str) -> anyhow::Result<Option<XUser>> {
        let operation_id = Uuid::new_v4().to_string();
        let username = username.trim_start_matches('@');
        let url = format!("{}/users/by/username/{}", self.api_base_url, username);

        info!("[XApi] 📡 请求用户资料: @{}", username);
        debug!("[XApi]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .get(&url)
            .header("X-Request-Id", &operation_id)
            .query(&[("user.fields", USER_FIELDS)])
            .send()
            .await
            .context("请求失败")?;

        let resp: ApiResponse<XUser> = handle_http_response(response, "用户资料查询").await?;
        match &resp.data {
            Some(user) => info!("[XApi] ✅ 用户资料响应: @{} ({})", user.username, user.id),
            None => info!("[XApi] 用户 @{} 不存在", username),
        }
        Ok(resp.data)
    }
}

#[async_trait]
impl SearchCapability for XApiClient {
    async fn search_recent(&self, query: &SearchQuery) -> Result<SearchPage> {
        self.search_recent_inner(query)
            .await
            .map_err(|e| BotError::transport("search_recent", e))
    }
}

#[async_trait]
impl ProfileCapability for XApiClient {
    async fn fetch_profile(&self, username: &str) -> Result<Option<ProfileSnapshot>> {
        self.fetch_user_inner(username)
            .await
            .map(|user| user.map(|u| u.to_snapshot()))
            .map_err(|e| BotError::transport("fetch_profile", e))
    }
}

/// 创建带认证头的 HTTP 客户端（token 通过 default_headers 自动添加）
pub fn build_http_client(config: &BotConfig) -> anyhow::Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.bearer_token))
            .context("无效的 token")?,
    );
    reqwest::ClientBuilder::new()
        .default_headers(headers)
        .timeout(config.request_timeout())
        .user_agent(concat!("social-bot-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("创建 HTTP 客户端失败")
}
