//! X API v2 通用响应结构与 HTTP 响应处理

use crate::bot::user::ProfileSnapshot;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info, warn};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 统一的 API 响应包装结构体（data / includes / meta / errors）
///
/// 没有结果时 X 只返回 meta，data 缺失，因此使用 `Option<T>`
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub includes: Includes,
    pub meta: Option<ResponseMeta>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub errors: Vec<ApiErrorDetail>,
}

/// expansions 展开的内联对象
#[derive(Debug, Default, Deserialize)]
pub struct Includes {
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub users: Vec<XUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub result_count: u32,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
    pub next_token: Option<String>,
}

/// 部分错误或整体错误的明细
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub detail: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
}

impl ApiErrorDetail {
    /// 资源不存在（用户改名、注销等）
    pub fn is_not_found(&self) -> bool {
        self.error_type.ends_with("/resource-not-found") || self.title == "Not Found Error"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
    #[serde(default)]
    pub listed_count: u64,
    #[serde(default)]
    pub like_count: u64,
}

/// X 用户对象（按 user.fields 请求的字段）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct XUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub public_metrics: Option<PublicMetrics>,
}

impl XUser {
    /// 转换为注册表使用的资料快照
    pub fn to_snapshot(&self) -> ProfileSnapshot {
        let metrics = self.public_metrics.clone().unwrap_or_default();
        ProfileSnapshot {
            username: self.username.clone(),
            external_id: self.id.clone(),
            display_name: self.name.clone(),
            bio: self.description.clone().unwrap_or_default(),
            created_at: self.created_at.clone().unwrap_or_default(),
            location: self.location.clone().unwrap_or_default(),
            url: self.url.clone().unwrap_or_default(),
            profile_image_url: self.profile_image_url.clone().unwrap_or_default(),
            verified: self.verified,
            follower_count: metrics.followers_count,
            following_count: metrics.following_count,
            post_count: metrics.tweet_count,
        }
    }
}

/// 通用 HTTP 响应处理函数：检查状态码后反序列化为统一响应结构体
///
/// errors 的判定见 [`check_api_errors`]
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    let api_resp = check_api_errors(api_resp, operation_name)?;

    info!(
        "[HTTP] {}完成，结果数: {}",
        operation_name,
        api_resp.meta.as_ref().map(|m| m.result_count).unwrap_or(0)
    );
    Ok(api_resp)
}

/// 检查响应中的 errors 数组
///
/// 只有 errors 没有 data 时视为失败；但如果全部是“资源不存在”，返回空 data 由调用方处理
fn check_api_errors<T>(
    api_resp: ApiResponse<T>,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    if api_resp.errors.is_empty() {
        return Ok(api_resp);
    }
    let summary = api_resp
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.title, e.detail))
        .collect::<Vec<_>>()
        .join("; ");
    if api_resp.data.is_some() {
        warn!("[HTTP] {}部分错误（已忽略）: {}", operation_name, summary);
        return Ok(api_resp);
    }
    if api_resp.errors.iter().all(ApiErrorDetail::is_not_found) {
        info!("[HTTP] {}资源不存在: {}", operation_name, summary);
        return Ok(api_resp);
    }
    error!("[HTTP] {}服务器错误: {}", operation_name, summary);
    Err(anyhow::anyhow!("服务器错误: {}", summary))
}
