//! 增量搜索 DTO

use crate::bot::types::ApiResponse;
use crate::bot::user::ProfileSnapshot;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

/// 搜索返回的帖子（按 tweet.fields 请求的字段）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub in_reply_to_user_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
}

/// 一次 recent search 的完整结果（帖子 + 内联用户）
pub type SearchPage = ApiResponse<Vec<Post>>;

/// 搜索条件：机器人本人发出的、回复他人的、含标签前缀的非转发帖子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub author: String,
    /// 宽匹配短语，所有标签变体共享
    pub phrase: String,
    pub since: DateTime<Utc>,
    pub replies_only: bool,
    pub exclude_reshares: bool,
    pub max_results: u32,
}

impl SearchQuery {
    /// 渲染为 X 搜索语法
    pub fn render(&self) -> String {
        let mut parts = vec![format!("from:{}", self.author.trim_start_matches('@'))];
        if self.replies_only {
            parts.push("is:reply".to_string());
        }
        parts.push(format!("\"{}\"", self.phrase.replace('"', "")));
        if self.exclude_reshares {
            parts.push("-is:retweet".to_string());
        }
        parts.join(" ")
    }

    pub fn start_time(&self) -> String {
        self.since.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// 抓取结果：一条带标签的回复及其回复对象的资料快照
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItem {
    pub item_id: String,
    pub text: String,
    pub target_username: String,
    pub target_profile: ProfileSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn query_renders_single_broad_prefix() {
        let q = SearchQuery {
            author: "@DocBot".to_string(),
            phrase: "[[ADD".to_string(),
            since: Utc.with_ymd_and_hms(2026, 10, 1, 8, 0, 0).unwrap(),
            replies_only: true,
            exclude_reshares: true,
            max_results: 100,
        };
        assert_eq!(q.render(), r#"from:DocBot is:reply "[[ADD" -is:retweet"#);
        assert_eq!(q.start_time(), "2026-10-01T08:00:00Z");
    }
}
