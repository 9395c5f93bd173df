//! 用户注册表模型定义

use crate::bot::error::BotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// 用户分类，决定下游回复的语气（CSV 中中立存为空字符串）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Classification {
    #[default]
    Neutral,
    Friend,
    Foe,
    Jokster,
    Snark,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Neutral => "",
            Classification::Friend => "friend",
            Classification::Foe => "foe",
            Classification::Jokster => "jokster",
            Classification::Snark => "snark",
        }
    }

    /// 用于日志展示，中立显示为 neutral
    pub fn display_name(self) -> &'static str {
        match self {
            Classification::Neutral => "neutral",
            other => other.as_str(),
        }
    }
}

impl FromStr for Classification {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "neutral" => Ok(Classification::Neutral),
            "friend" => Ok(Classification::Friend),
            "foe" => Ok(Classification::Foe),
            "jokster" => Ok(Classification::Jokster),
            "snark" => Ok(Classification::Snark),
            _ => Err(BotError::InvalidClassification(s.to_string())),
        }
    }
}

impl TryFrom<String> for Classification {
    type Error = BotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Classification> for String {
    fn from(value: Classification) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 外部平台返回的用户资料快照（只包含描述性字段和瞬时指标）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub username: String,
    pub external_id: String,
    pub display_name: String,
    pub bio: String,
    pub created_at: String,
    pub location: String,
    pub url: String,
    pub profile_image_url: String,
    pub verified: bool,
    pub follower_count: u64,
    pub following_count: u64,
    pub post_count: u64,
}

impl ProfileSnapshot {
    /// 快照必须带有用户名和外部 ID 才能写入注册表
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("缺少 username".to_string());
        }
        if self.external_id.trim().is_empty() {
            return Err(format!("@{} 缺少 external_id", self.username));
        }
        Ok(())
    }
}

/// 注册表中的一条用户记录（CSV 一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub external_id: String,
    pub display_name: String,
    pub bio: String,
    pub created_at: String,
    pub location: String,
    pub url: String,
    pub profile_image_url: String,
    #[serde(deserialize_with = "deserialize_bool_or_empty")]
    pub verified: bool,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub follower_count: u64,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub following_count: u64,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub post_count: u64,
    pub classification: Classification,
    #[serde(deserialize_with = "deserialize_bool_or_empty")]
    pub priority: bool,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub times_checked: u64,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub times_replied: u64,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub times_skipped: u64,
    #[serde(deserialize_with = "deserialize_count_or_empty")]
    pub times_no_candidate: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// CSV 表头，顺序即列顺序
pub const USER_COLUMNS: [&str; 19] = [
    "username",
    "external_id",
    "display_name",
    "bio",
    "created_at",
    "location",
    "url",
    "profile_image_url",
    "verified",
    "follower_count",
    "following_count",
    "post_count",
    "classification",
    "priority",
    "times_checked",
    "times_replied",
    "times_skipped",
    "times_no_candidate",
    "last_updated",
];

/// 用户名归一化：去掉前导 @ 后转小写；查找和重复检测共用同一规则
pub fn normalize_username(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

impl UserRecord {
    /// 首次观察到用户时创建记录：计数器清零、分类中立
    pub fn from_snapshot(snapshot: &ProfileSnapshot, now: DateTime<Utc>) -> Self {
        let mut record = UserRecord {
            username: snapshot.username.clone(),
            external_id: String::new(),
            display_name: String::new(),
            bio: String::new(),
            created_at: String::new(),
            location: String::new(),
            url: String::new(),
            profile_image_url: String::new(),
            verified: false,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
            classification: Classification::Neutral,
            priority: false,
            times_checked: 0,
            times_replied: 0,
            times_skipped: 0,
            times_no_candidate: 0,
            last_updated: None,
        };
        record.refresh_profile(snapshot, now);
        record
    }

    /// 刷新描述性字段和指标；分类、优先标记、计数器保持不变
    pub fn refresh_profile(&mut self, snapshot: &ProfileSnapshot, now: DateTime<Utc>) {
        self.external_id = snapshot.external_id.clone();
        self.display_name = snapshot.display_name.clone();
        // bio 中的换行会破坏人工查看 CSV，统一替换为空格
        self.bio = snapshot.bio.replace(['\n', '\r'], " ");
        self.created_at = snapshot.created_at.clone();
        self.location = snapshot.location.clone();
        self.url = snapshot.url.clone();
        self.profile_image_url = snapshot.profile_image_url.clone();
        self.verified = snapshot.verified;
        self.follower_count = snapshot.follower_count;
        self.following_count = snapshot.following_count;
        self.post_count = snapshot.post_count;
        self.last_updated = Some(now);
    }

    /// 用户名比较（按 [`normalize_username`] 归一化后比较）
    pub fn matches(&self, username: &str) -> bool {
        normalize_username(&self.username) == normalize_username(username)
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Checked => self.times_checked,
            Counter::Replied => self.times_replied,
            Counter::Skipped => self.times_skipped,
            Counter::NoCandidate => self.times_no_candidate,
        }
    }

    pub(crate) fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::Checked => &mut self.times_checked,
            Counter::Replied => &mut self.times_replied,
            Counter::Skipped => &mut self.times_skipped,
            Counter::NoCandidate => &mut self.times_no_candidate,
        }
    }

    /// 回复率 = 回复次数 / 检查次数
    pub fn engagement_rate(&self) -> f64 {
        if self.times_checked == 0 {
            0.0
        } else {
            self.times_replied as f64 / self.times_checked as f64
        }
    }
}

/// 用户记录上的互动计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Checked,
    Replied,
    Skipped,
    NoCandidate,
}

impl Counter {
    pub fn column(self) -> &'static str {
        match self {
            Counter::Checked => "times_checked",
            Counter::Replied => "times_replied",
            Counter::Skipped => "times_skipped",
            Counter::NoCandidate => "times_no_candidate",
        }
    }
}

/// 调用方回报的一次互动结果，每种结果只对应一个计数器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementOutcome {
    /// 成功发出回复
    Replied,
    /// 生成端决定跳过
    Skipped,
    /// 回看窗口内没有可回复的帖子
    NoCandidate,
}

impl EngagementOutcome {
    pub fn counter(self) -> Counter {
        match self {
            EngagementOutcome::Replied => Counter::Replied,
            EngagementOutcome::Skipped => Counter::Skipped,
            EngagementOutcome::NoCandidate => Counter::NoCandidate,
        }
    }
}

/// 完整性检查报告（只读，不做修复）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_records: usize,
    pub duplicate_count: usize,
    pub missing_required_field_count: usize,
    pub corrupt_row_count: usize,
    pub duplicate_usernames: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.duplicate_count == 0 && self.missing_required_field_count == 0
    }
}

/// 计数列允许为空（手工编辑过的 CSV），空值按 0 处理
fn deserialize_count_or_empty<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed.parse::<u64>().map_err(serde::de::Error::custom)
}

/// 布尔列兼容 true/false/True/False/1/0/空
fn deserialize_bool_or_empty<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        other => Err(serde::de::Error::custom(format!("非法布尔值: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(username: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            username: username.to_string(),
            external_id: "42".to_string(),
            display_name: "Bob".to_string(),
            bio: "line one\nline two".to_string(),
            follower_count: 10,
            ..Default::default()
        }
    }

    #[test]
    fn classification_round_trips_through_strings() {
        for c in [
            Classification::Neutral,
            Classification::Friend,
            Classification::Foe,
            Classification::Jokster,
            Classification::Snark,
        ] {
            let s: String = c.into();
            assert_eq!(s.parse::<Classification>().unwrap(), c);
        }
        assert_eq!("Neutral".parse::<Classification>().unwrap(), Classification::Neutral);
        assert!("enemy".parse::<Classification>().is_err());
    }

    #[test]
    fn new_record_starts_with_zero_counters() {
        let now = Utc::now();
        let r = UserRecord::from_snapshot(&snapshot("bob"), now);
        assert_eq!(r.times_checked, 0);
        assert_eq!(r.times_replied, 0);
        assert_eq!(r.classification, Classification::Neutral);
        assert_eq!(r.bio, "line one line two");
        assert_eq!(r.last_updated, Some(now));
    }

    #[test]
    fn refresh_keeps_classification_and_counters() {
        let mut r = UserRecord::from_snapshot(&snapshot("bob"), Utc::now());
        r.classification = Classification::Foe;
        r.times_replied = 3;
        let mut newer = snapshot("bob");
        newer.follower_count = 99;
        r.refresh_profile(&newer, Utc::now());
        assert_eq!(r.classification, Classification::Foe);
        assert_eq!(r.times_replied, 3);
        assert_eq!(r.follower_count, 99);
    }

    #[test]
    fn username_match_is_case_insensitive() {
        let r = UserRecord::from_snapshot(&snapshot("BobTheBuilder"), Utc::now());
        assert!(r.matches("bobthebuilder"));
        assert!(r.matches("@BOBTHEBUILDER"));
        assert!(!r.matches("bob"));
    }

    #[test]
    fn snapshot_requires_username_and_id() {
        assert!(snapshot("bob").validate().is_ok());
        let mut s = snapshot("bob");
        s.external_id.clear();
        assert!(s.validate().is_err());
    }
}
