//! 用户资料直接查询
//!
//! 轮换选中用户后按用户名拉取最新资料，刷新注册表中的描述字段和指标。

use crate::bot::error::{BotError, Result};
use crate::bot::user::models::normalize_username;
use crate::bot::user::{ProfileSnapshot, UserRecord, UserRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// 外部资料查询能力
#[async_trait]
pub trait ProfileCapability: Send + Sync {
    /// 按用户名查询；用户不存在（改名、注销）返回 `Ok(None)`
    async fn fetch_profile(&self, username: &str) -> Result<Option<ProfileSnapshot>>;
}

/// 资料刷新器
pub struct ProfileRefresher {
    capability: Arc<dyn ProfileCapability>,
}

impl ProfileRefresher {
    pub fn new(capability: Arc<dyn ProfileCapability>) -> Self {
        Self { capability }
    }

    /// 拉取资料并写入注册表；用户不存在时注册表保持不变并返回 `Ok(None)`
    pub async fn refresh(
        &self,
        registry: &mut UserRegistry,
        username: &str,
    ) -> Result<Option<UserRecord>> {
        let Some(snapshot) = self.capability.fetch_profile(username).await? else {
            warn!("[Profile] 用户 @{} 不存在或不可见，保留原记录", username);
            return Ok(None);
        };

        snapshot
            .validate()
            .map_err(|reason| BotError::MalformedProfile {
                item_id: username.to_string(),
                reason,
            })?;
        if normalize_username(&snapshot.username) != normalize_username(username) {
            return Err(BotError::MalformedProfile {
                item_id: username.to_string(),
                reason: format!("返回的用户名 @{} 与查询不一致", snapshot.username),
            });
        }

        let record = registry.upsert(&snapshot)?;
        info!(
            "[Profile] 已刷新 @{} 的资料，粉丝数: {}",
            record.username, record.follower_count
        );
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::user::Classification;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeProfiles {
        profiles: HashMap<String, ProfileSnapshot>,
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FakeProfiles {
        fn with(profiles: Vec<ProfileSnapshot>) -> Self {
            Self {
                profiles: profiles
                    .into_iter()
                    .map(|p| (normalize_username(&p.username), p))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ProfileCapability for FakeProfiles {
        async fn fetch_profile(&self, username: &str) -> Result<Option<ProfileSnapshot>> {
            self.calls.lock().unwrap().push(username.to_string());
            if self.fail {
                return Err(BotError::Transport {
                    operation: "fetch_profile".into(),
                    reason: "timeout".into(),
                });
            }
            Ok(self.profiles.get(&normalize_username(username)).cloned())
        }
    }

    fn snapshot(username: &str, followers: u64) -> ProfileSnapshot {
        ProfileSnapshot {
            username: username.into(),
            external_id: "101".into(),
            bio: "old bio".into(),
            follower_count: followers,
            ..Default::default()
        }
    }

    fn registry_with_bob() -> (tempfile::TempDir, UserRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        registry
            .insert_classified(&snapshot("bob", 10), Classification::Foe, true)
            .unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn refresh_updates_profile_and_checked_counter() {
        let (dir, mut registry) = registry_with_bob();
        let mut fresh = snapshot("Bob", 2500);
        fresh.bio = "new bio".into();
        let fake = Arc::new(FakeProfiles::with(vec![fresh]));
        let refresher = ProfileRefresher::new(fake.clone());

        let record = refresher.refresh(&mut registry, "bob").await.unwrap().unwrap();
        assert_eq!(*fake.calls.lock().unwrap(), vec!["bob".to_string()]);

        assert_eq!(record.follower_count, 2500);
        assert_eq!(record.bio, "new bio");
        assert_eq!(record.times_checked, 1);
        assert_eq!(record.classification, Classification::Foe);
        assert!(record.priority);
        assert_eq!(registry.len(), 1);

        let reopened = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        assert_eq!(reopened.get("bob").unwrap().follower_count, 2500);
    }

    #[tokio::test]
    async fn missing_user_leaves_registry_untouched() {
        let (_dir, mut registry) = registry_with_bob();
        let refresher = ProfileRefresher::new(Arc::new(FakeProfiles::with(Vec::new())));

        assert!(refresher.refresh(&mut registry, "bob").await.unwrap().is_none());
        let bob = registry.get("bob").unwrap();
        assert_eq!(bob.times_checked, 0);
        assert_eq!(bob.follower_count, 10);
    }

    #[tokio::test]
    async fn transport_failure_propagates_without_changes() {
        let (_dir, mut registry) = registry_with_bob();
        let fake = FakeProfiles {
            fail: true,
            ..FakeProfiles::with(Vec::new())
        };
        let refresher = ProfileRefresher::new(Arc::new(fake));

        let result = refresher.refresh(&mut registry, "bob").await;
        assert!(matches!(result, Err(BotError::Transport { .. })));
        assert_eq!(registry.get("bob").unwrap().times_checked, 0);
    }

    #[tokio::test]
    async fn mismatched_username_is_rejected() {
        let (_dir, mut registry) = registry_with_bob();
        let fake = FakeProfiles {
            profiles: HashMap::from([("bob".to_string(), snapshot("mallory", 1))]),
            calls: Mutex::new(Vec::new()),
            fail: false,
        };
        let refresher = ProfileRefresher::new(Arc::new(fake));

        let result = refresher.refresh(&mut registry, "bob").await;
        assert!(matches!(result, Err(BotError::MalformedProfile { .. })));
        assert!(!registry.contains("mallory"));
    }
}
