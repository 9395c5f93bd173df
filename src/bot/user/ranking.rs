//! 按互动率重排注册表
//!
//! 配合“始终取第一个”的轮换策略使用：每轮结束后重排，下一轮取表头。

use crate::bot::error::Result;
use crate::bot::user::dao::UserRegistry;
use crate::bot::user::models::{Classification, UserRecord};
use std::cmp::Ordering;
use tracing::info;

/// 分类权重：朋友优先，其次中立，其余分类垫底
fn classification_rank(c: Classification) -> u8 {
    match c {
        Classification::Friend => 3,
        Classification::Neutral => 2,
        _ => 1,
    }
}

/// 稳定排序：分类权重降序，再按回复率降序
pub fn sort_by_engagement(records: &mut [UserRecord]) {
    records.sort_by(|a, b| {
        classification_rank(b.classification)
            .cmp(&classification_rank(a.classification))
            .then_with(|| {
                b.engagement_rate()
                    .partial_cmp(&a.engagement_rate())
                    .unwrap_or(Ordering::Equal)
            })
    });
}

/// 对注册表整表重排并重写文件
pub fn resort_registry(registry: &mut UserRegistry) -> Result<()> {
    registry.reorder_with(|records| sort_by_engagement(records))?;
    if let Some(head) = registry.all().first() {
        info!(
            "[Ranking] 已按互动率重排 {} 个用户，表头: @{}（{}，回复率 {:.1}%）",
            registry.len(),
            head.username,
            head.classification,
            head.engagement_rate() * 100.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::user::models::ProfileSnapshot;
    use chrono::Utc;

    fn record(name: &str, class: Classification, checked: u64, replied: u64) -> UserRecord {
        let snap = ProfileSnapshot {
            username: name.to_string(),
            external_id: name.to_string(),
            ..Default::default()
        };
        let mut r = UserRecord::from_snapshot(&snap, Utc::now());
        r.classification = class;
        r.times_checked = checked;
        r.times_replied = replied;
        r
    }

    #[test]
    fn friends_first_then_rate() {
        let mut rows = vec![
            record("foe_hot", Classification::Foe, 2, 2),
            record("neutral_low", Classification::Neutral, 10, 1),
            record("friend_cold", Classification::Friend, 0, 0),
            record("neutral_high", Classification::Neutral, 4, 3),
            record("snark", Classification::Snark, 1, 0),
        ];
        sort_by_engagement(&mut rows);
        let names: Vec<_> = rows.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(
            names,
            vec!["friend_cold", "neutral_high", "neutral_low", "foe_hot", "snark"]
        );
    }

    #[test]
    fn ties_keep_existing_order() {
        let mut rows = vec![
            record("b", Classification::Neutral, 0, 0),
            record("a", Classification::Neutral, 0, 0),
        ];
        sort_by_engagement(&mut rows);
        assert_eq!(rows[0].username, "b");
    }

    #[test]
    fn resort_rewrites_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        let mut reg = UserRegistry::open(&path).unwrap();
        for name in ["first", "second"] {
            reg.upsert(&ProfileSnapshot {
                username: name.to_string(),
                external_id: name.to_string(),
                ..Default::default()
            })
            .unwrap();
        }
        reg.set_classification("second", Classification::Friend)
            .unwrap();

        resort_registry(&mut reg).unwrap();

        let reopened = UserRegistry::open(&path).unwrap();
        assert_eq!(reopened.all()[0].username, "second");
    }
}
