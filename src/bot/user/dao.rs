//! 用户注册表数据访问层
//!
//! 注册表以 CSV 平面文件为后端：打开时整表读入内存，
//! 每次修改先在副本上完成并原子重写文件，写盘成功后才替换内存中的表。
//! 单进程单写者，不需要加锁。

use crate::bot::error::{BotError, Result};
use crate::bot::storage::{read_optional_bytes, write_atomic};
use crate::bot::user::models::{
    normalize_username, Classification, Counter, EngagementOutcome, IntegrityReport,
    ProfileSnapshot, UserRecord, USER_COLUMNS,
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 用户注册表
pub struct UserRegistry {
    path: PathBuf,
    records: Vec<UserRecord>,
    corrupt_rows: usize,
}

impl UserRegistry {
    /// 打开注册表；文件不存在时视为空表，首次写入时创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (records, corrupt_rows) = match read_optional_bytes(&path)? {
            Some(content) => parse_records(&content)?,
            None => {
                info!("[Registry] 注册表文件不存在，将在首次写入时创建: {}", path.display());
                (Vec::new(), 0)
            }
        };

        debug!(
            "[Registry] 已加载 {} 条用户记录，跳过损坏行 {} 行",
            records.len(),
            corrupt_rows
        );

        Ok(Self {
            path,
            records,
            corrupt_rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 按存储顺序返回全部记录
    pub fn all(&self) -> &[UserRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 加载时被跳过的损坏行数
    pub fn corrupt_row_count(&self) -> usize {
        self.corrupt_rows
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.records.iter().find(|r| r.matches(username))
    }

    pub fn contains(&self, username: &str) -> bool {
        self.position(username).is_some()
    }

    fn position(&self, username: &str) -> Option<usize> {
        self.records.iter().position(|r| r.matches(username))
    }

    /// 插入或刷新用户资料
    ///
    /// 新用户：计数器为零、分类中立。已存在：只刷新资料字段，
    /// 保留分类、优先标记和计数器，`times_checked` 加一。
    pub fn upsert(&mut self, snapshot: &ProfileSnapshot) -> Result<UserRecord> {
        let now = Utc::now();
        let position = self.position(&snapshot.username);
        let record = self.commit(|records| match position {
            Some(idx) => {
                let existing = &mut records[idx];
                existing.refresh_profile(snapshot, now);
                existing.times_checked += 1;
                existing.clone()
            }
            None => {
                let record = UserRecord::from_snapshot(snapshot, now);
                records.push(record.clone());
                record
            }
        })?;

        if position.is_some() {
            info!(
                "[Registry] 刷新用户 @{}（第 {} 次检查）",
                record.username, record.times_checked
            );
        } else {
            info!("[Registry] 新增用户 @{}", record.username);
        }
        Ok(record)
    }

    /// 以指定分类和优先标记插入新用户，只写一次文件
    ///
    /// 用户已存在时返回 `Ok(None)`，不修改任何字段
    pub fn insert_classified(
        &mut self,
        snapshot: &ProfileSnapshot,
        classification: Classification,
        priority: bool,
    ) -> Result<Option<UserRecord>> {
        if self.contains(&snapshot.username) {
            debug!("[Registry] 用户 @{} 已存在，不重复插入", snapshot.username);
            return Ok(None);
        }
        let mut record = UserRecord::from_snapshot(snapshot, Utc::now());
        record.classification = classification;
        record.priority = priority;

        let inserted = record.clone();
        self.commit(move |records| records.push(record))?;
        info!(
            "[Registry] 新增用户 @{}，分类: {}{}",
            inserted.username,
            inserted.classification.display_name(),
            if inserted.priority { "，优先" } else { "" }
        );
        Ok(Some(inserted))
    }

    /// 修改用户分类；用户不存在时返回 false
    pub fn set_classification(
        &mut self,
        username: &str,
        classification: Classification,
    ) -> Result<bool> {
        let Some(idx) = self.position(username) else {
            warn!("[Registry] 无法设置分类，用户 @{} 不在注册表中", username);
            return Ok(false);
        };
        let previous = self.records[idx].classification;
        self.commit(|records| records[idx].classification = classification)?;
        info!(
            "[Registry] @{} 分类: {} -> {}",
            self.records[idx].username, previous, classification
        );
        Ok(true)
    }

    /// 修改优先标记；用户不存在时返回 false
    pub fn set_priority(&mut self, username: &str, priority: bool) -> Result<bool> {
        let Some(idx) = self.position(username) else {
            warn!("[Registry] 无法设置优先标记，用户 @{} 不在注册表中", username);
            return Ok(false);
        };
        self.commit(|records| records[idx].priority = priority)?;
        Ok(true)
    }

    /// 彻底删除用户记录；不存在时返回 false（幂等）
    pub fn remove(&mut self, username: &str) -> Result<bool> {
        let Some(idx) = self.position(username) else {
            debug!("[Registry] 用户 @{} 不在注册表中（已删除或从未添加）", username);
            return Ok(false);
        };
        let removed = self.commit(|records| records.remove(idx))?;
        info!("[Registry] 已删除用户 @{}", removed.username);
        Ok(true)
    }

    /// 指定计数器加一，返回 (旧值, 新值)
    pub fn increment_counter(&mut self, username: &str, counter: Counter) -> Result<(u64, u64)> {
        let idx = self.position(username).ok_or_else(|| BotError::NotFound {
            username: username.to_string(),
        })?;
        let old = self.commit(|records| {
            let slot = records[idx].counter_mut(counter);
            let old = *slot;
            *slot = old + 1;
            old
        })?;
        info!(
            "[Registry] @{} {}: {} -> {}",
            self.records[idx].username,
            counter.column(),
            old,
            old + 1
        );
        Ok((old, old + 1))
    }

    /// 调用方回报一次互动结果
    pub fn record_outcome(
        &mut self,
        username: &str,
        outcome: EngagementOutcome,
    ) -> Result<(u64, u64)> {
        self.increment_counter(username, outcome.counter())
    }

    /// 只读完整性检查：重复用户名、缺少必填字段（username / external_id）
    pub fn validate_integrity(&self) -> IntegrityReport {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut duplicate_usernames = Vec::new();
        let mut missing = 0;

        for record in &self.records {
            if record.username.trim().is_empty() || record.external_id.trim().is_empty() {
                missing += 1;
            }
            if record.username.trim().is_empty() {
                continue;
            }
            let count = seen.entry(normalize_username(&record.username)).or_insert(0);
            *count += 1;
            if *count == 2 {
                duplicate_usernames.push(record.username.clone());
            }
        }

        let duplicate_count = seen.values().filter(|&&c| c > 1).map(|c| c - 1).sum();

        let report = IntegrityReport {
            total_records: self.records.len(),
            duplicate_count,
            missing_required_field_count: missing,
            corrupt_row_count: self.corrupt_rows,
            duplicate_usernames,
        };

        if report.is_healthy() {
            info!(
                "[Registry] ✅ 完整性检查通过，轮换池共 {} 个用户",
                report.total_records
            );
        } else {
            for username in &report.duplicate_usernames {
                warn!(
                    "[Registry] ⚠️ {}",
                    BotError::DuplicateUsername {
                        username: username.clone()
                    }
                );
            }
            warn!(
                "[Registry] ⚠️ 完整性检查发现问题 - 重复: {}, 缺少必填字段: {}, 损坏行: {}",
                report.duplicate_count,
                report.missing_required_field_count,
                report.corrupt_row_count
            );
        }
        report
    }

    /// 由调用方对整表重新排序后重写文件（例如按互动率排序）
    pub fn reorder_with<F>(&mut self, reorder: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<UserRecord>),
    {
        self.commit(reorder)
    }

    /// 在副本上执行修改并写盘；写盘失败时内存中的表保持原样
    fn commit<F, T>(&mut self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<UserRecord>) -> T,
    {
        let mut next = self.records.clone();
        let output = mutate(&mut next);
        persist(&self.path, &next)?;
        self.records = next;
        Ok(output)
    }
}

/// 整表原子重写
fn persist(path: &Path, records: &[UserRecord]) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(USER_COLUMNS)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush().map_err(|e| BotError::io(path, e))?;
        Ok(())
    })?;
    debug!(
        "[Registry] 已保存 {} 条用户记录到 {}",
        records.len(),
        path.display()
    );
    Ok(())
}

/// 解析 CSV 内容；缺列、非 UTF-8 或字段非法的行记录日志后跳过
fn parse_records(content: &[u8]) -> Result<(Vec<UserRecord>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);
    let headers = match csv::StringRecord::from_byte_record(reader.byte_headers()?.clone()) {
        Ok(headers) => headers,
        Err(e) => {
            warn!("[Registry] 表头不是合法 UTF-8，按默认列顺序读取: {}", e);
            csv::StringRecord::from(USER_COLUMNS.to_vec())
        }
    };

    let mut records = Vec::new();
    let mut corrupt = 0;

    for row in reader.byte_records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                corrupt += 1;
                warn!("[Registry] 跳过无法读取的行: {}", e);
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or_default();

        let row = match csv::StringRecord::from_byte_record(row) {
            Ok(row) => row,
            Err(e) => {
                corrupt += 1;
                warn!(
                    "[Registry] {}",
                    BotError::CorruptRow {
                        line,
                        reason: format!("包含非法 UTF-8: {}", e.utf8_error()),
                    }
                );
                continue;
            }
        };

        if row.len() < USER_COLUMNS.len() {
            corrupt += 1;
            warn!(
                "[Registry] {}",
                BotError::CorruptRow {
                    line,
                    reason: format!("只有 {} 列，期望 {} 列", row.len(), USER_COLUMNS.len()),
                }
            );
            continue;
        }

        match row.deserialize::<UserRecord>(Some(&headers)) {
            Ok(record) if !record.username.trim().is_empty() => records.push(record),
            Ok(_) => {
                corrupt += 1;
                warn!(
                    "[Registry] {}",
                    BotError::CorruptRow {
                        line,
                        reason: "username 为空".to_string(),
                    }
                );
            }
            Err(e) => {
                corrupt += 1;
                warn!(
                    "[Registry] {}",
                    BotError::CorruptRow {
                        line,
                        reason: e.to_string(),
                    }
                );
            }
        }
    }

    Ok((records, corrupt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn snapshot(username: &str, id: &str) -> ProfileSnapshot {
        ProfileSnapshot {
            username: username.to_string(),
            external_id: id.to_string(),
            display_name: format!("{} display", username),
            bio: "writes jokes, bio has a comma, see?".to_string(),
            verified: true,
            follower_count: 120,
            following_count: 80,
            post_count: 3000,
            ..Default::default()
        }
    }

    fn open_temp() -> (tempfile::TempDir, UserRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        (dir, registry)
    }

    #[test]
    fn upsert_inserts_then_merges() {
        let (_dir, mut reg) = open_temp();
        let first = reg.upsert(&snapshot("bob", "1")).unwrap();
        assert_eq!(first.times_checked, 0);

        reg.set_classification("bob", Classification::Friend).unwrap();
        reg.increment_counter("bob", Counter::Replied).unwrap();

        let mut newer = snapshot("bob", "1");
        newer.follower_count = 500;
        let merged = reg.upsert(&newer).unwrap();
        assert_eq!(merged.times_checked, 1);
        assert_eq!(merged.times_replied, 1);
        assert_eq!(merged.classification, Classification::Friend);
        assert_eq!(merged.follower_count, 500);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn repeated_upsert_only_moves_checked_counter_and_timestamp() {
        let (_dir, mut reg) = open_temp();
        let snap = snapshot("alice", "7");
        reg.upsert(&snap).unwrap();

        let before = reg.upsert(&snap).unwrap();
        let after_one = reg.upsert(&snap).unwrap();
        let after_two = reg.upsert(&snap).unwrap();
        assert_eq!(after_two.times_checked, before.times_checked + 2);

        let mut a = after_one.clone();
        let mut b = after_two.clone();
        a.times_checked = 0;
        b.times_checked = 0;
        a.last_updated = None;
        b.last_updated = None;
        assert_eq!(a, b);
    }

    #[test]
    fn remove_is_a_true_delete() {
        let (_dir, mut reg) = open_temp();
        reg.upsert(&snapshot("carol", "3")).unwrap();
        reg.increment_counter("carol", Counter::Skipped).unwrap();
        reg.set_classification("carol", Classification::Snark).unwrap();

        assert!(reg.remove("CAROL").unwrap());
        assert!(!reg.remove("carol").unwrap());

        let fresh = reg.upsert(&snapshot("carol", "3")).unwrap();
        assert_eq!(fresh.times_skipped, 0);
        assert_eq!(fresh.times_checked, 0);
        assert_eq!(fresh.classification, Classification::Neutral);
    }

    #[test]
    fn operations_on_absent_user() {
        let (_dir, mut reg) = open_temp();
        assert!(!reg.set_classification("ghost", Classification::Foe).unwrap());
        assert!(!reg.set_priority("ghost", true).unwrap());
        match reg.increment_counter("ghost", Counter::Replied) {
            Err(BotError::NotFound { username }) => assert_eq!(username, "ghost"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn increment_reports_old_and_new() {
        let (_dir, mut reg) = open_temp();
        reg.upsert(&snapshot("dave", "4")).unwrap();
        assert_eq!(
            reg.record_outcome("dave", EngagementOutcome::NoCandidate)
                .unwrap(),
            (0, 1)
        );
        assert_eq!(
            reg.increment_counter("Dave", Counter::NoCandidate).unwrap(),
            (1, 2)
        );
        assert_eq!(reg.get("dave").unwrap().times_replied, 0);
    }

    #[test]
    fn state_survives_reopen_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        {
            let mut reg = UserRegistry::open(&path).unwrap();
            reg.upsert(&snapshot("zed", "26")).unwrap();
            reg.upsert(&snapshot("amy", "1")).unwrap();
            reg.set_classification("amy", Classification::Jokster).unwrap();
            reg.set_priority("zed", true).unwrap();
        }
        let reg = UserRegistry::open(&path).unwrap();
        let names: Vec<_> = reg.all().iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["zed", "amy"]);
        assert_eq!(reg.get("amy").unwrap().classification, Classification::Jokster);
        assert!(reg.get("zed").unwrap().priority);
        assert_eq!(
            reg.get("zed").unwrap().bio,
            "writes jokes, bio has a comma, see?"
        );
        assert!(reg.get("zed").unwrap().last_updated.is_some());
    }

    #[test]
    fn short_and_malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        let header = USER_COLUMNS.join(",");
        let good = "bob,1,Bob,bio,,,,,True,10,5,100,friend,false,2,1,0,0,";
        let short = "eve,2,Eve";
        let bad_count = "mal,3,Mal,bio,,,,,false,lots,5,100,,false,0,0,0,0,";
        let empty_counts = "ann,4,Ann,bio,,,,,,,,,,,,,,,";
        fs::write(
            &path,
            format!("{}\n{}\n{}\n{}\n{}\n", header, good, short, bad_count, empty_counts),
        )
        .unwrap();

        let reg = UserRegistry::open(&path).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.corrupt_row_count(), 2);
        let bob = reg.get("bob").unwrap();
        assert!(bob.verified);
        assert_eq!(bob.classification, Classification::Friend);
        assert_eq!(bob.times_checked, 2);
        assert_eq!(reg.get("ann").unwrap().follower_count, 0);

        let report = reg.validate_integrity();
        assert_eq!(report.corrupt_row_count, 2);
        assert_eq!(report.total_records, 2);
    }

    #[test]
    fn integrity_reports_duplicates_and_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        let header = USER_COLUMNS.join(",");
        let rows = [
            "bob,1,Bob,,,,,,false,0,0,0,,false,0,0,0,0,",
            "BOB,1,Bob,,,,,,false,0,0,0,,false,0,0,0,0,",
            "noid,,NoId,,,,,,false,0,0,0,,false,0,0,0,0,",
        ];
        fs::write(&path, format!("{}\n{}\n", header, rows.join("\n"))).unwrap();

        let reg = UserRegistry::open(&path).unwrap();
        let report = reg.validate_integrity();
        assert_eq!(report.total_records, 3);
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.missing_required_field_count, 1);
        assert_eq!(report.duplicate_usernames, vec!["BOB".to_string()]);
        assert!(!report.is_healthy());
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn every_mutation_is_on_disk_immediately() {
        let (dir, mut reg) = open_temp();
        reg.upsert(&snapshot("frank", "6")).unwrap();
        reg.increment_counter("frank", Counter::Replied).unwrap();

        let reopened = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        assert_eq!(reopened.get("frank").unwrap().times_replied, 1);
    }

    #[test]
    fn invalid_utf8_row_is_skipped_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        let mut content = USER_COLUMNS.join(",").into_bytes();
        content.extend_from_slice(b"\nbob,1,Bob,bio,,,,,false,10,5,100,,false,0,0,0,0,\n");
        content.extend_from_slice(b"m\xffl,2,Mal,bio,,,,,false,1,1,1,,false,0,0,0,0,\n");
        content.extend_from_slice(b"amy,3,Amy,bio,,,,,false,1,1,1,snark,false,0,0,0,0,\n");
        fs::write(&path, content).unwrap();

        let reg = UserRegistry::open(&path).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.corrupt_row_count(), 1);
        assert!(reg.contains("bob"));
        assert_eq!(reg.get("amy").unwrap().classification, Classification::Snark);
    }

    /// 让临时文件路径被目录占用，原子写入必然失败
    fn block_writes(reg: &UserRegistry) -> std::path::PathBuf {
        let tmp = crate::bot::storage::temp_path_for(reg.path());
        fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    #[test]
    fn failed_write_leaves_memory_and_disk_in_agreement() {
        let (dir, mut reg) = open_temp();
        reg.upsert(&snapshot("bob", "1")).unwrap();
        reg.upsert(&snapshot("amy", "2")).unwrap();
        let tmp = block_writes(&reg);

        assert!(reg.remove("bob").is_err());
        assert!(reg.set_classification("amy", Classification::Foe).is_err());
        assert!(reg.increment_counter("amy", Counter::Replied).is_err());
        assert!(reg.contains("bob"));
        assert_eq!(reg.get("amy").unwrap().classification, Classification::Neutral);
        assert_eq!(reg.get("amy").unwrap().times_replied, 0);

        // 下一次成功写盘不会带上之前失败的修改
        fs::remove_dir(&tmp).unwrap();
        reg.set_priority("amy", true).unwrap();
        let reopened = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        assert!(reopened.contains("bob"));
        let amy = reopened.get("amy").unwrap();
        assert!(amy.priority);
        assert_eq!(amy.classification, Classification::Neutral);
        assert_eq!(amy.times_replied, 0);
    }

    #[test]
    fn insert_classified_writes_full_record_once() {
        let (dir, mut reg) = open_temp();
        let inserted = reg
            .insert_classified(&snapshot("bob", "1"), Classification::Friend, true)
            .unwrap()
            .unwrap();
        assert_eq!(inserted.classification, Classification::Friend);
        assert!(inserted.priority);
        assert_eq!(inserted.times_checked, 0);

        assert!(reg
            .insert_classified(&snapshot("BOB", "1"), Classification::Foe, false)
            .unwrap()
            .is_none());

        let reopened = UserRegistry::open(dir.path().join("user_data.csv")).unwrap();
        let bob = reopened.get("bob").unwrap();
        assert_eq!(bob.classification, Classification::Friend);
        assert!(bob.priority);
    }

    #[test]
    fn failed_insert_classified_leaves_nothing_behind() {
        let (dir, mut reg) = open_temp();
        block_writes(&reg);
        assert!(reg
            .insert_classified(&snapshot("bob", "1"), Classification::Friend, true)
            .is_err());
        assert!(!reg.contains("bob"));
        assert!(!dir.path().join("user_data.csv").exists());
    }

    #[test]
    fn lookup_and_duplicate_check_share_normalisation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_data.csv");
        let header = USER_COLUMNS.join(",");
        let rows = [
            "Ärger,1,A,,,,,,false,0,0,0,,false,0,0,0,0,",
            "ärger,2,A,,,,,,false,0,0,0,,false,0,0,0,0,",
        ];
        fs::write(&path, format!("{}\n{}\n", header, rows.join("\n"))).unwrap();

        let reg = UserRegistry::open(&path).unwrap();
        assert_eq!(reg.get("@ÄRGER").unwrap().external_id, "1");
        let report = reg.validate_integrity();
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.duplicate_usernames, vec!["ärger".to_string()]);
    }
}
