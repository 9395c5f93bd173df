//! 平面文件存储工具：所有持久化文件统一走原子替换写入
//!
//! 写入流程：写临时文件 -> fsync -> rename 覆盖目标文件。
//! 进程在任意时刻崩溃，目标文件要么是旧的完整内容，要么是新的完整内容。

use crate::bot::error::{BotError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// 目标文件对应的临时文件路径（同目录，保证 rename 不跨文件系统）
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// 原子写入：`fill` 负责把完整内容写入临时文件
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| BotError::io(parent, e))?;
        }
    }

    let tmp_path = temp_path_for(path);
    let mut file = File::create(&tmp_path).map_err(|e| BotError::io(&tmp_path, e))?;

    if let Err(e) = fill(&mut file) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    file.flush().map_err(|e| BotError::io(&tmp_path, e))?;
    file.sync_all().map_err(|e| BotError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| BotError::io(path, e))?;
    Ok(())
}

/// 原子写入整段字节
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic(path, |file| {
        file.write_all(bytes).map_err(|e| BotError::io(path, e))
    })
}

/// 读取文本文件，文件不存在时返回 None
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BotError::io(path, e)),
    }
}

/// 读取原始字节，文件不存在时返回 None；编码问题留给调用方逐行处理
pub fn read_optional_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BotError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content_and_cleans_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.txt");

        write_bytes_atomic(&path, b"first").unwrap();
        write_bytes_atomic(&path, b"second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn failed_fill_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.txt");
        write_bytes_atomic(&path, b"old").unwrap();

        let result = write_atomic(&path, |_| Err(BotError::Config("boom".into())));

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn read_optional_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).unwrap().is_none());
    }
}
