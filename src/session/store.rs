//! 会话持久化：每个会话一个 JSON 文件（<sessions_dir>/<id>.json）
//!
//! 写入先落临时文件再 rename，失败时不会留下半截快照。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::StoreError;
use crate::session::Session;

/// 基于目录的会话存储
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// 打开（必要时创建）会话目录
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub fn save(&self, session: &Session) -> Result<PathBuf, StoreError> {
        let path = self.path_for(session.id());
        let json = serde_json::to_string_pretty(session)?;
        write_atomic(&path, &json)?;
        tracing::debug!(session_id = %session.id(), path = %path.display(), "session saved");
        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<Session, StoreError> {
        if !is_valid_id(id) {
            tracing::warn!(session_id = %id, "Rejected session id outside the store");
            return Err(StoreError::NotFound(id.to_string()));
        }
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let data = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_str(&data).map_err(|source| StoreError::Malformed { path, source })
    }

    /// 最近修改的 limit 个会话；无法解析的文件跳过并告警
    pub fn list(&self, limit: usize) -> Result<Vec<Session>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .map(|p| {
                let modified = fs::metadata(&p)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, p)
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));

        let mut sessions = Vec::new();
        for (_, path) in files {
            if sessions.len() >= limit {
                break;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|d| serde_json::from_str::<Session>(&d).map_err(|e| e.to_string()));
            match parsed {
                Ok(s) => sessions.push(s),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable session")
                }
            }
        }
        Ok(sessions)
    }
}

/// 会话 id 只能是单个文件名片段，不能带路径分隔符或 `..`
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
}

/// 临时文件 + rename
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })
}
