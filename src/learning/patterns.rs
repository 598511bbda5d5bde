//! 模式记忆：按 (域名, 选择器) 记录交互可靠性，跨运行持久化
//!
//! 每个模式一个 JSON 文件（<patterns_dir>/<pattern_id>.json），写穿透：
//! 先落盘，成功后才更新内存索引。目录假设只有一个写者；模式只增不删。

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::StoreError;
use crate::executor::ActionKind;
use crate::session::store::write_atomic;

/// 动作序列保留的最近条数
const MAX_SEQUENCE_LEN: usize = 10;

/// 一个 (域名, 选择器) 的交互记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub pattern_id: String,
    pub domain: String,
    /// button / link / input ...
    pub element_kind: String,
    pub selector_pattern: String,
    pub action_sequence: Vec<ActionKind>,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LearnedPattern {
    fn new(domain: &str, element_kind: &str, selector: &str, kind: ActionKind) -> Self {
        Self {
            pattern_id: pattern_id(domain, selector),
            domain: domain.to_string(),
            element_kind: element_kind.to_string(),
            selector_pattern: selector.to_string(),
            action_sequence: vec![kind],
            success_count: 0,
            failure_count: 0,
            last_used: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn observations(&self) -> u32 {
        self.success_count + self.failure_count
    }

    /// 成功占比；没有观测时为 0.5
    pub fn reliability(&self) -> f64 {
        let total = self.observations();
        if total == 0 {
            return 0.5;
        }
        self.success_count as f64 / total as f64
    }

    fn record(&mut self, success: bool) {
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.last_used = Utc::now();
    }
}

/// 模式 id：`len(domain) ‖ domain ‖ selector` 的 SHA-256（hex）
///
/// 域名长度前缀（u64 小端）保证不同的 (domain, selector) 不会得到相同输入。
pub fn pattern_id(domain: &str, selector: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain.as_bytes());
    hasher.update(selector.as_bytes());
    hex::encode(hasher.finalize())
}

/// 模式记忆：内存索引 + 目录持久化
#[derive(Debug)]
pub struct PatternMemory {
    dir: PathBuf,
    patterns: HashMap<String, LearnedPattern>,
}

impl PatternMemory {
    /// 加载目录下全部 *.json；损坏的记录跳过
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut patterns = HashMap::new();
        let entries = fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|d| serde_json::from_str::<LearnedPattern>(&d).map_err(|e| e.to_string()));
            match parsed {
                Ok(p) => {
                    patterns.insert(p.pattern_id.clone(), p);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable pattern")
                }
            }
        }
        tracing::info!(count = patterns.len(), dir = %dir.display(), "Pattern memory loaded");
        Ok(Self { dir, patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&LearnedPattern> {
        self.patterns.get(id)
    }

    /// 记录一次交互结果并立即落盘，返回模式 id
    ///
    /// 写盘失败时内存索引保持原样。
    pub fn record_outcome(
        &mut self,
        domain: &str,
        element_kind: &str,
        selector: &str,
        action_kind: ActionKind,
        success: bool,
    ) -> Result<String, StoreError> {
        let id = pattern_id(domain, selector);
        let mut updated = match self.patterns.get(&id) {
            Some(existing) => {
                let mut p = existing.clone();
                p.action_sequence.push(action_kind);
                let overflow = p.action_sequence.len().saturating_sub(MAX_SEQUENCE_LEN);
                p.action_sequence.drain(..overflow);
                p
            }
            None => LearnedPattern::new(domain, element_kind, selector, action_kind),
        };
        updated.record(success);

        let path = self.dir.join(format!("{}.json", id));
        let json = serde_json::to_string_pretty(&updated)?;
        write_atomic(&path, &json)?;

        tracing::debug!(
            pattern_id = %id,
            selector,
            success,
            reliability = updated.reliability(),
            "pattern updated"
        );
        self.patterns.insert(id.clone(), updated);
        Ok(id)
    }

    pub fn patterns_for_domain(&self, domain: &str) -> Vec<&LearnedPattern> {
        self.patterns.values().filter(|p| p.domain == domain).collect()
    }

    /// 最可靠的 n 个模式，可靠度相同则观测多者优先
    pub fn top_patterns(&self, domain: &str, n: usize) -> Vec<&LearnedPattern> {
        let mut list = self.patterns_for_domain(domain);
        list.sort_by(|a, b| {
            b.reliability()
                .total_cmp(&a.reliability())
                .then_with(|| b.observations().cmp(&a.observations()))
                .then_with(|| a.selector_pattern.cmp(&b.selector_pattern))
        });
        list.truncate(n);
        list
    }
}
