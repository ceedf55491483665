use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

/// Keys in the hotword file that are documentation, not categories.
const NOTE_KEYS: &[&str] = &["说明", "description", "备注", "mappings"];

#[derive(Debug, Error)]
pub enum HotwordError {
    #[error("failed to read hotword file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("hotword file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable snapshot of the hotword configuration.
///
/// Categories keep the order they appear in the file; `mappings` holds
/// per-category alias → canonical substitutions.
#[derive(Debug, Default, Clone)]
pub struct HotwordTable {
    pub categories: Vec<(String, Vec<String>)>,
    pub mappings: HashMap<String, HashMap<String, String>>,
}

impl HotwordTable {
    fn parse(raw: &str) -> Result<Self, HotwordError> {
        let value: Value = serde_json::from_str(raw)?;
        let mut table = HotwordTable::default();

        let Value::Object(object) = value else {
            return Ok(table);
        };

        for (key, entry) in object {
            if key == "mappings" {
                if let Value::Object(categories) = entry {
                    for (category, aliases) in categories {
                        if let Value::Object(aliases) = aliases {
                            let map = aliases
                                .into_iter()
                                .filter_map(|(alias, canonical)| {
                                    canonical.as_str().map(|c| (alias, c.to_string()))
                                })
                                .collect();
                            table.mappings.insert(category, map);
                        }
                    }
                }
                continue;
            }
            if NOTE_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Value::Array(words) = entry {
                let words: Vec<String> = words
                    .into_iter()
                    .filter_map(|w| w.as_str().map(|s| s.trim().to_string()))
                    .filter(|w| !w.is_empty())
                    .collect();
                table.categories.push((key, words));
            }
        }

        Ok(table)
    }

    pub fn total_words(&self) -> usize {
        self.categories.iter().map(|(_, words)| words.len()).sum()
    }

    /// Distinct words in first-seen order, joined by single spaces and
    /// truncated at a word boundary to `limit` characters.
    pub fn render(&self, limit: usize) -> String {
        let mut seen = HashSet::new();
        let mut out = String::new();
        for (_, words) in &self.categories {
            for word in words {
                if !seen.insert(word.as_str()) {
                    continue;
                }
                let extra = word.chars().count() + usize::from(!out.is_empty());
                if out.chars().count() + extra > limit {
                    return out;
                }
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
            }
        }
        out
    }

    /// Replaces aliases with their canonical forms across all categories.
    pub fn apply_aliases(&self, text: &str) -> String {
        let mut out = text.to_string();
        for aliases in self.mappings.values() {
            for (alias, canonical) in aliases {
                if !alias.is_empty() {
                    out = out.replace(alias.as_str(), canonical);
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HotwordStats {
    pub categories: usize,
    pub total: usize,
    pub per_category: HashMap<String, usize>,
}

/// Process-wide hotword registry.
///
/// Reload parses into a fresh table and swaps the Arc behind a write lock,
/// so concurrent readers observe either the old table or the new one,
/// never a mixture.
pub struct HotwordRegistry {
    path: PathBuf,
    render_limit: usize,
    table: RwLock<Arc<HotwordTable>>,
}

impl HotwordRegistry {
    pub fn load(path: impl Into<PathBuf>, render_limit: usize) -> Result<Self, HotwordError> {
        let path = path.into();
        if !path.exists() {
            warn!(path = %path.display(), "hotword file missing, writing default table");
            write_default_file(&path)?;
        }
        let table = Self::read_table(&path)?;
        info!(
            categories = table.categories.len(),
            total = table.total_words(),
            "hotword table loaded"
        );
        Ok(Self {
            path,
            render_limit,
            table: RwLock::new(Arc::new(table)),
        })
    }

    fn read_table(path: &Path) -> Result<HotwordTable, HotwordError> {
        let raw = std::fs::read_to_string(path).map_err(|source| HotwordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        HotwordTable::parse(&raw)
    }

    pub fn snapshot(&self) -> Arc<HotwordTable> {
        self.table.read().clone()
    }

    /// Space-joined biasing vocabulary from the current snapshot.
    pub fn render(&self) -> String {
        self.snapshot().render(self.render_limit)
    }

    pub fn stats(&self) -> HotwordStats {
        let table = self.snapshot();
        HotwordStats {
            categories: table.categories.len(),
            total: table.total_words(),
            per_category: table
                .categories
                .iter()
                .map(|(name, words)| (name.clone(), words.len()))
                .collect(),
        }
    }

    pub fn reload(&self) -> Result<HotwordStats, HotwordError> {
        let fresh = Arc::new(Self::read_table(&self.path)?);
        let old_total = {
            let mut guard = self.table.write();
            let old = guard.total_words();
            *guard = fresh;
            old
        };
        let stats = self.stats();
        info!(old_total, new_total = stats.total, "hotword table reloaded");
        Ok(stats)
    }
}

fn write_default_file(path: &Path) -> Result<(), HotwordError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| HotwordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let default = serde_json::json!({
        "人名": ["张三", "李四", "王五"],
        "项目名": ["智能办公", "数据中台"],
        "技术词汇": ["机器学习", "深度学习", "大语言模型"],
        "说明": "热词配置文件，修改后通过 /hotwords/reload 刷新。",
    });
    std::fs::write(path, serde_json::to_string_pretty(&default).expect("static json"))
        .map_err(|source| HotwordError::Io {
            path: path.to_path_buf(),
            source,
        })
}
