use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};

use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::matcher;
use crate::model::Keyword;
use crate::sources::KeywordSource;

static HTTP_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://").expect("static regex"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("keyword store I/O: {0}")]
    Io(#[from] io::Error),
    #[error("keyword store JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub skipped: usize,
}

/// JSON-backed keyword list. Every mutation rewrites the file atomically
/// after copying the previous version to the backup path.
pub struct KeywordStore {
    path: PathBuf,
    backup_path: PathBuf,
    keywords: RwLock<Vec<Keyword>>,
}

/// Rejects entries the settings form would refuse to save.
pub fn validate(keyword: &Keyword) -> Result<(), StoreError> {
    if keyword.shortcut.trim().is_empty() {
        return Err(StoreError::Invalid("shortcut must not be empty".into()));
    }
    let url = keyword.url.trim();
    if url.is_empty() {
        return Err(StoreError::Invalid("URL must not be empty".into()));
    }
    if !HTTP_URL.is_match(url) {
        return Err(StoreError::Invalid(format!("URL must start with http:// or https://, got '{url}'")));
    }
    Ok(())
}

pub fn default_keywords() -> Vec<Keyword> {
    vec![
        Keyword::new("gh", "GitHub", "https://github.com"),
        Keyword::new("g", "Google Search", "https://www.google.com/search?q={param}"),
        Keyword::new("yt", "YouTube Search", "https://www.youtube.com/results?search_query={param}"),
    ]
}

fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("keywords");
    path.with_file_name(format!("{stem}.backup.json"))
}

fn read_keywords(path: &Path) -> Result<Vec<Keyword>, StoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes `value` as JSON next to `path`, then renames it into place so
/// readers never observe a partial file.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl KeywordStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = Self {
            backup_path: backup_path_for(&path),
            path,
            keywords: RwLock::new(Vec::new()),
        };
        store.reload();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and replaces the in-memory list wholesale.
    /// Falls back to the backup, then to an empty list that is saved
    /// straight away. Never fails.
    pub fn reload(&self) {
        let loaded = if !self.path.exists() {
            info!("No keyword file at {:?}, seeding defaults", self.path);
            let defaults = default_keywords();
            self.save_or_warn(&defaults);
            defaults
        } else {
            match read_keywords(&self.path) {
                Ok(keywords) => keywords,
                Err(e) => {
                    warn!("Keyword file {:?} unreadable ({}), trying backup", self.path, e);
                    self.restore_backup()
                }
            }
        };

        info!("KeywordStore: loaded {} keywords", loaded.len());
        *self.keywords.write().unwrap_or_else(PoisonError::into_inner) = loaded;
    }

    fn restore_backup(&self) -> Vec<Keyword> {
        match read_keywords(&self.backup_path) {
            Ok(keywords) => {
                // Rewrite the primary only; the backup must stay intact.
                if let Err(e) = write_atomic(&self.path, &keywords) {
                    warn!("Could not restore {:?} from backup: {}", self.path, e);
                }
                keywords
            }
            Err(e) => {
                warn!("Keyword backup {:?} unusable ({}), starting empty", self.backup_path, e);
                self.save_or_warn(&[]);
                Vec::new()
            }
        }
    }

    fn save_or_warn(&self, keywords: &[Keyword]) {
        if let Err(e) = self.persist(keywords) {
            warn!("Saving keywords failed: {}", e);
        }
    }

    fn persist(&self, keywords: &[Keyword]) -> Result<(), StoreError> {
        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, &self.backup_path) {
                warn!("Keyword backup failed: {}", e);
            }
        }
        write_atomic(&self.path, keywords)?;
        debug!("Saved {} keywords to {:?}", keywords.len(), self.path);
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Keyword>) -> T) -> Result<T, StoreError> {
        let mut keywords = self.keywords.write().unwrap_or_else(PoisonError::into_inner);
        // Memory only changes once the file does.
        let mut next = keywords.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *keywords = next;
        Ok(out)
    }

    pub fn keywords(&self) -> Vec<Keyword> {
        self.keywords.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn add(&self, keyword: Keyword) -> Result<(), StoreError> {
        validate(&keyword)?;
        self.mutate(|keywords| keywords.push(keyword))
    }

    /// Replaces the keyword with the same id. Returns false when absent.
    pub fn update(&self, keyword: Keyword) -> Result<bool, StoreError> {
        validate(&keyword)?;
        if !self.keywords().iter().any(|k| k.id == keyword.id) {
            return Ok(false);
        }
        self.mutate(|keywords| {
            if let Some(slot) = keywords.iter_mut().find(|k| k.id == keyword.id) {
                *slot = keyword;
            }
            true
        })
    }

    pub fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        if !self.keywords().iter().any(|k| k.id == id) {
            return Ok(false);
        }
        self.mutate(|keywords| {
            keywords.retain(|k| k.id != id);
            true
        })
    }

    /// Flips `enabled`; returns the new value, or None for an unknown id.
    pub fn toggle_enabled(&self, id: Uuid) -> Result<Option<bool>, StoreError> {
        if !self.keywords().iter().any(|k| k.id == id) {
            return Ok(None);
        }
        self.mutate(|keywords| {
            keywords.iter_mut().find(|k| k.id == id).map(|k| {
                k.enabled = !k.enabled;
                k.enabled
            })
        })
    }

    pub fn export_to(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.keywords())?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Adds every imported keyword whose name is not already present.
    pub fn import_from(&self, path: &Path) -> Result<ImportSummary, StoreError> {
        let incoming = read_keywords(path)?;
        let summary = self.mutate(|keywords| {
            let mut summary = ImportSummary::default();
            for mut keyword in incoming {
                if keywords.iter().any(|k| k.name == keyword.name) {
                    summary.skipped += 1;
                    continue;
                }
                if keywords.iter().any(|k| k.id == keyword.id) {
                    keyword.id = Uuid::new_v4();
                }
                keywords.push(keyword);
                summary.added += 1;
            }
            summary
        })?;
        info!("Imported keywords: added {}, skipped {}", summary.added, summary.skipped);
        Ok(summary)
    }
}

impl KeywordSource for KeywordStore {
    fn search(&self, query: &str) -> Vec<Keyword> {
        let keywords = self.keywords.read().unwrap_or_else(PoisonError::into_inner);
        if query.is_empty() {
            return keywords.iter().filter(|k| k.enabled).cloned().collect();
        }
        matcher::rank_keywords(keywords.iter(), &query.to_lowercase())
    }
}
