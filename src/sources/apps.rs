use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use log::{debug, info};
use regex::Regex;
use walkdir::WalkDir;

use crate::matcher;
use crate::model::AppEntry;
use crate::sources::AppSource;

static BUNDLE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<key>CFBundleIdentifier</key>\s*<string>([^<]+)</string>").expect("static regex")
});

/// Snapshot of installed applications. The snapshot is swapped whole on
/// rescan; searches never see a half-built list.
pub struct AppIndex {
    apps: RwLock<Arc<Vec<AppEntry>>>,
    limit: usize,
    last: Mutex<Option<(String, Vec<AppEntry>)>>, // Memo of the previous query
}

impl AppIndex {
    pub fn new(entries: Vec<AppEntry>, limit: usize) -> Self {
        Self {
            apps: RwLock::new(Arc::new(entries)),
            limit,
            last: Mutex::new(None),
        }
    }

    pub fn replace(&self, entries: Vec<AppEntry>) {
        *self.apps.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(entries);
        self.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<Vec<AppEntry>> {
        self.apps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Collects every `.app` bundle directly inside `dirs`, sorted by name.
pub fn scan(dirs: &[PathBuf]) -> Vec<AppEntry> {
    let mut entries = Vec::new();

    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        debug!("Scanning applications in {:?}", dir);
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter().flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("app") {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push(AppEntry::new(path.to_path_buf(), name.to_string(), read_bundle_id(path)));
            }
        }
    }

    entries.sort_by_key(|a| a.name.to_lowercase());
    info!("AppIndex: found {} applications", entries.len());
    entries
}

/// Only XML plists are understood; binary ones yield None.
fn read_bundle_id(app: &Path) -> Option<String> {
    let content = fs::read_to_string(app.join("Contents").join("Info.plist")).ok()?;
    BUNDLE_ID
        .captures(&content)
        .map(|caps| caps[1].trim().to_string())
}

impl AppSource for AppIndex {
    fn search(&self, query: &str) -> Vec<AppEntry> {
        if query.is_empty() {
            return Vec::new();
        }

        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((q, hits)) = last.as_ref() {
            if q == query {
                return hits.clone();
            }
        }

        let hits = matcher::rank_apps(self.snapshot().iter(), &query.to_lowercase(), self.limit);
        *last = Some((query.to_string(), hits.clone()));
        hits
    }

    fn clear(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn plist(id: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<plist><dict>\n  <key>CFBundleName</key>\n  <string>X</string>\n  <key>CFBundleIdentifier</key>\n  <string>{id}</string>\n</dict></plist>"
        )
    }

    #[test]
    fn scans_bundles_with_identifiers() {
        let dir = tempdir().unwrap();
        let safari = dir.path().join("Safari.app").join("Contents");
        fs::create_dir_all(&safari).unwrap();
        fs::write(safari.join("Info.plist"), plist("com.apple.Safari")).unwrap();
        fs::create_dir_all(dir.path().join("calculator.app")).unwrap();
        fs::write(dir.path().join("readme.txt"), "not an app").unwrap();

        let apps = scan(&[dir.path().to_path_buf(), dir.path().join("missing")]);
        let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["calculator", "Safari"]);
        assert_eq!(apps[0].bundle_id, None);
        assert_eq!(apps[1].bundle_id.as_deref(), Some("com.apple.Safari"));
        assert!(apps[1].id.ends_with("Safari.app"));
    }

    #[test]
    fn empty_query_yields_nothing() {
        let index = AppIndex::new(vec![AppEntry::new(PathBuf::from("/A/Safari.app"), "Safari".into(), None)], 8);
        assert!(index.search("").is_empty());
        assert_eq!(index.search("saf").len(), 1);
    }

    #[test]
    fn replace_swaps_snapshot_and_drops_memo() {
        let index = AppIndex::new(vec![AppEntry::new(PathBuf::from("/A/Safari.app"), "Safari".into(), None)], 8);
        assert_eq!(index.search("sa").len(), 1);

        index.replace(vec![]);
        assert_eq!(index.len(), 0);
        assert!(index.search("sa").is_empty());
    }
}
