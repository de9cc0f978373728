use crate::model::{AppEntry, Keyword, SearchResult};

/// User-authored shortcuts. Searched synchronously on every keystroke.
pub trait KeywordSource: Send + Sync {
    fn search(&self, query: &str) -> Vec<Keyword>;
}

/// Installed applications. May be searched from a worker thread.
pub trait AppSource: Send + Sync {
    fn search(&self, query: &str) -> Vec<AppEntry>;
    /// Drops any per-query memo so a new session starts cold.
    fn clear(&self);
}

/// Remote projects. Blocking; always called off the event loop.
pub trait RemoteSource: Send + Sync {
    fn search(&self, query: &str) -> Vec<SearchResult>;
}

pub mod keywords;
pub mod apps;
pub mod remote;
