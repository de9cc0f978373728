use std::sync::Arc;

use log::{debug, info, warn};

use crate::executor::Opener;
use crate::matcher;
use crate::model::{AppEntry, Keyword, SearchResult};
use crate::sources::{AppSource, KeywordSource};

/// Stamp for one dispatched query. Bumped by every operation that makes
/// in-flight provider work obsolete.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Apps,
    Remote,
}

/// Work the runtime must run off the event loop and report back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub generation: Generation,
    pub query: String,
    pub kind: ProviderKind,
}

#[derive(Debug)]
pub enum ProviderPayload {
    Apps(Vec<AppEntry>),
    Remote(Vec<SearchResult>),
}

#[derive(Debug)]
pub struct ProviderEvent {
    pub generation: Generation,
    pub query: String,
    pub payload: ProviderPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Searching,
    Locked,
}

/// What the surface should do after a user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stay,
    Locked,
    Dismiss,
}

/// Query session for one showing of the panel. Owns the merged result
/// list and the locked-parameter state; every mutation ends in
/// `recompute`.
pub struct Aggregator {
    keywords: Arc<dyn KeywordSource>,
    apps: Arc<dyn AppSource>,
    opener: Arc<dyn Opener>,

    query: String,
    selected: usize,
    locked: Option<SearchResult>,
    param: String,
    generation: Generation,

    keyword_hits: Vec<Keyword>,
    remote_hits: Vec<SearchResult>,
    app_hits: Vec<AppEntry>,
    results: Vec<SearchResult>,
}

impl Aggregator {
    pub fn new(keywords: Arc<dyn KeywordSource>, apps: Arc<dyn AppSource>, opener: Arc<dyn Opener>) -> Self {
        Self {
            keywords,
            apps,
            opener,
            query: String::new(),
            selected: 0,
            locked: None,
            param: String::new(),
            generation: 0,
            keyword_hits: Vec::new(),
            remote_hits: Vec::new(),
            app_hits: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        if self.locked.is_some() { Mode::Locked } else { Mode::Searching }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Shortcut shown as the chip in front of the parameter input.
    pub fn locked_title(&self) -> Option<&str> {
        match &self.locked {
            Some(SearchResult::Keyword(k)) => Some(&k.shortcut),
            _ => None,
        }
    }

    pub fn autocomplete_hint(&self) -> Option<String> {
        if self.locked.is_some() {
            return None;
        }
        let selected = self.results.get(self.selected)?;
        matcher::autocomplete_hint(&self.query, selected.title())
    }

    /// Panel shown: back to an empty search, old responses ignored.
    pub fn reset(&mut self) -> Vec<ProviderRequest> {
        self.locked = None;
        self.param.clear();
        self.apps.clear();
        self.begin_query(String::new())
    }

    pub fn set_query_text(&mut self, text: &str) -> Vec<ProviderRequest> {
        if self.locked.is_some() {
            debug!("Ignoring query text while locked");
            return Vec::new();
        }
        self.begin_query(text.to_string())
    }

    fn begin_query(&mut self, text: String) -> Vec<ProviderRequest> {
        self.generation += 1;
        self.query = text;
        self.selected = 0;
        self.keyword_hits = self.keywords.search(&self.query);
        self.remote_hits.clear();
        self.app_hits.clear();
        self.recompute();

        [ProviderKind::Remote, ProviderKind::Apps]
            .into_iter()
            .map(|kind| ProviderRequest {
                generation: self.generation,
                query: self.query.clone(),
                kind,
            })
            .collect()
    }

    /// Merges a provider response unless it belongs to a superseded
    /// query. Returns whether the list changed.
    pub fn apply(&mut self, event: ProviderEvent) -> bool {
        if self.locked.is_some() || event.generation != self.generation || event.query != self.query {
            debug!(
                "Discarding stale provider response (gen {} vs {}, query '{}')",
                event.generation, self.generation, event.query
            );
            return false;
        }

        match event.payload {
            ProviderPayload::Apps(apps) => self.app_hits = apps,
            ProviderPayload::Remote(items) => self.remote_hits = items,
        }
        self.recompute();
        true
    }

    /// Keywords first, remote projects second, applications last.
    fn recompute(&mut self) {
        if self.locked.is_some() {
            self.results.clear();
            self.selected = 0;
            return;
        }

        self.results = self
            .keyword_hits
            .iter()
            .cloned()
            .map(SearchResult::Keyword)
            .chain(self.remote_hits.iter().cloned())
            .chain(self.app_hits.iter().cloned().map(SearchResult::App))
            .collect();
        self.selected = self.selected.min(self.results.len().saturating_sub(1));
    }

    pub fn set_param_text(&mut self, text: &str) {
        if self.locked.is_some() {
            self.param = text.to_string();
        }
    }

    pub fn move_up(&mut self) {
        if self.locked.is_none() && self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn move_down(&mut self) {
        if self.locked.is_none() && self.selected + 1 < self.results.len() {
            self.selected += 1;
        }
    }

    /// Locks onto the selected result when it takes a parameter.
    pub fn select_current(&mut self) -> Outcome {
        if self.locked.is_some() {
            return Outcome::Stay;
        }
        let Some(result) = self.results.get(self.selected) else {
            return Outcome::Stay;
        };
        if !result.is_parameterized() {
            return Outcome::Stay;
        }

        info!("Locked on '{}'", result.title());
        self.locked = Some(result.clone());
        self.generation += 1;
        self.query.clear();
        self.param.clear();
        self.selected = 0;
        self.keyword_hits.clear();
        self.remote_hits.clear();
        self.app_hits.clear();
        self.recompute();
        Outcome::Locked
    }

    /// Leaves the locked state for an empty search.
    pub fn unlock(&mut self) -> Vec<ProviderRequest> {
        if self.locked.take().is_none() {
            return Vec::new();
        }
        self.param.clear();
        self.begin_query(String::new())
    }

    pub fn accept_autocomplete(&mut self) -> Outcome {
        let parameterized = match self.results.get(self.selected) {
            Some(result) => result.is_parameterized(),
            None => return Outcome::Stay,
        };
        if parameterized { self.select_current() } else { self.execute() }
    }

    pub fn execute(&mut self) -> Outcome {
        if let Some(locked) = &self.locked {
            if locked.is_parameterized() && self.param.is_empty() {
                debug!("Parameter required for '{}'", locked.title());
                return Outcome::Stay;
            }
            let param = (!self.param.is_empty()).then_some(self.param.as_str());
            self.run(locked, param);
            return Outcome::Dismiss;
        }

        let Some(result) = self.results.get(self.selected) else {
            return Outcome::Stay;
        };
        if result.is_parameterized() {
            return self.select_current();
        }
        self.run(result, None);
        Outcome::Dismiss
    }

    /// Escape: close without running anything.
    pub fn dismiss(&mut self) -> Outcome {
        self.generation += 1;
        self.apps.clear();
        Outcome::Dismiss
    }

    fn run(&self, result: &SearchResult, param: Option<&str>) {
        match result.execute(param, self.opener.as_ref()) {
            Ok(()) => info!("Executed '{}'", result.title()),
            Err(e) => warn!("Could not execute '{}': {}", result.title(), e),
        }
    }
}
