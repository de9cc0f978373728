use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::Serialize;
use url::Url;

use crate::api::{ApiError, GraphApi, User};
use crate::credentials::TokenStore;
use crate::executor::{ExecError, Opener};
use crate::model::{RemoteItem, RemoteProject, SearchResult};
use crate::sources::keywords::write_atomic;
use crate::sources::RemoteSource;

struct Cached {
    fetched_at: Instant,
    projects: Vec<RemoteProject>,
}

/// Compact copy of the project list for companion surfaces that have no
/// token of their own.
#[derive(Serialize)]
struct SnapshotProject<'a> {
    id: &'a str,
    name: &'a str,
    services: Vec<SnapshotService<'a>>,
}

#[derive(Serialize)]
struct SnapshotService<'a> {
    id: &'a str,
    name: &'a str,
    status: &'static str,
}

pub struct ProjectProvider {
    api: Box<dyn GraphApi>,
    tokens: Arc<dyn TokenStore>,
    ttl: Duration,
    dashboard_url: String,
    snapshot_path: Option<PathBuf>,
    cache: Mutex<Option<Cached>>,
}

impl ProjectProvider {
    pub fn new(api: Box<dyn GraphApi>, tokens: Arc<dyn TokenStore>, ttl: Duration, dashboard_url: &str) -> Self {
        Self {
            api,
            tokens,
            ttl,
            dashboard_url: dashboard_url.trim_end_matches('/').to_string(),
            snapshot_path: None,
            cache: Mutex::new(None),
        }
    }

    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot_path = Some(path);
        self
    }

    /// Cached for `ttl`; `force_refresh` always goes to the network.
    /// The cache lock is held across the fetch so concurrent callers
    /// share one request.
    pub fn fetch_projects(&self, force_refresh: bool) -> Result<Vec<RemoteProject>, ApiError> {
        let token = self.tokens.load().ok_or(ApiError::NotAuthenticated)?;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if !force_refresh {
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    debug!("Returning {} cached projects", cached.projects.len());
                    return Ok(cached.projects.clone());
                }
            }
        }

        let projects = self.api.projects(&token)?;
        info!("Fetched {} projects", projects.len());
        self.write_snapshot(&projects);
        *cache = Some(Cached {
            fetched_at: Instant::now(),
            projects: projects.clone(),
        });
        Ok(projects)
    }

    /// Uncached identity check for a candidate token.
    pub fn validate_api_key(&self, key: &str) -> Result<User, ApiError> {
        self.api.me(key)
    }

    /// Drops cached projects and the companion snapshot, e.g. on logout.
    pub fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(path) = &self.snapshot_path {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Could not remove project snapshot {:?}: {}", path, e);
                }
            }
        }
    }

    fn write_snapshot(&self, projects: &[RemoteProject]) {
        let Some(path) = &self.snapshot_path else { return };
        let snapshot: Vec<SnapshotProject> = projects
            .iter()
            .map(|p| SnapshotProject {
                id: &p.id,
                name: &p.name,
                services: p
                    .services
                    .iter()
                    .map(|s| SnapshotService {
                        id: &s.id,
                        name: &s.name,
                        status: s.status.map(|st| st.as_str()).unwrap_or("UNKNOWN"),
                    })
                    .collect(),
            })
            .collect();

        if let Err(e) = write_atomic(path, &snapshot) {
            warn!("Could not write project snapshot {:?}: {}", path, e);
        }
    }

    fn to_item(&self, project: &RemoteProject) -> SearchResult {
        let count = project.services.len();
        let target = format!("{}/{}", self.dashboard_url, project.id);
        SearchResult::RemoteItem(RemoteItem {
            id: format!("project-{}", project.id),
            title: project.name.clone(),
            subtitle: format!("Project • {} service{}", count, if count == 1 { "" } else { "s" }),
            status: project.health(),
            action: Arc::new(move |opener: &dyn Opener| {
                let url = Url::parse(&target).map_err(|_| ExecError::InvalidUrl(target.clone()))?;
                opener.open_url(&url)?;
                Ok(())
            }),
        })
    }
}

impl RemoteSource for ProjectProvider {
    /// Any failure, including "not logged in", is an empty result.
    fn search(&self, query: &str) -> Vec<SearchResult> {
        let projects = match self.fetch_projects(false) {
            Ok(projects) => projects,
            Err(ApiError::NotAuthenticated) => {
                debug!("Remote search skipped: not authenticated");
                return Vec::new();
            }
            Err(e) => {
                warn!("Remote search failed: {}", e);
                return Vec::new();
            }
        };

        let q = query.to_lowercase();
        projects
            .iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&q) || p.services.iter().any(|s| s.name.to_lowercase().contains(&q))
            })
            .map(|p| self.to_item(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::testing::MemoryTokens;
    use crate::executor::testing::RecordingOpener;
    use crate::model::{DeploymentStatus, ProjectHealth, RemoteService};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeApi {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl GraphApi for FakeApi {
        fn me(&self, token: &str) -> Result<User, ApiError> {
            if token == "good" {
                Ok(User { id: "u1".into(), username: "ada".into(), name: "Ada".into() })
            } else {
                Err(ApiError::InvalidCredentials)
            }
        }

        fn projects(&self, _token: &str) -> Result<Vec<RemoteProject>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::Server("down".into()));
            }
            Ok(vec![
                RemoteProject {
                    id: "p1".into(),
                    name: "Shop".into(),
                    services: vec![RemoteService { id: "s1".into(), name: "checkout-api".into(), status: Some(DeploymentStatus::Running) }],
                },
                RemoteProject { id: "p2".into(), name: "Blog".into(), services: vec![] },
            ])
        }
    }

    fn provider(ttl: Duration, fail: bool, token: Option<&str>) -> (ProjectProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let tokens: Arc<dyn TokenStore> = match token {
            Some(t) => Arc::new(MemoryTokens::with(t)),
            None => Arc::new(MemoryTokens::default()),
        };
        let api = FakeApi { calls: calls.clone(), fail };
        (ProjectProvider::new(Box::new(api), tokens, ttl, "https://dash.example.com/projects/"), calls)
    }

    #[test]
    fn matches_project_or_service_names_in_provider_order() {
        let (p, _) = provider(Duration::from_secs(300), false, Some("good"));
        let titles = |q: &str| -> Vec<String> { p.search(q).iter().map(|r| r.title().to_string()).collect() };
        assert_eq!(titles("CHECKOUT"), vec!["Shop"]);
        assert_eq!(titles("blo"), vec!["Blog"]);
        assert_eq!(titles(""), vec!["Shop", "Blog"]);
        assert!(titles("nothing").is_empty());
    }

    #[test]
    fn items_carry_health_and_dashboard_action() {
        let (p, _) = provider(Duration::from_secs(300), false, Some("good"));
        let results = p.search("shop");
        assert_eq!(results[0].status(), Some(ProjectHealth::Deployed));
        assert_eq!(results[0].subtitle(), Some("Project • 1 service"));

        let opener = RecordingOpener::default();
        results[0].execute(None, &opener).unwrap();
        assert_eq!(opener.opened(), vec!["https://dash.example.com/projects/p1".to_string()]);
    }

    #[test]
    fn cache_respects_ttl_and_force_refresh() {
        let (p, calls) = provider(Duration::from_secs(300), false, Some("good"));
        p.fetch_projects(false).unwrap();
        p.fetch_projects(false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        p.fetch_projects(true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let (expired, calls) = provider(Duration::ZERO, false, Some("good"));
        expired.fetch_projects(false).unwrap();
        expired.fetch_projects(false).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_silent_in_search_but_typed_in_fetch() {
        let (p, _) = provider(Duration::from_secs(300), true, Some("good"));
        assert!(p.search("shop").is_empty());
        assert!(matches!(p.fetch_projects(false), Err(ApiError::Server(_))));

        let (anon, calls) = provider(Duration::from_secs(300), false, None);
        assert!(anon.search("shop").is_empty());
        assert!(matches!(anon.fetch_projects(false), Err(ApiError::NotAuthenticated)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validate_api_key_is_uncached() {
        let (p, _) = provider(Duration::from_secs(300), false, None);
        assert_eq!(p.validate_api_key("good").unwrap().username, "ada");
        assert!(matches!(p.validate_api_key("bad"), Err(ApiError::InvalidCredentials)));
    }

    #[test]
    fn snapshot_written_on_fetch_and_removed_on_invalidate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("projects.json");
        let (p, _) = provider(Duration::from_secs(300), false, Some("good"));
        let p = p.with_snapshot(path.clone());

        p.fetch_projects(false).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["services"][0]["status"], "RUNNING");
        assert_eq!(json[1]["name"], "Blog");
        assert!(!dir.path().join("projects.json.tmp").exists());

        p.invalidate();
        assert!(!path.exists());
    }
}
