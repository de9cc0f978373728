use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::{self, ExecError, Opener};

/// Placeholder a keyword URL carries when it needs an argument.
pub const PARAM_TOKEN: &str = "{param}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Uuid,
    pub shortcut: String,       // What the user types, e.g. "gh"
    pub name: String,           // Human label
    pub url: String,            // URL template, may contain {param}
    #[serde(rename = "isEnabled", default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool { true }

impl Keyword {
    pub fn new(shortcut: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shortcut: shortcut.into(),
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }

    pub fn is_parameterized(&self) -> bool {
        self.url.contains(PARAM_TOKEN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEntry {
    pub id: String,                // Bundle path, unique per session
    pub name: String,              // Bundle name without ".app"
    pub path: PathBuf,
    pub bundle_id: Option<String>,
}

impl AppEntry {
    pub fn new(path: PathBuf, name: String, bundle_id: Option<String>) -> Self {
        Self {
            id: path.to_string_lossy().to_string(),
            name,
            path,
            bundle_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Starting,
    Running,
    Stopping,
    Suspended,
    Crashed,
    PullFailed,
    Pending,
    Building,
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Starting => "STARTING",
            DeploymentStatus::Running => "RUNNING",
            DeploymentStatus::Stopping => "STOPPING",
            DeploymentStatus::Suspended => "SUSPENDED",
            DeploymentStatus::Crashed => "CRASHED",
            DeploymentStatus::PullFailed => "PULL_FAILED",
            DeploymentStatus::Pending => "PENDING",
            DeploymentStatus::Building => "BUILDING",
            DeploymentStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteService {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub services: Vec<RemoteService>,
}

/// Rolled-up state of every service in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectHealth {
    Deployed,
    Failed,
    Deploying,
    Idle,
}

impl RemoteProject {
    pub fn health(&self) -> ProjectHealth {
        let statuses = || self.services.iter().filter_map(|s| s.status);

        if statuses().any(|s| matches!(s, DeploymentStatus::Crashed | DeploymentStatus::PullFailed)) {
            ProjectHealth::Failed
        } else if statuses().any(|s| matches!(
            s,
            DeploymentStatus::Starting | DeploymentStatus::Building | DeploymentStatus::Pending | DeploymentStatus::Stopping
        )) {
            ProjectHealth::Deploying
        } else if statuses().any(|s| s == DeploymentStatus::Running) {
            ProjectHealth::Deployed
        } else {
            ProjectHealth::Idle
        }
    }
}

pub type RemoteAction = Arc<dyn Fn(&dyn Opener) -> Result<(), ExecError> + Send + Sync>;

#[derive(Clone)]
pub struct RemoteItem {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub status: ProjectHealth,
    pub action: RemoteAction,
}

impl fmt::Debug for RemoteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteItem")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("subtitle", &self.subtitle)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum SearchResult {
    Keyword(Keyword),
    App(AppEntry),
    RemoteItem(RemoteItem),
}

impl SearchResult {
    /// Stable identity across all providers.
    pub fn id(&self) -> String {
        match self {
            SearchResult::Keyword(k) => format!("keyword-{}", k.id),
            SearchResult::App(a) => format!("app-{}", a.id),
            SearchResult::RemoteItem(r) => format!("remote-{}", r.id),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            SearchResult::Keyword(k) => &k.shortcut,
            SearchResult::App(a) => &a.name,
            SearchResult::RemoteItem(r) => &r.title,
        }
    }

    pub fn subtitle(&self) -> Option<&str> {
        match self {
            SearchResult::Keyword(k) if k.name.is_empty() => None,
            SearchResult::Keyword(k) => Some(&k.name),
            SearchResult::App(_) => Some("Application"),
            SearchResult::RemoteItem(r) => Some(&r.subtitle),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        match self {
            SearchResult::Keyword(k) => k.is_parameterized(),
            SearchResult::App(_) | SearchResult::RemoteItem(_) => false,
        }
    }

    pub fn status(&self) -> Option<ProjectHealth> {
        match self {
            SearchResult::RemoteItem(r) => Some(r.status),
            _ => None,
        }
    }

    pub fn execute(&self, param: Option<&str>, opener: &dyn Opener) -> Result<(), ExecError> {
        executor::execute(self, param, opener)
    }
}

impl PartialEq for SearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, status: Option<DeploymentStatus>) -> RemoteService {
        RemoteService { id: format!("svc-{name}"), name: name.to_string(), status }
    }

    #[test]
    fn keyword_is_parameterized_only_with_token() {
        assert!(Keyword::new("g", "Google", "https://google.com/search?q={param}").is_parameterized());
        assert!(!Keyword::new("gh", "GitHub", "https://github.com").is_parameterized());
        assert!(!Keyword::new("x", "Braces", "https://x.com/{para}").is_parameterized());
    }

    #[test]
    fn keyword_json_uses_is_enabled_field() {
        let kw = Keyword::new("gh", "GitHub", "https://github.com");
        let json = serde_json::to_value(&kw).unwrap();
        assert_eq!(json["isEnabled"], serde_json::Value::Bool(true));

        let raw = format!(r#"{{"id":"{}","shortcut":"a","name":"b","url":"https://c"}}"#, kw.id);
        let parsed: Keyword = serde_json::from_str(&raw).unwrap();
        assert!(parsed.enabled);
    }

    #[test]
    fn ids_are_prefixed_by_kind() {
        let kw = Keyword::new("gh", "GitHub", "https://github.com");
        let app = AppEntry::new(PathBuf::from("/Applications/Safari.app"), "Safari".into(), None);
        assert_eq!(SearchResult::Keyword(kw.clone()).id(), format!("keyword-{}", kw.id));
        assert_eq!(SearchResult::App(app).id(), "app-/Applications/Safari.app");
    }

    #[test]
    fn subtitles_follow_kind() {
        let unnamed = Keyword::new("gh", "", "https://github.com");
        assert_eq!(SearchResult::Keyword(unnamed).subtitle(), None);
        let app = AppEntry::new(PathBuf::from("/Applications/Notes.app"), "Notes".into(), None);
        assert_eq!(SearchResult::App(app).subtitle(), Some("Application"));
    }

    #[test]
    fn unknown_status_strings_decode_as_unknown() {
        let svc: RemoteService = serde_json::from_str(r#"{"_id":"1","name":"web","status":"HIBERNATING"}"#).unwrap();
        assert_eq!(svc.status, Some(DeploymentStatus::Unknown));
        let svc: RemoteService = serde_json::from_str(r#"{"_id":"1","name":"web","status":"PULL_FAILED"}"#).unwrap();
        assert_eq!(svc.status, Some(DeploymentStatus::PullFailed));
    }

    #[test]
    fn health_prefers_failure_over_progress() {
        let mut project = RemoteProject {
            id: "p".into(),
            name: "shop".into(),
            services: vec![service("web", Some(DeploymentStatus::Running))],
        };
        assert_eq!(project.health(), ProjectHealth::Deployed);

        project.services.push(service("worker", Some(DeploymentStatus::Building)));
        assert_eq!(project.health(), ProjectHealth::Deploying);

        project.services.push(service("db", Some(DeploymentStatus::Crashed)));
        assert_eq!(project.health(), ProjectHealth::Failed);

        project.services = vec![service("cron", None)];
        assert_eq!(project.health(), ProjectHealth::Idle);
    }
}
