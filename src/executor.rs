use std::io;
use std::path::Path;

use log::debug;
use thiserror::Error;
use url::Url;

use crate::model::{Keyword, SearchResult, PARAM_TOKEN};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("'{0}' is not a valid URL")]
    InvalidUrl(String),
    #[error("keyword '{0}' needs a parameter")]
    MissingParameter(String),
    #[error("open failed: {0}")]
    Open(#[from] io::Error),
}

/// The OS "open" facility. Nothing here spawns processes directly.
pub trait Opener: Send + Sync {
    fn open_url(&self, url: &Url) -> io::Result<()>;
    fn open_path(&self, path: &Path) -> io::Result<()>;
}

pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open_url(&self, url: &Url) -> io::Result<()> {
        open::that(url.as_str())
    }

    fn open_path(&self, path: &Path) -> io::Result<()> {
        open::that(path)
    }
}

pub fn execute(result: &SearchResult, param: Option<&str>, opener: &dyn Opener) -> Result<(), ExecError> {
    match result {
        SearchResult::Keyword(keyword) => {
            let url = build_url(keyword, param)?;
            debug!("Opening {} for keyword '{}'", url, keyword.shortcut);
            opener.open_url(&url)?;
        }
        SearchResult::App(app) => {
            debug!("Launching {:?}", app.path);
            opener.open_path(&app.path)?;
        }
        SearchResult::RemoteItem(item) => {
            debug!("Running action for {}", item.id);
            (item.action)(opener)?;
        }
    }
    Ok(())
}

/// Substitutes `param` into the keyword's URL template. Templates that
/// already carry a query string get query-component encoding, anything
/// else is encoded per path segment so `/` survives.
pub fn build_url(keyword: &Keyword, param: Option<&str>) -> Result<Url, ExecError> {
    let raw = if keyword.is_parameterized() {
        let param = param
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ExecError::MissingParameter(keyword.shortcut.clone()))?;
        let encoded = if keyword.url.contains('?') || keyword.url.contains('&') {
            encode_query(param)
        } else {
            encode_path(param)
        };
        keyword.url.replace(PARAM_TOKEN, &encoded)
    } else {
        keyword.url.clone()
    };

    Url::parse(&raw).map_err(|_| ExecError::InvalidUrl(raw))
}

/// Encodes every reserved character, `&` and `=` included, so a
/// parameter can never split into extra query fields.
fn encode_query(param: &str) -> String {
    urlencoding::encode(param).into_owned()
}

fn encode_path(param: &str) -> String {
    param
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every open instead of touching the OS.
    #[derive(Default)]
    pub struct RecordingOpener {
        pub opened: Mutex<Vec<String>>,
    }

    impl RecordingOpener {
        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl Opener for RecordingOpener {
        fn open_url(&self, url: &Url) -> io::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }

        fn open_path(&self, path: &Path) -> io::Result<()> {
            self.opened.lock().unwrap().push(path.display().to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingOpener;
    use super::*;
    use crate::model::{AppEntry, ProjectHealth, RemoteItem};
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn path_templates_use_path_encoding() {
        let kw = Keyword::new("x", "X", "https://x.com/{param}");
        let url = build_url(&kw, Some("a b")).unwrap();
        assert_eq!(url.as_str(), "https://x.com/a%20b");

        let nested = build_url(&kw, Some("rust-lang/rust")).unwrap();
        assert_eq!(nested.as_str(), "https://x.com/rust-lang/rust");
    }

    #[test]
    fn query_templates_use_query_encoding() {
        let kw = Keyword::new("x", "X", "https://x.com?q={param}");
        let url = build_url(&kw, Some("a&b")).unwrap();
        assert_eq!(url.query(), Some("q=a%26b"));

        let spaced = build_url(&kw, Some("a b=c")).unwrap();
        assert_eq!(spaced.query(), Some("q=a%20b%3Dc"));
    }

    #[test]
    fn plain_keyword_ignores_param() {
        let kw = Keyword::new("gh", "GitHub", "https://github.com");
        assert_eq!(build_url(&kw, Some("ignored")).unwrap().as_str(), "https://github.com/");
        assert_eq!(build_url(&kw, None).unwrap().as_str(), "https://github.com/");
    }

    #[test]
    fn missing_param_and_bad_urls_are_errors() {
        let kw = Keyword::new("g", "Google", "https://google.com/search?q={param}");
        assert!(matches!(build_url(&kw, None), Err(ExecError::MissingParameter(_))));
        assert!(matches!(build_url(&kw, Some("")), Err(ExecError::MissingParameter(_))));

        let broken = Keyword::new("b", "Broken", "not a url");
        assert!(matches!(build_url(&broken, None), Err(ExecError::InvalidUrl(_))));
    }

    #[test]
    fn execute_dispatches_per_kind() {
        let opener = RecordingOpener::default();

        let kw = SearchResult::Keyword(Keyword::new("g", "Google", "https://google.com/search?q={param}"));
        execute(&kw, Some("rust"), &opener).unwrap();

        let app = AppEntry::new(PathBuf::from("/Applications/Safari.app"), "Safari".into(), None);
        execute(&SearchResult::App(app), None, &opener).unwrap();

        let item = RemoteItem {
            id: "project-1".into(),
            title: "shop".into(),
            subtitle: "Project".into(),
            status: ProjectHealth::Idle,
            action: Arc::new(|opener: &dyn Opener| {
                let url = Url::parse("https://dash.example.com/projects/1").map_err(|_| ExecError::InvalidUrl("dash".into()))?;
                opener.open_url(&url)?;
                Ok(())
            }),
        };
        execute(&SearchResult::RemoteItem(item), None, &opener).unwrap();

        assert_eq!(opener.opened(), vec![
            "https://google.com/search?q=rust".to_string(),
            "/Applications/Safari.app".to_string(),
            "https://dash.example.com/projects/1".to_string(),
        ]);
    }

    #[test]
    fn failed_build_opens_nothing() {
        let opener = RecordingOpener::default();
        let kw = SearchResult::Keyword(Keyword::new("x", "X", "https://x.com/{param}"));
        assert!(execute(&kw, None, &opener).is_err());
        assert!(opener.opened().is_empty());
    }
}
