mod api;
mod config;
mod credentials;
mod dispatch;
mod executor;
mod matcher;
mod model;
mod shell;
mod sources;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use uuid::Uuid;

use crate::api::{ApiClient, ApiError};
use crate::config::{load_config, Config};
use crate::credentials::{Keychain, TokenStore};
use crate::executor::SystemOpener;
use crate::model::{Keyword, SearchResult};
use crate::sources::apps::{self, AppIndex};
use crate::sources::keywords::KeywordStore;
use crate::sources::remote::ProjectProvider;
use crate::state::Aggregator;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the merged result list for a query
    Search { query: String },
    /// Run the top result for a query
    Run {
        query: String,
        /// Text substituted into a parameterized keyword
        #[arg(short, long)]
        param: Option<String>,
    },
    /// Interactive session reading actions from stdin (default)
    Shell,
    /// Manage keywords
    #[command(subcommand)]
    Keywords(KeywordCommand),
    /// Validate and store an API token
    Login { token: String },
    /// Forget the stored API token
    Logout,
    /// Show the account behind the stored token
    Whoami,
    /// List remote projects
    Projects {
        /// Bypass the project cache
        #[arg(long)]
        refresh: bool,
    },
}

#[derive(Subcommand, Debug)]
enum KeywordCommand {
    List,
    Add {
        shortcut: String,
        url: String,
        #[arg(short, long, default_value = "")]
        name: String,
    },
    /// Change fields of an existing keyword
    Edit {
        keyword: String,
        #[arg(long)]
        shortcut: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Remove by shortcut or id
    Remove { keyword: String },
    /// Enable or disable by shortcut or id
    Toggle { keyword: String },
    Import { path: PathBuf },
    Export { path: PathBuf },
}

struct Services {
    store: Arc<KeywordStore>,
    apps: Arc<AppIndex>,
    projects: Arc<ProjectProvider>,
    tokens: Arc<dyn TokenStore>,
}

impl Services {
    fn build(config: &Config) -> Result<Self> {
        let store = Arc::new(KeywordStore::open(config.keywords_path()));
        let apps = Arc::new(AppIndex::new(Vec::new(), config.general.app_limit));
        let tokens: Arc<dyn TokenStore> = Arc::new(Keychain);
        let client = ApiClient::new(&config.remote.endpoint, config.timeout())?;
        let projects = ProjectProvider::new(Box::new(client), tokens.clone(), config.cache_ttl(), &config.remote.dashboard_url)
            .with_snapshot(config.snapshot_path());

        Ok(Self {
            store,
            apps,
            projects: Arc::new(projects),
            tokens,
        })
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.store.clone(), self.apps.clone(), Arc::new(SystemOpener))
    }

    /// Runs a query with every provider resolved inline.
    fn search_blocking(&self, config: &Config, query: &str) -> Aggregator {
        self.apps.replace(apps::scan(&config.app_dirs()));
        let mut aggregator = self.aggregator();
        aggregator.reset();
        for request in aggregator.set_query_text(query) {
            let event = dispatch::resolve(self.apps.as_ref(), self.projects.as_ref(), request);
            aggregator.apply(event);
        }
        aggregator
    }

    fn find_keyword(&self, needle: &str) -> Result<Keyword> {
        let keywords = self.store.keywords();
        if let Ok(id) = Uuid::parse_str(needle) {
            if let Some(k) = keywords.iter().find(|k| k.id == id) {
                return Ok(k.clone());
            }
        }
        let mut matches = keywords.into_iter().filter(|k| k.shortcut == needle);
        match (matches.next(), matches.next()) {
            (Some(k), None) => Ok(k),
            (Some(_), Some(_)) => bail!("shortcut '{}' is ambiguous, use the id", needle),
            (None, _) => bail!("no keyword '{}'", needle),
        }
    }
}

fn print_results(results: &[SearchResult]) {
    for result in results {
        let kind = match result {
            SearchResult::Keyword(_) => "keyword",
            SearchResult::App(_) => "app",
            SearchResult::RemoteItem(_) => "project",
        };
        let status = match result {
            SearchResult::App(app) => app.bundle_id.as_deref().map(|id| format!(" ({id})")).unwrap_or_default(),
            _ => result.status().map(|s| format!(" [{:?}]", s)).unwrap_or_default(),
        };
        println!("{:<8} {:<24} {}{}", kind, result.title(), result.subtitle().unwrap_or(""), status);
    }
}

fn keywords_command(services: &Services, command: KeywordCommand) -> Result<()> {
    let store = &services.store;
    match command {
        KeywordCommand::List => {
            info!("Keywords from {:?}", store.path());
            for k in store.keywords() {
                let state = if k.enabled { "on " } else { "off" };
                println!("{} {} {:<10} {:<24} {}", k.id, state, k.shortcut, k.name, k.url);
            }
        }
        KeywordCommand::Add { shortcut, url, name } => {
            let keyword = Keyword::new(shortcut, name, url);
            let id = keyword.id;
            store.add(keyword)?;
            println!("Added {}", id);
        }
        KeywordCommand::Edit { keyword, shortcut, url, name } => {
            let mut keyword = services.find_keyword(&keyword)?;
            if let Some(shortcut) = shortcut {
                keyword.shortcut = shortcut;
            }
            if let Some(url) = url {
                keyword.url = url;
            }
            if let Some(name) = name {
                keyword.name = name;
            }
            store.update(keyword.clone())?;
            println!("Updated '{}'", keyword.shortcut);
        }
        KeywordCommand::Remove { keyword } => {
            let keyword = services.find_keyword(&keyword)?;
            store.delete(keyword.id)?;
            println!("Removed '{}'", keyword.shortcut);
        }
        KeywordCommand::Toggle { keyword } => {
            let keyword = services.find_keyword(&keyword)?;
            if let Some(enabled) = store.toggle_enabled(keyword.id)? {
                println!("'{}' is now {}", keyword.shortcut, if enabled { "enabled" } else { "disabled" });
            }
        }
        KeywordCommand::Import { path } => {
            let summary = store.import_from(&path)?;
            println!("Imported {} keywords, skipped {}", summary.added, summary.skipped);
        }
        KeywordCommand::Export { path } => {
            store.export_to(&path)?;
            println!("Exported to {:?}", path);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // 1. Load Config
    let config = load_config(args.config.as_deref())?;

    // 2. Services
    let services = Services::build(&config)?;

    // 3. Command
    match args.command.unwrap_or(Command::Shell) {
        Command::Search { query } => {
            let aggregator = services.search_blocking(&config, &query);
            print_results(aggregator.results());
        }
        Command::Run { query, param } => {
            let aggregator = services.search_blocking(&config, &query);
            let Some(result) = aggregator.results().first() else {
                bail!("nothing matches '{}'", query);
            };
            if result.is_parameterized() && param.as_deref().is_none_or(str::is_empty) {
                bail!("'{}' needs a parameter, pass --param", result.title());
            }
            result.execute(param.as_deref(), &SystemOpener)?;
            info!("Executed '{}'", result.title());
        }
        Command::Shell => {
            let app_index = services.apps.clone();
            let dirs = config.app_dirs();
            thread::spawn(move || {
                app_index.replace(apps::scan(&dirs));
                info!("Indexed {} applications", app_index.len());
            });

            shell::run(
                services.aggregator(),
                services.apps.clone(),
                services.projects.clone(),
                services.store.clone(),
                config.debounce(),
            )?;
        }
        Command::Keywords(command) => keywords_command(&services, command)?,
        Command::Login { token } => {
            let user = services.projects.validate_api_key(&token)?;
            services.tokens.save(&token)?;
            services.projects.invalidate();
            println!("Logged in as {}", user.username);
        }
        Command::Logout => {
            services.tokens.delete()?;
            services.projects.invalidate();
            println!("Logged out");
        }
        Command::Whoami => {
            let token = services.tokens.load().ok_or(ApiError::NotAuthenticated)?;
            let user = services.projects.validate_api_key(&token)?;
            println!("{} ({})", user.username, user.name);
        }
        Command::Projects { refresh } => {
            for project in services.projects.fetch_projects(refresh)? {
                println!("{:<24} {:?}", project.name, project.health());
                for service in &project.services {
                    let status = service.status.map(|s| s.as_str()).unwrap_or("UNKNOWN");
                    println!("  {:<22} {}", service.name, status);
                }
            }
        }
    }

    Ok(())
}
