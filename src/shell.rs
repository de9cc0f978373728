//! Line-mode stand-in for the floating panel.
//!
//! Each stdin line is one user action: plain text replaces the query (or
//! the parameter while locked), `:up`/`:down` move, `:tab` accepts the
//! completion, an empty line or `:enter` executes, `:back` unlocks, `:esc`
//! dismisses, `:reload` re-reads the keyword file, `:clear` empties the
//! query and `:quit` exits. Writes to the keyword file by other tools are
//! picked up without `:reload`.

use std::ffi::OsStr;
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use calloop::channel::{self, Event as ChannelEvent};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle, RegistrationToken};
use log::{debug, info, warn};
use notify::{Config as WatchConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::dispatch::{Dispatcher, Publish};
use crate::model::ProjectHealth;
use crate::sources::keywords::KeywordStore;
use crate::sources::{AppSource, RemoteSource};
use crate::state::{Aggregator, Mode, Outcome, ProviderEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Up,
    Down,
    Tab,
    Enter,
    Back,
    Escape,
    Reload,
    Quit,
}

impl Input {
    pub fn parse(line: &str) -> Self {
        match line.trim_end_matches(['\r', '\n']) {
            "" | ":enter" => Input::Enter,
            ":up" => Input::Up,
            ":down" => Input::Down,
            ":tab" => Input::Tab,
            ":back" => Input::Back,
            ":esc" => Input::Escape,
            ":reload" => Input::Reload,
            ":clear" => Input::Text(String::new()),
            ":quit" | ":q" => Input::Quit,
            text => Input::Text(text.to_string()),
        }
    }
}

struct Shell {
    aggregator: Aggregator,
    dispatcher: Dispatcher,
    store: Arc<KeywordStore>,
    handle: LoopHandle<'static, Shell>,
    debounce: Duration,
    pending: Option<(String, RegistrationToken)>, // Debounced query text
    should_exit: bool,
}

impl Shell {
    fn new(
        aggregator: Aggregator,
        dispatcher: Dispatcher,
        store: Arc<KeywordStore>,
        handle: LoopHandle<'static, Shell>,
        debounce: Duration,
    ) -> Self {
        Self {
            aggregator,
            dispatcher,
            store,
            handle,
            debounce,
            pending: None,
            should_exit: false,
        }
    }

    /// Panel shown: fresh session.
    fn show(&mut self) {
        let requests = self.aggregator.reset();
        self.dispatcher.dispatch(requests);
        self.render();
    }

    fn run_query(&mut self, text: &str) {
        let requests = self.aggregator.set_query_text(text);
        self.dispatcher.dispatch(requests);
    }

    /// Restarts the debounce window with `text` as the latest input.
    fn schedule_query(&mut self, text: String) {
        if let Some((_, token)) = self.pending.take() {
            self.handle.remove(token);
        }

        let timer = Timer::from_duration(self.debounce);
        let inserted = self.handle.insert_source(timer, |_, _, shell: &mut Shell| {
            if let Some((text, _)) = shell.pending.take() {
                shell.run_query(&text);
                shell.render();
            }
            TimeoutAction::Drop
        });
        match inserted {
            Ok(token) => self.pending = Some((text, token)),
            Err(e) => {
                warn!("Debounce timer unavailable ({}), querying immediately", e.error);
                self.run_query(&text);
            }
        }
    }

    /// Applies a still-pending keystroke before acting on the list.
    fn flush_pending(&mut self) {
        if let Some((text, token)) = self.pending.take() {
            self.handle.remove(token);
            self.run_query(&text);
        }
    }

    fn handle_input(&mut self, input: Input) {
        debug!("Input: {:?}", input);
        if let Input::Text(text) = input {
            match self.aggregator.mode() {
                Mode::Searching => self.schedule_query(text),
                Mode::Locked => {
                    self.aggregator.set_param_text(&text);
                    self.render();
                }
            }
            return;
        }

        self.flush_pending();
        match input {
            Input::Up => self.aggregator.move_up(),
            Input::Down => self.aggregator.move_down(),
            Input::Tab => {
                let outcome = self.aggregator.accept_autocomplete();
                self.finish(outcome);
            }
            Input::Enter => {
                let outcome = self.aggregator.execute();
                self.finish(outcome);
            }
            Input::Back => {
                let requests = self.aggregator.unlock();
                self.dispatcher.dispatch(requests);
            }
            Input::Escape => {
                let outcome = self.aggregator.dismiss();
                self.finish(outcome);
            }
            Input::Reload => self.reload_keywords(),
            Input::Quit => {
                self.should_exit = true;
                return;
            }
            Input::Text(_) => {}
        }
        self.render();
    }

    /// Re-reads the keyword file and refreshes the visible list.
    fn reload_keywords(&mut self) {
        self.store.reload();
        if self.aggregator.mode() == Mode::Searching {
            let query = self.aggregator.query().to_string();
            self.run_query(&query);
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        if outcome == Outcome::Dismiss {
            println!("-- dismissed --");
            self.show();
        }
    }

    fn render(&self) {
        for line in view(&self.aggregator) {
            println!("{line}");
        }
    }
}

/// Whether `event` created, changed or removed the file named `file_name`.
fn touches_file(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
        && event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

/// Watches the directory holding `path`, since atomic saves replace the
/// file itself on every write.
fn watch_keywords(path: &Path, tx: channel::Sender<()>) -> notify::Result<RecommendedWatcher> {
    let file_name = path.file_name().unwrap_or(OsStr::new("keywords.json")).to_os_string();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if touches_file(&event, &file_name) {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("Keyword watch error: {:?}", e),
        },
        WatchConfig::default(),
    )?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

fn health_mark(health: Option<ProjectHealth>) -> &'static str {
    match health {
        Some(ProjectHealth::Deployed) => " [ok]",
        Some(ProjectHealth::Failed) => " [failed]",
        Some(ProjectHealth::Deploying) => " [deploying]",
        Some(ProjectHealth::Idle) | None => "",
    }
}

/// Text rendering of the session.
pub fn view(aggregator: &Aggregator) -> Vec<String> {
    if aggregator.mode() == Mode::Locked {
        let title = aggregator.locked_title().unwrap_or("?");
        return vec![format!("[{}] {}_", title, aggregator.param())];
    }

    let mut lines = Vec::with_capacity(aggregator.results().len() + 1);
    match aggregator.autocomplete_hint() {
        Some(hint) => lines.push(format!("> {} ({})", aggregator.query(), hint)),
        None => lines.push(format!("> {}", aggregator.query())),
    }
    for (i, result) in aggregator.results().iter().enumerate() {
        let marker = if i == aggregator.selected_index() { '*' } else { ' ' };
        let tab = if result.is_parameterized() { "  tab" } else { "" };
        lines.push(format!(
            "{} {:<20} {}{}{}",
            marker,
            result.title(),
            result.subtitle().unwrap_or(""),
            health_mark(result.status()),
            tab
        ));
    }
    lines
}

pub fn run(
    aggregator: Aggregator,
    apps: Arc<dyn AppSource>,
    remote: Arc<dyn RemoteSource>,
    store: Arc<KeywordStore>,
    debounce: Duration,
) -> Result<()> {
    let mut event_loop: EventLoop<'static, Shell> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    // 1. Provider results rejoin the loop here
    let (tx_events, rx_events) = channel::channel::<ProviderEvent>();
    let tx_events = Mutex::new(tx_events);
    let publish: Publish = Arc::new(move |event| {
        if let Ok(tx) = tx_events.lock() {
            let _ = tx.send(event);
        }
    });
    handle
        .insert_source(rx_events, |event, _, shell: &mut Shell| {
            if let ChannelEvent::Msg(event) = event {
                if shell.aggregator.apply(event) {
                    shell.render();
                }
            }
        })
        .map_err(|e| anyhow!("provider channel: {}", e.error))?;

    // 2. User input
    let (tx_input, rx_input) = channel::channel::<Input>();
    handle
        .insert_source(rx_input, |event, _, shell: &mut Shell| match event {
            ChannelEvent::Msg(input) => shell.handle_input(input),
            ChannelEvent::Closed => shell.should_exit = true,
        })
        .map_err(|e| anyhow!("input channel: {}", e.error))?;

    // 3. Keyword file changes
    let (tx_reload, rx_reload) = channel::channel::<()>();
    handle
        .insert_source(rx_reload, |event, _, shell: &mut Shell| {
            if let ChannelEvent::Msg(()) = event {
                debug!("Keyword file changed on disk");
                shell.reload_keywords();
                shell.render();
            }
        })
        .map_err(|e| anyhow!("reload channel: {}", e.error))?;
    let _watcher = match watch_keywords(store.path(), tx_reload) {
        Ok(watcher) => {
            info!("Watching {:?} for changes", store.path());
            Some(watcher)
        }
        Err(e) => {
            warn!("Could not watch {:?} ({}), use :reload", store.path(), e);
            None
        }
    };

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx_input.send(Input::parse(&line)).is_err() {
                return;
            }
        }
        let _ = tx_input.send(Input::Quit);
    });

    let dispatcher = Dispatcher::new(apps, remote, publish);
    let mut shell = Shell::new(aggregator, dispatcher, store, handle, debounce);
    shell.show();

    // 4. Run loop
    loop {
        if shell.should_exit {
            break;
        }
        event_loop.dispatch(None, &mut shell)?;
    }

    Ok(())
}
