use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::sources::{AppSource, RemoteSource};
use crate::state::{ProviderEvent, ProviderKind, ProviderPayload, ProviderRequest};

/// Delivers a finished provider response back to the event loop.
pub type Publish = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Runs the asynchronous providers on worker threads. Results are only
/// ever handed to `publish`; the aggregator is never touched from here.
pub struct Dispatcher {
    apps: Arc<dyn AppSource>,
    remote: Arc<dyn RemoteSource>,
    publish: Publish,
}

impl Dispatcher {
    pub fn new(apps: Arc<dyn AppSource>, remote: Arc<dyn RemoteSource>, publish: Publish) -> Self {
        Self { apps, remote, publish }
    }

    pub fn dispatch(&self, requests: Vec<ProviderRequest>) {
        for request in requests {
            let apps = self.apps.clone();
            let remote = self.remote.clone();
            let publish = self.publish.clone();
            let name = format!("provider-{:?}-{}", request.kind, request.generation);

            let spawned = thread::Builder::new().name(name).spawn(move || {
                publish(resolve(apps.as_ref(), remote.as_ref(), request));
            });
            if let Err(e) = spawned {
                warn!("Could not start provider worker: {}", e);
            }
        }
    }
}

/// Runs one request to completion on the calling thread.
pub fn resolve(apps: &dyn AppSource, remote: &dyn RemoteSource, request: ProviderRequest) -> ProviderEvent {
    let payload = match request.kind {
        ProviderKind::Apps => ProviderPayload::Apps(apps.search(&request.query)),
        ProviderKind::Remote => ProviderPayload::Remote(remote.search(&request.query)),
    };
    debug!("Provider {:?} finished for '{}' (gen {})", request.kind, request.query, request.generation);
    ProviderEvent {
        generation: request.generation,
        query: request.query,
        payload,
    }
}
