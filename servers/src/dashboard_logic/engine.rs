//! Wires the live-sync components together and owns their lifetime.

use std::sync::Arc;

use anyhow::Result;
use lib_dashboard::core::store::Epoch;
use lib_dashboard::ingestors::{dashboard_sources, Scope, WsStompConnector};
use lib_dashboard::retrieve::DashboardApi;
use lib_dashboard::{
    Category, ConnectionManager, EventStore, PollScheduler, StoreView, SubscriptionRegistry, SyncSettings,
    TopicRouter,
};
use tokio::task::JoinHandle;

/// Shared handles the HTTP layer reads from.
#[derive(Clone)]
pub struct AppState {
    pub view: StoreView,
    pub registry: SubscriptionRegistry,
    pub connection: Arc<ConnectionManager>,
    pub poller: Arc<PollScheduler>,
    pub api: DashboardApi,
}

pub struct Engine {
    state: AppState,
    settings: SyncSettings,
    store_task: JoinHandle<()>,
}

impl Engine {
    /// Builds every component without starting network activity.
    pub fn build(settings: SyncSettings) -> Result<Engine> {
        settings.validate()?;

        let (store, handle, view) = EventStore::new(&settings, Epoch::new());
        let store_task = store.spawn();

        let api = DashboardApi::new(&settings)?;
        let sources = dashboard_sources(&api, &Scope::from_settings(&settings));
        let poller = Arc::new(PollScheduler::new(sources, handle.clone()));

        let registry = SubscriptionRegistry::new(settings.listener_queue_size);
        let router = TopicRouter::new(handle, registry.clone())
            .with_refresh_trigger(Category::Healing, poller.refresh_trigger());

        let connector = Arc::new(WsStompConnector::new(settings.push_url.clone()));
        let connection = Arc::new(ConnectionManager::new(
            connector,
            Arc::new(router),
            settings.reconnect_delay(),
        ));

        Ok(Engine {
            state: AppState {
                view,
                registry,
                connection,
                poller,
                api,
            },
            settings,
            store_task,
        })
    }

    pub fn start(&self) {
        log::info!(
            "Starting live sync: push {} / REST {}",
            self.settings.push_url,
            self.settings.api_base_url
        );
        self.state.connection.connect();
        self.state.poller.start(self.settings.poll_interval());
    }

    pub fn app_state(&self) -> AppState {
        self.state.clone()
    }

    /// Disconnects the push channel, stops polling and ends the store task.
    pub async fn shutdown(self) {
        self.state.connection.disconnect().await;
        self.state.poller.stop();
        self.store_task.abort();
        log::info!("Live sync stopped");
    }
}
