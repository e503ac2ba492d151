//! REST-backed [`SnapshotSource`]s for the poll scheduler.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::configs::SyncSettings;
use crate::ingestors::poller::{FetchError, Snapshot, SnapshotSource};
use crate::model::{Category, Event, EventPayload, KnowledgeSnapshot};
use crate::retrieve::DashboardApi;

/// Repository and branch a source is scoped to. `None` means all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub repo: Option<String>,
    pub branch: Option<String>,
}

impl Scope {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            repo: settings.repo_filter.clone(),
            branch: settings.branch_filter.clone(),
        }
    }
}

/// Recent events of one category.
pub struct EventListSource {
    api: DashboardApi,
    category: Category,
    scope: Scope,
    name: String,
}

impl EventListSource {
    pub fn new(api: DashboardApi, category: Category, scope: Scope) -> Self {
        Self {
            api,
            category,
            scope,
            name: format!("{}-events", category),
        }
    }
}

impl SnapshotSource for EventListSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
        let api = self.api.clone();
        let category = self.category;
        let Scope { repo, branch } = self.scope.clone();
        async move {
            let repo = repo.as_deref();
            let branch = branch.as_deref();
            let items: Vec<Event> = match category {
                Category::Pipeline => api
                    .pipeline_events(repo, branch)
                    .await?
                    .into_iter()
                    .map(|e| Event::new(EventPayload::Pipeline(e)))
                    .collect(),
                Category::Healing => api
                    .healing_sessions(repo)
                    .await?
                    .into_iter()
                    .map(|e| Event::new(EventPayload::Healing(e)))
                    .collect(),
                Category::Security => api
                    .security_scans(repo, branch)
                    .await?
                    .into_iter()
                    .map(|e| Event::new(EventPayload::Security(e)))
                    .collect(),
            };
            Ok(Snapshot::Events { category, items })
        }
        .boxed()
    }
}

pub struct StatsSource {
    api: DashboardApi,
    repo: Option<String>,
}

impl StatsSource {
    pub fn new(api: DashboardApi, repo: Option<String>) -> Self {
        Self { api, repo }
    }
}

impl SnapshotSource for StatsSource {
    fn name(&self) -> &str {
        "dashboard-stats"
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
        let api = self.api.clone();
        let repo = self.repo.clone();
        async move {
            let stats = api.dashboard_stats(repo.as_deref()).await?;
            Ok(Snapshot::Stats(stats.unwrap_or_default()))
        }
        .boxed()
    }
}

/// Knowledge-base statistics together with the learned patterns.
pub struct KnowledgeSource {
    api: DashboardApi,
}

impl KnowledgeSource {
    pub fn new(api: DashboardApi) -> Self {
        Self { api }
    }
}

impl SnapshotSource for KnowledgeSource {
    fn name(&self) -> &str {
        "knowledge-base"
    }

    fn fetch(&self) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
        let api = self.api.clone();
        async move {
            let (stats, patterns) = tokio::try_join!(api.knowledge_stats(), api.knowledge_patterns(None))?;
            Ok(Snapshot::Knowledge(KnowledgeSnapshot {
                stats,
                patterns,
            }))
        }
        .boxed()
    }
}

/// The full set of sources a dashboard polls: one per event category, the
/// headline statistics and the knowledge base.
pub fn dashboard_sources(api: &DashboardApi, scope: &Scope) -> Vec<Arc<dyn SnapshotSource>> {
    let mut sources: Vec<Arc<dyn SnapshotSource>> = Category::ALL
        .into_iter()
        .map(|c| Arc::new(EventListSource::new(api.clone(), c, scope.clone())) as Arc<dyn SnapshotSource>)
        .collect();
    sources.push(Arc::new(StatsSource::new(api.clone(), scope.repo.clone())));
    sources.push(Arc::new(KnowledgeSource::new(api.clone())));
    sources
}
