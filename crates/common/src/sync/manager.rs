use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::{ConsumeReport, SyncConfig, SyncConsumer, SyncError};
use crate::changes::{self, FileChangeInfo};
use crate::local_state::{LocalSyncState, SyncStatus};
use crate::permissions::{ParseMode, PermissionTree};
use crate::queue::SyncQueue;
use crate::remote::SyncRemote;
use crate::state::{self, DirectoryState, FileMetadata, IgnoreRules};

/// Snapshots of one datasite taken at the start of an iteration.
struct DatasitePlan {
    datasite: String,
    local: DirectoryState,
    remote: DirectoryState,
}

/// Drives the client sync loop.
pub struct SyncManager {
    remote: Arc<dyn SyncRemote>,
    config: SyncConfig,
    queue: Arc<SyncQueue>,
    local_state: Arc<LocalSyncState>,
    consumer: SyncConsumer,
}

impl SyncManager {
    pub fn new(
        remote: Arc<dyn SyncRemote>,
        config: SyncConfig,
        local_state: Arc<LocalSyncState>,
    ) -> Self {
        let queue = Arc::new(SyncQueue::new());
        let consumer = SyncConsumer::new(
            remote.clone(),
            config.datasites.clone(),
            queue.clone(),
            local_state.clone(),
        );
        Self {
            remote,
            config,
            queue,
            local_state,
            consumer,
        }
    }

    pub fn local_state(&self) -> &Arc<LocalSyncState> {
        &self.local_state
    }

    /// Run iterations every `interval` until `shutdown_rx` fires.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<()>) {
        tracing::info!(
            identity = %self.remote.identity(),
            datasites = %self.config.datasites.display(),
            interval_ms = self.config.interval.as_millis() as u64,
            "sync manager started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) if report != ConsumeReport::default() => {
                            tracing::info!(
                                applied = report.applied,
                                rejected = report.rejected,
                                failed = report.failed,
                                skipped = report.skipped,
                                "sync iteration finished"
                            );
                        }
                        Ok(_) => tracing::trace!("sync iteration finished, nothing to do"),
                        Err(e) => tracing::error!("sync iteration failed: {}", e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("sync manager shutting down");
                    break;
                }
            }
        }
    }

    /// One full iteration: snapshot, diff, apply permission files, then
    /// content, then persist the local sync state.
    pub async fn run_once(&self) -> Result<ConsumeReport, SyncError> {
        let datasites = &self.config.datasites;
        if !datasites.is_dir() {
            return Err(SyncError::MissingSyncFolder(datasites.clone()));
        }

        let ignore = self.ignore_rules();
        let remote_states = self.remote_states().await?;

        let mut plans = Vec::with_capacity(remote_states.len());
        for (datasite, files) in remote_states {
            match self.plan(&datasite, files, &ignore).await {
                Ok(plan) => plans.push(plan),
                Err(e) => {
                    tracing::error!(datasite = %datasite, "skipping datasite this iteration: {}", e);
                }
            }
        }

        let mut content = Vec::new();
        for plan in &plans {
            self.reconcile(plan);
            for change in changes::diff(&plan.local, &plan.remote) {
                let Some(change) = self.direct(change, plan) else {
                    continue;
                };
                if change.is_permission_file() {
                    self.queue.enqueue(change);
                } else {
                    content.push(change);
                }
            }
        }

        let mut report = ConsumeReport::default();
        if !self.queue.is_empty() {
            let trees = self.load_trees(&plans).await;
            report += self.consumer.consume_all(&trees).await;
        }

        if !content.is_empty() {
            for change in content {
                self.queue.enqueue(change);
            }
            let trees = self.load_trees(&plans).await;
            report += self.consumer.consume_all(&trees).await;
        }

        if let Err(e) = self.local_state.save() {
            tracing::error!("failed to save local sync state: {}", e);
        }
        Ok(report)
    }

    fn ignore_rules(&self) -> IgnoreRules {
        let rules = match IgnoreRules::load(&self.config.datasites) {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("ignoring unreadable ignore file: {}", e);
                IgnoreRules::new()
            }
        };
        self.config
            .ignored_folders
            .iter()
            .fold(rules, |rules, folder| rules.with_folder(folder.as_str()))
    }

    /// Metadata of every readable datasite, including our own even when the
    /// server has nothing for it yet.
    async fn remote_states(&self) -> Result<BTreeMap<String, Vec<FileMetadata>>, SyncError> {
        let own = self.remote.identity().to_string();
        let mut states = match self.remote.datasite_states().await {
            Ok(states) => states,
            Err(e) => {
                tracing::warn!("failed to fetch datasite states, syncing own datasite only: {}", e);
                let files = self.remote.dir_state(&own).await?;
                BTreeMap::from([(own.clone(), files)])
            }
        };
        states.entry(own).or_default();
        Ok(states)
    }

    async fn plan(
        &self,
        datasite: &str,
        files: Vec<FileMetadata>,
        ignore: &IgnoreRules,
    ) -> Result<DatasitePlan, SyncError> {
        let root = self.config.datasites.clone();
        let dir = datasite.to_string();
        let rules = ignore.clone();
        let local =
            tokio::task::spawn_blocking(move || state::snapshot(&root, &dir, &rules)).await??;

        let remote = DirectoryState::from_metadata(
            datasite,
            files
                .into_iter()
                .filter(|meta| !ignore.is_ignored(&meta.path, datasite)),
        );

        Ok(DatasitePlan {
            datasite: datasite.to_string(),
            local,
            remote,
        })
    }

    /// Record paths both sides already agree on, so a later remote edit is
    /// not mistaken for a local one.
    fn reconcile(&self, plan: &DatasitePlan) {
        for (path, meta) in &plan.local.tree {
            if plan.remote.hash_of(path) == Some(meta.hash.as_str())
                && self.local_state.synced_hash(path).as_deref() != Some(meta.hash.as_str())
            {
                self.local_state.mark_synced(path, Some(meta.clone()));
            }
        }
        for path in self.local_state.synced_paths_within(&plan.datasite) {
            if plan.local.get(&path).is_none() && plan.remote.get(&path).is_none() {
                self.local_state.mark_synced(&path, None);
            }
        }
    }

    /// Keep a change as a pull unless the local copy moved away from what
    /// was last synced, in which case it becomes a push. When both sides
    /// moved, the server copy wins outside our own datasite.
    fn direct(&self, change: FileChangeInfo, plan: &DatasitePlan) -> Option<FileChangeInfo> {
        let synced = self.local_state.synced_hash(&change.path);
        if change.local_hash == synced {
            return Some(change);
        }
        if change.remote_hash != synced && plan.datasite != self.remote.identity() {
            tracing::info!(
                path = %change.path,
                "both sides changed since last sync, keeping the server copy"
            );
            return Some(change);
        }

        if let Some(status) = self.local_state.status(&change.path) {
            if status.status == SyncStatus::Rejected
                && status.hash == change.local_hash
            {
                return None;
            }
        }

        let local_size = plan.local.get(&change.path).map(|meta| meta.size).unwrap_or(0);
        Some(change.reverse(local_size))
    }

    /// Permission trees built from the local copies, read fresh so that
    /// permission files applied earlier in the iteration are in effect.
    async fn load_trees(&self, plans: &[DatasitePlan]) -> BTreeMap<String, PermissionTree> {
        let mut trees = BTreeMap::new();
        for plan in plans {
            let root = self.config.datasites.clone();
            let dir = plan.datasite.clone();
            let tree = tokio::task::spawn_blocking(move || {
                PermissionTree::from_dir(&root, &dir, ParseMode::BestEffort)
            })
            .await;
            match tree {
                Ok(Ok(tree)) => {
                    trees.insert(plan.datasite.clone(), tree);
                }
                Ok(Err(e)) => {
                    tracing::error!(datasite = %plan.datasite, "failed to load permissions: {}", e)
                }
                Err(e) => {
                    tracing::error!(datasite = %plan.datasite, "failed to load permissions: {}", e)
                }
            }
        }
        trees
    }
}
