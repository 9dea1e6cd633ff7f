//! The Scheduler: drives periodic cycles, accepts on-demand triggers,
//! and enforces at-most-one cycle in flight. Grounded on the
//! shutdown-broadcast/`tokio::select!` shape in the teacher's
//! `src/commands/watch.rs` (`watch_loop` racing a `broadcast::Receiver`
//! against scheduled work) and `src/commands/reconcile.rs`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex as AsyncMutex, RwLock};
use tokio::time::interval;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::analyzer::Analyzer;
use crate::cluster_index::{ClusterIndex, Selectors};
use crate::config::{Config, RunMode};
use crate::error::Result;
use crate::harvester::{HarvestOutcome, Harvester};
use crate::linter::Linter;
use crate::metrics;
use crate::model::ServiceDescriptor;
use crate::probe::Probe;
use crate::profile::DomainProfile;
use crate::store::{ChangeOutcome, SpecStore};

/// Result of one completed (or cancelled) cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_id: u64,
    pub discovered: usize,
    pub harvested: usize,
    pub failed: usize,
    pub analyzed: usize,
    pub skipped_unchanged: usize,
    pub cancelled: bool,
}

/// Outcome of a `trigger_now` call.
pub enum TriggerOutcome {
    Started(CycleReport),
    /// A cycle was already running and the default coalescing policy
    /// dropped this trigger (§4.6, §9 open question: coalesce chosen).
    AlreadyRunning,
}

pub struct Scheduler {
    config: Config,
    cluster_index: Arc<dyn ClusterIndex>,
    linter: Arc<dyn Linter>,
    profile: Arc<DomainProfile>,
    store: Arc<SpecStore>,
    probe: Probe,
    aggregator: Aggregator,
    running: Arc<AtomicBool>,
    cycle_lock: Arc<AsyncMutex<()>>,
    next_cycle_id: Arc<std::sync::atomic::AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
    last_descriptors: Arc<RwLock<Vec<ServiceDescriptor>>>,
}

impl Scheduler {
    pub async fn new(
        config: Config,
        cluster_index: Arc<dyn ClusterIndex>,
        linter: Arc<dyn Linter>,
        profile: Arc<DomainProfile>,
    ) -> Result<Self> {
        let store = Arc::new(SpecStore::new(&config.storage_path).await?);
        let (shutdown_tx, _) = broadcast::channel(1);
        let aggregator = Aggregator::new();
        rehydrate_aggregator(&store, linter.as_ref(), profile.as_ref(), &aggregator).await;

        Ok(Self {
            config,
            cluster_index,
            linter,
            profile,
            store,
            probe: Probe::new(),
            aggregator,
            running: Arc::new(AtomicBool::new(false)),
            cycle_lock: Arc::new(AsyncMutex::new(())),
            next_cycle_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            shutdown_tx,
            last_descriptors: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn store(&self) -> &SpecStore {
        &self.store
    }

    /// Descriptors discovered during the most recently completed cycle,
    /// served by `GET /services`.
    pub async fn last_services(&self) -> Vec<ServiceDescriptor> {
        self.last_descriptors.read().await.clone()
    }

    /// Broadcasts the shutdown signal every in-flight cycle races against.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Runs cycles per `config.run_mode` until the process receives
    /// `Ctrl+C` (continuous mode) or a single cycle completes (one-shot).
    /// Returns the process exit code per §6.
    pub async fn run(&self) -> i32 {
        match self.config.run_mode {
            RunMode::OneShot => {
                self.trigger_now(false).await;
                0
            }
            RunMode::Continuous => {
                let mut ticker = interval(self.config.harvest_interval);
                ticker.tick().await; // first tick fires immediately

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            self.trigger_now(false).await;
                        }
                        _ = tokio::signal::ctrl_c() => {
                            info!("shutdown_signal_received");
                            let _ = self.shutdown_tx.send(());
                            return 2;
                        }
                    }
                }
            }
        }
    }

    /// Runs a cycle now unless one is already in flight, in which case
    /// the trigger is coalesced (dropped) per the default policy.
    pub async fn trigger_now(&self, _force: bool) -> TriggerOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            return TriggerOutcome::AlreadyRunning;
        };

        self.running.store(true, Ordering::SeqCst);
        let report = self.run_cycle().await;
        self.running.store(false, Ordering::SeqCst);
        TriggerOutcome::Started(report)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_cycle(&self) -> CycleReport {
        let cycle_id = self.next_cycle_id.fetch_add(1, Ordering::SeqCst);
        let mut report = CycleReport {
            cycle_id,
            ..Default::default()
        };

        let selectors = Selectors {
            label_selectors: [("app".to_string(), self.config.label_app.clone())]
                .into_iter()
                .collect(),
            annotation_filters: Default::default(),
        };

        let descriptors = match self.cluster_index.enumerate(&self.config.namespaces, &selectors).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, cycle_id, "cycle aborted: cluster index unavailable");
                return report;
            }
        };
        report.discovered = descriptors.len();

        for namespace in &self.config.namespaces {
            let count = descriptors.iter().filter(|d| &d.namespace == namespace).count();
            metrics::record_discovery(namespace, count);
        }

        let mut probed = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(enriched) = self.probe.probe(descriptor).await {
                probed.push(enriched);
            }
        }
        *self.last_descriptors.write().await = probed.clone();

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let harvester = self.harvester();
        let (outcomes, cancelled) = harvester
            .harvest_cancellable(probed, &self.store, Some(&mut shutdown_rx))
            .await;
        report.cancelled = cancelled;
        if cancelled {
            warn!(cycle_id, harvested_before_cancel = outcomes.len(), "cycle cancelled mid-harvest");
        }

        let analyzer = Analyzer::new(self.linter.as_ref(), self.profile.as_ref());

        for outcome in outcomes {
            match outcome {
                HarvestOutcome::Success { document, change } => {
                    report.harvested += 1;
                    let identity = document.identity();
                    metrics::record_harvest(&document.service, &document.namespace, "success", 0.0);

                    if change == ChangeOutcome::Unchanged
                        && let Some(cached) = self.aggregator.get(&identity).await
                        && cached.rule_set_version == self.linter.rule_set_version()
                    {
                        report.skipped_unchanged += 1;
                        continue;
                    }

                    let overview = analyzer.analyze(&document);
                    let severity_counts = [
                        ("critical", overview.findings.iter().filter(|f| f.severity == crate::model::Severity::Critical).count() as u32),
                        ("major", overview.findings.iter().filter(|f| f.severity == crate::model::Severity::Major).count() as u32),
                        ("minor", overview.findings.iter().filter(|f| f.severity == crate::model::Severity::Minor).count() as u32),
                        ("info", overview.findings.iter().filter(|f| f.severity == crate::model::Severity::Info).count() as u32),
                    ];
                    metrics::record_analysis(
                        &overview.service,
                        &overview.namespace,
                        overview.compliance_score,
                        &severity_counts,
                        overview.total_endpoints,
                    );
                    self.aggregator.update(overview).await;
                    report.analyzed += 1;

                    if let Err(e) = self.store.prune(&identity).await {
                        warn!(error = %e, %identity, "prune failed");
                    }
                }
                HarvestOutcome::Failure { service, namespace, reason } => {
                    report.failed += 1;
                    metrics::record_harvest_error("harvest_failure", &service);
                    warn!(service, namespace, reason, cycle_id, "harvest failed for service");
                }
            }
        }

        let attempts = report.harvested + report.failed;
        let success_rate = if attempts == 0 {
            100.0
        } else {
            100.0 * report.harvested as f64 / attempts as f64
        };
        metrics::record_cycle_complete(success_rate);

        info!(
            cycle_id,
            discovered = report.discovered,
            harvested = report.harvested,
            analyzed = report.analyzed,
            failed = report.failed,
            cancelled = report.cancelled,
            "cycle complete"
        );

        report
    }

    fn harvester(&self) -> Harvester {
        Harvester::new(self.config.max_concurrent)
    }
}

/// Rebuilds the Aggregator's cache from whatever `SpecStore` already has
/// on disk, re-running the Analyzer against each identity's latest
/// document. Lets a freshly constructed `Scheduler` (in particular the
/// `report` CLI command, which never calls `run`/`trigger_now`) reflect
/// the previous cycle's results instead of starting from an empty
/// snapshot every time.
async fn rehydrate_aggregator(store: &SpecStore, linter: &dyn Linter, profile: &DomainProfile, aggregator: &Aggregator) {
    let documents = match store.list_latest().await {
        Ok(docs) => docs,
        Err(e) => {
            warn!(error = %e, "rehydrate: failed to list stored documents, starting with an empty cache");
            return;
        }
    };

    if documents.is_empty() {
        return;
    }

    let analyzer = Analyzer::new(linter, profile);
    for document in &documents {
        aggregator.update(analyzer.analyze(document)).await;
    }
    info!(count = documents.len(), "rehydrated aggregator cache from spec store");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_index::StaticClusterIndex;
    use crate::linter::ReferenceLinter;
    use crate::model::ServiceDescriptor;

    #[tokio::test]
    async fn zero_discovered_services_yields_empty_cycle() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            storage_path: tmp.path().to_path_buf(),
            namespaces: vec!["default".to_string()],
            ..Config::default()
        };

        let scheduler = Scheduler::new(
            cfg,
            Arc::new(StaticClusterIndex::new(Vec::new())),
            Arc::new(ReferenceLinter::new()),
            Arc::new(DomainProfile::default()),
        )
        .await
        .unwrap();

        let TriggerOutcome::Started(report) = scheduler.trigger_now(false).await else {
            panic!("expected first trigger to start");
        };
        assert_eq!(report.discovered, 0);
        assert_eq!(report.harvested, 0);
        assert_eq!(report.failed, 0);
    }

    struct SlowClusterIndex;

    #[async_trait::async_trait]
    impl ClusterIndex for SlowClusterIndex {
        async fn enumerate(
            &self,
            _namespaces: &[String],
            _selectors: &Selectors,
        ) -> Result<Vec<ServiceDescriptor>> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn concurrent_trigger_coalesces() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config {
            storage_path: tmp.path().to_path_buf(),
            ..Config::default()
        };

        let scheduler = Arc::new(
            Scheduler::new(
                cfg,
                Arc::new(SlowClusterIndex),
                Arc::new(ReferenceLinter::new()),
                Arc::new(DomainProfile::default()),
            )
            .await
            .unwrap(),
        );

        let a = scheduler.clone();
        let handle = tokio::spawn(async move { a.trigger_now(false).await });
        // Give the first trigger time to take the cycle lock before we probe it.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(scheduler.is_running());

        let second = scheduler.trigger_now(false).await;
        assert!(matches!(second, TriggerOutcome::AlreadyRunning));

        let first = handle.await.unwrap();
        assert!(matches!(first, TriggerOutcome::Started(_)));
    }

    #[tokio::test]
    async fn fresh_scheduler_rehydrates_aggregator_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let descriptor = ServiceDescriptor {
            name: "orders".to_string(),
            namespace: "default".to_string(),
            labels: Default::default(),
            annotations: Default::default(),
            endpoints: vec!["http://unused.invalid".to_string()],
            health_path: None,
            openapi_path: None,
            version: None,
        };
        let cfg = Config {
            storage_path: tmp.path().to_path_buf(),
            namespaces: vec!["default".to_string()],
            ..Config::default()
        };

        {
            let scheduler = Scheduler::new(
                cfg.clone(),
                Arc::new(StaticClusterIndex::new(vec![descriptor.clone()])),
                Arc::new(ReferenceLinter::new()),
                Arc::new(DomainProfile::default()),
            )
            .await
            .unwrap();
            assert!(scheduler.aggregator().list().await.is_empty());

            let doc = crate::model::SpecDocument {
                service: "orders".to_string(),
                namespace: "default".to_string(),
                source_url: "http://unused.invalid/openapi.json".to_string(),
                content: serde_json::json!({"paths": {"/v1/orders": {"get": {"responses": {}}}}}),
                version: None,
                harvested_at: chrono::Utc::now(),
                is_valid: true,
                validation_errors: Vec::new(),
                content_hash: "irrelevant".to_string(),
            };
            scheduler.store().put(&doc).await.unwrap();
        }

        // A brand-new Scheduler over the same storage path, with no call to
        // `run`/`trigger_now`, must already see the persisted document —
        // this is what makes `api-gov report` non-empty.
        let rehydrated = Scheduler::new(
            cfg,
            Arc::new(StaticClusterIndex::new(vec![descriptor])),
            Arc::new(ReferenceLinter::new()),
            Arc::new(DomainProfile::default()),
        )
        .await
        .unwrap();

        let overviews = rehydrated.aggregator().list().await;
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].service, "orders");
    }
}
