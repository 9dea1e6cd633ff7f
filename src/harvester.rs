//! The Harvester: fetches OpenAPI documents with bounded concurrency,
//! per-target throttling, and retry with backoff. Grounded on
//! `original_source/src/core/api_harvester.py`'s `APIHarvester`
//! (`asyncio.Semaphore` + `asyncio_throttle.Throttler` + `tenacity`
//! retry), translated to `tokio::sync::Semaphore` plus a hand-rolled
//! token bucket since no corpus crate exposes an async rate limiter with
//! this exact per-second-refill shape.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tracing::{info, warn};

use crate::canonical::content_hash;
use crate::model::{ServiceDescriptor, SpecDocument};
use crate::store::{ChangeOutcome, SpecStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MIN: Duration = Duration::from_secs(4);
const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// Grace period given to fetches already in flight when cancellation
/// fires, before the remainder are abandoned (§4.6, §5). Owned here
/// since it bounds exactly the in-flight work this module drives.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Result of attempting to harvest a single service's OpenAPI document.
pub enum HarvestOutcome {
    Success {
        document: SpecDocument,
        change: ChangeOutcome,
    },
    Failure {
        service: String,
        namespace: String,
        reason: String,
    },
}

/// Token bucket of `rate` tokens refilled once per second, bounding the
/// Harvester's request rate across the whole cycle.
struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    fn new(rate: usize) -> Self {
        let semaphore = Arc::new(Semaphore::new(rate));
        let refill = semaphore.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let available = refill.available_permits();
                if available < rate {
                    refill.add_permits(rate - available);
                }
            }
        });
        Self { semaphore }
    }

    async fn acquire(&self) {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");
        permit.forget();
    }
}

/// Harvests OpenAPI documents from a set of probed services.
pub struct Harvester {
    client: reqwest::Client,
    concurrency: Arc<Semaphore>,
    rate_limiter: Arc<RateLimiter>,
}

impl Harvester {
    pub fn new(max_concurrent: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client config is valid");
        Self {
            client,
            concurrency: Arc::new(Semaphore::new(max_concurrent)),
            rate_limiter: Arc::new(RateLimiter::new(max_concurrent)),
        }
    }

    /// Harvests every service that has a confirmed OpenAPI endpoint. A
    /// single service's failure never aborts the cycle — it is recorded
    /// as a `HarvestOutcome::Failure` and the rest proceed. Never
    /// cancelled; equivalent to [`Harvester::harvest_cancellable`] with
    /// no cancellation signal.
    pub async fn harvest(&self, services: Vec<ServiceDescriptor>, store: &SpecStore) -> Vec<HarvestOutcome> {
        let (outcomes, _cancelled) = self.harvest_cancellable(services, store, None).await;
        outcomes
    }

    /// As [`Harvester::harvest`], but races the batch against `cancel`.
    /// On cancellation, already-completed fetches are kept and in-flight
    /// ones are given up to `CANCEL_GRACE` to finish before the rest are
    /// abandoned — so a cancelled cycle still pushes whatever portion of
    /// the batch actually completed, per §4.6/§5's partial-results
    /// contract. Returns the outcomes gathered and whether cancellation
    /// fired at all.
    pub async fn harvest_cancellable(
        &self,
        services: Vec<ServiceDescriptor>,
        store: &SpecStore,
        mut cancel: Option<&mut broadcast::Receiver<()>>,
    ) -> (Vec<HarvestOutcome>, bool) {
        let mut tasks = JoinSet::new();

        for service in services {
            let Some(openapi_path) = service.openapi_path.clone() else {
                continue;
            };
            let Some(base) = service.endpoints.first().cloned() else {
                continue;
            };

            let client = self.client.clone();
            let concurrency = self.concurrency.clone();
            let rate_limiter = self.rate_limiter.clone();
            let url = if openapi_path.starts_with("http") {
                openapi_path
            } else {
                format!("{}{openapi_path}", base.trim_end_matches('/'))
            };

            tasks.spawn(async move {
                let _permit = concurrency.acquire_owned().await.expect("semaphore not closed");
                rate_limiter.acquire().await;
                harvest_one(&client, &service.name, &service.namespace, &url).await
            });
        }

        let mut raw_outcomes = Vec::new();
        let mut cancelled = false;

        loop {
            let Some(rx) = cancel.as_deref_mut() else {
                match tasks.join_next().await {
                    Some(Ok(outcome)) => raw_outcomes.push(outcome),
                    Some(Err(e)) => warn!(error = %e, "harvest task panicked"),
                    None => break,
                }
                continue;
            };

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(outcome)) => raw_outcomes.push(outcome),
                    Some(Err(e)) => warn!(error = %e, "harvest task panicked"),
                    None => break,
                },
                _ = rx.recv() => {
                    cancelled = true;
                    warn!("cancellation requested mid-harvest, entering grace period");
                    drain_grace_period(&mut tasks, &mut raw_outcomes).await;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let finalized = self.finalize(raw_outcomes, store).await;
        (finalized, cancelled)
    }

    /// Change detection and persistence happen after concurrent fetch
    /// completes, serialized per identity by the store itself.
    async fn finalize(&self, outcomes: Vec<HarvestOutcome>, store: &SpecStore) -> Vec<HarvestOutcome> {
        let mut finalized = Vec::new();
        for outcome in outcomes {
            match outcome {
                HarvestOutcome::Success { document, .. } => {
                    let change = match store.classify_change(&document).await {
                        Ok(c) => c,
                        Err(e) => {
                            finalized.push(HarvestOutcome::Failure {
                                service: document.service.clone(),
                                namespace: document.namespace.clone(),
                                reason: format!("change detection failed: {e}"),
                            });
                            continue;
                        }
                    };
                    if let Err(e) = store.put(&document).await {
                        finalized.push(HarvestOutcome::Failure {
                            service: document.service.clone(),
                            namespace: document.namespace.clone(),
                            reason: format!("persisting document failed: {e}"),
                        });
                        continue;
                    }
                    finalized.push(HarvestOutcome::Success { document, change });
                }
                other => finalized.push(other),
            }
        }
        finalized
    }
}

/// Gives whatever is still in flight in `tasks` up to `CANCEL_GRACE` to
/// finish, pushing each result as it arrives. Tasks that don't finish
/// within the window are left for the caller's `abort_all()`.
async fn drain_grace_period(tasks: &mut JoinSet<HarvestOutcome>, raw_outcomes: &mut Vec<HarvestOutcome>) {
    let deadline = Instant::now() + CANCEL_GRACE;
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return;
        };
        match timeout(remaining, tasks.join_next()).await {
            Ok(Some(Ok(outcome))) => raw_outcomes.push(outcome),
            Ok(Some(Err(e))) => warn!(error = %e, "harvest task panicked during grace period"),
            Ok(None) => return, // everything finished within the grace period
            Err(_) => return,   // grace period elapsed with tasks still outstanding
        }
    }
}

async fn harvest_one(
    client: &reqwest::Client,
    service: &str,
    namespace: &str,
    url: &str,
) -> HarvestOutcome {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let body: Value = match resp.json().await {
                    Ok(v) => v,
                    Err(e) => {
                        return HarvestOutcome::Failure {
                            service: service.to_string(),
                            namespace: namespace.to_string(),
                            reason: format!("unparseable body: {e}"),
                        };
                    }
                };
                return build_document(service, namespace, url, body);
            }
            Ok(resp) if resp.status().is_client_error() => {
                // 4xx is terminal — no retry.
                return HarvestOutcome::Failure {
                    service: service.to_string(),
                    namespace: namespace.to_string(),
                    reason: format!("terminal status {}", resp.status()),
                };
            }
            Ok(resp) => {
                // 5xx: transient, retry within budget.
                if attempt >= MAX_ATTEMPTS {
                    return HarvestOutcome::Failure {
                        service: service.to_string(),
                        namespace: namespace.to_string(),
                        reason: format!("retry exhausted, last status {}", resp.status()),
                    };
                }
                sleep(backoff_for(attempt)).await;
            }
            Err(e) => {
                if attempt >= MAX_ATTEMPTS {
                    return HarvestOutcome::Failure {
                        service: service.to_string(),
                        namespace: namespace.to_string(),
                        reason: format!("retry exhausted, last error {e}"),
                    };
                }
                warn!(service, namespace, attempt, error = %e, "harvest: transient failure, retrying");
                sleep(backoff_for(attempt)).await;
            }
        }
    }
}

/// Exponential backoff: base 1s, clamped to [4s, 10s].
fn backoff_for(attempt: u32) -> Duration {
    let raw = BACKOFF_BASE * 2u32.pow(attempt);
    raw.clamp(BACKOFF_MIN, BACKOFF_MAX)
}

fn build_document(service: &str, namespace: &str, url: &str, content: Value) -> HarvestOutcome {
    let (is_valid, validation_errors) = validate_openapi(&content);
    let version = content
        .pointer("/info/version")
        .and_then(Value::as_str)
        .map(String::from);
    let hash = content_hash(&content);

    info!(service, namespace, is_valid, "harvested spec document");

    HarvestOutcome::Success {
        document: SpecDocument {
            service: service.to_string(),
            namespace: namespace.to_string(),
            source_url: url.to_string(),
            content,
            version,
            harvested_at: chrono::Utc::now(),
            is_valid,
            validation_errors,
            content_hash: hash,
        },
        change: ChangeOutcome::New, // overwritten by caller after store lookup
    }
}

/// Minimal syntactic OpenAPI well-formedness check: requires an
/// `openapi`/`swagger` version field and a `paths` object. Validation
/// failure is not a harvest failure — the document is retained with
/// `is_valid=false` for best-effort downstream analysis.
fn validate_openapi(content: &Value) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    if content.get("openapi").is_none() && content.get("swagger").is_none() {
        errors.push("missing 'openapi' or 'swagger' version field".to_string());
    }
    if !content.get("paths").map(Value::is_object).unwrap_or(false) {
        errors.push("missing or non-object 'paths'".to_string());
    }
    if !content
        .get("info")
        .map(|v| v.is_object())
        .unwrap_or(false)
    {
        errors.push("missing 'info' object".to_string());
    }

    (errors.is_empty(), errors)
}
