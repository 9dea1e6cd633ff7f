//! SpecStore: file-system-backed persistence for harvested documents.
//! Grounded on `original_source/src/core/api_harvester.py`'s
//! `SpecStorage`, generalized to the atomic-write and per-identity
//! serialisation requirements of the specification (§4.3).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::canonical::content_hash;
use crate::error::{GovernanceError, Result};
use crate::fields::extract_fields;
use crate::model::{FieldRecord, Identity, SpecDocument};

/// Outcome of comparing a freshly harvested document against the
/// previously stored one for the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    New,
    Unchanged,
    Updated,
}

/// Field-level diff between two documents.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub added: Vec<FieldRecord>,
    pub removed: Vec<FieldRecord>,
    pub modified: Vec<(FieldRecord, FieldRecord)>,
}

/// File-system-backed store keyed by `(service, namespace, harvested_at)`.
/// Retains at most two documents per identity (latest, previous).
pub struct SpecStore {
    root: PathBuf,
    // Per-identity write serialisation; readers never block on this past
    // the rename boundary since writes are atomic.
    locks: AsyncMutex<HashMap<Identity, Arc<AsyncMutex<()>>>>,
}

impl SpecStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            GovernanceError::CycleFatal(format!("storage root {root:?} unwritable: {e}"))
        })?;
        Ok(Self {
            root,
            locks: AsyncMutex::new(HashMap::new()),
        })
    }

    async fn lock_for(&self, identity: &Identity) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn file_name(service: &str, namespace: &str, harvested_at: &chrono::DateTime<chrono::Utc>) -> String {
        format!("{service}_{namespace}_{}.json", harvested_at.to_rfc3339())
    }

    fn prefix(service: &str, namespace: &str) -> String {
        format!("{service}_{namespace}_")
    }

    /// Persists `doc` with key `(service, namespace, harvested_at)`.
    /// Writes are atomic: write to a temp file, then rename into place,
    /// so no partial document is ever visible to readers.
    pub async fn put(&self, doc: &SpecDocument) -> Result<PathBuf> {
        let identity = doc.identity();
        let guard = self.lock_for(&identity).await;
        let _held = guard.lock().await;

        let file_name = Self::file_name(&doc.service, &doc.namespace, &doc.harvested_at);
        let final_path = self.root.join(&file_name);
        let tmp_path = self.root.join(format!("{file_name}.tmp"));

        let body = serde_json::to_vec_pretty(doc)
            .map_err(|e| GovernanceError::PermanentPerTarget {
                target: identity.to_string(),
                reason: format!("serialising document failed: {e}"),
            })?;

        fs::write(&tmp_path, &body).await.map_err(|e| {
            GovernanceError::PermanentPerTarget {
                target: identity.to_string(),
                reason: format!("writing temp file failed: {e}"),
            }
        })?;

        fs::rename(&tmp_path, &final_path).await.map_err(|e| {
            GovernanceError::PermanentPerTarget {
                target: identity.to_string(),
                reason: format!("rename into place failed: {e}"),
            }
        })?;

        info!(service = %doc.service, namespace = %doc.namespace, file = %file_name, "spec stored");
        Ok(final_path)
    }

    /// Returns documents for `identity` sorted by harvest time, most
    /// recent first.
    async fn scan(&self, identity: &Identity) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
        let prefix = Self::prefix(&identity.service, &identity.namespace);
        let mut entries = Vec::new();

        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) => {
                warn!(error = %e, "spec store scan failed, treating as empty");
                return Ok(Vec::new());
            }
        };

        while let Some(entry) = read_dir.next_entry().await.map_err(|e| {
            GovernanceError::Transient {
                target: identity.to_string(),
                source: e.into(),
            }
        })? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(&prefix) || name.ends_with(".tmp") {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((path, modified));
        }

        entries.sort_by_key(|(_, modified)| std::cmp::Reverse(*modified));
        Ok(entries)
    }

    async fn load(path: &Path) -> Option<SpecDocument> {
        let bytes = fs::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Returns the most recently harvested document for every identity
    /// the store currently holds — used to rehydrate the Aggregator's
    /// cache from disk at startup, without re-harvesting anything.
    /// Identity is read from each document's own fields rather than
    /// parsed back out of its file name, since service/namespace names
    /// may themselves contain underscores.
    pub async fn list_latest(&self) -> Result<Vec<SpecDocument>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) => {
                warn!(error = %e, "spec store listing failed, treating as empty");
                return Ok(Vec::new());
            }
        };

        let mut latest_by_identity: HashMap<Identity, (SpecDocument, chrono::DateTime<chrono::Utc>)> = HashMap::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| GovernanceError::CycleFatal(format!("listing spec store: {e}")))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(".tmp") {
                continue;
            }
            let Some(doc) = Self::load(&path).await else {
                continue;
            };

            let identity = doc.identity();
            match latest_by_identity.get(&identity) {
                Some((_, harvested_at)) if *harvested_at >= doc.harvested_at => {}
                _ => {
                    let harvested_at = doc.harvested_at;
                    latest_by_identity.insert(identity, (doc, harvested_at));
                }
            }
        }

        Ok(latest_by_identity.into_values().map(|(doc, _)| doc).collect())
    }

    /// Returns the most recently harvested document for `identity`, or
    /// `None` if the store has never seen it. Read errors fall back to
    /// "no prior document" rather than propagating.
    pub async fn latest(&self, identity: &Identity) -> Result<Option<SpecDocument>> {
        let entries = self.scan(identity).await?;
        match entries.first() {
            Some((path, _)) => Ok(Self::load(path).await),
            None => Ok(None),
        }
    }

    /// Returns the second-most-recently harvested document for
    /// `identity`.
    pub async fn previous(&self, identity: &Identity) -> Result<Option<SpecDocument>> {
        let entries = self.scan(identity).await?;
        match entries.get(1) {
            Some((path, _)) => Ok(Self::load(path).await),
            None => Ok(None),
        }
    }

    /// Retains the latest two documents for `identity`, removing older
    /// ones. Idempotent: pruning an already-pruned identity is a no-op.
    pub async fn prune(&self, identity: &Identity) -> Result<()> {
        let entries = self.scan(identity).await?;
        for (path, _) in entries.into_iter().skip(2) {
            if let Err(e) = fs::remove_file(&path).await {
                warn!(?path, error = %e, "prune: failed to remove old spec");
            }
        }
        Ok(())
    }

    /// Classifies a freshly harvested document against the store's
    /// current latest for the same identity, without writing anything.
    pub async fn classify_change(&self, doc: &SpecDocument) -> Result<ChangeOutcome> {
        let identity = doc.identity();
        match self.latest(&identity).await? {
            None => Ok(ChangeOutcome::New),
            Some(prior) if prior.content_hash == doc.content_hash => Ok(ChangeOutcome::Unchanged),
            Some(_) => Ok(ChangeOutcome::Updated),
        }
    }
}

/// Computes the field-level diff between two documents. A pure function:
/// given the same pair of documents it always returns the same diff.
pub fn diff_documents(old: &SpecDocument, new: &SpecDocument) -> Diff {
    let old_fields = extract_fields(&old.content, &old.service, &old.namespace);
    let new_fields = extract_fields(&new.content, &new.service, &new.namespace);

    let mut diff = Diff::default();

    for nf in &new_fields {
        match old_fields.iter().find(|of| of.location == nf.location) {
            None => diff.added.push(nf.clone()),
            Some(of) if of.r#type != nf.r#type || of.required != nf.required => {
                diff.modified.push((of.clone(), nf.clone()));
            }
            Some(_) => {}
        }
    }
    for of in &old_fields {
        if !new_fields.iter().any(|nf| nf.location == of.location) {
            diff.removed.push(of.clone());
        }
    }

    diff
}

/// Computes `content_hash` for a document's content. Re-exported here so
/// callers that only depend on `store` don't need to reach into
/// `canonical` directly.
pub fn hash_content(content: &serde_json::Value) -> String {
    content_hash(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn doc(service: &str, namespace: &str, hash: &str) -> SpecDocument {
        SpecDocument {
            service: service.to_string(),
            namespace: namespace.to_string(),
            source_url: "http://example".to_string(),
            content: json!({"info": {"version": "1.0"}}),
            version: Some("1.0".to_string()),
            harvested_at: Utc::now(),
            is_valid: true,
            validation_errors: Vec::new(),
            content_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn put_then_latest_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SpecStore::new(tmp.path()).await.unwrap();
        let d = doc("orders", "default", "abc");

        store.put(&d).await.unwrap();
        let latest = store.latest(&d.identity()).await.unwrap().unwrap();
        assert_eq!(latest.content_hash, "abc");
    }

    #[tokio::test]
    async fn prune_retains_only_latest_two() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SpecStore::new(tmp.path()).await.unwrap();

        for i in 0..5 {
            let mut d = doc("orders", "default", &format!("h{i}"));
            d.harvested_at = Utc::now() + chrono::Duration::seconds(i);
            store.put(&d).await.unwrap();
        }

        let identity = Identity::new("orders", "default");
        store.prune(&identity).await.unwrap();
        let remaining = store.scan(&identity).await.unwrap();
        assert_eq!(remaining.len(), 2);

        // Idempotent.
        store.prune(&identity).await.unwrap();
        let remaining = store.scan(&identity).await.unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn classify_change_detects_new_unchanged_updated() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SpecStore::new(tmp.path()).await.unwrap();

        let mut d1 = doc("orders", "default", "abc");
        assert_eq!(store.classify_change(&d1).await.unwrap(), ChangeOutcome::New);
        store.put(&d1).await.unwrap();

        d1.harvested_at = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(
            store.classify_change(&d1).await.unwrap(),
            ChangeOutcome::Unchanged
        );

        let mut d2 = d1.clone();
        d2.content_hash = "def".to_string();
        d2.harvested_at = Utc::now() + chrono::Duration::seconds(2);
        assert_eq!(
            store.classify_change(&d2).await.unwrap(),
            ChangeOutcome::Updated
        );
    }

    #[test]
    fn diff_detects_added_removed_modified() {
        let old = doc("orders", "default", "abc");
        let mut old = old;
        old.content = json!({
            "components": {"schemas": {"Order": {"properties": {
                "sku": {"type": "string"},
                "qty": {"type": "integer"}
            }}}}
        });

        let mut new = doc("orders", "default", "def");
        new.content = json!({
            "components": {"schemas": {"Order": {"properties": {
                "sku": {"type": "string"},
                "qty": {"type": "string"},
                "notes": {"type": "string"}
            }}}}
        });

        let diff = diff_documents(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].name, "notes");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].1.name, "qty");
        assert!(diff.removed.is_empty());
    }
}
