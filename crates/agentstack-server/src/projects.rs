//! In-memory registry of known projects' hashed API keys.
//!
//! Project/key lifecycle (creation, rotation, deletion) is the out-of-scope
//! dashboard CRUD surface (§1); this registry only holds the minimal state
//! the gateway's auth step needs to scan on a cache miss — grounded on
//! `agentstack_security::auth::AuthCache::verify`'s `known: &[ApiKeyRecord]`
//! parameter, which this registry supplies.

use agentstack_security::auth::ApiKeyRecord;
use parking_lot::RwLock;

/// Holds every registered project's stored API-key hash.
pub struct ProjectRegistry {
    records: RwLock<Vec<ApiKeyRecord>>,
}

impl ProjectRegistry {
    /// An empty registry. No key will authenticate until [`Self::register`]
    /// is called.
    #[must_use]
    pub fn new() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }

    /// Register a project's hashed API key, replacing any existing record
    /// for the same `project_id`.
    pub fn register(&self, record: ApiKeyRecord) {
        let mut records = self.records.write();
        records.retain(|r| r.project_id != record.project_id);
        records.push(record);
    }

    /// Remove every record for `project_id`.
    pub fn remove(&self, project_id: &str) {
        self.records.write().retain(|r| r.project_id != project_id);
    }

    /// Snapshot of every known record, for [`agentstack_security::auth::AuthCache::verify`].
    #[must_use]
    pub fn snapshot(&self) -> Vec<ApiKeyRecord> {
        self.records.read().clone()
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_remove() {
        let registry = ProjectRegistry::new();
        registry.register(ApiKeyRecord { project_id: "p1".into(), api_key_hash: "h1".into() });
        assert_eq!(registry.snapshot().len(), 1);
        registry.remove("p1");
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn re_registering_replaces_not_duplicates() {
        let registry = ProjectRegistry::new();
        registry.register(ApiKeyRecord { project_id: "p1".into(), api_key_hash: "h1".into() });
        registry.register(ApiKeyRecord { project_id: "p1".into(), api_key_hash: "h2".into() });
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].api_key_hash, "h2");
    }
}
