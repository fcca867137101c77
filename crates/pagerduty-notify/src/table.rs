//! Tracking of open incidents per pipeline/stage.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::{Mutex, MutexGuard};

/// Open incident identifiers keyed by `pipeline-stage`.
///
/// A key is present exactly while an incident is believed open for it.
/// Callers that check and then update must hold the guard from
/// [`IncidentTable::lock`] across both steps.
#[derive(Debug, Default)]
pub struct IncidentTable {
    inner: Mutex<HashMap<String, String>>,
}

impl IncidentTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a check-then-act sequence.
    pub async fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().await
    }

    /// Incident id tracked for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().await.get(key).cloned()
    }

    /// Sorted copy of every tracked incident.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Forget every tracked incident, returning how many were dropped.
    /// The incidents stay open upstream.
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let dropped = inner.len();
        inner.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_table_operations() {
        let table = IncidentTable::new();
        assert!(table.is_empty().await);

        table.lock().await.insert("deploy-test".to_string(), "id-1".to_string());
        table.lock().await.insert("build-unit".to_string(), "id-2".to_string());

        assert_eq!(table.len().await, 2);
        assert_eq!(table.get("deploy-test").await.as_deref(), Some("id-1"));
        assert!(table.get("deploy-unit").await.is_none());

        let keys: Vec<_> = table.snapshot().await.into_keys().collect();
        assert_eq!(keys, vec!["build-unit", "deploy-test"]);

        assert_eq!(table.clear().await, 2);
        assert!(table.is_empty().await);
    }
}
