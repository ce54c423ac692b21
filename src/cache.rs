use crate::model::RouteEntry;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BindingKey {
    namespace: String,
    name: String,
}

impl BindingKey {
    fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Route bindings observed in one cluster
///
/// Every write takes the lock exclusively and replaces whole entries, the one
/// exception being [`BindingStore::update_certificate_expiry`]. Reads hand out
/// copies, never references into the map.
#[derive(Debug)]
pub struct BindingStore {
    cluster_name: String,
    data: Arc<RwLock<HashMap<BindingKey, RouteEntry>>>,
}

impl BindingStore {
    /// Create an empty store for the given cluster label
    #[must_use]
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Insert or replace the entry stored under the same namespace and name
    pub async fn upsert(&self, entry: RouteEntry) {
        let key = BindingKey::new(&entry.namespace, &entry.name);
        let mut cache = self.data.write().await;
        cache.insert(key, entry);
    }

    /// Remove an entry, no-op when absent
    pub async fn delete(&self, namespace: &str, name: &str) {
        let mut cache = self.data.write().await;
        cache.remove(&BindingKey::new(namespace, name));
    }

    /// Point-in-time copy of every entry, in no particular order
    pub async fn snapshot(&self) -> Vec<RouteEntry> {
        let cache = self.data.read().await;
        cache.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Set the expiry of every certificate named `certificate` in `namespace`
    ///
    /// `None` clears a previously known expiry. Returns how many host bindings
    /// were touched.
    pub async fn update_certificate_expiry(
        &self,
        namespace: &str,
        certificate: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> usize {
        let mut cache = self.data.write().await;
        let mut updated = 0;

        for entry in cache.values_mut().filter(|e| e.namespace == namespace) {
            for cert in entry
                .hosts
                .iter_mut()
                .filter_map(|host| host.certificate.as_mut())
                .filter(|cert| cert.name == certificate)
            {
                cert.expires_at = expires_at;
                updated += 1;
            }
        }

        updated
    }

    /// First known expiry of `certificate` among entries in `namespace`
    pub async fn certificate_expiry(
        &self,
        namespace: &str,
        certificate: &str,
    ) -> Option<DateTime<Utc>> {
        let cache = self.data.read().await;
        cache
            .values()
            .filter(|e| e.namespace == namespace)
            .flat_map(|e| e.hosts.iter())
            .filter_map(|host| host.certificate.as_ref())
            .filter(|cert| cert.name == certificate)
            .find_map(|cert| cert.expires_at)
    }
}
