use crate::events::CertificateResource;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("certificate resource {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },
    #[error("certificate lookup unavailable: {0}")]
    Unavailable(String),
}

/// Where the reconciler fetches certificate resources from
#[async_trait]
pub trait CertificateSource: Send + Sync {
    /// Fetch the certificate resource `name` in `namespace`
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] when the resource does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<CertificateResource, LookupError>;
}

/// Certificate resources seen through change events, kept in memory
#[derive(Debug, Default, Clone)]
pub struct CertificateIndex {
    data: Arc<RwLock<HashMap<(String, String), CertificateResource>>>,
}

impl CertificateIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, namespace: &str, name: &str, resource: CertificateResource) {
        let mut index = self.data.write().await;
        index.insert((namespace.to_string(), name.to_string()), resource);
    }

    pub async fn remove(&self, namespace: &str, name: &str) {
        let mut index = self.data.write().await;
        index.remove(&(namespace.to_string(), name.to_string()));
    }
}

#[async_trait]
impl CertificateSource for CertificateIndex {
    async fn get(&self, namespace: &str, name: &str) -> Result<CertificateResource, LookupError> {
        let index = self.data.read().await;
        index
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
