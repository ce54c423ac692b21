use crate::{
    cache::BindingStore,
    cert::resource_expiry,
    events::{CertificateResource, ChangeEvent, RouteSpec},
    metrics::CERT_PARSE_ERRORS,
    model::{Certificate, HostBinding, RouteEntry},
    source::{CertificateIndex, CertificateSource, LookupError},
};
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::Arc,
};
use tracing::{debug, info};

/// How a rebuilt entry obtains certificate expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryStrategy {
    /// Always fetch and parse the certificate resource
    #[default]
    Fetch,
    /// Reuse an expiry already known to the store, fetch only when none is known
    Preserve,
}

impl FromStr for ExpiryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fetch" => Ok(Self::Fetch),
            "preserve" => Ok(Self::Preserve),
            _ => Err(format!("Invalid expiry strategy: {s}")),
        }
    }
}

impl fmt::Display for ExpiryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::Preserve => write!(f, "preserve"),
        }
    }
}

/// Turns change events into [`BindingStore`] writes
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<BindingStore>,
    source: Arc<dyn CertificateSource>,
    index: Option<CertificateIndex>,
    strategy: ExpiryStrategy,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("cluster", &self.store.cluster_name())
            .field("strategy", &self.strategy)
            .field("index", &self.index.is_some())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<BindingStore>,
        source: Arc<dyn CertificateSource>,
        strategy: ExpiryStrategy,
    ) -> Self {
        Self {
            store,
            source,
            index: None,
            strategy,
        }
    }

    /// Keep `index` current with certificate change events
    #[must_use]
    pub fn with_index(mut self, index: CertificateIndex) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub const fn strategy(&self) -> ExpiryStrategy {
        self.strategy
    }

    /// Apply a single change event
    pub async fn apply(&self, event: ChangeEvent) {
        match event {
            ChangeEvent::RouteChanged {
                namespace,
                name,
                spec,
            } => {
                self.reconcile_route(&namespace, &name, &spec).await;
            }
            ChangeEvent::RouteDeleted { namespace, name } => {
                self.delete_route(&namespace, &name).await;
            }
            ChangeEvent::CertChanged {
                namespace,
                name,
                resource,
            } => self.certificate_changed(&namespace, &name, resource).await,
            ChangeEvent::CertDeleted { namespace, name } => {
                self.certificate_deleted(&namespace, &name).await;
            }
        }
    }

    /// Rebuild the entry for a route from its spec and store it
    pub async fn reconcile_route(&self, namespace: &str, name: &str, spec: &RouteSpec) -> RouteEntry {
        debug!(namespace, name, "reconciling route");

        let hosts = declared_hosts(spec);
        let host_certs = certificate_names(spec);

        let mut expiries: HashMap<&str, Option<DateTime<Utc>>> = HashMap::new();
        for cert_name in hosts.iter().filter_map(|host| host_certs.get(*host)) {
            if !expiries.contains_key(cert_name.as_str()) {
                let expiry = self.resolve_expiry(namespace, cert_name).await;
                expiries.insert(cert_name.as_str(), expiry);
            }
        }

        let bindings = hosts
            .iter()
            .map(|host| {
                let certificate = host_certs.get(*host).map(|cert_name| {
                    let expiry = expiries.get(cert_name.as_str()).copied().flatten();
                    Certificate::new(cert_name.as_str(), expiry)
                });
                HostBinding::new(*host, certificate)
            })
            .collect();

        let entry = RouteEntry::new(namespace, name, bindings);
        self.store.upsert(entry.clone()).await;

        debug!(namespace, name, hosts = entry.hosts.len(), "route stored");
        entry
    }

    /// Forget a route
    pub async fn delete_route(&self, namespace: &str, name: &str) {
        info!(namespace, name, "route deleted, removing from cache");
        self.store.delete(namespace, name).await;
    }

    /// Record new certificate material and refresh the expiry of every binding using it
    pub async fn certificate_changed(
        &self,
        namespace: &str,
        name: &str,
        resource: CertificateResource,
    ) {
        if !resource.is_tls() {
            debug!(namespace, name, kind = %resource.kind, "skipping non-TLS resource");
            return;
        }

        let expiry = resource_expiry(&resource);

        if let Some(index) = &self.index {
            index.insert(namespace, name, resource).await;
        }

        match expiry {
            Ok(expires_at) => {
                let updated = self
                    .store
                    .update_certificate_expiry(namespace, name, Some(expires_at))
                    .await;
                info!(
                    namespace,
                    name,
                    expires = %expires_at.format("%Y-%m-%d"),
                    updated,
                    "updated certificate expiry"
                );
            }
            Err(e) => {
                CERT_PARSE_ERRORS.with_label_values(&[e.kind()]).inc();
                debug!(namespace, name, error = %e, "failed to parse certificate, skipping");
            }
        }
    }

    /// Certificate resource is gone, its expiry is unknown again
    pub async fn certificate_deleted(&self, namespace: &str, name: &str) {
        if let Some(index) = &self.index {
            index.remove(namespace, name).await;
        }

        let updated = self
            .store
            .update_certificate_expiry(namespace, name, None)
            .await;
        debug!(namespace, name, updated, "certificate deleted, clearing expiry");
    }

    async fn resolve_expiry(&self, namespace: &str, cert_name: &str) -> Option<DateTime<Utc>> {
        if self.strategy == ExpiryStrategy::Preserve
            && let Some(known) = self.store.certificate_expiry(namespace, cert_name).await
        {
            return Some(known);
        }

        self.fetch_expiry(namespace, cert_name).await
    }

    async fn fetch_expiry(&self, namespace: &str, cert_name: &str) -> Option<DateTime<Utc>> {
        let resource = match self.source.get(namespace, cert_name).await {
            Ok(resource) => resource,
            Err(LookupError::NotFound { .. }) => {
                debug!(namespace, certificate = cert_name, "certificate resource not found");
                return None;
            }
            Err(e) => {
                debug!(namespace, certificate = cert_name, error = %e, "certificate lookup failed");
                return None;
            }
        };

        match resource_expiry(&resource) {
            Ok(expiry) => Some(expiry),
            Err(e) => {
                CERT_PARSE_ERRORS.with_label_values(&[e.kind()]).inc();
                debug!(
                    namespace,
                    certificate = cert_name,
                    error = %e,
                    "failed to extract certificate expiry"
                );
                None
            }
        }
    }
}

/// Hostnames from the routing rules, or from the TLS bindings when the rules name none
fn declared_hosts(spec: &RouteSpec) -> Vec<&str> {
    let mut seen = HashSet::new();
    let mut hosts: Vec<&str> = spec
        .rules
        .iter()
        .map(|rule| rule.host.as_str())
        .filter(|host| !host.is_empty() && seen.insert(*host))
        .collect();

    if hosts.is_empty() {
        hosts = spec
            .tls
            .iter()
            .flat_map(|tls| tls.hosts.iter())
            .map(String::as_str)
            .filter(|host| !host.is_empty() && seen.insert(*host))
            .collect();
    }

    hosts
}

/// Host to certificate resource name; a later binding overrides an earlier one
fn certificate_names(spec: &RouteSpec) -> HashMap<String, String> {
    spec.tls
        .iter()
        .filter(|tls| !tls.secret_name.is_empty())
        .flat_map(|tls| {
            tls.hosts
                .iter()
                .map(move |host| (host.clone(), tls.secret_name.clone()))
        })
        .collect()
}
