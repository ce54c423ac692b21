//! Change events consumed by the reconciler
//!
//! Events arrive over an mpsc channel and are applied strictly one at a time,
//! so two events for the same route or certificate are never reordered. The
//! JSON-lines feed lets a watcher (or a file) drive the reconciler.

use crate::{metrics::RECONCILIATIONS_TOTAL, reconcile::Reconciler};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Resource type of certificate resources the observer cares about
pub const TLS_RESOURCE_TYPE: &str = "kubernetes.io/tls";

/// Hostnames served by one routing rule
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRule {
    #[serde(default)]
    pub host: String,
}

/// Association between a certificate resource and the hosts it covers
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsBinding {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub secret_name: String,
}

/// Declared routing and TLS configuration of a route
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSpec {
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    #[serde(default)]
    pub tls: Vec<TlsBinding>,
}

/// Named bag of certificate material
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateResource {
    #[serde(rename = "type", default = "default_resource_type")]
    pub kind: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn default_resource_type() -> String {
    TLS_RESOURCE_TYPE.to_string()
}

impl Default for CertificateResource {
    fn default() -> Self {
        Self {
            kind: default_resource_type(),
            data: BTreeMap::new(),
        }
    }
}

impl CertificateResource {
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.kind == TLS_RESOURCE_TYPE
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum ChangeEvent {
    RouteChanged {
        namespace: String,
        name: String,
        spec: RouteSpec,
    },
    RouteDeleted {
        namespace: String,
        name: String,
    },
    CertChanged {
        namespace: String,
        name: String,
        resource: CertificateResource,
    },
    CertDeleted {
        namespace: String,
        name: String,
    },
}

impl ChangeEvent {
    /// Label used for logging and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RouteChanged { .. } => "route_changed",
            Self::RouteDeleted { .. } => "route_deleted",
            Self::CertChanged { .. } => "cert_changed",
            Self::CertDeleted { .. } => "cert_deleted",
        }
    }
}

/// Apply events until the channel closes or `cancel` fires
pub async fn dispatch(
    mut rx: mpsc::Receiver<ChangeEvent>,
    reconciler: Reconciler,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                info!("stopping event dispatcher");
                return;
            }
            event = rx.recv() => event,
        };

        let Some(event) = event else {
            debug!("event channel closed");
            return;
        };

        RECONCILIATIONS_TOTAL
            .with_label_values(&[event.kind()])
            .inc();
        reconciler.apply(event).await;
    }
}

/// Forward JSON-lines change events from `reader` into `tx`
///
/// Lines that fail to parse are logged and skipped. Returns the number of
/// events forwarded.
///
/// # Errors
///
/// Returns an error if reading from `reader` fails
pub async fn feed_json_lines<R>(
    reader: R,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;
    let mut line_number = 0;

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line.context("failed to read change events")?,
        };

        let Some(line) = line else {
            break;
        };
        line_number += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ChangeEvent>(line) {
            Ok(event) => {
                if tx.send(event).await.is_err() {
                    debug!("event channel closed, stopping feed");
                    break;
                }
                forwarded += 1;
            }
            Err(e) => warn!(line = line_number, error = %e, "skipping malformed change event"),
        }
    }

    Ok(forwarded)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_changed_from_json() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "kind": "RouteChanged",
            "namespace": "default",
            "name": "webapp",
            "spec": {
                "rules": [{"host": "webapp.local"}],
                "tls": [{"hosts": ["webapp.local"], "secretName": "webapp-tls"}]
            }
        }))
        .unwrap();

        assert_eq!(
            event,
            ChangeEvent::RouteChanged {
                namespace: "default".to_string(),
                name: "webapp".to_string(),
                spec: RouteSpec {
                    rules: vec![RouteRule {
                        host: "webapp.local".to_string()
                    }],
                    tls: vec![TlsBinding {
                        hosts: vec!["webapp.local".to_string()],
                        secret_name: "webapp-tls".to_string(),
                    }],
                },
            }
        );
        assert_eq!(event.kind(), "route_changed");
    }

    #[test]
    fn test_cert_changed_defaults_to_tls() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "kind": "CertChanged",
            "namespace": "default",
            "name": "webapp-tls",
            "resource": {"data": {"tls.crt": "pem"}}
        }))
        .unwrap();

        let ChangeEvent::CertChanged { resource, .. } = event else {
            panic!("expected CertChanged");
        };
        assert!(resource.is_tls());
        assert_eq!(resource.data.get("tls.crt").map(String::as_str), Some("pem"));
    }

    #[test]
    fn test_opaque_resource_is_not_tls() {
        let resource: CertificateResource =
            serde_json::from_value(json!({"type": "Opaque", "data": {}})).unwrap();
        assert!(!resource.is_tls());
    }

    #[test]
    fn test_deletion_without_payload() {
        let event: ChangeEvent = serde_json::from_str(
            r#"{"kind":"RouteDeleted","namespace":"default","name":"webapp"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "route_deleted");
    }

    #[tokio::test]
    async fn test_feed_json_lines_skips_garbage() {
        let input = concat!(
            r#"{"kind":"RouteDeleted","namespace":"default","name":"a"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"kind":"CertDeleted","namespace":"default","name":"a-tls"}"#,
            "\n",
        );
        let (tx, mut rx) = mpsc::channel(8);

        let forwarded = feed_json_lines(input.as_bytes(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(forwarded, 2);

        assert_eq!(rx.recv().await.unwrap().kind(), "route_deleted");
        assert_eq!(rx.recv().await.unwrap().kind(), "cert_deleted");
        assert!(rx.recv().await.is_none());
    }
}
