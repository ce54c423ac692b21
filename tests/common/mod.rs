#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
    routing::post,
};
use cert_observer::{
    events::{CertificateResource, RouteRule, RouteSpec, TlsBinding},
    model::Report,
};
use chrono::{DateTime, TimeZone, Utc};
use std::{
    collections::{BTreeMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{
    net::TcpListener,
    time::{Duration, Instant, sleep},
};
use tokio_util::sync::CancellationToken;

pub const WEBAPP_PEM: &str = include_str!("../fixtures/webapp-tls.crt");
pub const API_PEM: &str = include_str!("../fixtures/api-tls.crt");

pub fn webapp_expiry() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 20, 10, 30, 0).unwrap()
}

pub fn api_expiry() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 3, 15, 8, 0, 0).unwrap()
}

pub fn tls_resource(pem: &str) -> CertificateResource {
    CertificateResource {
        data: BTreeMap::from([("tls.crt".to_string(), pem.to_string())]),
        ..CertificateResource::default()
    }
}

/// Route spec with one rule per host and the given `(hosts, secret)` TLS bindings
pub fn route_spec(hosts: &[&str], tls: &[(&[&str], &str)]) -> RouteSpec {
    RouteSpec {
        rules: hosts
            .iter()
            .map(|host| RouteRule {
                host: (*host).to_string(),
            })
            .collect(),
        tls: tls
            .iter()
            .map(|(hosts, secret)| TlsBinding {
                hosts: hosts.iter().map(|h| (*h).to_string()).collect(),
                secret_name: (*secret).to_string(),
            })
            .collect(),
    }
}

/// A port nothing listens on (bound then released)
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[derive(Debug, Clone)]
pub struct Received {
    pub content_type: Option<String>,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct CollectorState {
    received: Mutex<Vec<Received>>,
    statuses: Mutex<VecDeque<StatusCode>>,
}

/// In-process report collector answering with scripted status codes, then 200
pub struct Collector {
    pub addr: SocketAddr,
    state: Arc<CollectorState>,
    cancel: CancellationToken,
}

impl Collector {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap(), Vec::new()).await
    }

    pub async fn with_statuses(statuses: Vec<StatusCode>) -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap(), statuses).await
    }

    pub async fn start_on(addr: SocketAddr, statuses: Vec<StatusCode>) -> Self {
        let state = Arc::new(CollectorState {
            received: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
        });

        let app = Router::new()
            .route("/report", post(collect))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            cancel,
        }
    }

    pub fn endpoint(&self) -> reqwest::Url {
        endpoint_for(self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.received.lock().unwrap().len()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.received()
            .into_iter()
            .map(|r| serde_json::from_value(r.body).unwrap())
            .collect()
    }

    /// Wait until a received report satisfies `predicate`
    pub async fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<Report>
    where
        F: Fn(&Report) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(report) = self.reports().into_iter().find(|r| predicate(r)) {
                return Some(report);
            }
            sleep(Duration::from_millis(20)).await;
        }
        None
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn endpoint_for(addr: SocketAddr) -> reqwest::Url {
    format!("http://{addr}/report").parse().unwrap()
}

async fn collect(
    State(state): State<Arc<CollectorState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let received = Received {
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    };
    state.received.lock().unwrap().push(received);

    state
        .statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK)
}
