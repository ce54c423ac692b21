use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Certificate bound to a host, identified by the name of the resource holding it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub name: String,
    /// `NotAfter` of the certificate, `None` until parsed at least once
    #[serde(rename = "expires", skip_serializing_if = "Option::is_none", default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Certificate {
    #[must_use]
    pub fn new(name: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            expires_at,
        }
    }
}

/// A single hostname declared by a route
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    /// Empty when the route declares no hostnames at all
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub certificate: Option<Certificate>,
}

impl HostBinding {
    #[must_use]
    pub fn new(host: impl Into<String>, certificate: Option<Certificate>) -> Self {
        Self {
            host: host.into(),
            certificate,
        }
    }

    /// Placeholder binding for routes without any hostname
    #[must_use]
    pub fn unnamed() -> Self {
        Self::new("", None)
    }
}

/// Everything known about one route, keyed by namespace and name
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub namespace: String,
    pub name: String,
    pub hosts: Vec<HostBinding>,
}

impl RouteEntry {
    /// Build an entry, substituting a single unnamed host when `hosts` is empty
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        mut hosts: Vec<HostBinding>,
    ) -> Self {
        if hosts.is_empty() {
            hosts.push(HostBinding::unnamed());
        }

        Self {
            namespace: namespace.into(),
            name: name.into(),
            hosts,
        }
    }
}

/// Payload posted to the collector
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub cluster: String,
    #[serde(rename = "ingresses")]
    pub entries: Vec<RouteEntry>,
}
