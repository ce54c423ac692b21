//! Observes ingress-style route bindings and the expiry of the TLS
//! certificates they reference, and reports them to a collector over HTTP.

pub mod cache;
pub mod cert;
pub mod cli;
pub mod config;
pub mod events;
pub mod metrics;
pub mod model;
pub mod observer;
pub mod reconcile;
pub mod reporter;
pub mod server;
pub mod source;
