use crate::{
    cli::actions::Action,
    config::{
        Config, EventInput, MetricsConfig, parse_cluster_name, parse_duration, parse_endpoint,
    },
    reconcile::ExpiryStrategy,
};
use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use std::net::IpAddr;

/// Convert `ArgMatches` into typed Action enum with validation
///
/// # Errors
///
/// Returns an error if any option fails validation
pub fn dispatch(matches: &ArgMatches) -> Result<Action> {
    let cluster_name = matches
        .get_one::<String>("cluster-name")
        .context("cluster name is required")?;
    let cluster_name = parse_cluster_name(cluster_name)?;

    let endpoint = matches
        .get_one::<String>("report-endpoint")
        .context("report endpoint is required")?;
    let report_endpoint = parse_endpoint(endpoint)?;

    let interval = matches
        .get_one::<String>("report-interval")
        .context("report interval is required")?;
    let report_interval = parse_duration("report interval", interval)?;

    let timeout = matches
        .get_one::<String>("report-timeout")
        .context("report timeout is required")?;
    let report_timeout = parse_duration("report timeout", timeout)?;

    let expiry_strategy = matches
        .get_one::<String>("expiry-strategy")
        .map(|s| s.parse::<ExpiryStrategy>().map_err(|e| anyhow!(e)))
        .transpose()?
        .unwrap_or_default();

    let listen = matches
        .get_one::<String>("listen")
        .map(|addr| {
            addr.parse::<IpAddr>()
                .with_context(|| format!("Invalid IP address: {addr}"))
        })
        .transpose()?;

    let port = matches.get_one::<u16>("port").copied().unwrap_or(9300);

    let events = matches
        .get_one::<String>("events")
        .map(|arg| EventInput::from_arg(arg));

    Ok(Action::Observe {
        config: Config {
            cluster_name,
            report_endpoint,
            report_interval,
            report_timeout,
            expiry_strategy,
            metrics: MetricsConfig { listen, port },
            events,
        },
    })
}

/// Number of `-v` flags
#[must_use]
pub fn verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose")
}
