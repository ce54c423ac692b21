use crate::config::{
    DEFAULT_CLUSTER_NAME, DEFAULT_REPORT_ENDPOINT, DEFAULT_REPORT_INTERVAL, DEFAULT_REPORT_TIMEOUT,
};
use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

/// Pure clap command definitions with zero business logic
#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new(env!("CARGO_PKG_NAME"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("cluster-name")
                .default_value(DEFAULT_CLUSTER_NAME)
                .env("CLUSTER_NAME")
                .help("cluster label attached to every report")
                .long("cluster-name")
                .short('c'),
        )
        .arg(
            Arg::new("report-endpoint")
                .default_value(DEFAULT_REPORT_ENDPOINT)
                .env("REPORT_ENDPOINT")
                .help("collector URL reports are POSTed to")
                .long("report-endpoint")
                .short('e')
                .value_name("URL"),
        )
        .arg(
            Arg::new("report-interval")
                .default_value(DEFAULT_REPORT_INTERVAL)
                .env("REPORT_INTERVAL")
                .help("time between reports, e.g. 30s, 1m, 1m30s")
                .long("report-interval")
                .short('i')
                .value_name("DURATION"),
        )
        .arg(
            Arg::new("report-timeout")
                .default_value(DEFAULT_REPORT_TIMEOUT)
                .env("REPORT_TIMEOUT")
                .help("timeout for a single report request")
                .long("report-timeout")
                .short('t')
                .value_name("DURATION"),
        )
        .arg(
            Arg::new("expiry-strategy")
                .default_value("fetch")
                .env("EXPIRY_STRATEGY")
                .help("how route reconciliation obtains certificate expiry")
                .long("expiry-strategy")
                .long_help(
                    "How route reconciliation obtains certificate expiry:\n\n\
                    - fetch: always fetch and parse the certificate resource (default)\n\
                    - preserve: reuse an expiry already known to the store, fetch only when none is known",
                )
                .value_name("STRATEGY")
                .value_parser(["fetch", "preserve"]),
        )
        .arg(
            Arg::new("events")
                .env("EVENTS_FILE")
                .help("JSON-lines change event feed, '-' reads stdin")
                .long("events")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("listen")
                .env("METRICS_LISTEN")
                .help("IP address to bind to (default: [::]:port, accepts both IPv6 and IPv4)")
                .long("listen")
                .long_help(
                    "IP address to bind to:\n\
                    Not specified (default) binds to [::]:port which accepts both IPv6 and IPv4 connections.\n\
                    Falls back to 0.0.0.0:port if IPv6 is unavailable.\n\n\
                    Specific IPv4 examples: '0.0.0.0', '127.0.0.1'\n\
                    Specific IPv6: '::', '::1'",
                )
                .short('l')
                .value_name("IP"),
        )
        .arg(
            Arg::new("port")
                .default_value("9300")
                .env("METRICS_PORT")
                .help("listening port for /metrics and /health")
                .long("port")
                .short('p')
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("verbose")
                .help("increase log verbosity, -v debug, -vv trace")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_new() {
        let cmd = new();
        assert_eq!(cmd.get_name(), "cert-observer");
        assert_eq!(
            cmd.get_about().unwrap().to_string(),
            env!("CARGO_PKG_DESCRIPTION")
        );
        assert_eq!(
            cmd.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_new_args_overrides() {
        let cmd = new();
        let m = cmd
            .try_get_matches_from(vec![
                "cert-observer",
                "--cluster-name",
                "prod",
                "--report-endpoint",
                "https://collector/report",
                "--report-interval",
                "1m",
                "--expiry-strategy",
                "preserve",
                "--events",
                "-",
                "-vv",
            ])
            .unwrap();

        assert_eq!(m.get_one("cluster-name"), Some(&String::from("prod")));
        assert_eq!(
            m.get_one("report-endpoint"),
            Some(&String::from("https://collector/report"))
        );
        assert_eq!(m.get_one("report-interval"), Some(&String::from("1m")));
        assert_eq!(m.get_one("expiry-strategy"), Some(&String::from("preserve")));
        assert_eq!(m.get_one("events"), Some(&String::from("-")));
        assert_eq!(m.get_count("verbose"), 2);
    }

    #[test]
    fn test_new_rejects_unknown_strategy() {
        let cmd = new();
        let matches =
            cmd.try_get_matches_from(vec!["cert-observer", "--expiry-strategy", "guess"]);
        assert!(matches.is_err());
    }

    #[test]
    fn test_new_port_must_be_numeric() {
        let cmd = new();
        let matches = cmd.try_get_matches_from(vec!["cert-observer", "--port", "http"]);
        assert!(matches.is_err());
    }
}
