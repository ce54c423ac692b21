use prometheus::{
    Encoder, IntCounterVec, IntGauge, Registry, opts, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry,
};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

trait ResultExt<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                eprintln!("failed to initialize metric ({context}): {err}");
                std::process::exit(1);
            }
        }
    }
}

pub static INGRESSES_TOTAL: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "cert_observer_ingresses_total",
        "Total number of observed ingresses",
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static REPORTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "cert_observer_reports_total",
            "Report cycles by outcome (success, error)"
        ),
        &["status"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static REPORT_CONSECUTIVE_FAILURES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "cert_observer_report_consecutive_failures",
        "Report cycles failed in a row since the last success",
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static LAST_REPORT_SUCCESS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "cert_observer_last_report_success_timestamp_seconds",
        "Unix timestamp of the last delivered report",
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "cert_observer_reconciliations_total",
            "Change events applied by kind"
        ),
        &["kind"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

pub static CERT_PARSE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        opts!(
            "cert_observer_cert_parse_errors_total",
            "Certificate expiry extraction failures by type (missing_data, decode, parse)"
        ),
        &["error_type"],
        &REGISTRY
    )
    .or_exit("metric can be created")
});

/// Encode and return metrics for HTTP export
///
/// # Errors
///
/// Returns an error if metrics encoding fails
pub fn encode_metrics() -> Result<Vec<u8>, String> {
    let mut buffer = Vec::new();
    let encoder = prometheus::TextEncoder::new();

    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| format!("could not encode custom metrics: {e}"))?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_gauge_operations() {
        INGRESSES_TOTAL.set(3);
        assert_eq!(INGRESSES_TOTAL.get(), 3);
        REPORT_CONSECUTIVE_FAILURES.set(0);
        assert_eq!(REPORT_CONSECUTIVE_FAILURES.get(), 0);
    }

    #[test]
    fn test_metrics_labels() {
        // counters are process-wide, compare against the value before
        let success = REPORTS_TOTAL.with_label_values(&["success"]);
        let error = REPORTS_TOTAL.with_label_values(&["error"]);
        let (success_before, error_before) = (success.get(), error.get());
        success.inc();
        error.inc_by(2);
        assert!(success.get() > success_before);
        assert!(error.get() >= error_before + 2);

        let deleted = RECONCILIATIONS_TOTAL.with_label_values(&["route_deleted"]);
        let before = deleted.get();
        deleted.inc();
        assert!(deleted.get() > before);

        for error_type in ["missing_data", "decode", "parse"] {
            let counter = CERT_PARSE_ERRORS.with_label_values(&[error_type]);
            let before = counter.get();
            counter.inc();
            assert!(counter.get() > before, "{error_type}");
        }

        LAST_REPORT_SUCCESS.set(1_234_567_890);
        assert!(LAST_REPORT_SUCCESS.get() > 0);
    }

    #[test]
    fn test_encode_metrics() {
        let _ = &*INGRESSES_TOTAL;
        REPORTS_TOTAL.with_label_values(&["success"]).inc();

        let buffer = encode_metrics().unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("cert_observer_ingresses_total"));
        assert!(output.contains("cert_observer_reports_total"));
    }

    #[test]
    fn test_registry() {
        let _ = &*INGRESSES_TOTAL;
        let _ = &*REPORT_CONSECUTIVE_FAILURES;
        RECONCILIATIONS_TOTAL.with_label_values(&["test"]).inc();

        let metric_names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|m| m.name().to_string())
            .collect();

        assert!(metric_names.contains(&"cert_observer_ingresses_total".to_string()));
        assert!(metric_names.contains(&"cert_observer_report_consecutive_failures".to_string()));
        assert!(metric_names.contains(&"cert_observer_reconciliations_total".to_string()));
    }
}
