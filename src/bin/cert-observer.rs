use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(cert_observer::cli::start());

    // a pending stdin read on the blocking pool cannot be cancelled
    runtime.shutdown_timeout(Duration::from_secs(1));

    result
}
