use crate::{
    cache::BindingStore,
    config::{Config, EventInput},
    events::{ChangeEvent, dispatch, feed_json_lines},
    reconcile::Reconciler,
    reporter::Reporter,
    server,
    source::CertificateIndex,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::{
    fs::File,
    io::{self, BufReader},
    sync::mpsc,
    task,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const EVENT_QUEUE: usize = 1024;

/// Start the observer and run until Ctrl-C
///
/// # Errors
///
/// Returns an error if the metrics listener cannot be bound, the event
/// feed cannot be opened, or a background task dies unexpectedly
pub async fn start(config: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    let signal = cancel.clone();
    task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        signal.cancel();
    });

    run(config, cancel).await
}

/// Wire store, reconciler, reporter and metrics server, stop on `cancel`
///
/// # Errors
///
/// Same as [`start`]
pub async fn run(config: Config, cancel: CancellationToken) -> Result<()> {
    let store = Arc::new(BindingStore::new(config.cluster_name.clone()));
    let index = CertificateIndex::new();
    let reconciler = Reconciler::new(
        Arc::clone(&store),
        Arc::new(index.clone()),
        config.expiry_strategy,
    )
    .with_index(index);

    info!(
        cluster = %config.cluster_name,
        strategy = %config.expiry_strategy,
        "starting cert observer"
    );

    let (listener, bind_addr) = server::bind(&config.metrics)
        .await
        .context("failed to bind metrics listener")?;
    info!("listening on {bind_addr}");

    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let dispatcher = task::spawn(dispatch(rx, reconciler, cancel.clone()));

    if let Some(input) = config.events.clone() {
        spawn_feed(input, tx, cancel.clone()).await?;
    } else {
        drop(tx);
    }

    let reporter = Reporter::new(
        Arc::clone(&store),
        config.report_endpoint.clone(),
        config.report_interval,
        config.report_timeout,
    )
    .context("failed to build HTTP client")?;
    let reporter_handle = task::spawn(reporter.run(cancel.clone()));

    let server = server::serve(listener, Arc::clone(&store), cancel.clone());

    let result = tokio::select! {
        result = server => result,
        result = reporter_handle => match result {
            Ok(()) if cancel.is_cancelled() => Ok(()),
            Ok(()) => Err(anyhow::anyhow!("reporter stopped")),
            Err(e) => Err(anyhow::anyhow!("reporter task failed: {e}")),
        },
    };

    cancel.cancel();
    if let Err(e) = dispatcher.await {
        error!("event dispatcher failed: {e}");
    }

    info!("cert observer stopped");
    result
}

async fn spawn_feed(
    input: EventInput,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    match input {
        EventInput::Stdin => {
            info!("reading change events from stdin");
            task::spawn(log_feed(feed_json_lines(
                BufReader::new(io::stdin()),
                tx,
                cancel,
            )));
        }
        EventInput::File(path) => {
            let file = File::open(&path)
                .await
                .with_context(|| format!("failed to open events file {}", path.display()))?;
            info!(path = %path.display(), "reading change events");
            task::spawn(log_feed(feed_json_lines(BufReader::new(file), tx, cancel)));
        }
    }
    Ok(())
}

async fn log_feed(feed: impl Future<Output = Result<usize>>) {
    match feed.await {
        Ok(forwarded) => info!(forwarded, "change event feed finished"),
        Err(e) => error!("change event feed failed: {e:#}"),
    }
}
