#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::unused_addr;
use std::{
    process::{Command, Stdio},
    time::{Duration, Instant},
};

/// Stdin stays open and silent, SIGINT must still stop the process
#[tokio::test]
async fn test_sigint_exits_with_idle_stdin_feed() {
    let metrics = unused_addr();
    let collector = unused_addr();

    let mut child = Command::new(env!("CARGO_BIN_EXE_cert-observer"))
        .args([
            "--report-endpoint",
            &format!("http://{collector}/report"),
            "--listen",
            &metrics.ip().to_string(),
            "--port",
            &metrics.port().to_string(),
            "--events",
            "-",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // keep the write end open for the whole test
    let _stdin = child.stdin.take().unwrap();

    let health = format!("http://{metrics}/health");
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if reqwest::get(&health).await.is_ok_and(|r| r.status().is_success()) {
            break;
        }
        assert!(Instant::now() < deadline, "observer did not start");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    let exit = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit;
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            panic!("observer still running 5s after SIGINT");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    // handled shutdown, not killed by the default signal action
    assert!(exit.success(), "unexpected exit: {exit:?}");
}
