//! Shared utilities for integration testing.

use std::future::Future;
use std::time::Duration;

/// Install a subscriber so `RUST_LOG` works in tests. Safe to call from
/// every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Poll `condition` until it holds, panicking after `deadline`.
#[allow(dead_code)]
pub async fn wait_for<F, Fut>(condition: F, deadline: Duration)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let result = tokio::time::timeout(deadline, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    result.expect("condition not reached before deadline");
}
