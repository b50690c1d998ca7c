//! Remote schema download.
//!
//! [`SchemaFetcher`] abstracts the transport so builds can be tested without
//! network access; [`HttpFetcher`] is the production implementation. A
//! download is bounded by a timeout and can be abandoned early through a
//! [`CancellationToken`], see [`fetch_with_deadline`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{Result, SchemaError};

/// Default upper bound for a schema download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How often a pending download checks for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Downloads a schema document.
pub trait SchemaFetcher: Send + Sync {
    /// Returns the body of `url`, failing with [`SchemaError::Fetch`] on
    /// transport errors and non-success statuses.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Shared flag used to abandon an in-flight download.
///
/// Clones observe the same flag.
///
/// ```
/// # use pkgbuild_schema::CancellationToken;
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Blocking HTTP fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pkgbuild/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SchemaError::Fetch {
                url: String::new(),
                reason: format!("http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl SchemaFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |reason: String| SchemaError::Fetch {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(fetch_error(
                "unsatisfied dependency, the reference defined in the build manifest doesn't exist (HTTP 404)"
                    .to_string(),
            ));
        }
        if !status.is_success() {
            return Err(fetch_error(format!("unexpected HTTP status {status}")));
        }

        let body = resp
            .bytes()
            .map_err(|e| fetch_error(format!("read body: {e}")))?;
        debug!(url, bytes = body.len(), "downloaded schema");
        Ok(body.to_vec())
    }
}

/// Runs `fetcher` on a worker thread and waits for it until `timeout`
/// elapses or `cancel` is triggered.
///
/// On timeout or cancellation the worker is detached; its result is
/// discarded when it eventually finishes.
pub fn fetch_with_deadline(
    fetcher: Arc<dyn SchemaFetcher>,
    url: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    if cancel.is_cancelled() {
        return Err(SchemaError::Cancelled);
    }

    let (tx, rx) = mpsc::channel();
    let worker_url = url.to_string();
    std::thread::Builder::new()
        .name("schema-fetch".into())
        .spawn(move || {
            // The receiver is gone once the caller gave up.
            let _ = tx.send(fetcher.fetch(&worker_url));
        })?;

    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            debug!(url, "schema download cancelled");
            return Err(SchemaError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(SchemaError::Fetch {
                url: url.to_string(),
                reason: format!("timed out after {}s", timeout.as_secs_f32()),
            });
        }
        match rx.recv_timeout(CANCEL_POLL_INTERVAL.min(deadline - now)) {
            Ok(result) => return result,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(SchemaError::Fetch {
                    url: url.to_string(),
                    reason: "download worker terminated".to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowFetcher(Duration);

    impl SchemaFetcher for SlowFetcher {
        fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
            std::thread::sleep(self.0);
            Ok(b"- fields: []".to_vec())
        }
    }

    #[test]
    fn test_fetch_returns_worker_result() {
        let body = fetch_with_deadline(
            Arc::new(SlowFetcher(Duration::ZERO)),
            "http://schemas.test/ecs",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(body, b"- fields: []");
    }

    #[test]
    fn test_fetch_times_out() {
        let err = fetch_with_deadline(
            Arc::new(SlowFetcher(Duration::from_secs(5))),
            "http://schemas.test/ecs",
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Fetch { .. }));
    }

    #[test]
    fn test_cancel_aborts_pending_fetch() {
        let token = CancellationToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });

        let started = Instant::now();
        let err = fetch_with_deadline(
            Arc::new(SlowFetcher(Duration::from_secs(10))),
            "http://schemas.test/ecs",
            Duration::from_secs(30),
            &token,
        )
        .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, SchemaError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_already_cancelled_token_skips_fetch() {
        let token = CancellationToken::new();
        token.cancel();
        let err = fetch_with_deadline(
            Arc::new(SlowFetcher(Duration::ZERO)),
            "http://schemas.test/ecs",
            Duration::from_secs(1),
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Cancelled));
    }
}
