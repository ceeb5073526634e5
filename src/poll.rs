//! Generic status polling honoring server `Retry-After` hints, with a
//! deadline and cooperative cancellation.

use crate::clock::Clock;
use crate::error::{AcmeError, Result};
use jiff::Timestamp;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Poll interval when the server sends no `Retry-After`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// A resource whose status can be polled
pub trait Pollable {
    /// The status enum of this resource
    type Status: Copy + Eq + std::fmt::Debug + Send;

    /// The cached status, if the body has been loaded
    fn current_status(&self) -> Option<Self::Status>;

    /// The clock of the session this resource belongs to
    fn poll_clock(&self) -> Result<Arc<dyn Clock>>;

    /// Fetch the resource, updating the cached body, and return the
    /// server's `Retry-After` hint
    fn refresh(&mut self) -> impl Future<Output = Result<Option<Timestamp>>> + Send;
}

/// Create a linked cancellation pair. Hand the [`CancelSignal`] to a
/// polling call; fire the [`CancelHandle`] to abort it at the next
/// suspension point.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Fires the cancellation of polling calls holding the linked signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel all linked signals
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// The receiving end of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether the handle has fired
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the handle fires. Pends forever if the handle is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Poll a resource until its status reaches one of `terminal`, the
/// deadline passes (`Timeout`), or the cancellation signal fires
/// (`Cancelled`).
///
/// The resource's cached body keeps every update a fetch produced, also
/// when the call ends in cancellation. An empty terminal set fails
/// validation immediately.
pub async fn wait_for_status<R: Pollable>(
    resource: &mut R,
    terminal: &[R::Status],
    timeout: Duration,
    cancel: Option<&CancelSignal>,
) -> Result<R::Status> {
    if terminal.is_empty() {
        return Err(AcmeError::invalid_input("terminal status set is empty"));
    }
    if let Some(status) = resource.current_status()
        && terminal.contains(&status)
    {
        return Ok(status);
    }

    let clock = resource.poll_clock()?;
    let deadline = checked_after(clock.now(), timeout);

    loop {
        if cancel.is_some_and(CancelSignal::is_cancelled) {
            return Err(AcmeError::Cancelled);
        }

        let retry_after = resource.refresh().await?;
        if let Some(status) = resource.current_status()
            && terminal.contains(&status)
        {
            return Ok(status);
        }

        let now = clock.now();
        let next = retry_after.unwrap_or_else(|| checked_after(now, DEFAULT_POLL_INTERVAL));
        if next >= deadline {
            return Err(AcmeError::Timeout);
        }

        let pause = next.duration_since(now);
        let pause = if pause.is_negative() {
            Duration::ZERO
        } else {
            pause.unsigned_abs()
        };
        debug!(status = ?resource.current_status(), ?pause, "waiting before next poll");
        match cancel {
            Some(signal) => {
                tokio::select! {
                    () = tokio::time::sleep(pause) => {}
                    () = signal.cancelled() => return Err(AcmeError::Cancelled),
                }
            }
            None => tokio::time::sleep(pause).await,
        }
    }
}

fn checked_after(now: Timestamp, pause: Duration) -> Timestamp {
    jiff::SignedDuration::try_from(pause)
        .ok()
        .and_then(|pause| now.checked_add(pause).ok())
        .unwrap_or(Timestamp::MAX)
}
