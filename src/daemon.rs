//! Foreground runner for automatic feed updates.
//!
//! Polls on the configured tiers until SIGINT or SIGTERM, then stops the
//! monitors, flushes the cache and saves the tree before returning.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::{AppContext, Result};
use crate::config::interval::format_interval;

pub struct Daemon {
    ctx: AppContext,
}

impl Daemon {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Overrides the delay before the first poll.
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.ctx.config.polling.startup_delay = delay;
        self
    }

    pub async fn run(&self) -> Result<()> {
        let mut subscriber = self.ctx.subscriber()?;
        let mut redirects = self.ctx.client.subscribe_redirects();
        let polling = &self.ctx.config.polling;

        info!(
            pid = std::process::id(),
            entries = subscriber.tree().entries().len(),
            high = %format_interval(polling.high_interval.as_secs()),
            low = %format_interval(polling.low_interval.as_secs()),
            "Tributary daemon started"
        );
        subscriber.start();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = subscriber.next_event() => match event {
                    Some(received) => {
                        let uri = received.uri.clone();
                        if let Some(added) = subscriber.receive(received) {
                            if added > 0 {
                                info!(uri = %uri, added, "New items");
                            }
                        }
                    }
                    None => break,
                },
                redirect = redirects.recv() => match redirect {
                    Ok(redirect) => info!(
                        from = %redirect.from,
                        to = %redirect.to,
                        "Feed served from discovered URI"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed redirect notifications")
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("Daemon shutting down...");
        subscriber.shutdown().await;
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Signal handlers unavailable, falling back to Ctrl-C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
