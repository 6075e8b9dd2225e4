//! Bridge contract event listener
//!
//! Subscribes to a contract's logs over a WebSocket connection so tests can
//! assert the relay-triggering events were actually emitted.

use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Streaming subscription to one contract's event logs.
///
/// The collector runs as a background task; it is cancelled and joined at
/// teardown through [`EventListener::shutdown`].
pub struct EventListener {
    events: mpsc::UnboundedReceiver<Log>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventListener {
    /// Connect over WebSocket and subscribe to all logs emitted by
    /// `contract`.
    pub async fn subscribe(ws_url: &str, contract: Address) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(ws_url)
            .await
            .map_err(|e| Error::Connection {
                rpc: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let filter = Filter::new().address(contract);
        let subscription =
            provider
                .subscribe_logs(&filter)
                .await
                .map_err(|e| Error::Connection {
                    rpc: ws_url.to_string(),
                    reason: e.to_string(),
                })?;

        info!(%contract, ws_url, "subscribed to contract logs");

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let cancelled = cancel.clone();

        let task = tokio::spawn(async move {
            // The provider must outlive the subscription stream.
            let _provider = provider;
            let mut stream = subscription.into_stream();
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    log = stream.next() => {
                        let Some(log) = log else { break };
                        debug!(address = %log.address(), "observed contract log");
                        if tx.send(log).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            events: rx,
            cancel,
            task,
        })
    }

    /// Wait up to `timeout` for the next observed log.
    pub async fn next_event(&mut self, timeout: Duration) -> Option<Log> {
        tokio::time::timeout(timeout, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Cancel the collector task and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}
