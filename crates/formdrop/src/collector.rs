//! The storage server loop.
//!
//! The collector owns the receiving end of the ingest channel and the
//! [`Store`]. It handles one datagram at a time: receive, decode, merge.
//! A bad datagram or a failed write is logged and the loop moves on; only a
//! stop signal ends it.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::channel::{Datagram, IngestReceiver};
use crate::record::Record;
use crate::service::ServiceHandle;
use crate::store::Store;
use crate::Result;

/// Where the collector is in its receive-decode-merge cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    /// Waiting for the next datagram.
    Listening,
    /// A datagram has arrived.
    Receiving,
    /// Decoding the datagram into a record.
    Decoding,
    /// Merging the record into the store.
    Merging,
    /// The loop has ended and the socket is released.
    Stopped,
}

/// Counters kept across the collector's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    /// Datagrams received.
    pub received: u64,
    /// Records written to the store.
    pub stored: u64,
    /// Datagrams dropped because they did not decode.
    pub rejected: u64,
    /// Records lost because the store write failed.
    pub failed: u64,
}

/// Result of processing one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored under the given key.
    Stored(String),
    /// Not a valid form body; dropped.
    Rejected,
    /// Decoded but the store write failed; dropped.
    Failed,
}

/// Datagram-fed store writer.
#[derive(Debug)]
pub struct Collector {
    receiver: IngestReceiver,
    store: Arc<Store>,
    state: CollectorState,
    stats: CollectorStats,
}

impl Collector {
    /// Create a collector over an already bound receiver.
    #[must_use]
    pub fn new(receiver: IngestReceiver, store: Arc<Store>) -> Self {
        Self {
            receiver,
            store,
            state: CollectorState::Listening,
            stats: CollectorStats::default(),
        }
    }

    /// Bind the ingest socket and create a collector.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr, max_datagram_size: usize, store: Arc<Store>) -> Result<Self> {
        let receiver = IngestReceiver::bind(addr, max_datagram_size).await?;
        Ok(Self::new(receiver, store))
    }

    /// The address the ingest socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.receiver.local_addr()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CollectorState {
        self.state
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Run until `handle` is signalled, then release the socket.
    ///
    /// Returns the final counters.
    pub async fn run(mut self, handle: ServiceHandle) -> CollectorStats {
        match self.local_addr() {
            Ok(addr) => info!("Collector listening on udp://{addr}"),
            Err(e) => warn!("Collector started, local address unavailable: {e}"),
        }

        loop {
            self.state = CollectorState::Listening;
            let received = tokio::select! {
                () = handle.stopped() => break,
                received = self.receiver.recv() => received,
            };

            match received {
                Ok(datagram) => {
                    self.process(datagram).await;
                }
                Err(e) => warn!("Failed to receive datagram: {e}"),
            }
        }

        self.state = CollectorState::Stopped;
        let Self { receiver, stats, .. } = self;
        drop(receiver);
        info!(
            "Collector stopped: {} received, {} stored, {} rejected, {} failed",
            stats.received, stats.stored, stats.rejected, stats.failed
        );
        stats
    }

    /// Decode one datagram and merge it into the store.
    pub async fn process(&mut self, datagram: Datagram) -> Outcome {
        self.state = CollectorState::Receiving;
        self.stats.received += 1;
        debug!(
            "Received {} bytes from {}",
            datagram.payload.len(),
            datagram.peer
        );
        if datagram.truncated {
            warn!(
                "Datagram from {} exceeded {} bytes and was truncated",
                datagram.peer,
                self.receiver.max_datagram_size()
            );
        }

        self.state = CollectorState::Decoding;
        let outcome = match Record::decode(&datagram.payload) {
            Ok(record) => {
                self.state = CollectorState::Merging;
                self.merge(record).await
            }
            Err(e) => {
                warn!(
                    "Dropping datagram from {}: {e} (payload {:?})",
                    datagram.peer,
                    String::from_utf8_lossy(&datagram.payload)
                );
                Outcome::Rejected
            }
        };

        match outcome {
            Outcome::Stored(_) => self.stats.stored += 1,
            Outcome::Rejected => self.stats.rejected += 1,
            Outcome::Failed => self.stats.failed += 1,
        }
        self.state = CollectorState::Listening;
        outcome
    }

    async fn merge(&self, record: Record) -> Outcome {
        let store = Arc::clone(&self.store);
        let fields = record.len();

        match tokio::task::spawn_blocking(move || store.merge_and_save(record)).await {
            Ok(Ok(key)) => {
                info!("Stored submission {key} ({fields} fields)");
                Outcome::Stored(key)
            }
            Ok(Err(e)) => {
                error!("Failed to save submission: {e}");
                Outcome::Failed
            }
            Err(e) => {
                error!("Store task aborted: {e}");
                Outcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::IngestSender;
    use crate::logging::init_test_logging;
    use crate::service::ServiceKind;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_collector() -> (TempDir, Arc<Store>, Collector) {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("data.json")).unwrap());
        let collector = Collector::bind("127.0.0.1:0".parse().unwrap(), 1024, Arc::clone(&store))
            .await
            .unwrap();
        (dir, store, collector)
    }

    fn datagram(payload: &[u8]) -> Datagram {
        Datagram {
            payload: payload.to_vec(),
            peer: "127.0.0.1:40000".parse().unwrap(),
            truncated: false,
        }
    }

    #[tokio::test]
    async fn test_process_valid_datagram() {
        let (_dir, store, mut collector) = create_test_collector().await;
        assert_eq!(collector.state(), CollectorState::Listening);

        let outcome = collector.process(datagram(b"name=Ann&city=NY")).await;

        let Outcome::Stored(key) = outcome else {
            panic!("expected stored outcome, got {outcome:?}");
        };
        let entries = store.load();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            serde_json::to_value(&entries[&key]).unwrap(),
            serde_json::json!({"name": "Ann", "city": "NY"})
        );
        assert_eq!(collector.state(), CollectorState::Listening);
        assert_eq!(
            collector.stats(),
            CollectorStats {
                received: 1,
                stored: 1,
                rejected: 0,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_process_malformed_datagram_leaves_store_untouched() {
        let (_dir, store, mut collector) = create_test_collector().await;
        let before = std::fs::read(store.path()).unwrap();

        let outcome = collector.process(datagram(b"name=Ann&city")).await;

        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(std::fs::read(store.path()).unwrap(), before);
        assert_eq!(collector.stats().rejected, 1);
        assert_eq!(collector.stats().stored, 0);
    }

    #[tokio::test]
    async fn test_process_store_failure_is_counted() {
        let (_dir, store, mut collector) = create_test_collector().await;
        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir(store.path()).unwrap();

        let outcome = collector.process(datagram(b"name=Ann")).await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(collector.stats().failed, 1);
        assert_eq!(collector.state(), CollectorState::Listening);
    }

    #[tokio::test]
    async fn test_process_truncated_datagram_still_decodes() {
        let (_dir, store, mut collector) = create_test_collector().await;
        let mut truncated = datagram(b"name=Ann&comment=abc");
        truncated.truncated = true;

        let outcome = collector.process(truncated).await;

        assert!(matches!(outcome, Outcome::Stored(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_until_stopped() {
        let (_dir, store, collector) = create_test_collector().await;
        let sender = IngestSender::new(collector.local_addr().unwrap());
        let handle = ServiceHandle::new(ServiceKind::Collector);
        let task = tokio::spawn(collector.run(handle.clone()));

        sender.send(b"bad-body").await.unwrap();
        sender.send(b"name=Ann&city=NY").await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        handle.stop();
        let stats = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("collector should stop")
            .unwrap();

        assert_eq!(stats.received, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_run_releases_socket_on_stop() {
        let (_dir, store, collector) = create_test_collector().await;
        let addr = collector.local_addr().unwrap();
        let handle = ServiceHandle::new(ServiceKind::Collector);
        handle.stop();

        let stats = collector.run(handle).await;
        assert_eq!(stats, CollectorStats::default());

        // Port is free again
        let rebound = Collector::bind(addr, 1024, store).await;
        assert!(rebound.is_ok());
    }
}
