//! Startup and shutdown of the running services.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tracing::{info, info_span, warn, Instrument};

use crate::channel::IngestSender;
use crate::collector::Collector;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{self, AppState, Site};
use crate::service::{ServiceKind, ServiceManager};
use crate::store::Store;

/// Which services to run in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// HTTP front end and collector together.
    All,
    /// Only the HTTP front end.
    HttpOnly,
    /// Only the collector.
    CollectorOnly,
}

impl RunMode {
    /// Whether this mode runs the HTTP front end.
    #[must_use]
    pub fn runs_http(self) -> bool {
        matches!(self, Self::All | Self::HttpOnly)
    }

    /// Whether this mode runs the collector.
    #[must_use]
    pub fn runs_collector(self) -> bool {
        matches!(self, Self::All | Self::CollectorOnly)
    }
}

/// Services that have been started and are running in the background.
pub struct Running {
    manager: ServiceManager,
    tasks: JoinSet<Result<()>>,
    http_addr: Option<SocketAddr>,
    ingest_addr: SocketAddr,
}

impl std::fmt::Debug for Running {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Running")
            .field("services", &self.manager.count())
            .field("http_addr", &self.http_addr)
            .field("ingest_addr", &self.ingest_addr)
            .finish_non_exhaustive()
    }
}

impl Running {
    /// Bind sockets and spawn the services selected by `mode`.
    ///
    /// When the collector runs here, the front end sends to the collector's
    /// actual bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or a socket cannot be
    /// bound. Nothing is left running in that case.
    pub async fn start(config: &Config, mode: RunMode) -> Result<Self> {
        let mut manager = ServiceManager::new();
        let mut tasks = JoinSet::new();
        let mut ingest_addr = config.ingest_addr();
        let mut http_addr = None;

        let collector = if mode.runs_collector() {
            let store = Arc::new(Store::open(config.data_path())?);
            let collector =
                Collector::bind(ingest_addr, config.ingest.max_datagram_size, store).await?;
            ingest_addr = collector.local_addr()?;
            Some(collector)
        } else {
            None
        };

        let listener = if mode.runs_http() {
            let listener = http::bind(config.http_addr()).await?;
            http_addr = Some(listener.local_addr()?);
            Some(listener)
        } else {
            None
        };

        if let Some(collector) = collector {
            let handle = manager.register(ServiceKind::Collector);
            tasks.spawn(
                async move {
                    collector.run(handle).await;
                    Ok(())
                }
                .instrument(info_span!("collector")),
            );
        }

        if let Some(listener) = listener {
            let handle = manager.register(ServiceKind::Http);
            let state = AppState::new(
                Site::from_config(&config.site),
                IngestSender::new(ingest_addr),
            );
            tasks.spawn(http::serve(listener, state, handle).instrument(info_span!("http")));
        }

        Ok(Self {
            manager,
            tasks,
            http_addr,
            ingest_addr,
        })
    }

    /// Address the HTTP front end listens on, if it runs here.
    #[must_use]
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Address of the ingest channel.
    #[must_use]
    pub fn ingest_addr(&self) -> SocketAddr {
        self.ingest_addr
    }

    /// Signal every service to stop.
    pub fn stop(&self) {
        self.manager.stop_all();
    }

    /// Wait for `shutdown` (or for any service to exit), stop everything and
    /// wait for all services to finish.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a service.
    pub async fn wait(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut first = Ok(());

        tokio::select! {
            () = shutdown => info!("Shutdown requested, stopping services"),
            Some(joined) = self.tasks.join_next() => {
                warn!("A service exited early, stopping the rest");
                first = flatten(joined);
            }
        }

        self.manager.stop_all();
        while let Some(joined) = self.tasks.join_next().await {
            let result = flatten(joined);
            if first.is_ok() {
                first = result;
            }
        }

        info!("All services stopped");
        first
    }
}

/// Run the services selected by `mode` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if startup fails or a service fails.
pub async fn run(config: &Config, mode: RunMode) -> Result<()> {
    let running = Running::start(config, mode).await?;
    running
        .wait(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C, stopping: {e}");
            }
        })
        .await
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    joined.map_err(|e| Error::internal(format!("service task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.http.bind_address = "127.0.0.1".parse().unwrap();
        config.http.port = 0;
        config.ingest.port = 0;
        config.storage.data_path = dir.join("storage").join("data.json");
        config.site.base_dir = dir.to_path_buf();
        fs::write(dir.join("index.html"), "<h1>Index</h1>").unwrap();
        fs::write(dir.join("message.html"), "<form></form>").unwrap();
        fs::write(dir.join("error.html"), "<h1>Oops</h1>").unwrap();
        config
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    #[test]
    fn test_run_mode_selection() {
        assert!(RunMode::All.runs_http() && RunMode::All.runs_collector());
        assert!(RunMode::HttpOnly.runs_http() && !RunMode::HttpOnly.runs_collector());
        assert!(!RunMode::CollectorOnly.runs_http() && RunMode::CollectorOnly.runs_collector());
    }

    #[tokio::test]
    async fn test_post_is_stored_end_to_end() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let running = Running::start(&config, RunMode::All).await.unwrap();
        let http_addr = running.http_addr().unwrap();

        let body = "name=Ann&city=NY";
        let response = raw_request(
            http_addr,
            &format!(
                "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
                 Content-Type: application/x-www-form-urlencoded\r\n\
                 Content-Length: {}\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 302"), "{response}");
        assert!(response.to_ascii_lowercase().contains("location: /\r\n"));

        let store = Store::open(config.data_path()).unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let entries = store.load();
        assert_eq!(entries.len(), 1);
        let stored = entries.values().next().unwrap();
        assert_eq!(
            serde_json::to_value(stored).unwrap(),
            serde_json::json!({"name": "Ann", "city": "NY"})
        );

        running.stop();
        running.wait(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_pages_served_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let running = Running::start(&config, RunMode::HttpOnly).await.unwrap();
        let http_addr = running.http_addr().unwrap();

        let index = raw_request(http_addr, "GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
        assert!(index.starts_with("HTTP/1.1 200"));
        assert!(index.ends_with("<h1>Index</h1>"));

        let missing = raw_request(
            http_addr,
            "GET /nonexistent.xyz HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(missing.starts_with("HTTP/1.1 404"));
        assert!(missing.ends_with("<h1>Oops</h1>"));

        running.wait(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_collector_only_mode_has_no_http() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let running = Running::start(&config, RunMode::CollectorOnly).await.unwrap();

        assert!(running.http_addr().is_none());
        assert_ne!(running.ingest_addr().port(), 0);
        assert!(config.data_path().exists());

        running.wait(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_http_port_taken() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let taken = http::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        config.http.port = taken.local_addr().unwrap().port();

        let err = Running::start(&config, RunMode::All).await.unwrap_err();
        assert!(matches!(err, Error::HttpBind { .. }));
    }
}
