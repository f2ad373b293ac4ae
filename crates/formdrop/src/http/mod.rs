//! HTTP front end.
//!
//! Serves the fixed pages and static files, and hands every POST body to the
//! ingest channel without looking at it:
//! - `GET /` and `GET /message.html` return their pages
//! - `GET /<path>` returns a file below the base directory, or the error page
//! - `POST /<any>` forwards the raw body and redirects to `/`

pub mod site;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, error, info, warn, Level};

use crate::channel::IngestSender;
use crate::error::{Error, Result};
use crate::service::ServiceHandle;

pub use site::{Page, Site, StaticFile};

/// Content type of the fixed pages.
const HTML: &str = "text/html";

/// Shared, read-only state of the front end.
#[derive(Debug, Clone)]
pub struct AppState {
    site: Arc<Site>,
    sender: IngestSender,
}

impl AppState {
    /// Create the front end state.
    #[must_use]
    pub fn new(site: Site, sender: IngestSender) -> Self {
        Self {
            site: Arc::new(site),
            sender,
        }
    }
}

/// Build the front end router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(submit))
        .route("/message.html", get(message).post(submit))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Bind the HTTP listener.
///
/// # Errors
///
/// Returns [`Error::HttpBind`] if the address cannot be bound.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::HttpBind { addr, source })
}

/// Serve requests until `handle` is signalled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(listener: TcpListener, state: AppState, handle: ServiceHandle) -> Result<()> {
    match listener.local_addr() {
        Ok(addr) => info!("HTTP front end listening on http://{addr}"),
        Err(e) => warn!("HTTP front end started, local address unavailable: {e}"),
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { handle.stopped().await })
        .await?;

    info!("HTTP front end stopped");
    Ok(())
}

async fn index(State(state): State<AppState>) -> Response {
    page_response(&state.site, Page::Index, StatusCode::OK).await
}

async fn message(State(state): State<AppState>) -> Response {
    page_response(&state.site, Page::Message, StatusCode::OK).await
}

async fn fallback(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
    match method {
        Method::POST => submit(State(state), body).await,
        Method::GET | Method::HEAD => static_response(&state.site, uri.path()).await,
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Forward the raw body and redirect, whatever happened to the datagram.
async fn submit(State(state): State<AppState>, body: Bytes) -> Response {
    match state.sender.send(&body).await {
        Ok(sent) => debug!("Forwarded {sent} byte submission"),
        Err(e) => warn!("Submission dropped: {e}"),
    }

    (StatusCode::FOUND, [(header::LOCATION, "/")]).into_response()
}

async fn static_response(site: &Site, path: &str) -> Response {
    match site.static_file(path).await {
        Ok(file) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, file.content_type)],
            file.body,
        )
            .into_response(),
        Err(e) => {
            debug!("{e}");
            page_response(site, Page::Error, StatusCode::NOT_FOUND).await
        }
    }
}

async fn page_response(site: &Site, page: Page, status: StatusCode) -> Response {
    match site.page(page).await {
        Ok(body) => (status, [(header::CONTENT_TYPE, HTML)], body).into_response(),
        Err(e) => {
            error!(
                "Failed to load {page} page from {}: {e}",
                site.page_path(page).display()
            );
            if page == Page::Error {
                (status, "404 Not Found").into_response()
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error").into_response()
            }
        }
    }
}
