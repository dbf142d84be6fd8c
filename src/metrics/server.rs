//! HTTP endpoint serving the progress metric

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::TcpListener;

use super::exposition::Exposition;
use crate::logwatch::{ProgressMap, ProgressSink};

const METRICS_PATH: &str = "/metrics";
const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Holds the latest snapshot and renders it on request
#[derive(Clone)]
pub struct MetricServer {
    inner: Arc<Inner>,
}

struct Inner {
    exposition: Exposition,
    progress: Mutex<Arc<ProgressMap>>,
}

impl MetricServer {
    pub fn new(exposition: Exposition) -> Self {
        Self {
            inner: Arc::new(Inner {
                exposition,
                progress: Mutex::new(Arc::new(ProgressMap::new())),
            }),
        }
    }

    /// Replace the snapshot served to scrapers
    pub fn set_progress(&self, progress: Arc<ProgressMap>) {
        *self
            .inner
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = progress;
    }

    /// Render the most recent snapshot
    pub fn render(&self) -> String {
        let progress = Arc::clone(
            &self
                .inner
                .progress
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        self.inner.exposition.render(&progress)
    }

    /// Routes served by the endpoint. `HEAD` is answered by the `GET` route.
    pub fn router(&self) -> Router {
        Router::new()
            .route(METRICS_PATH, get(metrics))
            .with_state(self.clone())
    }

    /// Bind the listening socket
    ///
    /// Binding eagerly lets a bad address fail at startup rather than inside
    /// a background task.
    pub async fn bind(&self, addr: &str) -> Result<MetricListener> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint: {}", addr))?;

        Ok(MetricListener {
            listener,
            server: self.clone(),
        })
    }
}

impl ProgressSink for MetricServer {
    fn set_progress(&self, progress: Arc<ProgressMap>) {
        MetricServer::set_progress(self, progress);
    }
}

async fn metrics(State(server): State<MetricServer>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], server.render())
}

/// A bound metrics endpoint
pub struct MetricListener {
    listener: TcpListener,
    server: MetricServer,
}

impl MetricListener {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read metrics endpoint address")
    }

    /// Serve scrapes until the task is dropped
    pub async fn serve(self) -> Result<()> {
        tracing::info!(
            "Metrics endpoint listening on http://{}{}",
            self.local_addr()?,
            METRICS_PATH
        );

        axum::serve(self.listener, self.server.router())
            .await
            .context("Metrics endpoint failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn send(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn scrape(addr: SocketAddr, method: &str, target: &str) -> String {
        let request = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            method, target, addr
        );
        send(addr, &request).await
    }

    async fn start_server(server: &MetricServer) -> SocketAddr {
        let listener = server.bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(listener.serve());
        addr
    }

    #[test]
    fn test_set_progress_replaces_snapshot() {
        let server = MetricServer::new(Exposition::default());
        let mut progress = ProgressMap::new();
        progress.insert("a.log".to_string(), 6);
        server.set_progress(Arc::new(progress));
        assert_eq!(
            server.render(),
            "# TYPE plot_progress counter\nplot_progress{plot=\"a.log\"} 6\n"
        );

        server.set_progress(Arc::new(ProgressMap::new()));
        assert_eq!(server.render(), "# TYPE plot_progress counter\n");
    }

    #[tokio::test]
    async fn test_serve_metrics() {
        let server = MetricServer::new(Exposition::default());
        let mut progress = ProgressMap::new();
        progress.insert("plot.log".to_string(), 73);
        server.set_progress(Arc::new(progress));

        let addr = start_server(&server).await;
        let response = scrape(addr, "GET", "/metrics").await;

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response
            .to_ascii_lowercase()
            .contains("content-type: text/plain; version=0.0.4\r\n"));
        assert!(response.ends_with(
            "\r\n\r\n# TYPE plot_progress counter\nplot_progress{plot=\"plot.log\"} 73\n"
        ));
    }

    #[tokio::test]
    async fn test_serve_absolute_form_target() {
        let server = MetricServer::new(Exposition::default());
        let addr = start_server(&server).await;

        let target = format!("http://{}/metrics", addr);
        let response = scrape(addr, "GET", &target).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\n# TYPE plot_progress counter\n"));
    }

    #[tokio::test]
    async fn test_serve_follows_updates() {
        let server = MetricServer::new(Exposition::default());
        let addr = start_server(&server).await;

        let response = scrape(addr, "GET", "/metrics?name=x").await;
        assert!(response.ends_with("\r\n\r\n# TYPE plot_progress counter\n"));

        let mut progress = ProgressMap::new();
        progress.insert("late.log".to_string(), 12);
        ProgressSink::set_progress(&server, Arc::new(progress));

        let response = scrape(addr, "GET", "/metrics").await;
        assert!(response.contains("plot_progress{plot=\"late.log\"} 12\n"));
    }

    #[tokio::test]
    async fn test_serve_unknown_path() {
        let server = MetricServer::new(Exposition::default());
        let addr = start_server(&server).await;

        let response = scrape(addr, "GET", "/").await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));

        let response = scrape(addr, "POST", "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    }

    #[tokio::test]
    async fn test_head_request_has_no_body() {
        let server = MetricServer::new(Exposition::default());
        let addr = start_server(&server).await;

        let response = scrape(addr, "HEAD", "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_bind_bad_address() {
        let server = MetricServer::new(Exposition::default());
        assert!(server.bind("not an address").await.is_err());
    }
}
