use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use md2html_core::SiteBuilder;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

mod reload;
mod watch;

pub use reload::{PING_EVENT, RELOAD_EVENT, ReloadBroadcaster, format_event};
pub use watch::SourceWatcher;

pub const LIVE_RELOAD_PATH: &str = "/__livereload__";
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Script added to every page while serving. Reloads on `reload`, and after a
/// dropped connection waits two seconds and reloads.
pub const LIVE_RELOAD_SNIPPET: &str = r#"<script>
(function () {
  var source = new EventSource('/__livereload__');
  source.addEventListener('reload', function () {
    window.location.reload();
  });
  source.addEventListener('ping', function () {});
  source.onerror = function () {
    source.close();
    setTimeout(function () { window.location.reload(); }, 2000);
  };
})();
</script>"#;

/// Configuration for the live development server
#[derive(Debug, Clone)]
pub struct LiveServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to serve on
    pub port: u16,
    /// Auto-open browser
    pub open: bool,
}

impl Default for LiveServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            open: false,
        }
    }
}

/// Builds the site, serves the output directory and reloads connected
/// browsers whenever a source change has been rebuilt.
pub struct LiveServer {
    config: LiveServerConfig,
    builder: SiteBuilder,
}

impl LiveServer {
    /// Create a new live server. The live-reload snippet is added to the
    /// site metadata unless the configuration already provides one.
    pub fn new(config: LiveServerConfig, builder: SiteBuilder) -> Result<Self> {
        let builder = if builder.site_value("live_reload_snippet").is_some() {
            builder
        } else {
            builder.add_site_value("live_reload_snippet", LIVE_RELOAD_SNIPPET)?
        };
        Ok(Self { config, builder })
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let output_dir = self.builder.config().output_dir.clone();
        self.builder.build_all()?;

        let broadcaster = ReloadBroadcaster::new();
        let watcher = {
            let broadcaster = broadcaster.clone();
            let source_dir = self.builder.config().source_dir.clone();
            SourceWatcher::start(self.builder, move |path| {
                let shown = path.strip_prefix(&source_dir).unwrap_or(path);
                tracing::info!("Reload triggered by {}", shown.display());
                broadcaster.reload();
            })?
        };

        let heartbeat = {
            let broadcaster = broadcaster.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
                loop {
                    interval.tick().await;
                    broadcaster.ping();
                }
            })
        };

        let app = router(&output_dir, broadcaster.clone());
        let listener = bind_listener(&self.config.host, self.config.port).await?;
        let url = display_url(&self.config.host, listener.local_addr()?.port());
        tracing::info!("Serving {} at {url}", output_dir.display());

        if self.config.open {
            if let Err(err) = open::that(&url) {
                tracing::debug!("Failed to open browser: {err}");
            }
        }

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(broadcaster.clone()))
            .await;

        heartbeat.abort();
        broadcaster.close();
        tokio::task::spawn_blocking(move || watcher.stop()).await?;
        served?;
        Ok(())
    }
}

/// Bind the serving socket. `host` may be a name such as `localhost`.
async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to {host}:{port}"))
}

fn display_url(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

/// HTTP routes: the live-reload event stream plus the static output.
pub fn router(output_dir: &Path, broadcaster: ReloadBroadcaster) -> Router {
    Router::new()
        .route(LIVE_RELOAD_PATH, get(livereload_handler))
        .fallback_service(ServeDir::new(output_dir))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache"),
        ))
        .with_state(broadcaster)
}

async fn livereload_handler(State(broadcaster): State<ReloadBroadcaster>) -> impl IntoResponse {
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(broadcaster.subscribe()))
        .map_err(|err| {
            tracing::error!("Failed to open live reload stream: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Resolves on Ctrl-C. Client streams are closed first so open event-stream
/// connections do not hold up graceful shutdown.
async fn shutdown_signal(broadcaster: ReloadBroadcaster) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {err}");
        return;
    }
    tracing::info!("Stopping development server");
    broadcaster.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use md2html_core::AppConfig;
    use std::fs;
    use tempfile::TempDir;

    fn builder(tmp: &TempDir) -> SiteBuilder {
        let config = AppConfig {
            source_dir: tmp.path().join("docs"),
            output_dir: tmp.path().join("out"),
            ..AppConfig::default()
        };
        fs::create_dir_all(&config.source_dir).unwrap();
        fs::write(config.source_dir.join("index.md"), "# Home\n").unwrap();
        SiteBuilder::from_config(config).unwrap()
    }

    #[test]
    fn test_snippet_is_injected_into_pages() {
        let tmp = TempDir::new().unwrap();
        let server = LiveServer::new(LiveServerConfig::default(), builder(&tmp)).unwrap();
        let results = server.builder.build_all().unwrap();
        assert!(results[0].html.contains("new EventSource('/__livereload__')"));
        assert!(results[0].html.contains("</script>\n</body>"));
    }

    #[test]
    fn test_existing_snippet_is_kept() {
        let tmp = TempDir::new().unwrap();
        let builder = builder(&tmp)
            .add_site_value("live_reload_snippet", "<script>custom()</script>")
            .unwrap();
        let server = LiveServer::new(LiveServerConfig::default(), builder).unwrap();
        let results = server.builder.build_all().unwrap();
        assert!(results[0].html.contains("<script>custom()</script>"));
        assert!(!results[0].html.contains("EventSource"));
    }

    #[tokio::test]
    async fn test_bind_accepts_host_names() {
        let listener = bind_listener("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_display_url_brackets_ipv6() {
        assert_eq!(display_url("localhost", 8000), "http://localhost:8000");
        assert_eq!(display_url("::1", 8000), "http://[::1]:8000");
    }
}
