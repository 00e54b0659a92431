//! The fixture server handle and its accept loop

use crate::config::ServerConfig;
use crate::dispatch::handle_request;
use crate::overrides::route_handler;
use crate::state::ServerState;
use crate::tls::TlsConfig;
use crate::tracker::report_connection_error;
use crate::waiters::RequestWaiter;
use crate::writer::ResponseWriter;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use testserver_core::{BasicCredentials, Error, Request, Response, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[cfg(feature = "tls")]
type Acceptor = tokio_rustls::TlsAcceptor;

#[cfg(not(feature = "tls"))]
#[derive(Clone)]
enum Acceptor {}

/// A running fixture server.
///
/// Serves the files under its root directory over HTTP or HTTPS on an
/// ephemeral port. Tests layer per-path overrides on top and `reset` them
/// between cases.
///
/// ```no_run
/// # async fn demo() -> testserver::Result<()> {
/// let server = testserver::TestServer::create("assets").await?;
/// server.set_redirect("/old.html", "/empty.html");
/// let waiter = server.wait_for_request("/empty.html");
/// // ... drive a browser at server.url("/old.html") ...
/// let request = waiter.await?;
/// assert_eq!(request.path, "/empty.html");
/// server.stop().await
/// # }
/// ```
pub struct TestServer {
    state: Arc<ServerState>,
    addr: SocketAddr,
    scheme: &'static str,
    root: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    accept_task: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Plain HTTP server for `dir`
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(dir, ServerConfig::default()).await
    }

    /// HTTPS server for `dir` using the bundled localhost certificate
    pub async fn create_https(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(dir, ServerConfig::default().tls(TlsConfig::fixture())).await
    }

    /// Server for `dir` with explicit configuration
    pub async fn with_config(dir: impl Into<PathBuf>, config: ServerConfig) -> Result<Self> {
        let root = dir.into();
        let scheme = config.scheme();
        let acceptor = load_acceptor(&config)?;

        let listener = TcpListener::bind((config.hostname.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(ServerState::new(root.clone()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            state.clone(),
            acceptor,
            config.keep_alive,
            shutdown_rx,
        ));

        tracing::info!(port = addr.port(), scheme, root = %root.display(), "fixture server listening");

        Ok(Self {
            state,
            addr,
            scheme,
            root,
            shutdown_tx: Some(shutdown_tx),
            accept_task: Some(accept_task),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Local address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http[s]://localhost:<port>`
    pub fn prefix(&self) -> String {
        format!("{}://localhost:{}", self.scheme, self.port())
    }

    /// `http[s]://127.0.0.1:<port>`, a different origin than [`prefix`](Self::prefix)
    pub fn cross_process_prefix(&self) -> String {
        format!("{}://127.0.0.1:{}", self.scheme, self.port())
    }

    pub fn empty_page(&self) -> String {
        self.url("/empty.html")
    }

    /// Absolute URL for `path` under [`prefix`](Self::prefix)
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.prefix(), path)
        } else {
            format!("{}/{}", self.prefix(), path)
        }
    }

    /// Asset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Open connections and WebSocket sessions
    pub fn connection_count(&self) -> usize {
        self.state.tracker.count()
    }

    /// Serve caching headers for static files under `prefix`.
    ///
    /// The prefix is matched against both the request pathname and the
    /// absolute file path. It is not cleared by [`reset`](Self::reset).
    pub fn enable_http_cache(&self, prefix: impl Into<String>) {
        *self.state.cache_prefix.write() = Some(prefix.into());
    }

    /// Require these Basic credentials for `path`
    pub fn set_auth(&self, path: impl Into<String>, username: impl Into<String>, password: impl Into<String>) {
        self.state
            .tables
            .lock()
            .overrides
            .set_auth(path, BasicCredentials::new(username, password));
    }

    /// Gzip the static response for `path`
    pub fn enable_gzip(&self, path: impl Into<String>) {
        self.state.tables.lock().overrides.enable_gzip(path);
    }

    /// Send `Content-Security-Policy: <value>` with the static response for `path`
    pub fn set_csp(&self, path: impl Into<String>, value: impl Into<String>) {
        self.state.tables.lock().overrides.set_csp(path, value);
    }

    /// Answer `path` with `handler` instead of the static file. Last registration wins.
    pub fn set_route<F, Fut>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.state
            .tables
            .lock()
            .overrides
            .set_route(path, route_handler(handler));
    }

    /// Answer `from` with a 302 to `to`
    pub fn set_redirect(&self, from: impl Into<String>, to: impl Into<String>) {
        let location: Arc<str> = Arc::from(to.into());
        self.set_route(from, move |_req, res: ResponseWriter| {
            let location = location.clone();
            async move { res.send(Response::found(&location)) }
        });
    }

    /// Future resolving with the next request for `path`.
    ///
    /// While a waiter for `path` is pending, every call returns the same one.
    pub fn wait_for_request(&self, path: impl AsRef<str>) -> RequestWaiter {
        let path = path.as_ref();
        tracing::debug!(path, "waiting for request");
        self.state.tables.lock().waiters.wait_for(path)
    }

    /// Answer with the default static behaviour, typically from inside a route
    pub async fn serve_file(&self, req: &Request, res: ResponseWriter, pathname: &str) {
        self.state.serve_file(req, res, pathname).await;
    }

    /// Clear every override, reject pending waiters and abort unfinished
    /// responses. Connections stay open.
    pub fn reset(&self) {
        self.state.reset();
    }

    /// Reset, close every connection and the listener.
    ///
    /// Returns the first unexpected connection error seen while running.
    pub async fn stop(mut self) -> Result<()> {
        self.state.reset();
        self.state.tracker.start_shutdown();
        let mut closed = self.state.tracker.destroy_all();

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                tracing::debug!(error = %e, "accept loop ended abnormally");
            }
        }
        // Connections accepted while shutdown was being signalled
        closed += self.state.tracker.destroy_all();

        tracing::info!(port = self.port(), closed, "fixture server stopped");

        match self.state.take_fatal() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            self.state.reset();
            self.state.tracker.start_shutdown();
            self.state.tracker.destroy_all();
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for TestServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestServer")
            .field("addr", &self.addr)
            .field("scheme", &self.scheme)
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(feature = "tls")]
fn load_acceptor(config: &ServerConfig) -> Result<Option<Acceptor>> {
    config.tls.as_ref().map(TlsConfig::build_acceptor).transpose()
}

#[cfg(not(feature = "tls"))]
fn load_acceptor(config: &ServerConfig) -> Result<Option<Acceptor>> {
    match config.tls {
        Some(_) => Err(Error::Tls(
            "TLS support not enabled. Compile with 'tls' feature.".to_string(),
        )),
        None => Ok(None),
    }
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    acceptor: Option<Acceptor>,
    keep_alive: bool,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let tracker = state.tracker.clone();

    tokio::select! {
        _ = async {
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        match accept_retry_delay(&e) {
                            Some(delay) => {
                                tracing::warn!(error = %e, ?delay, "accept failed, backing off");
                                tokio::time::sleep(delay).await;
                            }
                            None => tracing::debug!(error = %e, "accept failed"),
                        }
                        continue;
                    }
                };

                // Reject new connections during shutdown
                if tracker.is_shutting_down() {
                    drop(stream);
                    continue;
                }

                let _ = stream.set_nodelay(true);
                let conn_state = state.clone();
                let acceptor = acceptor.clone();
                tracker.spawn(serve_connection(conn_state, stream, peer, acceptor, keep_alive));
            }
        } => {}
        _ = shutdown_rx => {
            // Signal shutdown - new connections will be rejected
            tracker.start_shutdown();
        }
    }
}

/// Pause before retrying `accept` after `err`. Per-connection errors retry
/// at once.
fn accept_retry_delay(err: &io::Error) -> Option<Duration> {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

async fn serve_connection(
    state: Arc<ServerState>,
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<Acceptor>,
    keep_alive: bool,
) {
    tracing::debug!(peer = %peer, "connection opened");

    match acceptor {
        #[cfg(feature = "tls")]
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_http(state, TokioIo::new(tls_stream), peer, keep_alive).await,
            Err(e) if crate::tracker::is_benign_io_error(&e) => {
                tracing::debug!(peer = %peer, error = %e, "TLS handshake aborted");
            }
            Err(e) => state.record_fatal(Error::Tls(e.to_string())),
        },
        #[cfg(not(feature = "tls"))]
        Some(never) => match never {},
        None => serve_http(state, TokioIo::new(stream), peer, keep_alive).await,
    }
}

async fn serve_http<I>(state: Arc<ServerState>, io: I, peer: SocketAddr, keep_alive: bool)
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service_state = state.clone();
    let service = service_fn(move |req| handle_request(service_state.clone(), req));

    if let Err(e) = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(io, service)
        .with_upgrades()
        .await
    {
        report_connection_error(&state, peer, e);
    }
}
