//! State shared by the accept loop, every connection and the public handle

use crate::overrides::OverrideTable;
use crate::tracker::ConnectionTracker;
use crate::waiters::WaiterRegistry;
use crate::writer::{InFlight, ResponseWriter};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use testserver_core::{Error, Request, ServeOptions, StaticFileConfig, StaticFiles};

/// Everything `reset` must clear in one step
#[derive(Default)]
pub(crate) struct Tables {
    pub overrides: OverrideTable,
    pub waiters: WaiterRegistry,
    pub in_flight: InFlight,
}

/// Server state shared across all connections
pub(crate) struct ServerState {
    /// Override tables, waiters and in-flight responses behind one lock
    pub tables: Mutex<Tables>,
    /// Static file resolver for the asset root
    pub static_files: StaticFiles,
    /// Prefix under which static files get caching headers
    pub cache_prefix: RwLock<Option<String>>,
    /// Open connections and WebSocket sessions
    pub tracker: Arc<ConnectionTracker>,
    /// First unrecognized connection error, reported by `stop`
    fatal: Mutex<Option<Error>>,
}

impl ServerState {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let config = StaticFileConfig::new(root).start_time(SystemTime::now());
        Self {
            tables: Mutex::new(Tables::default()),
            static_files: StaticFiles::new(config),
            cache_prefix: RwLock::new(None),
            tracker: Arc::new(ConnectionTracker::new()),
            fatal: Mutex::new(None),
        }
    }

    /// Clear overrides, reject waiters and abort unfinished responses
    pub fn reset(&self) {
        let mut tables = self.tables.lock();
        tables.overrides.clear();
        let rejected = tables.waiters.reject_all();
        let aborted = tables.in_flight.abort_all();
        tracing::debug!(rejected, aborted, "server reset");
    }

    /// Remember an unexpected failure so `stop` can report it
    pub fn record_fatal(&self, error: Error) {
        tracing::error!(error = %error, "unexpected server error");
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().take()
    }

    /// Default static behaviour for `pathname`, written to `writer`
    pub async fn serve_file(&self, req: &Request, writer: ResponseWriter, pathname: &str) {
        let (csp, gzip) = {
            let tables = self.tables.lock();
            (
                tables.overrides.csp(pathname).map(|s| s.to_string()),
                tables.overrides.is_gzip(pathname),
            )
        };
        let cache_prefix = self.cache_prefix.read().clone();

        let options = ServeOptions {
            cache_prefix: cache_prefix.as_deref(),
            csp: csp.as_deref(),
            gzip,
        };
        let response = self.static_files.handle(req, pathname, options).await;

        // Reset may have aborted the response while the file was being read
        if writer.is_finished() {
            tracing::debug!(pathname, "response aborted before static file was ready");
            return;
        }
        writer.send(response);
    }
}
