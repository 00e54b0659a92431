//! Server configuration

use crate::tls::TlsConfig;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub hostname: String,
    /// 0 asks the OS for an ephemeral port
    pub port: u16,
    /// HTTP/1.1 keep-alive
    pub keep_alive: bool,
    /// Serve HTTPS instead of plain HTTP
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 0,
            keep_alive: true,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// `https` when TLS is configured, `http` otherwise
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert!(config.keep_alive);
        assert_eq!(config.scheme(), "http");
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .hostname("0.0.0.0")
            .keep_alive(false)
            .tls(TlsConfig::fixture());
        assert_eq!(config.hostname, "0.0.0.0");
        assert!(!config.keep_alive);
        assert_eq!(config.scheme(), "https");
    }
}
