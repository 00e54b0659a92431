//! HTTP Basic authentication for per-path credential overrides

use crate::{Request, Response, ResponseBuilder, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Realm advertised in the challenge
pub const REALM: &str = "Secure Area";

/// Body of every 401 written by the fixture server
pub const UNAUTHORIZED_BODY: &str = "HTTP Error 401 Unauthorized: Access is denied";

/// Basic authentication credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse from Authorization header
    pub fn parse(header: &str) -> Option<Self> {
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(Self::new(username, password))
    }

    /// Encode to Authorization header value
    pub fn encode(&self) -> String {
        let combined = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(combined))
    }

    /// Check a request against these credentials.
    ///
    /// Returns the 401 challenge to send when the request does not carry
    /// exactly these credentials, `None` when it may proceed.
    pub fn challenge(&self, req: &Request) -> Option<Response> {
        let presented = req.header("authorization").and_then(BasicCredentials::parse);
        match presented {
            Some(creds) if creds == *self => None,
            _ => Some(unauthorized_response()),
        }
    }
}

/// The 401 challenge response
pub fn unauthorized_response() -> Response {
    ResponseBuilder::new(StatusCode::UNAUTHORIZED)
        .header("WWW-Authenticate", format!("Basic realm=\"{}\"", REALM))
        .body(UNAUTHORIZED_BODY)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};

    #[test]
    fn test_basic_credentials_parse() {
        // "user:pass" = "dXNlcjpwYXNz"
        let creds = BasicCredentials::parse("Basic dXNlcjpwYXNz").unwrap();
        assert_eq!(creds.username, "user");
        assert_eq!(creds.password, "pass");

        assert!(BasicCredentials::parse("Bearer abc").is_none());
        assert!(BasicCredentials::parse("Basic !!!").is_none());
    }

    #[test]
    fn test_basic_credentials_encode() {
        let creds = BasicCredentials::new("user", "pass");
        assert_eq!(creds.encode(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_password_with_colon() {
        let creds = BasicCredentials::new("user", "pa:ss");
        let parsed = BasicCredentials::parse(&creds.encode()).unwrap();
        assert_eq!(parsed, creds);
    }

    #[test]
    fn test_challenge() {
        let expected = BasicCredentials::new("user", "pass");

        let good = RequestBuilder::new(Method::GET, "/")
            .header("Authorization", expected.encode())
            .build();
        assert!(expected.challenge(&good).is_none());

        let wrong = RequestBuilder::new(Method::GET, "/")
            .header("Authorization", BasicCredentials::new("user", "nope").encode())
            .build();
        let res = expected.challenge(&wrong).unwrap();
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.header("www-authenticate"), Some("Basic realm=\"Secure Area\""));
        assert_eq!(res.body_string().as_deref(), Some(UNAUTHORIZED_BODY));

        let missing = RequestBuilder::new(Method::GET, "/").build();
        assert!(expected.challenge(&missing).is_some());
    }
}
