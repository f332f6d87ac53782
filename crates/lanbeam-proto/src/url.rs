//! Peer endpoint URL construction.

use std::net::Ipv4Addr;

use url::Url;

use crate::types::{Protocol, DEFAULT_PORT};

/// A reachable peer API endpoint. Port 0 falls back to the standard port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
    pub protocol: Protocol,
}

impl PeerEndpoint {
    pub fn new(address: Ipv4Addr, port: u16, protocol: Protocol) -> Self {
        let port = if port == 0 { DEFAULT_PORT } else { port };
        Self {
            address,
            port,
            protocol,
        }
    }

    /// Absolute URL for an API path, with percent-encoded query values.
    pub fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = Url::parse(&format!(
            "{}://{}:{}{}{}",
            self.protocol.scheme(),
            self.address,
            self.port,
            crate::types::API_BASE,
            path
        ))
        .expect("endpoint URL components are always valid");
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    pub fn register_url(&self) -> Url {
        self.api_url("/register", &[])
    }

    pub fn prepare_upload_url(&self, pin: Option<&str>) -> Url {
        match pin {
            Some(pin) if !pin.is_empty() => self.api_url("/prepare-upload", &[("pin", pin)]),
            _ => self.api_url("/prepare-upload", &[]),
        }
    }

    pub fn upload_url(&self, session_id: &str, file_id: &str, token: &str) -> Url {
        self.api_url(
            "/upload",
            &[
                ("sessionId", session_id),
                ("fileId", file_id),
                ("token", token),
            ],
        )
    }

    pub fn cancel_url(&self, session_id: &str) -> Url {
        self.api_url("/cancel", &[("sessionId", session_id)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> PeerEndpoint {
        PeerEndpoint::new(Ipv4Addr::new(192, 168, 1, 42), 53317, Protocol::Http)
    }

    #[test]
    fn zero_port_falls_back_to_default() {
        let ep = PeerEndpoint::new(Ipv4Addr::new(10, 0, 0, 1), 0, Protocol::Https);
        assert_eq!(ep.port, DEFAULT_PORT);
        assert_eq!(
            ep.register_url().as_str(),
            "https://10.0.0.1:53317/api/localsend/v2/register"
        );
    }

    #[test]
    fn prepare_upload_with_pin() {
        let url = endpoint().prepare_upload_url(Some("123456"));
        assert_eq!(
            url.as_str(),
            "http://192.168.1.42:53317/api/localsend/v2/prepare-upload?pin=123456"
        );
        let bare = endpoint().prepare_upload_url(None);
        assert!(bare.query().is_none());
    }

    #[test]
    fn upload_url_carries_all_params() {
        let url = endpoint().upload_url("sess-1", "f1", "tok");
        assert_eq!(
            url.as_str(),
            "http://192.168.1.42:53317/api/localsend/v2/upload?sessionId=sess-1&fileId=f1&token=tok"
        );
    }

    #[test]
    fn query_values_are_percent_encoded() {
        let url = endpoint().upload_url("a b", "f/1", "t&k=v");
        let query = url.query().unwrap();
        assert!(query.contains("sessionId=a+b") || query.contains("sessionId=a%20b"));
        assert!(query.contains("fileId=f%2F1"));
        assert!(query.contains("token=t%26k%3Dv"));
    }

    #[test]
    fn cancel_url_has_session() {
        let url = endpoint().cancel_url("xyz");
        assert_eq!(
            url.as_str(),
            "http://192.168.1.42:53317/api/localsend/v2/cancel?sessionId=xyz"
        );
    }
}
