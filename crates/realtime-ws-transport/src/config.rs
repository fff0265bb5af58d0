//! Transport configuration.

use crate::{WsError, WsResult};
use realtime_config::RealtimeConfig;
use std::time::Duration;
use url::Url;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: Url,
    /// Handshake deadline; exceeding it reports `connect_error("timeout")`.
    pub connect_timeout: Duration,
}

impl WsTransportConfig {
    /// Build from an `http(s)` or `ws(s)` endpoint with a 10s connect timeout.
    pub fn new(endpoint: &Url) -> WsResult<Self> {
        Ok(Self {
            url: to_websocket_url(endpoint)?,
            connect_timeout: Duration::from_secs(10),
        })
    }

    pub fn from_realtime(config: &RealtimeConfig) -> WsResult<Self> {
        let mut ws = Self::new(&config.endpoint()?)?;
        ws.connect_timeout = config.connect_timeout();
        Ok(ws)
    }
}

/// Map `http` to `ws` and `https` to `wss`. WebSocket URLs pass through.
pub fn to_websocket_url(endpoint: &Url) -> WsResult<Url> {
    let scheme = match endpoint.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(WsError::UnsupportedScheme(other.to_string())),
    };

    let mut url = endpoint.clone();
    url.set_scheme(scheme)
        .map_err(|_| WsError::UnsupportedScheme(endpoint.scheme().to_string()))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn maps_http_schemes() {
        assert_eq!(
            to_websocket_url(&url("http://localhost:5002")).unwrap().as_str(),
            "ws://localhost:5002/"
        );
        assert_eq!(
            to_websocket_url(&url("https://dash.example.com:5002/stream"))
                .unwrap()
                .as_str(),
            "wss://dash.example.com:5002/stream"
        );
    }

    #[test]
    fn websocket_urls_pass_through() {
        assert_eq!(
            to_websocket_url(&url("wss://dash.example.com:5002")).unwrap().as_str(),
            "wss://dash.example.com:5002/"
        );
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            to_websocket_url(&url("ftp://example.com")),
            Err(WsError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn from_realtime_uses_timeout_and_endpoint() {
        let mut realtime = RealtimeConfig::default();
        realtime.endpoint_override = Some("https://dash.example.com:5002".to_string());
        realtime.connect_timeout_ms = 2500;

        let config = WsTransportConfig::from_realtime(&realtime).unwrap();
        assert_eq!(config.url.as_str(), "wss://dash.example.com:5002/");
        assert_eq!(config.connect_timeout, Duration::from_millis(2500));
    }
}
