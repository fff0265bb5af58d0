//! Backend endpoint resolution.
//!
//! The backend listens on a fixed port on the same host that served the
//! dashboard page. Loopback pages (and callers with no page at all) talk to
//! the local development backend.

use crate::ConfigResult;
use url::Url;

/// Port the quant backend serves its event stream on.
pub const BACKEND_PORT: u16 = 5002;

/// Endpoint used for loopback pages and when no page location is known.
pub const LOCAL_ENDPOINT: &str = "http://localhost:5002";

const LOOPBACK_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Resolve the event-stream endpoint.
///
/// An explicit `override_url` always wins. Otherwise the endpoint is derived
/// from `page`: same host, [`BACKEND_PORT`], `https` only when the page was
/// served over `https`.
pub fn resolve_endpoint(page: Option<&Url>, override_url: Option<&str>) -> ConfigResult<Url> {
    if let Some(raw) = override_url {
        return Ok(Url::parse(raw.trim())?);
    }

    let Some(host) = page.and_then(|p| p.host_str()) else {
        return Ok(Url::parse(LOCAL_ENDPOINT)?);
    };
    if LOOPBACK_HOSTS.contains(&host) {
        return Ok(Url::parse(LOCAL_ENDPOINT)?);
    }

    let scheme = match page.map(Url::scheme) {
        Some("https") => "https",
        _ => "http",
    };
    Ok(Url::parse(&format!("{scheme}://{host}:{BACKEND_PORT}"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn no_page_uses_local_backend() {
        let url = resolve_endpoint(None, None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5002/");
    }

    #[test]
    fn loopback_pages_use_local_backend() {
        for raw in [
            "http://localhost:5173/dashboard",
            "http://127.0.0.1:8080/",
            "https://localhost/",
            "http://[::1]:3000/",
        ] {
            let url = resolve_endpoint(Some(&page(raw)), None).unwrap();
            assert_eq!(url.as_str(), "http://localhost:5002/", "page {raw}");
        }
    }

    #[test]
    fn remote_page_keeps_host_and_swaps_port() {
        let url = resolve_endpoint(Some(&page("http://quant.example.com:8080/charts")), None).unwrap();
        assert_eq!(url.as_str(), "http://quant.example.com:5002/");
    }

    #[test]
    fn https_page_yields_https_endpoint() {
        let url = resolve_endpoint(Some(&page("https://quant.example.com/")), None).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(5002));
    }

    #[test]
    fn override_wins_over_page() {
        let url = resolve_endpoint(
            Some(&page("https://quant.example.com/")),
            Some(" ws://10.0.0.5:9000 "),
        )
        .unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.5:9000/");
    }

    #[test]
    fn invalid_override_is_an_error() {
        assert!(resolve_endpoint(None, Some("not a url")).is_err());
    }

    #[test]
    fn hostless_page_uses_local_backend() {
        let url = resolve_endpoint(Some(&page("file:///tmp/index.html")), None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5002/");
    }
}
