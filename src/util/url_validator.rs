use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a remote URL is refused before any request is made.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Plain http not allowed: {0}")]
    Insecure(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which otherwise-refused URLs [`validate_url`] lets through.
///
/// The default is the strict policy: `https` only, public hosts only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlPolicy {
    /// Permit localhost and private/link-local/unspecified addresses
    pub allow_private: bool,
    /// Permit plain `http`
    pub allow_insecure: bool,
}

/// Checks that a URL taken from an upstream feed is safe to fetch.
///
/// Only `https` is accepted unless `policy.allow_insecure` also admits
/// `http`. Unless `policy.allow_private` is set, localhost and
/// private/link-local/unspecified addresses are rejected so a hostile feed
/// cannot point the proxy at internal services.
///
/// ```
/// use rssok::util::{validate_url, UrlPolicy};
///
/// let strict = UrlPolicy::default();
/// assert!(validate_url("https://cdn.example.com/a.jpg", strict).is_ok());
/// assert!(validate_url("http://cdn.example.com/a.jpg", strict).is_err());
///
/// let open = UrlPolicy { allow_private: true, allow_insecure: true };
/// assert!(validate_url("http://127.0.0.1/a.jpg", open).is_ok());
/// assert!(validate_url("file:///etc/passwd", open).is_err());
/// ```
pub fn validate_url(url_str: &str, policy: UrlPolicy) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "https" => {}
        "http" if policy.allow_insecure => {}
        "http" => return Err(UrlValidationError::Insecure(url.to_string())),
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if policy.allow_private {
        return Ok(url);
    }

    if let Some(host) = url.host_str() {
        if host.eq_ignore_ascii_case("localhost") {
            return Err(UrlValidationError::Localhost);
        }

        // Strip brackets from IPv6 addresses for parsing
        let host_for_parse = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
