use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors from feed URL normalization and validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Normalize a feed URL into its canonical string form.
///
/// The canonical form is what the catalog keys on, so two spellings of the
/// same address (`HTTP://Example.com/feed` vs `http://example.com/feed`)
/// converge on one feed row.
///
/// Rejects non-HTTP(S) schemes always, and localhost / private ranges
/// unless `allow_private` is set (SSRF guard — feed URLs come from
/// untrusted readers). Self-hosted deployments that aggregate feeds on an
/// internal network set `allow_private` via configuration.
pub fn normalize_feed_url(url_str: &str, allow_private: bool) -> Result<String, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if !allow_private {
        if let Some(host) = url.host_str() {
            if host == "localhost" {
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
    }

    Ok(url.to_string())
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
