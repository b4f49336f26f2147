//! Origin URL policy.
//!
//! Origins are fetched server-side, so a URL must not be able to point the pipeline at
//! internal services. Checks, in order: scheme, host presence, optional allowlist,
//! literal private addresses, internal hostnames, and finally every address the host
//! resolves to.

use std::net::{IpAddr, Ipv6Addr};

use reqwest::Url;
use tokio::net::lookup_host;

use assetflow_core::AppError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlGuardError {
    #[error("Malformed URL: {0}")]
    Malformed(String),

    #[error("Unsupported scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("Host '{0}' is not in the allowed origin list")]
    NotAllowlisted(String),

    #[error("Origin '{0}' points at a private or internal address")]
    PrivateAddress(String),
}

impl From<UrlGuardError> for AppError {
    fn from(err: UrlGuardError) -> Self {
        AppError::InvalidUrl(err.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    /// Permit loopback, private and link-local origins (tests, trusted networks).
    pub allow_private: bool,
    /// When set, only these hosts and their subdomains may be fetched.
    pub allowlist: Option<Vec<String>>,
}

impl OriginPolicy {
    /// Syntactic checks only: scheme, host, allowlist, literal addresses, and internal
    /// hostnames. No network access.
    pub fn parse(&self, url: &str) -> Result<Url, UrlGuardError> {
        let parsed = Url::parse(url).map_err(|e| UrlGuardError::Malformed(e.to_string()))?;

        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(UrlGuardError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| UrlGuardError::Malformed("URL has no host".to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_lowercase();

        if let Some(allowlist) = &self.allowlist {
            if !host_allowed(&host, allowlist) {
                return Err(UrlGuardError::NotAllowlisted(host));
            }
        }

        if !self.allow_private {
            let literal_private = host.parse::<IpAddr>().is_ok_and(|ip| is_private_ip(&ip));
            if literal_private || is_internal_hostname(&host) {
                return Err(UrlGuardError::PrivateAddress(host));
            }
        }

        Ok(parsed)
    }

    /// Full check including DNS resolution of the host.
    ///
    /// A host that fails to resolve is let through; the download will fail on its own.
    pub async fn check(&self, url: &str) -> Result<Url, UrlGuardError> {
        let parsed = self.parse(url)?;
        if self.allow_private {
            return Ok(parsed);
        }

        let host = parsed.host_str().unwrap_or_default();
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = parsed.port_or_known_default().unwrap_or(80);

        match lookup_host((host, port)).await {
            Ok(addrs) => {
                for addr in addrs {
                    if is_private_ip(&addr.ip()) {
                        return Err(UrlGuardError::PrivateAddress(format!(
                            "{} ({})",
                            host,
                            addr.ip()
                        )));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Failed to resolve origin host");
            }
        }

        Ok(parsed)
    }
}

/// Exact match or subdomain of an allowlisted host.
fn host_allowed(host: &str, allowlist: &[String]) -> bool {
    allowlist.iter().any(|allowed| {
        let allowed = allowed.to_lowercase();
        host == allowed || host.ends_with(&format!(".{}", allowed))
    })
}

fn is_internal_hostname(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
}

/// Loopback, private, link-local, multicast, unspecified, and unique-local ranges.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private()
                || ipv4.is_loopback()
                || ipv4.is_link_local()
                || ipv4.is_multicast()
                || ipv4.is_broadcast()
                || ipv4.octets()[0] == 0
        }
        IpAddr::V6(ipv6) => {
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

// fe80::/10
fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}

// fc00::/7
fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}
