//! SSRF guard: decides whether a URL (and each of its redirect targets) is safe
//! to fetch. Ported in spirit from a production SSRF checker; this crate takes
//! the stricter policy the specification calls for — any resolved IP being
//! private/loopback/link-local fails the whole request, not just the narrowed
//! subset — rather than allowing a fetch through on a partially-public answer.

use crate::error::UrlGuardError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::net::lookup_host;
use url::{Host, Url};

/// Outcome of validating a URL: the parsed URL plus every IP that was resolved
/// for it (empty for literal-IP hosts' own address, which is still included).
#[derive(Debug, Clone)]
pub struct ValidatedUrl {
    pub url: Url,
    pub resolved_ips: Vec<IpAddr>,
}

/// Validate `raw_url`: scheme allowlist, then (if `deny_private`) reject hosts
/// that resolve to a private, loopback, or link-local address.
pub async fn validate(raw_url: &str, deny_private: bool) -> Result<ValidatedUrl, UrlGuardError> {
    let url = Url::parse(raw_url).map_err(|e| UrlGuardError::InvalidUrl(format!("{raw_url}: {e}")))?;
    validate_parsed(url, deny_private).await
}

pub async fn validate_parsed(url: Url, deny_private: bool) -> Result<ValidatedUrl, UrlGuardError> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlGuardError::InvalidUrl(format!("unsupported scheme: {other}"))),
    }

    let host = url.host().ok_or_else(|| UrlGuardError::InvalidUrl("url has no host".into()))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let resolved_ips = match &host {
        Host::Ipv4(ip) => vec![IpAddr::V4(*ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(*ip)],
        Host::Domain(name) => resolve(name, port).await?,
    };

    if deny_private {
        if let Some(blocked) = resolved_ips.iter().find(|ip| is_unsafe(ip)) {
            return Err(UrlGuardError::PrivateIp(*blocked));
        }
    }

    Ok(ValidatedUrl { url, resolved_ips })
}

async fn resolve(host: &str, port: u16) -> Result<Vec<IpAddr>, UrlGuardError> {
    let addrs = lookup_host((host, port))
        .await
        .map_err(|source| UrlGuardError::ResolutionFailed { host: host.to_string(), source })?;
    let ips: Vec<IpAddr> = addrs.map(|a| a.ip()).collect();
    if ips.is_empty() {
        return Err(UrlGuardError::InvalidUrl(format!("dns lookup for {host} returned no addresses")));
    }
    Ok(ips)
}

/// True if `ip` is loopback, RFC1918/RFC4193 private, or link-local.
pub fn is_unsafe(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_unsafe_v4(v4),
        IpAddr::V6(v6) => is_unsafe_v6(v6),
    }
}

fn is_unsafe_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_unsafe_v6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_unsafe_v4(&v4);
    }
    let segments = ip.segments();
    // fc00::/7 (unique local)
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // fe80::/10 (link-local)
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    false
}
