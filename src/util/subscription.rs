use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Why a subscription URL was refused.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private, link-local or unspecified address while the
    /// policy forbids them.
    #[error("Internal address not allowed: {0}")]
    InternalAddress(String),
}

/// Which hosts a subscription may point at.
///
/// The service fetches subscriptions on behalf of every user, so by default
/// it refuses URLs that would make it probe its own network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressPolicy {
    #[default]
    PublicOnly,
    AllowInternal,
}

impl AddressPolicy {
    pub fn from_allow_internal(allow: bool) -> Self {
        if allow {
            AddressPolicy::AllowInternal
        } else {
            AddressPolicy::PublicOnly
        }
    }
}

/// Parse and check a subscription URL.
///
/// Only literal IP hosts and `localhost` are classified; names that resolve
/// to internal addresses are not looked up here.
pub fn validate_subscription(raw: &str, policy: AddressPolicy) -> Result<Url, SubscriptionError> {
    let url = Url::parse(raw.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SubscriptionError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let host = url.host().ok_or(SubscriptionError::MissingHost)?;
    if policy == AddressPolicy::AllowInternal {
        return Ok(url);
    }

    let internal = match &host {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => is_internal(&IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_internal(&IpAddr::V6(*ip)),
    };
    if internal {
        return Err(SubscriptionError::InternalAddress(host.to_string()));
    }

    Ok(url)
}

fn is_internal(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_internal(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
        }
    }
}
