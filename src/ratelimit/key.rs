//! Partition key derivation from request attributes.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Key used when no identity can be derived for a request.
///
/// All such requests share this one bucket.
pub const UNKNOWN_KEY: &str = "unknown";

/// The attributes of an incoming request a key can be derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    /// Address of the connected peer, if the transport exposes one
    pub remote_addr: Option<IpAddr>,
    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,
    /// Request path
    pub path: String,
}

impl RequestIdentity {
    /// Create an identity for a request to `path` with no address information.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the peer address.
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the `X-Forwarded-For` header value.
    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// First hop listed in `X-Forwarded-For`, if any.
    pub fn first_forwarded_hop(&self) -> Option<&str> {
        self.forwarded_for
            .as_deref()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
    }
}

/// Strategy mapping a request to the key its requests are counted under.
///
/// Returning `None` means the caller could not be identified.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, identity: &RequestIdentity) -> Option<String>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&RequestIdentity) -> Option<String> + Send + Sync,
{
    fn extract(&self, identity: &RequestIdentity) -> Option<String> {
        self(identity)
    }
}

/// Built-in key strategies selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// The peer address alone
    #[default]
    Address,
    /// The peer address combined with the request path
    AddressAndRoute,
    /// The first `X-Forwarded-For` hop, else the peer address
    ForwardedFor,
}

impl KeyExtractor for KeyStrategy {
    fn extract(&self, identity: &RequestIdentity) -> Option<String> {
        match self {
            KeyStrategy::Address => identity.remote_addr.map(|ip| ip.to_string()),
            KeyStrategy::AddressAndRoute => identity
                .remote_addr
                .map(|ip| format!("{}:{}", ip, identity.path)),
            KeyStrategy::ForwardedFor => identity
                .first_forwarded_hop()
                .map(str::to_owned)
                .or_else(|| identity.remote_addr.map(|ip| ip.to_string())),
        }
    }
}

impl fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyStrategy::Address => "address",
            KeyStrategy::AddressAndRoute => "address_and_route",
            KeyStrategy::ForwardedFor => "forwarded_for",
        };
        f.write_str(name)
    }
}

/// Apply `extractor`, falling back to [`UNKNOWN_KEY`] for a missing or blank key.
pub fn resolve_key(extractor: &dyn KeyExtractor, identity: &RequestIdentity) -> String {
    match extractor.extract(identity) {
        Some(key) if !key.trim().is_empty() => key,
        _ => UNKNOWN_KEY.to_string(),
    }
}
