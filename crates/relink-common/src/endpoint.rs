//! Candidate endpoints for the connector.
//!
//! Resolution itself is delegated to the system resolver via
//! [`tokio::net::lookup_host`]; this module only fixes the resolved
//! addresses into an ordered, immutable list.

use std::fmt;
use std::net::SocketAddr;

use crate::error::{RelinkError, Result};

/// Ordered list of candidate addresses, tried front to back.
///
/// The list is immutable once built. Duplicates are kept because the
/// resolver's order is meaningful (e.g. it may deliberately repeat an
/// address family preference).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Endpoints {
    addrs: Vec<SocketAddr>,
}

impl Endpoints {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs }
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SocketAddr> {
        self.addrs.iter()
    }

    /// Parses a list of literal `ip:port` strings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` for the first entry that is not a socket
    /// address. No DNS lookups are performed.
    pub fn parse<I, S>(addrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let addrs = addrs
            .into_iter()
            .map(|s| {
                let s = s.as_ref();
                s.parse::<SocketAddr>()
                    .map_err(|e| RelinkError::InvalidEndpoint(format!("'{}': {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { addrs })
    }
}

impl From<Vec<SocketAddr>> for Endpoints {
    fn from(addrs: Vec<SocketAddr>) -> Self {
        Self::new(addrs)
    }
}

impl FromIterator<SocketAddr> for Endpoints {
    fn from_iter<T: IntoIterator<Item = SocketAddr>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Endpoints {
    type Item = &'a SocketAddr;
    type IntoIter = std::slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

impl fmt::Display for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .addrs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "[{}]", joined)
    }
}

/// Resolves `host:port` into the ordered endpoint list.
///
/// # Errors
///
/// Returns `InvalidEndpoint` if the lookup fails or yields no addresses.
pub async fn resolve(host: &str, port: u16) -> Result<Endpoints> {
    let target = format!("{}:{}", host, port);
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| RelinkError::InvalidEndpoint(format!("Failed to resolve '{}': {}", target, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(RelinkError::InvalidEndpoint(format!(
            "'{}' resolved to no addresses",
            target
        )));
    }

    tracing::debug!(target = %target, count = addrs.len(), "Resolved endpoints");
    Ok(Endpoints::new(addrs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_order() {
        let endpoints = Endpoints::parse(["127.0.0.1:9002", "127.0.0.1:9001"]).unwrap();
        let ports: Vec<u16> = endpoints.iter().map(|a| a.port()).collect();
        assert_eq!(ports, vec![9002, 9001]);
    }

    #[test]
    fn test_parse_rejects_hostnames() {
        let result = Endpoints::parse(["localhost:9001"]);
        assert!(matches!(result, Err(RelinkError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_display() {
        let endpoints = Endpoints::parse(["127.0.0.1:1", "127.0.0.1:2"]).unwrap();
        assert_eq!(endpoints.to_string(), "[127.0.0.1:1, 127.0.0.1:2]");
    }

    #[test]
    fn test_empty() {
        let endpoints = Endpoints::default();
        assert!(endpoints.is_empty());
        assert_eq!(endpoints.len(), 0);
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let endpoints = resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints.iter().next().unwrap().port(), 8080);
    }
}
