//! Server registry.
//!
//! An ordered collection of server definitions. Insertion order is failover
//! priority; adding a definition whose normalized endpoint matches an
//! existing entry replaces that entry in place instead of appending.

use std::time::Duration;

use crate::config::Protocol;

/// One candidate directory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDefinition {
    /// Normalized endpoint URL; this is the entry's identity.
    pub url: String,
    /// Transport connect timeout; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Protocol operation timeout; `None` waits indefinitely.
    pub operation_timeout: Option<Duration>,
    /// Upgrade the connection with STARTTLS after connecting.
    pub start_tls: bool,
}

impl ServerDefinition {
    /// Build a definition from its configuration surface. Non-positive
    /// timeout seconds mean "wait indefinitely".
    pub fn new(
        host: &str,
        port: u16,
        protocol: Protocol,
        connect_timeout_secs: i64,
        operation_timeout_secs: i64,
    ) -> Self {
        let (_, start_tls) = protocol.scheme();
        Self {
            url: normalize_endpoint(host, port, protocol),
            connect_timeout: timeout_from_secs(connect_timeout_secs),
            operation_timeout: timeout_from_secs(operation_timeout_secs),
            start_tls,
        }
    }

    /// A definition for a referral target: the URL comes straight from the
    /// referral payload and gets the default referral connect timeout.
    pub(crate) fn for_referral(url: String, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout: Some(connect_timeout),
            operation_timeout: None,
            start_tls: false,
        }
    }
}

fn timeout_from_secs(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs as u64))
}

/// Normalize an endpoint into its identity URL: lowercased scheme and host,
/// explicit port. `ldapi` endpoints carry the socket path instead of
/// host and port.
pub fn normalize_endpoint(host: &str, port: u16, protocol: Protocol) -> String {
    let (scheme, _) = protocol.scheme();
    match protocol {
        Protocol::Ldapi => format!("ldapi://{host}"),
        _ => format!("{}://{}:{}", scheme, host.to_ascii_lowercase(), port),
    }
}

/// Ordered server collection; iteration order is failover order.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    servers: Vec<ServerDefinition>,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server definition, replacing any entry with the same
    /// normalized endpoint in place so failover order is preserved.
    pub fn add(&mut self, server: ServerDefinition) {
        match self.servers.iter_mut().find(|s| s.url == server.url) {
            Some(existing) => *existing = server,
            None => self.servers.push(server),
        }
    }

    /// Remove the entry with the given normalized endpoint; no-op if there
    /// is none.
    pub fn remove(&mut self, url: &str) {
        self.servers.retain(|s| s.url != url);
    }

    /// Servers in failover order.
    pub fn servers(&self) -> &[ServerDefinition] {
        &self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
