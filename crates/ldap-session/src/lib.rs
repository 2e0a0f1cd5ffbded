//! # ldap-session
//!
//! A resilient client-side session manager for LDAPv3 directories.
//!
//! The crate keeps an ordered registry of candidate servers, reuses one
//! live session per client across calls, bridges text values between a
//! caller-facing encoding and the wire encoding, maps record operations
//! onto protocol primitives, and transparently follows single-hop
//! referrals.
//!
//! ## Features
//!
//! - Ordered server registry with deterministic failover
//! - One cached session per client, with rebind-on-demand
//! - STARTTLS, LDAPS, and UNIX-domain-socket endpoints
//! - Modification inference by diffing against the current record
//! - Single-hop referral chasing with the client's own credentials
//!
//! ## Example
//!
//! ```ignore
//! use ldap_session::prelude::*;
//!
//! let config = LdapConfig::new("ldap.example.com")
//!     .with_credentials("cn=Manager,dc=example,dc=com", "secret");
//! let client = LdapClient::new(config)?;
//!
//! // Failover target on the TLS port.
//! client.add_server("ldap-backup.example.com", 636, Protocol::Ldaps, 5, 10);
//!
//! let result = client
//!     .search(
//!         "dc=example,dc=com",
//!         SearchScope::Subtree,
//!         &Filter::eq("uid", "jdoe").to_string(),
//!         None,
//!         None,
//!     )
//!     .await?;
//! for record in &result.records {
//!     println!("{}", record.dn);
//! }
//!
//! client.disconnect().await?;
//! ```
//!
//! ## Crate organization
//!
//! - [`config`] - Client configuration and transport variants
//! - [`registry`] - Ordered server registry
//! - [`cache`] - Client identities, credentials, and the session cache
//! - [`encoding`] - The API/wire encoding bridge
//! - [`dn`] - Distinguished-name escaping and parsing
//! - [`filter`] - Search filter construction
//! - [`operation`] - Values, records, modifications, search results
//! - [`transport`] - The wire transport contract and its `ldap3` backend
//! - [`client`] - The directory client itself
//! - [`error`] - Error types with transient/permanent classification

pub mod cache;
pub mod client;
pub mod config;
pub mod dn;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod operation;
pub mod registry;
pub mod transport;

pub use cache::{ClientId, Credentials, Session, SessionCache};
pub use client::LdapClient;
pub use config::{LdapConfig, Protocol};
pub use encoding::{EncodingBridge, BINARY_ATTRIBUTES};
pub use error::{DirectoryError, DirectoryResult};
pub use filter::Filter;
pub use operation::{
    AttrValues, DirValue, ModType, Modification, Record, SearchResult, SearchScope,
};
pub use registry::{ServerDefinition, ServerRegistry};
pub use transport::{
    DirectorySession, DirectoryTransport, Ldap3Transport, RawEntry, SearchOutcome, WriteOutcome,
};

/// Prelude module for convenient imports.
///
/// ```
/// use ldap_session::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::{ClientId, Credentials, SessionCache};
    pub use crate::client::LdapClient;
    pub use crate::config::{LdapConfig, Protocol};
    pub use crate::error::{DirectoryError, DirectoryResult};
    pub use crate::filter::Filter;
    pub use crate::operation::{
        AttrValues, DirValue, ModType, Modification, Record, SearchResult, SearchScope,
    };
}
