//! Client configuration.
//!
//! Configuration for the directory client: initial endpoint, default bind
//! credentials, timeouts, and the two text encodings bridged by
//! [`crate::encoding::EncodingBridge`].

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Transport variant for a server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Unencrypted traffic on the standard port.
    Ldap,
    /// Encrypted traffic to a separate TLS port.
    Ldaps,
    /// Encrypted traffic on the standard port via STARTTLS.
    LdapTls,
    /// Traffic through a UNIX domain socket on the file system.
    Ldapi,
}

impl Protocol {
    /// The URL scheme this variant uses on the wire, and whether the
    /// connection must be upgraded with STARTTLS after connecting.
    ///
    /// `LdapTls` is plain `ldap` on the wire; the upgrade happens in-band.
    pub(crate) fn scheme(self) -> (&'static str, bool) {
        match self {
            Protocol::Ldap => ("ldap", false),
            Protocol::Ldaps => ("ldaps", false),
            Protocol::LdapTls => ("ldap", true),
            Protocol::Ldapi => ("ldapi", false),
        }
    }
}

/// Configuration for a directory client.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Initial server hostname, or the socket path for `ldapi`. An empty
    /// host means the client starts with an empty server registry.
    #[serde(default)]
    pub host: String,

    /// Initial server port (389 for `ldap`, 636 for `ldaps`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport variant for the initial server.
    #[serde(default = "default_protocol")]
    pub protocol: Protocol,

    /// Default bind DN; empty means anonymous binds.
    #[serde(default)]
    pub bind_dn: String,

    /// Default bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Reject all mutating operations.
    #[serde(default)]
    pub read_only: bool,

    /// Seconds to wait for a transport connect before failing over to the
    /// next server. Non-positive means "wait indefinitely".
    #[serde(default = "default_timeout")]
    pub connect_timeout_secs: i64,

    /// Seconds to wait for a protocol operation to complete. Non-positive
    /// means "wait indefinitely".
    #[serde(default = "default_timeout")]
    pub operation_timeout_secs: i64,

    /// Label of the caller-facing text encoding. Unset means callers work
    /// with plain Rust strings and byte values pass through opaquely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_encoding: Option<String>,

    /// Label of the wire text encoding.
    #[serde(default = "default_directory_encoding")]
    pub directory_encoding: Option<String>,
}

fn default_port() -> u16 {
    389
}

fn default_protocol() -> Protocol {
    Protocol::Ldap
}

fn default_timeout() -> i64 {
    -1
}

fn default_directory_encoding() -> Option<String> {
    Some("utf-8".to_string())
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            protocol: default_protocol(),
            bind_dn: String::new(),
            bind_password: None,
            read_only: false,
            connect_timeout_secs: default_timeout(),
            operation_timeout_secs: default_timeout(),
            api_encoding: None,
            directory_encoding: default_directory_encoding(),
        }
    }
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("read_only", &self.read_only)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("api_encoding", &self.api_encoding)
            .field("directory_encoding", &self.directory_encoding)
            .finish()
    }
}

impl LdapConfig {
    /// Create a config for an initial server on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the initial server port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the transport variant for the initial server.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Set the default bind credentials.
    pub fn with_credentials(
        mut self,
        bind_dn: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Self {
        self.bind_dn = bind_dn.into();
        self.bind_password = Some(bind_password.into());
        self
    }

    /// Mark the client read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Set connect and operation timeouts in seconds; non-positive values
    /// mean "wait indefinitely".
    #[must_use]
    pub fn with_timeouts(mut self, connect_secs: i64, operation_secs: i64) -> Self {
        self.connect_timeout_secs = connect_secs;
        self.operation_timeout_secs = operation_secs;
        self
    }

    /// Set the caller-facing text encoding by label.
    pub fn with_api_encoding(mut self, label: impl Into<String>) -> Self {
        self.api_encoding = Some(label.into());
        self
    }

    /// Set the wire text encoding by label, or `None` to pass byte values
    /// through untouched.
    #[must_use]
    pub fn with_directory_encoding(mut self, label: Option<String>) -> Self {
        self.directory_encoding = label;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        for label in [&self.api_encoding, &self.directory_encoding]
            .into_iter()
            .flatten()
        {
            if Encoding::for_label(label.as_bytes()).is_none() {
                return Err(DirectoryError::invalid_configuration(format!(
                    "unknown encoding label: {label}"
                )));
            }
        }
        Ok(())
    }

    /// A copy safe for logging, with the password redacted.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }
}
