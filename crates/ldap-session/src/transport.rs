//! Wire transport contract and its `ldap3`-backed implementation.
//!
//! The client talks to the directory through these traits so that the
//! session-management and operation-mapping logic stays independent of the
//! protocol library. Expected protocol outcomes that are not failures —
//! complete results, partial results, referrals — are explicit variants
//! rather than errors.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod, SearchEntry};
use tracing::{debug, warn};

use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{DirValue, Modification, SearchScope};
use crate::registry::ServerDefinition;

/// Attribute payload for an add operation, values already in wire bytes.
pub type WireAttrs = Vec<(String, Vec<Vec<u8>>)>;

/// One item of a raw search response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    /// A proper record with an attribute mapping.
    Record {
        dn: String,
        attrs: Vec<(String, Vec<DirValue>)>,
    },
    /// A continuation reference or other non-record item some servers mix
    /// into results; the client drops these.
    Reference { urls: Vec<String> },
}

/// Outcome of a search call.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The full result set.
    Complete(Vec<RawEntry>),
    /// A truncated result set; still a success for the caller.
    Partial(Vec<RawEntry>),
    /// The server asks for the operation to be retried elsewhere; the
    /// payload contains the referred directory URL.
    Referral(String),
}

/// Outcome of a write call (add, delete, modify, rename).
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Done,
    /// As for searches: retry against the URL embedded in the payload.
    Referral(String),
}

/// Connection factory honoring a server definition's timeouts and
/// STARTTLS flag.
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    async fn connect(
        &self,
        server: &ServerDefinition,
    ) -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// One live protocol connection.
///
/// Implementations must not chase referrals on their own; referral results
/// surface as [`SearchOutcome::Referral`] / [`WriteOutcome::Referral`] and
/// the client follows a single hop explicitly.
#[async_trait]
pub trait DirectorySession: Send + Sync {
    async fn simple_bind(&mut self, bind_dn: &str, password: &str) -> DirectoryResult<()>;

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: Option<&[String]>,
    ) -> DirectoryResult<SearchOutcome>;

    async fn add(&mut self, dn: &str, attrs: WireAttrs) -> DirectoryResult<WriteOutcome>;

    async fn delete(&mut self, dn: &str) -> DirectoryResult<WriteOutcome>;

    async fn modify(
        &mut self,
        dn: &str,
        mods: Vec<Modification>,
    ) -> DirectoryResult<WriteOutcome>;

    /// Change the entry's RDN, deleting the old naming value.
    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<WriteOutcome>;

    async fn unbind(&mut self) -> DirectoryResult<()>;
}

/// Production transport backed by the `ldap3` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Transport;

#[async_trait]
impl DirectoryTransport for Ldap3Transport {
    async fn connect(
        &self,
        server: &ServerDefinition,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let mut settings = LdapConnSettings::new().set_starttls(server.start_tls);
        if let Some(timeout) = server.connect_timeout {
            settings = settings.set_conn_timeout(timeout);
        }

        debug!(url = %server.url, "connecting to directory server");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &server.url)
            .await
            .map_err(map_ldap_error)?;

        tokio::spawn(async move {
            if let Err(err) = conn.drive().await {
                warn!(error = %err, "directory connection driver error");
            }
        });

        Ok(Box::new(Ldap3Session {
            ldap,
            operation_timeout: server.operation_timeout,
        }))
    }
}

struct Ldap3Session {
    ldap: Ldap,
    operation_timeout: Option<Duration>,
}

impl Ldap3Session {
    /// The protocol handle with the operation timeout armed for the next
    /// call.
    fn handle(&mut self) -> &mut Ldap {
        if let Some(timeout) = self.operation_timeout {
            self.ldap.with_timeout(timeout);
        }
        &mut self.ldap
    }
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn simple_bind(&mut self, bind_dn: &str, password: &str) -> DirectoryResult<()> {
        let result = self
            .handle()
            .simple_bind(bind_dn, password)
            .await
            .map_err(map_ldap_error)?;
        match result.rc {
            0 => Ok(()),
            49 => Err(DirectoryError::InvalidCredentials {
                bind_dn: bind_dn.to_string(),
            }),
            _ => Err(result_error("bind", &result)),
        }
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: Option<&[String]>,
    ) -> DirectoryResult<SearchOutcome> {
        let attrs: Vec<&str> = attrs
            .map(|list| list.iter().map(String::as_str).collect())
            .unwrap_or_default();

        let ldap3::SearchResult(entries, result) = self
            .handle()
            .search(base, map_scope(scope), filter, attrs)
            .await
            .map_err(map_ldap_error)?;

        match result.rc {
            // 3 = timeLimitExceeded, 4 = sizeLimitExceeded, 9 = the legacy
            // partial-results code: all deliver what was collected so far.
            0 => Ok(SearchOutcome::Complete(convert_entries(entries, &result))),
            3 | 4 | 9 => Ok(SearchOutcome::Partial(convert_entries(entries, &result))),
            10 => Ok(SearchOutcome::Referral(referral_payload(&result))),
            32 => Err(DirectoryError::NotFound {
                dn: base.to_string(),
            }),
            _ => Err(result_error("search", &result)),
        }
    }

    async fn add(&mut self, dn: &str, attrs: WireAttrs) -> DirectoryResult<WriteOutcome> {
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attrs
            .into_iter()
            .map(|(name, values)| (name.into_bytes(), values.into_iter().collect()))
            .collect();
        let result = self
            .handle()
            .add(dn, attrs)
            .await
            .map_err(map_ldap_error)?;
        write_outcome(dn, &result)
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<WriteOutcome> {
        let result = self.handle().delete(dn).await.map_err(map_ldap_error)?;
        write_outcome(dn, &result)
    }

    async fn modify(
        &mut self,
        dn: &str,
        mods: Vec<Modification>,
    ) -> DirectoryResult<WriteOutcome> {
        let mods: Vec<Mod<Vec<u8>>> = mods.into_iter().map(map_modification).collect();
        let result = self
            .handle()
            .modify(dn, mods)
            .await
            .map_err(map_ldap_error)?;
        write_outcome(dn, &result)
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<WriteOutcome> {
        let result = self
            .handle()
            .modifydn(dn, new_rdn, true, None)
            .await
            .map_err(map_ldap_error)?;
        write_outcome(dn, &result)
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.ldap.unbind().await.map_err(map_ldap_error)
    }
}

fn map_scope(scope: SearchScope) -> ldap3::Scope {
    match scope {
        SearchScope::Base => ldap3::Scope::Base,
        SearchScope::OneLevel => ldap3::Scope::OneLevel,
        SearchScope::Subtree => ldap3::Scope::Subtree,
    }
}

fn map_modification(modification: Modification) -> Mod<Vec<u8>> {
    match modification {
        Modification::Add { attribute, values } => {
            Mod::Add(attribute.into_bytes(), values.into_iter().collect())
        }
        Modification::Replace { attribute, values } => {
            Mod::Replace(attribute.into_bytes(), values.into_iter().collect())
        }
        Modification::Delete { attribute, values } => Mod::Delete(
            attribute.into_bytes(),
            values.unwrap_or_default().into_iter().collect(),
        ),
    }
}

fn convert_entries(entries: Vec<ldap3::ResultEntry>, result: &LdapResult) -> Vec<RawEntry> {
    let mut raw = Vec::with_capacity(entries.len() + 1);
    for entry in entries {
        let entry = SearchEntry::construct(entry);
        if entry.dn.is_empty() && entry.attrs.is_empty() && entry.bin_attrs.is_empty() {
            continue;
        }
        let mut attrs: Vec<(String, Vec<DirValue>)> = entry
            .attrs
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().map(DirValue::Text).collect()))
            .collect();
        for (name, values) in entry.bin_attrs {
            attrs.push((name, values.into_iter().map(DirValue::Bytes).collect()));
        }
        raw.push(RawEntry::Record {
            dn: entry.dn,
            attrs,
        });
    }
    if !result.refs.is_empty() {
        raw.push(RawEntry::Reference {
            urls: result.refs.clone(),
        });
    }
    raw
}

fn write_outcome(dn: &str, result: &LdapResult) -> DirectoryResult<WriteOutcome> {
    match result.rc {
        0 => Ok(WriteOutcome::Done),
        9 | 10 => Ok(WriteOutcome::Referral(referral_payload(result))),
        32 => Err(DirectoryError::NotFound { dn: dn.to_string() }),
        68 => Err(DirectoryError::AlreadyExists { dn: dn.to_string() }),
        _ => Err(result_error("write", result)),
    }
}

fn referral_payload(result: &LdapResult) -> String {
    result
        .refs
        .first()
        .cloned()
        .unwrap_or_else(|| result.text.clone())
}

fn result_error(operation: &str, result: &LdapResult) -> DirectoryError {
    DirectoryError::protocol(format!(
        "{operation} failed with result code {}: {}",
        result.rc, result.text
    ))
}

fn map_ldap_error(err: ldap3::LdapError) -> DirectoryError {
    use ldap3::LdapError;
    match err {
        LdapError::Io { source } => {
            DirectoryError::unreachable_with_source("transport I/O failure", source)
        }
        LdapError::EndOfStream => DirectoryError::unreachable("connection closed by peer"),
        err @ LdapError::Timeout { .. } => DirectoryError::timeout(err.to_string()),
        err => DirectoryError::local(err.to_string()),
    }
}
