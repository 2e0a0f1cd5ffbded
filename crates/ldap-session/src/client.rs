//! Directory client: session lifecycle, failover, and operation mapping.
//!
//! The client owns an ordered server registry and a slot in a shared
//! session cache. Operations connect lazily, reuse the cached session,
//! rebind when the effective credentials change, and follow a single
//! referral hop when the server asks for one.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{ClientId, Credentials, Session, SessionCache};
use crate::config::{LdapConfig, Protocol};
use crate::dn::{escape_dn, escape_dn_value, format_dn, parse_dn};
use crate::encoding::{is_binary_attribute, EncodingBridge, BINARY_SUFFIX};
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{
    AttrValues, DirValue, ModType, Modification, Record, SearchResult, SearchScope,
};
use crate::registry::{normalize_endpoint, ServerDefinition, ServerRegistry};
use crate::transport::{
    DirectorySession, DirectoryTransport, Ldap3Transport, RawEntry, SearchOutcome, WireAttrs,
    WriteOutcome,
};

/// Filter used when none is relevant, notably the base-scoped read that
/// precedes a modify.
const DEFAULT_FILTER: &str = "(objectClass=*)";

/// Connect timeout applied when chasing a referral, whose endpoint has no
/// registry entry to take timeouts from.
const REFERRAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type SessionGuard = OwnedMutexGuard<Option<Session>>;

/// A resilient directory client.
///
/// Constructed with zero or more initial servers; further servers can be
/// added or removed over its lifetime. All operations accept optional
/// override credentials and otherwise bind with the configured defaults.
pub struct LdapClient {
    id: ClientId,
    config: LdapConfig,
    bridge: EncodingBridge,
    /// Default bind identity, DN already canonicalized.
    default_bind: Credentials,
    registry: RwLock<ServerRegistry>,
    cache: Arc<SessionCache>,
    transport: Arc<dyn DirectoryTransport>,
}

impl LdapClient {
    /// Create a client speaking LDAP over the `ldap3` transport.
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        Self::with_transport(config, Arc::new(Ldap3Transport))
    }

    /// Create a client over a custom transport.
    pub fn with_transport(
        config: LdapConfig,
        transport: Arc<dyn DirectoryTransport>,
    ) -> DirectoryResult<Self> {
        Self::with_session_cache(config, transport, Arc::new(SessionCache::new()))
    }

    /// Create a client sharing an existing session cache.
    pub fn with_session_cache(
        config: LdapConfig,
        transport: Arc<dyn DirectoryTransport>,
        cache: Arc<SessionCache>,
    ) -> DirectoryResult<Self> {
        config.validate()?;
        let bridge = EncodingBridge::new(
            config.api_encoding.as_deref(),
            config.directory_encoding.as_deref(),
        )?;
        let default_bind = Credentials::new(
            escape_dn(&config.bind_dn)?,
            config.bind_password.clone().unwrap_or_default(),
        );

        let mut registry = ServerRegistry::new();
        if !config.host.is_empty() {
            registry.add(ServerDefinition::new(
                &config.host,
                config.port,
                config.protocol,
                config.connect_timeout_secs,
                config.operation_timeout_secs,
            ));
        }

        Ok(Self {
            id: ClientId::next(),
            config,
            bridge,
            default_bind,
            registry: RwLock::new(registry),
            cache,
            transport,
        })
    }

    /// This client's cache identity.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The session cache this client uses.
    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Registered servers in failover order.
    pub fn servers(&self) -> Vec<ServerDefinition> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .servers()
            .to_vec()
    }

    /// Add a server definition, replacing any entry for the same endpoint.
    /// Non-positive timeout seconds mean "wait indefinitely".
    pub fn add_server(
        &self,
        host: &str,
        port: u16,
        protocol: Protocol,
        connect_timeout_secs: i64,
        operation_timeout_secs: i64,
    ) {
        let server = ServerDefinition::new(
            host,
            port,
            protocol,
            connect_timeout_secs,
            operation_timeout_secs,
        );
        debug!(url = %server.url, "adding directory server");
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(server);
    }

    /// Remove a server definition; no-op if it is not registered. A live
    /// session against the removed server stays usable until it fails or
    /// is disconnected.
    pub fn remove_server(&self, host: &str, port: u16, protocol: Protocol) {
        let url = normalize_endpoint(host, port, protocol);
        debug!(url = %url, "removing directory server");
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&url);
    }

    /// Establish and bind the cached session. Called implicitly by every
    /// operation; calling it with fresh credentials rebinds the cached
    /// session.
    #[instrument(skip(self, credentials), fields(id = %self.id))]
    pub async fn connect(&self, credentials: Option<&Credentials>) -> DirectoryResult<()> {
        self.bound_session(credentials).await.map(drop)
    }

    /// Unbind and drop the cached session. Idempotent.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn disconnect(&self) -> DirectoryResult<()> {
        let slot = self.cache.slot(self.id);
        let mut guard = slot.lock_owned().await;
        if let Some(mut session) = guard.take() {
            if let Err(err) = session.wire().unbind().await {
                warn!(error = %err, "error during unbind");
            }
            info!("directory session closed");
        }
        Ok(())
    }

    /// Search for entries under `base`.
    ///
    /// A truncated ("partial") result set from the server is returned as a
    /// success. Entries without a proper attribute mapping are dropped.
    /// Each record carries an injected `dn` attribute.
    #[instrument(skip(self, credentials), fields(id = %self.id, base = %base))]
    pub async fn search(
        &self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attrs: Option<&[String]>,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<SearchResult> {
        let wire_filter = self.bridge.incoming_str(filter)?;
        let wire_base = escape_dn(&self.bridge.incoming_str(base)?)?;

        let mut guard = self.bound_session(credentials).await?;
        let session = session_mut(&mut guard)?;
        let outcome = session
            .wire()
            .search(&wire_base, scope, &wire_filter, attrs)
            .await?;

        let entries = match outcome {
            SearchOutcome::Complete(entries) | SearchOutcome::Partial(entries) => entries,
            SearchOutcome::Referral(payload) => {
                drop(guard);
                let mut referred = self.referral_session(&payload).await?;
                let retried = referred.search(&wire_base, scope, &wire_filter, attrs).await;
                if let Err(err) = referred.unbind().await {
                    debug!(error = %err, "error unbinding referral session");
                }
                match retried? {
                    SearchOutcome::Complete(entries) | SearchOutcome::Partial(entries) => entries,
                    SearchOutcome::Referral(url) => {
                        return Err(DirectoryError::UnfollowedReferral { url })
                    }
                }
            }
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let RawEntry::Record { dn, attrs } = entry else {
                debug!("dropping non-record search result entry");
                continue;
            };
            let mut converted: HashMap<String, Vec<DirValue>> =
                HashMap::with_capacity(attrs.len() + 1);
            for (name, values) in attrs {
                let values = if is_binary_attribute(&name) {
                    values
                } else {
                    let mut out = Vec::with_capacity(values.len());
                    for value in values {
                        out.push(self.bridge.outgoing(value)?);
                    }
                    out
                };
                converted.insert(name, values);
            }
            let dn_value = self.bridge.outgoing(DirValue::Text(dn.clone()))?;
            converted.insert("dn".to_string(), vec![dn_value]);
            records.push(Record {
                dn,
                attrs: converted,
            });
        }

        debug!(count = records.len(), "search completed");
        Ok(SearchResult {
            count: records.len(),
            records,
        })
    }

    /// Insert a new record at `rdn + "," + base`.
    ///
    /// Keys ending in `;binary` have the marker stripped and their values
    /// passed to the wire unconverted. A single string value is split on
    /// semicolons into a trimmed multivalue list; attributes whose value
    /// list is a lone empty string are omitted entirely.
    #[instrument(skip(self, attrs, credentials), fields(id = %self.id, base = %base, rdn = %rdn))]
    pub async fn insert(
        &self,
        base: &str,
        rdn: &str,
        attrs: Vec<(String, AttrValues)>,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<()> {
        self.ensure_writable()?;
        let base = escape_dn(&self.bridge.incoming_str(base)?)?;
        let rdn = escape_dn(&self.bridge.incoming_str(rdn)?)?;
        let dn = format!("{rdn},{base}");

        let mut wire_attrs: WireAttrs = Vec::new();
        for (key, values) in &attrs {
            let (attribute, is_binary) = strip_binary_marker(key);
            let wire_values = self.request_values(values, is_binary, true)?;
            if is_empty_marker(&wire_values) {
                continue;
            }
            wire_attrs.push((attribute, wire_values));
        }

        let guard = self.bound_session(credentials).await?;
        self.execute_write(
            guard,
            WriteOp::Add {
                dn: &dn,
                attrs: &wire_attrs,
            },
        )
        .await?;
        info!(dn = %dn, "inserted directory entry");
        Ok(())
    }

    /// Delete the record with the given DN.
    #[instrument(skip(self, credentials), fields(id = %self.id, dn = %dn))]
    pub async fn delete(&self, dn: &str, credentials: Option<&Credentials>) -> DirectoryResult<()> {
        self.ensure_writable()?;
        let dn = escape_dn(&self.bridge.incoming_str(dn)?)?;
        let guard = self.bound_session(credentials).await?;
        self.execute_write(guard, WriteOp::Delete { dn: &dn }).await?;
        info!(dn = %dn, "deleted directory entry");
        Ok(())
    }

    /// Modify the record with the given DN.
    ///
    /// Without an explicit `mod_type` the modification for each attribute
    /// is inferred by diffing the request against the current record. An
    /// explicit `Delete` only applies when the requested value set exactly
    /// matches the current one. If the request changes the record's naming
    /// attribute, the entry is renamed before the remaining modifications
    /// are applied.
    #[instrument(skip(self, attrs, credentials), fields(id = %self.id, dn = %dn))]
    pub async fn modify(
        &self,
        dn: &str,
        mod_type: Option<ModType>,
        attrs: Vec<(String, AttrValues)>,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<()> {
        self.ensure_writable()?;
        let wire_dn = self.bridge.incoming_str(dn)?;
        let mut target_dn = escape_dn(&wire_dn)?;

        let found = self
            .search(&wire_dn, SearchScope::Base, DEFAULT_FILTER, None, credentials)
            .await?;
        let current = found.records.into_iter().next().ok_or_else(|| {
            DirectoryError::NotFound {
                dn: target_dn.clone(),
            }
        })?;

        let modifications = self.build_modifications(&current, &attrs, mod_type)?;

        // A request that changes the entry's naming attribute becomes a
        // rename of the RDN, applied before the attribute modifications.
        let mut components = parse_dn(&target_dn)?;
        if let Some((rdn_attr, _)) = components.first().cloned() {
            if let Some(requested) = first_requested_value(&attrs, &rdn_attr) {
                let current_first = current
                    .attrs
                    .get(&rdn_attr)
                    .and_then(|values| values.first());
                let differs = match current_first {
                    Some(current_value) => {
                        self.bridge.wire_bytes(&requested)?
                            != self.bridge.wire_bytes(current_value)?
                    }
                    None => true,
                };
                if !requested.is_empty() && differs {
                    let new_value = requested
                        .as_text()
                        .map(str::to_string)
                        .ok_or_else(|| DirectoryError::InvalidDn {
                            dn: target_dn.clone(),
                        })?;
                    let wire_value = self.bridge.incoming_str(&new_value)?;
                    let new_rdn = format!("{}={}", rdn_attr, escape_dn_value(&wire_value));
                    let guard = self.bound_session(credentials).await?;
                    self.execute_write(
                        guard,
                        WriteOp::Rename {
                            dn: &target_dn,
                            new_rdn: &new_rdn,
                        },
                    )
                    .await?;
                    info!(dn = %target_dn, new_rdn = %new_rdn, "renamed directory entry");
                    components[0].1 = wire_value;
                    target_dn = format_dn(&components);
                }
            }
        }

        if modifications.is_empty() {
            debug!(dn = %target_dn, "nothing to modify");
            return Ok(());
        }

        let guard = self.bound_session(credentials).await?;
        self.execute_write(
            guard,
            WriteOp::Modify {
                dn: &target_dn,
                mods: &modifications,
            },
        )
        .await?;
        info!(dn = %target_dn, count = modifications.len(), "modified directory entry");
        Ok(())
    }

    /// Resolve the bind identity for an operation: caller-supplied
    /// credentials if given, else the configured defaults, with the DN
    /// canonicalized and converted to its wire form.
    fn effective_credentials(
        &self,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<Credentials> {
        match credentials {
            None => Ok(Credentials::new(
                self.bridge.incoming_str(&self.default_bind.bind_dn)?,
                self.default_bind.password.clone(),
            )),
            Some(given) => Ok(Credentials::new(
                escape_dn(&self.bridge.incoming_str(&given.bind_dn)?)?,
                given.password.clone(),
            )),
        }
    }

    /// Lock this client's cache slot, establishing a session if there is
    /// none and rebinding when the effective credentials differ from the
    /// session's last bind.
    ///
    /// Connect attempts walk the registry in failover order; transient
    /// transport errors move on to the next server and the last one is
    /// re-raised if every server fails.
    async fn bound_session(
        &self,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<SessionGuard> {
        let effective = self.effective_credentials(credentials)?;

        let slot = self.cache.slot(self.id);
        let mut guard = slot.lock_owned().await;

        // A session established earlier stays usable even if its server has
        // since been removed from the registry.
        if guard.is_none() {
            let servers = self.servers();
            if servers.is_empty() {
                return Err(DirectoryError::NoServers);
            }
            let mut last_error: Option<DirectoryError> = None;
            for server in &servers {
                match self.transport.connect(server).await {
                    Ok(wire) => {
                        info!(url = %server.url, "directory connection established");
                        *guard = Some(Session::new(wire));
                        last_error = None;
                        break;
                    }
                    Err(err) if err.is_transient() => {
                        warn!(url = %server.url, error = %err, "server unavailable, trying next");
                        last_error = Some(err);
                    }
                    Err(err) => return Err(err),
                }
            }
            if let Some(err) = last_error {
                return Err(err);
            }
        }

        let session = session_mut(&mut guard)?;
        if session.needs_bind(&effective) {
            debug!(bind_dn = %effective.bind_dn, "binding directory session");
            session
                .wire()
                .simple_bind(&effective.bind_dn, &effective.password)
                .await?;
            session.record_bind(effective);
        }

        Ok(guard)
    }

    /// Run a write operation, following at most one referral.
    async fn execute_write(
        &self,
        mut guard: SessionGuard,
        op: WriteOp<'_>,
    ) -> DirectoryResult<()> {
        let session = session_mut(&mut guard)?;
        match op.dispatch(session.wire()).await? {
            WriteOutcome::Done => Ok(()),
            WriteOutcome::Referral(payload) => {
                drop(guard);
                let mut referred = self.referral_session(&payload).await?;
                let retried = op.dispatch(referred.as_mut()).await;
                if let Err(err) = referred.unbind().await {
                    debug!(error = %err, "error unbinding referral session");
                }
                match retried? {
                    WriteOutcome::Done => Ok(()),
                    WriteOutcome::Referral(url) => {
                        Err(DirectoryError::UnfollowedReferral { url })
                    }
                }
            }
        }
    }

    /// Connect and bind to the endpoint named in a referral payload. The
    /// session is temporary and never cached; the bind always uses the
    /// client's own configured credentials.
    async fn referral_session(
        &self,
        payload: &str,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let url = referral_url(payload)?;
        info!(url = %url, "following referral");
        let server = ServerDefinition::for_referral(url, REFERRAL_CONNECT_TIMEOUT);
        let mut session = self.transport.connect(&server).await?;
        let credentials = self.effective_credentials(None)?;
        session
            .simple_bind(&credentials.bind_dn, &credentials.password)
            .await?;
        Ok(session)
    }

    /// Build the wire modification list for a modify request.
    fn build_modifications(
        &self,
        current: &Record,
        attrs: &[(String, AttrValues)],
        mod_type: Option<ModType>,
    ) -> DirectoryResult<Vec<Modification>> {
        let mut modifications = Vec::new();

        for (key, values) in attrs {
            let (attribute, is_binary) = strip_binary_marker(key);
            let wire_values = self.request_values(values, is_binary, false)?;
            let empty_marker = is_empty_marker(&wire_values);

            let current_values = match current.attrs.get(&attribute) {
                Some(values) => Some(
                    values
                        .iter()
                        .map(|value| self.bridge.wire_bytes(value))
                        .collect::<DirectoryResult<Vec<_>>>()?,
                ),
                None => None,
            };

            match mod_type {
                None => {
                    // A missing attribute compares as a single empty value.
                    let current_or_empty = current_values
                        .clone()
                        .unwrap_or_else(|| vec![Vec::new()]);
                    if current_values.is_none() && !empty_marker {
                        modifications.push(Modification::Add {
                            attribute,
                            values: wire_values,
                        });
                    } else if current_or_empty != wire_values
                        && !empty_marker
                        && !wire_values.is_empty()
                    {
                        modifications.push(Modification::Replace {
                            attribute,
                            values: wire_values,
                        });
                    } else if current_values.is_some()
                        && (empty_marker || wire_values.is_empty())
                    {
                        modifications.push(Modification::Delete {
                            attribute,
                            values: None,
                        });
                    }
                }
                Some(ModType::Add | ModType::Delete) if empty_marker => continue,
                Some(ModType::Delete) => {
                    // Only delete when the requested values match the
                    // current value set exactly; partial overlap is ignored.
                    let requested: HashSet<&Vec<u8>> = wire_values.iter().collect();
                    let existing: HashSet<&Vec<u8>> = current_values
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .collect();
                    if requested != existing {
                        continue;
                    }
                    modifications.push(Modification::Delete {
                        attribute,
                        values: Some(wire_values),
                    });
                }
                Some(ModType::Add) => modifications.push(Modification::Add {
                    attribute,
                    values: wire_values,
                }),
                Some(ModType::Replace) => modifications.push(Modification::Replace {
                    attribute,
                    values: wire_values,
                }),
            }
        }

        Ok(modifications)
    }

    /// Normalize request values into wire bytes. Binary-marked values pass
    /// through raw; single strings split on semicolons, trimmed only for
    /// inserts.
    fn request_values(
        &self,
        values: &AttrValues,
        is_binary: bool,
        trim: bool,
    ) -> DirectoryResult<Vec<Vec<u8>>> {
        if is_binary {
            let raw = match values {
                AttrValues::Single(value) => vec![DirValue::Text(value.clone())],
                AttrValues::Many(list) => list.iter().cloned().map(DirValue::Text).collect(),
                AttrValues::Binary(list) => list.iter().cloned().map(DirValue::Bytes).collect(),
            };
            return Ok(raw.into_iter().map(DirValue::into_bytes).collect());
        }

        let values: Vec<DirValue> = match values {
            AttrValues::Single(value) => value
                .split(';')
                .map(|part| {
                    DirValue::Text(if trim {
                        part.trim().to_string()
                    } else {
                        part.to_string()
                    })
                })
                .collect(),
            AttrValues::Many(list) => list.iter().cloned().map(DirValue::Text).collect(),
            AttrValues::Binary(list) => list.iter().cloned().map(DirValue::Bytes).collect(),
        };
        values
            .iter()
            .map(|value| self.bridge.wire_bytes(value))
            .collect()
    }

    fn ensure_writable(&self) -> DirectoryResult<()> {
        if self.config.read_only {
            return Err(DirectoryError::ReadOnly);
        }
        Ok(())
    }
}

impl std::fmt::Debug for LdapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapClient")
            .field("id", &self.id)
            .field("config", &self.config.redacted())
            .finish()
    }
}

/// A write operation, kept around so a referral retry can re-dispatch it.
enum WriteOp<'a> {
    Add { dn: &'a str, attrs: &'a WireAttrs },
    Delete { dn: &'a str },
    Modify { dn: &'a str, mods: &'a [Modification] },
    Rename { dn: &'a str, new_rdn: &'a str },
}

impl WriteOp<'_> {
    async fn dispatch(
        &self,
        session: &mut dyn DirectorySession,
    ) -> DirectoryResult<WriteOutcome> {
        match self {
            WriteOp::Add { dn, attrs } => session.add(dn, (*attrs).clone()).await,
            WriteOp::Delete { dn } => session.delete(dn).await,
            WriteOp::Modify { dn, mods } => session.modify(dn, mods.to_vec()).await,
            WriteOp::Rename { dn, new_rdn } => session.rename(dn, new_rdn).await,
        }
    }
}

fn session_mut(guard: &mut SessionGuard) -> DirectoryResult<&mut Session> {
    guard
        .as_mut()
        .ok_or_else(|| DirectoryError::local("no live session in cache slot"))
}

fn strip_binary_marker(key: &str) -> (String, bool) {
    match key.strip_suffix(BINARY_SUFFIX) {
        Some(stripped) => (stripped.to_string(), true),
        None => (key.to_string(), false),
    }
}

/// Whether a value list is the "no value" marker: a lone empty value.
fn is_empty_marker(values: &[Vec<u8>]) -> bool {
    values.len() == 1 && values[0].is_empty()
}

/// The first value requested for an attribute, unsplit and unconverted.
fn first_requested_value(attrs: &[(String, AttrValues)], attribute: &str) -> Option<DirValue> {
    let (_, values) = attrs.iter().find(|(key, _)| key == attribute)?;
    match values {
        AttrValues::Single(value) => Some(DirValue::Text(value.clone())),
        AttrValues::Many(list) => list.first().map(|value| DirValue::Text(value.clone())),
        AttrValues::Binary(list) => list.first().map(|value| DirValue::Bytes(value.clone())),
    }
}

/// Extract and validate the directory URL embedded in a referral payload.
fn referral_url(payload: &str) -> DirectoryResult<String> {
    let bad = || DirectoryError::BadReferral {
        payload: payload.to_string(),
    };
    let start = payload.find("ldap").ok_or_else(bad)?;
    let candidate = &payload[start..];
    let parsed = Url::parse(candidate).map_err(|_| bad())?;
    if !parsed.scheme().starts_with("ldap") {
        return Err(bad());
    }
    Ok(candidate.to_string())
}
