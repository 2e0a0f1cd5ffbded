//! Shared test fixtures: an in-memory directory served through the
//! transport contract, with scriptable failures and a call log.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ldap_session::prelude::*;
use ldap_session::registry::ServerDefinition;
use ldap_session::transport::{
    DirectorySession, DirectoryTransport, RawEntry, SearchOutcome, WireAttrs, WriteOutcome,
};

pub type AttrMap = HashMap<String, Vec<Vec<u8>>>;

/// The normalized URL of the server every test config points at.
pub const PRIMARY_URL: &str = "ldap://host:636";

/// Scriptable in-memory directory shared by all sessions of a
/// [`FakeTransport`].
#[derive(Default)]
pub struct DirectoryState {
    /// DN to attribute map.
    pub entries: HashMap<String, AttrMap>,
    /// Bind DNs with a required password; all other binds succeed.
    pub passwords: HashMap<String, String>,
    /// Endpoints refusing transport connections (transient failure).
    pub down: HashSet<String>,
    /// Endpoints failing connects with a non-transient error.
    pub broken: HashSet<String>,
    /// Endpoint to referral payload; such servers answer every operation
    /// with a referral.
    pub referrals: HashMap<String, String>,
    /// Deliver search results as a partial outcome.
    pub partial: bool,
    /// Mix a non-record reference into search results.
    pub junk_reference: bool,
    /// Every endpoint a connect was attempted against, in order.
    pub connect_log: Vec<String>,
    /// Every bind issued: (endpoint, bind DN, password).
    pub bind_log: Vec<(String, String, String)>,
    /// Every operation issued, e.g. `"modify ldap://host:636 cn=foo,dc=localhost"`.
    pub op_log: Vec<String>,
}

pub struct FakeTransport {
    pub state: Arc<Mutex<DirectoryState>>,
}

#[async_trait]
impl DirectoryTransport for FakeTransport {
    async fn connect(
        &self,
        server: &ServerDefinition,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let mut state = self.state.lock().unwrap();
        state.connect_log.push(server.url.clone());
        if state.down.contains(&server.url) {
            return Err(DirectoryError::unreachable(format!(
                "{} is down",
                server.url
            )));
        }
        if state.broken.contains(&server.url) {
            return Err(DirectoryError::invalid_configuration(format!(
                "{} is misconfigured",
                server.url
            )));
        }
        Ok(Box::new(FakeSession {
            url: server.url.clone(),
            state: self.state.clone(),
        }))
    }
}

pub struct FakeSession {
    url: String,
    state: Arc<Mutex<DirectoryState>>,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn simple_bind(&mut self, bind_dn: &str, password: &str) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .bind_log
            .push((self.url.clone(), bind_dn.to_string(), password.to_string()));
        if let Some(expected) = state.passwords.get(bind_dn) {
            if expected != password {
                return Err(DirectoryError::InvalidCredentials {
                    bind_dn: bind_dn.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        _attrs: Option<&[String]>,
    ) -> DirectoryResult<SearchOutcome> {
        let mut state = self.state.lock().unwrap();
        state.op_log.push(format!("search {} {}", self.url, base));
        if let Some(payload) = state.referrals.get(&self.url) {
            return Ok(SearchOutcome::Referral(payload.clone()));
        }
        if scope == SearchScope::Base && !state.entries.contains_key(base) {
            return Err(DirectoryError::NotFound {
                dn: base.to_string(),
            });
        }

        let mut entries: Vec<RawEntry> = Vec::new();
        if state.junk_reference {
            entries.push(RawEntry::Reference {
                urls: vec!["ldap://forest.example.com/dc=forest".to_string()],
            });
        }

        let mut matching: Vec<(&String, &AttrMap)> = state
            .entries
            .iter()
            .filter(|(dn, attrs)| matches_scope(dn, base, scope) && matches_filter(attrs, filter))
            .collect();
        matching.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (dn, attrs) in matching {
            let attrs = attrs
                .iter()
                .map(|(name, values)| {
                    (
                        name.clone(),
                        values.iter().map(|v| to_dir_value(v)).collect(),
                    )
                })
                .collect();
            entries.push(RawEntry::Record {
                dn: dn.clone(),
                attrs,
            });
        }

        if state.partial {
            Ok(SearchOutcome::Partial(entries))
        } else {
            Ok(SearchOutcome::Complete(entries))
        }
    }

    async fn add(&mut self, dn: &str, attrs: WireAttrs) -> DirectoryResult<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.op_log.push(format!("add {} {}", self.url, dn));
        if let Some(payload) = state.referrals.get(&self.url) {
            return Ok(WriteOutcome::Referral(payload.clone()));
        }
        if state.entries.contains_key(dn) {
            return Err(DirectoryError::AlreadyExists { dn: dn.to_string() });
        }
        let mut map = AttrMap::new();
        for (name, values) in attrs {
            map.insert(name, values);
        }
        state.entries.insert(dn.to_string(), map);
        Ok(WriteOutcome::Done)
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.op_log.push(format!("delete {} {}", self.url, dn));
        if let Some(payload) = state.referrals.get(&self.url) {
            return Ok(WriteOutcome::Referral(payload.clone()));
        }
        if state.entries.remove(dn).is_none() {
            return Err(DirectoryError::NotFound { dn: dn.to_string() });
        }
        Ok(WriteOutcome::Done)
    }

    async fn modify(
        &mut self,
        dn: &str,
        mods: Vec<Modification>,
    ) -> DirectoryResult<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.op_log.push(format!("modify {} {}", self.url, dn));
        if let Some(payload) = state.referrals.get(&self.url) {
            return Ok(WriteOutcome::Referral(payload.clone()));
        }
        let entry = state
            .entries
            .get_mut(dn)
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.to_string() })?;
        for modification in mods {
            match modification {
                Modification::Add { attribute, values } => {
                    entry.entry(attribute).or_default().extend(values);
                }
                Modification::Replace { attribute, values } => {
                    entry.insert(attribute, values);
                }
                Modification::Delete {
                    attribute,
                    values: None,
                } => {
                    entry.remove(&attribute);
                }
                Modification::Delete {
                    attribute,
                    values: Some(values),
                } => {
                    if let Some(existing) = entry.get_mut(&attribute) {
                        existing.retain(|v| !values.contains(v));
                        if existing.is_empty() {
                            entry.remove(&attribute);
                        }
                    }
                }
            }
        }
        Ok(WriteOutcome::Done)
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str) -> DirectoryResult<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        state
            .op_log
            .push(format!("rename {} {} {}", self.url, dn, new_rdn));
        if let Some(payload) = state.referrals.get(&self.url) {
            return Ok(WriteOutcome::Referral(payload.clone()));
        }
        let Some((attribute, value)) = new_rdn.split_once('=') else {
            return Err(DirectoryError::protocol(format!("bad rdn: {new_rdn}")));
        };
        let mut entry = state
            .entries
            .remove(dn)
            .ok_or_else(|| DirectoryError::NotFound { dn: dn.to_string() })?;
        entry.insert(attribute.to_string(), vec![value.as_bytes().to_vec()]);
        let new_dn = match dn.split_once(',') {
            Some((_, parent)) => format!("{new_rdn},{parent}"),
            None => new_rdn.to_string(),
        };
        if state.entries.contains_key(&new_dn) {
            return Err(DirectoryError::AlreadyExists { dn: new_dn });
        }
        state.entries.insert(new_dn, entry);
        Ok(WriteOutcome::Done)
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state.op_log.push(format!("unbind {}", self.url));
        Ok(())
    }
}

fn matches_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn.split_once(',').map(|(_, parent)| parent) == Some(base),
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

/// Understands presence and simple equality filters; everything else
/// matches all entries.
fn matches_filter(attrs: &AttrMap, filter: &str) -> bool {
    let inner = filter.trim().trim_start_matches('(').trim_end_matches(')');
    let Some((attribute, value)) = inner.split_once('=') else {
        return true;
    };
    if value == "*" {
        return attribute.eq_ignore_ascii_case("objectClass") || attrs.contains_key(attribute);
    }
    attrs
        .get(attribute)
        .is_some_and(|values| values.iter().any(|v| v == value.as_bytes()))
}

/// Bytes become text values when they are valid UTF-8, mirroring how the
/// production transport splits textual and binary attributes.
fn to_dir_value(bytes: &[u8]) -> DirValue {
    match std::str::from_utf8(bytes) {
        Ok(text) => DirValue::Text(text.to_string()),
        Err(_) => DirValue::Bytes(bytes.to_vec()),
    }
}

pub fn base_config() -> LdapConfig {
    LdapConfig::new("host")
        .with_port(636)
        .with_credentials("cn=Manager,dc=localhost", "pass")
}

pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn build_client(config: LdapConfig) -> (LdapClient, Arc<Mutex<DirectoryState>>) {
    init_tracing();
    let state = Arc::new(Mutex::new(DirectoryState::default()));
    let transport = Arc::new(FakeTransport {
        state: state.clone(),
    });
    let client = LdapClient::with_transport(config, transport).expect("client construction");
    (client, state)
}

pub fn simple_client() -> (LdapClient, Arc<Mutex<DirectoryState>>) {
    build_client(base_config())
}

pub fn seed_entry(state: &Arc<Mutex<DirectoryState>>, dn: &str, attrs: &[(&str, &[&str])]) {
    let mut map = AttrMap::new();
    for (name, values) in attrs {
        map.insert(
            (*name).to_string(),
            values.iter().map(|v| v.as_bytes().to_vec()).collect(),
        );
    }
    state.lock().unwrap().entries.insert(dn.to_string(), map);
}

pub fn entry_values(
    state: &Arc<Mutex<DirectoryState>>,
    dn: &str,
    attribute: &str,
) -> Option<Vec<Vec<u8>>> {
    state
        .lock()
        .unwrap()
        .entries
        .get(dn)
        .and_then(|entry| entry.get(attribute))
        .cloned()
}

pub fn text_values(
    state: &Arc<Mutex<DirectoryState>>,
    dn: &str,
    attribute: &str,
) -> Option<Vec<String>> {
    entry_values(state, dn, attribute).map(|values| {
        values
            .into_iter()
            .map(|v| String::from_utf8(v).expect("utf-8 value"))
            .collect()
    })
}

pub fn connect_log(state: &Arc<Mutex<DirectoryState>>) -> Vec<String> {
    state.lock().unwrap().connect_log.clone()
}

pub fn bind_log(state: &Arc<Mutex<DirectoryState>>) -> Vec<(String, String, String)> {
    state.lock().unwrap().bind_log.clone()
}

pub fn op_log(state: &Arc<Mutex<DirectoryState>>) -> Vec<String> {
    state.lock().unwrap().op_log.clone()
}

/// The operation names issued so far, e.g. `["search", "modify"]`.
pub fn op_names(state: &Arc<Mutex<DirectoryState>>) -> Vec<String> {
    op_log(state)
        .iter()
        .map(|op| op.split(' ').next().unwrap_or_default().to_string())
        .collect()
}
