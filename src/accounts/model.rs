//! Account data model — services, protocol parameters, persisted accounts
//! and the draft built up by field components.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::fields::Field;

/// Parameter name carrying the account's user id.
pub const ACCOUNT_PARAM: &str = "account";

/// Parameter name of the server a protocol connects to.
pub const SERVER_PARAM: &str = "server";

// ── Parameters ──────────────────────────────────────────────────────

/// The value type a protocol declares for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Str,
    Int,
    UInt,
    Bool,
}

/// A typed connection parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Str(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Str(_) => ParamKind::Str,
            Self::Int(_) => ParamKind::Int,
            Self::UInt(_) => ParamKind::UInt,
            Self::Bool(_) => ParamKind::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of either signed or unsigned values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Connection parameters keyed by name.
pub type Parameters = BTreeMap<String, ParamValue>;

/// A parameter a protocol accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub default: Option<ParamValue>,
    /// Secret values (passwords) are never logged.
    #[serde(default)]
    pub secret: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            secret: false,
        }
    }

    pub fn with_default(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// A protocol as offered by a connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// Connection manager providing the protocol.
    pub manager: String,
    /// Protocol name, e.g. `jabber` or `sip`.
    pub name: String,
    pub params: Vec<ParamSpec>,
}

impl ProtocolInfo {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Whether the protocol accepts `value` under `name`.
    pub fn accepts(&self, name: &str, value: &ParamValue) -> bool {
        self.param(name).is_some_and(|spec| spec.kind == value.kind())
    }

    /// The protocol's default server, if it declares one.
    pub fn default_server(&self) -> Option<&ParamValue> {
        self.param(SERVER_PARAM).and_then(|p| p.default.as_ref())
    }
}

// ── Services ────────────────────────────────────────────────────────

/// A service offered in the wizard, bound to one protocol.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    pub name: String,
    pub display_name: String,
    pub icon_name: Option<String>,
    /// Lower sorts first in service selection.
    pub priority: i32,
    pub protocol: ProtocolInfo,
    /// Custom text shown after a successful sign-in.
    pub successful_message: Option<String>,
    /// Whether only one account of this service may be active. `None`
    /// defers to the configured policy default.
    pub single_account: Option<bool>,
    /// Parameters written on every save regardless of the page contents.
    pub preset_params: Parameters,
    /// Field layout of the sign-in/edit page.
    pub fields: Vec<Field>,
}

// ── Accounts ────────────────────────────────────────────────────────

/// Stable account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Avatar image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Avatar {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A persisted account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub service: String,
    pub protocol: String,
    pub params: Parameters,
    pub enabled: bool,
    /// Set once a connection has ever succeeded.
    pub has_been_online: bool,
    /// Whether the account is currently signed in.
    pub connected: bool,
    pub display_name: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<Avatar>,
    /// Secondary addresses (URI schemes / alias fields).
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    /// A draft account has never completed a connection.
    pub fn is_draft(&self) -> bool {
        !self.has_been_online
    }

    /// The user id, or an empty string when unset.
    pub fn account_name(&self) -> &str {
        self.params
            .get(ACCOUNT_PARAM)
            .and_then(ParamValue::as_str)
            .unwrap_or_default()
    }
}

/// A pending change to an optional account property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Update<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T> Update<T> {
    /// `Set` for `Some`, `Clear` for `None`.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Clear,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// The resulting value, if this update changes anything.
    pub fn into_change(self) -> Option<Option<T>> {
        match self {
            Self::Keep => None,
            Self::Set(v) => Some(Some(v)),
            Self::Clear => Some(None),
        }
    }
}

/// Settings collected from a page, pending commit.
///
/// Built by field components, then consumed whole by the lifecycle controller.
/// Dropping a draft discards every staged change.
#[derive(Debug, Clone)]
pub struct AccountDraft {
    protocol: ProtocolInfo,
    params: Parameters,
    unset: BTreeSet<String>,
    enabled: Option<bool>,
    display_name: Update<String>,
    nickname: Update<String>,
    avatar: Update<Avatar>,
    aliases: Option<Vec<String>>,
}

impl AccountDraft {
    pub fn new(protocol: &ProtocolInfo) -> Self {
        Self {
            protocol: protocol.clone(),
            params: Parameters::new(),
            unset: BTreeSet::new(),
            enabled: None,
            display_name: Update::Keep,
            nickname: Update::Keep,
            avatar: Update::Keep,
            aliases: None,
        }
    }

    /// Stage a parameter. Parameters the protocol does not support, or with
    /// the wrong type, are refused.
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> bool {
        if !self.protocol.accepts(name, &value) {
            warn!(
                protocol = %self.protocol.name,
                param = name,
                "Protocol does not support parameter, ignoring"
            );
            return false;
        }
        self.unset.remove(name);
        self.params.insert(name.to_string(), value);
        true
    }

    /// Stage removal of a parameter.
    pub fn unset_param(&mut self, name: &str) {
        self.params.remove(name);
        self.unset.insert(name.to_string());
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = Some(enabled);
    }

    pub fn set_display_name(&mut self, update: Update<String>) {
        self.display_name = update;
    }

    pub fn set_nickname(&mut self, update: Update<String>) {
        self.nickname = update;
    }

    pub fn set_avatar(&mut self, update: Update<Avatar>) {
        self.avatar = update;
    }

    pub fn set_aliases(&mut self, aliases: Vec<String>) {
        self.aliases = Some(aliases);
    }

    pub fn protocol(&self) -> &ProtocolInfo {
        &self.protocol
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn unset(&self) -> &BTreeSet<String> {
        &self.unset
    }

    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    pub fn display_name(&self) -> &Update<String> {
        &self.display_name
    }

    pub fn account_name(&self) -> Option<&str> {
        self.params.get(ACCOUNT_PARAM).and_then(ParamValue::as_str)
    }

    /// Split the draft into its parts for committing.
    pub fn into_parts(self) -> DraftParts {
        DraftParts {
            params: self.params,
            unset: self.unset,
            enabled: self.enabled,
            display_name: self.display_name,
            nickname: self.nickname,
            avatar: self.avatar,
            aliases: self.aliases,
        }
    }
}

/// The contents of a consumed [`AccountDraft`].
#[derive(Debug, Clone)]
pub struct DraftParts {
    pub params: Parameters,
    pub unset: BTreeSet<String>,
    pub enabled: Option<bool>,
    pub display_name: Update<String>,
    pub nickname: Update<String>,
    pub avatar: Update<Avatar>,
    pub aliases: Option<Vec<String>>,
}

/// Parameter changes to apply to an existing account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterDiff {
    pub set: Parameters,
    pub unset: BTreeSet<String>,
}

impl ParameterDiff {
    /// Compute what must change to go from `existing` to `staged`.
    ///
    /// Values equal to the persisted ones are dropped. Persisted keys absent
    /// from `staged` are unset, as are keys explicitly marked for removal.
    pub fn between(existing: &Parameters, staged: &Parameters, explicit_unset: &BTreeSet<String>) -> Self {
        let mut set = staged.clone();
        let mut unset = BTreeSet::new();

        for (name, value) in existing {
            match staged.get(name) {
                Some(new) if new == value => {
                    set.remove(name);
                }
                Some(_) => {}
                None => {
                    unset.insert(name.clone());
                }
            }
        }
        for name in explicit_unset {
            if existing.contains_key(name) {
                unset.insert(name.clone());
            }
        }

        Self { set, unset }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}
