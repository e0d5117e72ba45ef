//! Accounts — data model, persistence, single-account policy and the
//! lifecycle controller that saves and signs in accounts.

pub mod lifecycle;
pub mod model;
pub mod policy;
pub mod store;

pub use lifecycle::{AccountLifecycleController, AccountTarget, CommitOutcome, CommitReport};
pub use model::{
    ACCOUNT_PARAM, AccountDraft, AccountId, AccountRecord, Avatar, DraftParts, ParamKind,
    ParamSpec, ParamValue, ParameterDiff, Parameters, ProtocolInfo, SERVER_PARAM, ServiceProfile,
    Update,
};
pub use policy::{ProfilePolicy, SingleAccountPolicy};
pub use store::{AccountStore, MemoryAccountStore};
