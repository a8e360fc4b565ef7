//! Whitelist authorization for ctec game servers.
//!
//! A game server asks whether a connecting player may join. The answer comes from a
//! short-circuiting cascade over server, IP, player and role records, with every
//! lookup cached in a [`ctec_cache::QueryCache`] and invalidated when the tables it
//! reads are mutated.

pub mod cascade;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use cascade::{
    AbsentRecordPolicy, CascadeConfig, DEFAULT_ABSENT_RECORD_POLICY, DEFAULT_STAGE_TTL,
    WhitelistCascade,
};
pub use error::{StoreError, StoreResult};
pub use store::WhitelistStore;
pub use tables::Stage;
pub use types::{
    DEFAULT_SERVER_PORT, PlayerId, PlayerIdentity, PlayerLookup, ServerId, WhitelistCode,
    WhitelistRequest, WhitelistVerdict,
};
