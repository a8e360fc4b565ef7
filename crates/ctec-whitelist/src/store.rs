//! Relational reads behind the cascade.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{PlayerId, PlayerIdentity, ServerId};

/// Source of truth for whitelist records.
///
/// Each method is one uncached read; [`WhitelistCascade`](crate::WhitelistCascade)
/// wraps them with the query cache.
#[async_trait]
pub trait WhitelistStore: Send + Sync {
    /// Resolve a server by its listening address.
    async fn find_server(&self, ip: IpAddr, port: u16) -> StoreResult<Option<ServerId>>;

    /// Explicit allow/deny record for a client address on a server.
    async fn ip_policy(&self, server: ServerId, ip: IpAddr) -> StoreResult<Option<bool>>;

    /// Resolve a player by UUID or name.
    async fn find_player(&self, identity: &PlayerIdentity) -> StoreResult<Option<PlayerId>>;

    /// Explicit allow/deny record for a player on a server.
    async fn player_policy(&self, server: ServerId, player: PlayerId) -> StoreResult<Option<bool>>;

    /// Whether any role the player holds, directly or through an active event, is
    /// allowed on the server.
    async fn has_role_grant(&self, server: ServerId, player: PlayerId) -> StoreResult<bool>;
}
