//! Whitelist mutations.
//!
//! Every mutation invalidates the cached lookups of the table it changed once the
//! statement has succeeded. A failed invalidation is returned as
//! [`AdminError::StaleCache`] so the caller learns the change is committed but may
//! not be visible until the cached entries expire.

use std::fmt;
use std::net::IpAddr;

use ctec_cache::{Invalidation, QueryCache};
use ctec_whitelist::tables;
use ctec_whitelist::{PlayerId, ServerId};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use uuid::Uuid;

use crate::PgPool;
use crate::error::{AdminError, AdminResult};

/// Lifecycle state of an event. Only active events confer their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Active,
    Inactive,
    Completed,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write access to the whitelist tables.
pub struct WhitelistAdmin {
    pool: PgPool,
    cache: QueryCache,
}

impl WhitelistAdmin {
    #[must_use]
    pub fn new(pool: PgPool, cache: QueryCache) -> Self {
        Self { pool, cache }
    }

    // -------------------------------------------------------------------------
    // Servers and players
    // -------------------------------------------------------------------------

    /// Register a server, or rename the one already listening on `ip:port`.
    pub async fn register_server(
        &self,
        name: &str,
        ip: IpAddr,
        port: u16,
    ) -> AdminResult<ServerId> {
        let (id,): (Uuid,) = query_as(
            r#"
            INSERT INTO minecraft_servers (name, ip_address, port)
            VALUES ($1, $2, $3)
            ON CONFLICT (ip_address, port) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(ip.to_string())
        .bind(i32::from(port))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(server = %id, ip = %ip, port, "Minecraft server registered");
        self.invalidate(tables::MINECRAFT_SERVERS).await?;
        Ok(ServerId(id))
    }

    /// Register a player, or update the name of the player with `uuid`.
    pub async fn register_player(&self, name: &str, uuid: Uuid) -> AdminResult<PlayerId> {
        let (id,): (i32,) = query_as(
            r#"
            INSERT INTO minecraft_players (name, uuid)
            VALUES ($1, $2)
            ON CONFLICT (uuid) DO UPDATE SET name = EXCLUDED.name, updated_at = now()
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(uuid)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(player = id, uuid = %uuid, name, "Minecraft player registered");
        self.invalidate(tables::MINECRAFT_PLAYERS).await?;
        Ok(PlayerId(id))
    }

    /// Attach a player account to a community member.
    pub async fn link_player_member(
        &self,
        member_ref_id: &str,
        player: PlayerId,
    ) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO minecraft_player_members (member_ref_id, minecraft_player_ref_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(member_ref_id)
        .bind(player.0)
        .execute(&self.pool)
        .await?;

        self.invalidate(tables::MINECRAFT_PLAYER_MEMBERS).await
    }

    // -------------------------------------------------------------------------
    // Policies
    // -------------------------------------------------------------------------

    /// Allow or deny a client address on a server.
    pub async fn set_ip_policy(
        &self,
        server: ServerId,
        ip: IpAddr,
        allow: bool,
    ) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO minecraft_ip_blocklist (ip_address, minecraft_server_ref_id, allow)
            VALUES ($1, $2, $3)
            ON CONFLICT (ip_address, minecraft_server_ref_id)
            DO UPDATE SET allow = EXCLUDED.allow, updated_at = now()
            "#,
        )
        .bind(ip.to_string())
        .bind(server.0)
        .bind(allow)
        .execute(&self.pool)
        .await?;

        tracing::info!(server = %server, ip = %ip, allow, "IP policy set");
        self.invalidate(tables::MINECRAFT_IP_BLOCKLIST).await
    }

    /// Remove the IP record, leaving the absent-record policy in charge.
    /// Returns `false` if there was no record.
    pub async fn remove_ip_policy(&self, server: ServerId, ip: IpAddr) -> AdminResult<bool> {
        let removed = query(
            r#"
            DELETE FROM minecraft_ip_blocklist
            WHERE minecraft_server_ref_id = $1 AND ip_address = $2
            "#,
        )
        .bind(server.0)
        .bind(ip.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            self.invalidate(tables::MINECRAFT_IP_BLOCKLIST).await?;
        }
        Ok(removed > 0)
    }

    /// Allow or deny a player on a server directly.
    pub async fn set_player_policy(
        &self,
        server: ServerId,
        player: PlayerId,
        allow: bool,
    ) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO minecraft_server_player_whitelist
                (minecraft_server_ref_id, minecraft_player_ref_id, allow)
            VALUES ($1, $2, $3)
            ON CONFLICT (minecraft_server_ref_id, minecraft_player_ref_id)
            DO UPDATE SET allow = EXCLUDED.allow
            "#,
        )
        .bind(server.0)
        .bind(player.0)
        .bind(allow)
        .execute(&self.pool)
        .await?;

        tracing::info!(server = %server, player = %player, allow, "Player policy set");
        self.invalidate(tables::MINECRAFT_SERVER_PLAYER_WHITELIST).await
    }

    /// Remove the direct player record. Returns `false` if there was no record.
    pub async fn remove_player_policy(
        &self,
        server: ServerId,
        player: PlayerId,
    ) -> AdminResult<bool> {
        let removed = query(
            r#"
            DELETE FROM minecraft_server_player_whitelist
            WHERE minecraft_server_ref_id = $1 AND minecraft_player_ref_id = $2
            "#,
        )
        .bind(server.0)
        .bind(player.0)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            self.invalidate(tables::MINECRAFT_SERVER_PLAYER_WHITELIST)
                .await?;
        }
        Ok(removed > 0)
    }

    /// Allow or deny every holder of `role` on a server.
    pub async fn set_role_policy(
        &self,
        server: ServerId,
        role: Uuid,
        allow: bool,
    ) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO minecraft_server_role_whitelist
                (minecraft_server_ref_id, role_ref_id, allow)
            VALUES ($1, $2, $3)
            ON CONFLICT (minecraft_server_ref_id, role_ref_id)
            DO UPDATE SET allow = EXCLUDED.allow
            "#,
        )
        .bind(server.0)
        .bind(role)
        .bind(allow)
        .execute(&self.pool)
        .await?;

        tracing::info!(server = %server, role = %role, allow, "Role policy set");
        self.invalidate(tables::MINECRAFT_SERVER_ROLE_WHITELIST)
            .await
    }

    // -------------------------------------------------------------------------
    // Role membership
    // -------------------------------------------------------------------------

    pub async fn grant_member_role(&self, member_ref_id: &str, role: Uuid) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO member_roles (member_ref_id, role_ref_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(member_ref_id)
        .bind(role)
        .execute(&self.pool)
        .await?;

        self.invalidate(tables::MEMBER_ROLES).await
    }

    /// Returns `false` if the member did not hold the role.
    pub async fn revoke_member_role(&self, member_ref_id: &str, role: Uuid) -> AdminResult<bool> {
        let removed =
            query("DELETE FROM member_roles WHERE member_ref_id = $1 AND role_ref_id = $2")
                .bind(member_ref_id)
                .bind(role)
                .execute(&self.pool)
                .await?
                .rows_affected();

        if removed > 0 {
            self.invalidate(tables::MEMBER_ROLES).await?;
        }
        Ok(removed > 0)
    }

    pub async fn add_event_member(&self, event: Uuid, member_ref_id: &str) -> AdminResult<()> {
        query(
            r#"
            INSERT INTO event_members (event_ref_id, member_ref_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(event)
        .bind(member_ref_id)
        .execute(&self.pool)
        .await?;

        self.invalidate(tables::EVENT_MEMBERS).await
    }

    /// Move an event to another lifecycle state.
    pub async fn set_event_status(&self, event: Uuid, status: EventStatus) -> AdminResult<()> {
        let updated = query("UPDATE events SET status = $2::event_status_enum WHERE id = $1")
            .bind(event)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(AdminError::not_found(format!("event {event}")));
        }

        tracing::info!(event = %event, status = %status, "Event status changed");
        self.invalidate(tables::EVENTS).await
    }

    async fn invalidate(&self, table: &'static str) -> AdminResult<()> {
        self.cache
            .invalidate_request(&Invalidation::tables([table]))
            .await
            .map_err(|source| AdminError::StaleCache { table, source })
    }
}
