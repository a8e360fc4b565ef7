//! Whitelist reads.

use std::net::IpAddr;

use async_trait::async_trait;
use ctec_whitelist::{PlayerId, PlayerIdentity, ServerId, StoreResult, WhitelistStore};
use sqlx_core::query_as::query_as;
use uuid::Uuid;

use crate::PgPool;
use crate::error::PostgresError;

/// Roles a player's members hold directly, plus the roles of active events they take
/// part in, matched against the server's allowed roles.
const ROLE_GRANT_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1
        FROM minecraft_player_members pm
        JOIN (
            SELECT mr.member_ref_id, mr.role_ref_id
            FROM member_roles mr
            UNION ALL
            SELECT em.member_ref_id, e.role_ref_id
            FROM event_members em
            JOIN events e ON e.id = em.event_ref_id
            WHERE e.status = 'ACTIVE' AND e.role_ref_id IS NOT NULL
        ) granted ON granted.member_ref_id = pm.member_ref_id
        JOIN minecraft_server_role_whitelist rw
            ON rw.role_ref_id = granted.role_ref_id
           AND rw.minecraft_server_ref_id = $1
           AND rw.allow
        WHERE pm.minecraft_player_ref_id = $2
    )
"#;

/// [`WhitelistStore`] over the whitelist tables.
#[derive(Clone)]
pub struct PgWhitelistStore {
    pool: PgPool,
}

impl PgWhitelistStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WhitelistStore for PgWhitelistStore {
    async fn find_server(&self, ip: IpAddr, port: u16) -> StoreResult<Option<ServerId>> {
        let row: Option<(Uuid,)> = query_as(
            r#"
            SELECT id
            FROM minecraft_servers
            WHERE ip_address = $1 AND port = $2
            LIMIT 1
            "#,
        )
        .bind(ip.to_string())
        .bind(i32::from(port))
        .fetch_optional(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        Ok(row.map(|(id,)| ServerId(id)))
    }

    async fn ip_policy(&self, server: ServerId, ip: IpAddr) -> StoreResult<Option<bool>> {
        let row: Option<(bool,)> = query_as(
            r#"
            SELECT allow
            FROM minecraft_ip_blocklist
            WHERE minecraft_server_ref_id = $1 AND ip_address = $2
            LIMIT 1
            "#,
        )
        .bind(server.0)
        .bind(ip.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        Ok(row.map(|(allow,)| allow))
    }

    async fn find_player(&self, identity: &PlayerIdentity) -> StoreResult<Option<PlayerId>> {
        let row: Option<(i32,)> = match identity {
            PlayerIdentity::Uuid(uuid) => {
                query_as::<_, (i32,)>("SELECT id FROM minecraft_players WHERE uuid = $1 LIMIT 1")
                    .bind(*uuid)
                    .fetch_optional(&self.pool)
                    .await
            }
            PlayerIdentity::Name(name) => {
                query_as::<_, (i32,)>("SELECT id FROM minecraft_players WHERE name = $1 LIMIT 1")
                    .bind(name.as_str())
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(PostgresError::from)?;

        Ok(row.map(|(id,)| PlayerId(id)))
    }

    async fn player_policy(&self, server: ServerId, player: PlayerId) -> StoreResult<Option<bool>> {
        let row: Option<(bool,)> = query_as(
            r#"
            SELECT allow
            FROM minecraft_server_player_whitelist
            WHERE minecraft_server_ref_id = $1 AND minecraft_player_ref_id = $2
            LIMIT 1
            "#,
        )
        .bind(server.0)
        .bind(player.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(PostgresError::from)?;

        Ok(row.map(|(allow,)| allow))
    }

    async fn has_role_grant(&self, server: ServerId, player: PlayerId) -> StoreResult<bool> {
        let (granted,): (bool,) = query_as(ROLE_GRANT_SQL)
            .bind(server.0)
            .bind(player.0)
            .fetch_one(&self.pool)
            .await
            .map_err(PostgresError::from)?;

        Ok(granted)
    }
}
