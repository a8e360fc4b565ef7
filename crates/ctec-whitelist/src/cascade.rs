//! Whitelist evaluation engine.
//!
//! A check runs five stages in fixed order and stops at the first terminal verdict:
//!
//! 1. resolve the server from its address
//! 2. the client IP policy, when the request carries an IP
//! 3. resolve the player from UUID or name
//! 4. the direct player policy
//! 5. role grants, directly or through an active event
//!
//! Stages 2 and 3 run concurrently once the server is known, as do stages 4 and 5
//! once the player is known. Results are always examined in stage order, so the
//! verdict does not depend on which lookup finishes first.
//!
//! # Example
//!
//! ```ignore
//! let cascade = WhitelistCascade::new(store, cache, CascadeConfig::default());
//! let verdict = cascade
//!     .check(&WhitelistRequest::by_name("10.0.0.1", 25565, "Steve"))
//!     .await;
//! if verdict.is_allowed() {
//!     // let the player in
//! }
//! ```

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ctec_cache::{CacheParams, QueryCache};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::store::WhitelistStore;
use crate::tables::{Stage, keys};
use crate::types::{PlayerId, PlayerIdentity, ServerId, WhitelistRequest, WhitelistVerdict};

/// Metric names as constants for consistency.
pub mod names {
    pub const WHITELIST_VERDICTS_TOTAL: &str = "ctec_whitelist_verdicts_total";
    pub const WHITELIST_CHECK_DURATION_SECONDS: &str = "ctec_whitelist_check_duration_seconds";
}

// =============================================================================
// Configuration
// =============================================================================

/// How stages 2 and 4 treat a server with no record for the IP or player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentRecordPolicy {
    /// No IP record lets the check continue; no player record defers to role grants.
    Allow,
    /// Only an explicit allow record passes stage 2 or stage 4.
    Deny,
}

/// Absent-record policy used unless configured otherwise.
pub const DEFAULT_ABSENT_RECORD_POLICY: AbsentRecordPolicy = AbsentRecordPolicy::Allow;

/// Lifetime of cached stage results.
pub const DEFAULT_STAGE_TTL: Duration = Duration::from_secs(300);

/// Configuration for the whitelist cascade.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub absent_record_policy: AbsentRecordPolicy,
    /// TTL of every cached stage result.
    pub ttl: Duration,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            absent_record_policy: DEFAULT_ABSENT_RECORD_POLICY,
            ttl: DEFAULT_STAGE_TTL,
        }
    }
}

/// A stage either yields its value or ends the cascade with a verdict.
type Outcome<T> = Result<T, WhitelistVerdict>;

// =============================================================================
// Cascade
// =============================================================================

/// Whitelist evaluation engine.
///
/// Every stage lookup goes through the query cache, keyed and tagged by the stage's
/// cache key and depending on the tables the stage reads.
pub struct WhitelistCascade {
    store: Arc<dyn WhitelistStore>,
    cache: QueryCache,
    config: CascadeConfig,
}

impl WhitelistCascade {
    #[must_use]
    pub fn new(store: Arc<dyn WhitelistStore>, cache: QueryCache, config: CascadeConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Decide whether the player in `request` may join the server.
    ///
    /// Never fails: malformed input and lookup failures end in the denial of the
    /// stage they occur in.
    pub async fn check(&self, request: &WhitelistRequest) -> WhitelistVerdict {
        let start = Instant::now();
        let verdict = match self.evaluate(request).await {
            Ok(verdict) | Err(verdict) => verdict,
        };

        let elapsed = start.elapsed();
        metrics::counter!(names::WHITELIST_VERDICTS_TOTAL, "code" => verdict.code.as_str())
            .increment(1);
        metrics::histogram!(names::WHITELIST_CHECK_DURATION_SECONDS).record(elapsed.as_secs_f64());
        tracing::debug!(
            server_ip = %request.server_ip,
            server_port = request.server_port,
            code = %verdict.code,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "Whitelist check completed"
        );
        verdict
    }

    async fn evaluate(&self, request: &WhitelistRequest) -> Outcome<WhitelistVerdict> {
        // Stage 1
        let Some((server_ip, server_port)) = request.server_address() else {
            return Err(rejected(Stage::Server, "malformed server address"));
        };
        let server = self.resolve_server(server_ip, server_port).await?;

        // Stages 2 and 3
        let client_ip = request
            .client_ip()
            .map_err(|_| rejected(Stage::IpPolicy, "malformed client ip"))?;
        let identity = request.player_identity();
        let (ip_outcome, player_outcome) = tokio::join!(
            self.check_ip(server, client_ip),
            self.resolve_player(identity.as_ref()),
        );
        ip_outcome?;
        let player = player_outcome?;

        // Stages 4 and 5
        let (direct, roles) = tokio::join!(
            self.player_policy(server, player),
            self.role_grant(server, player),
        );
        match direct? {
            Some(true) => Ok(WhitelistVerdict::allow()),
            Some(false) => Err(rejected(Stage::PlayerPolicy, "player explicitly denied")),
            None => match self.config.absent_record_policy {
                AbsentRecordPolicy::Deny => Err(rejected(Stage::PlayerPolicy, "no player record")),
                AbsentRecordPolicy::Allow => {
                    if roles? {
                        Ok(WhitelistVerdict::allow())
                    } else {
                        Err(rejected(Stage::RoleGrant, "no whitelisted role"))
                    }
                }
            },
        }
    }

    async fn resolve_server(&self, ip: IpAddr, port: u16) -> Outcome<ServerId> {
        let found = self
            .lookup(Stage::Server, keys::server(ip, port), || {
                self.store.find_server(ip, port)
            })
            .await?;
        found.ok_or_else(|| rejected(Stage::Server, "no server at this address"))
    }

    async fn check_ip(&self, server: ServerId, ip: Option<IpAddr>) -> Outcome<()> {
        let Some(ip) = ip else {
            return Ok(());
        };
        let record = self
            .lookup(Stage::IpPolicy, keys::ip_policy(server, ip), || {
                self.store.ip_policy(server, ip)
            })
            .await?;
        match record {
            Some(true) => Ok(()),
            Some(false) => Err(rejected(Stage::IpPolicy, "ip explicitly denied")),
            None => match self.config.absent_record_policy {
                AbsentRecordPolicy::Allow => Ok(()),
                AbsentRecordPolicy::Deny => Err(rejected(Stage::IpPolicy, "no ip record")),
            },
        }
    }

    async fn resolve_player(&self, identity: Option<&PlayerIdentity>) -> Outcome<PlayerId> {
        let Some(identity) = identity else {
            return Err(rejected(Stage::Player, "malformed player identifier"));
        };
        let found = self
            .lookup(Stage::Player, keys::player(identity), || {
                self.store.find_player(identity)
            })
            .await?;
        found.ok_or_else(|| rejected(Stage::Player, "unknown player"))
    }

    async fn player_policy(&self, server: ServerId, player: PlayerId) -> Outcome<Option<bool>> {
        self.lookup(
            Stage::PlayerPolicy,
            keys::player_policy(server, player),
            || self.store.player_policy(server, player),
        )
        .await
    }

    async fn role_grant(&self, server: ServerId, player: PlayerId) -> Outcome<bool> {
        self.lookup(Stage::RoleGrant, keys::role_grant(server, player), || {
            self.store.has_role_grant(server, player)
        })
        .await
    }

    /// Read-through lookup of one stage. A store failure ends the cascade with the
    /// stage's denial.
    async fn lookup<T, F, Fut>(&self, stage: Stage, key: String, fetch: F) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let params = CacheParams::tables(stage.dependencies().iter().copied())
            .with_tag(key.clone())
            .with_ttl(self.config.ttl);

        self.cache
            .get_or_fetch(&key, &params, fetch)
            .await
            .map_err(|e| {
                tracing::error!(
                    stage = stage.name(),
                    key = %key,
                    error = %e,
                    "Whitelist lookup failed"
                );
                WhitelistVerdict::deny(stage.denial())
            })
    }
}

fn rejected(stage: Stage, detail: &'static str) -> WhitelistVerdict {
    tracing::debug!(stage = stage.name(), detail, "Whitelist stage denied");
    WhitelistVerdict::deny(stage.denial())
}
