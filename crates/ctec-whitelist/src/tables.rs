//! Tables read by the cascade and the cache keys of each stage.

use std::net::IpAddr;

use crate::types::{PlayerId, PlayerIdentity, ServerId, WhitelistCode};

pub const MINECRAFT_SERVERS: &str = "minecraft_servers";
pub const MINECRAFT_PLAYERS: &str = "minecraft_players";
pub const MINECRAFT_IP_BLOCKLIST: &str = "minecraft_ip_blocklist";
pub const MINECRAFT_SERVER_PLAYER_WHITELIST: &str = "minecraft_server_player_whitelist";
pub const MINECRAFT_SERVER_ROLE_WHITELIST: &str = "minecraft_server_role_whitelist";
pub const MINECRAFT_PLAYER_MEMBERS: &str = "minecraft_player_members";
pub const MEMBER_ROLES: &str = "member_roles";
pub const EVENTS: &str = "events";
pub const EVENT_MEMBERS: &str = "event_members";

/// Every table some stage depends on.
pub const ALL_TABLES: [&str; 9] = [
    MINECRAFT_SERVERS,
    MINECRAFT_PLAYERS,
    MINECRAFT_IP_BLOCKLIST,
    MINECRAFT_SERVER_PLAYER_WHITELIST,
    MINECRAFT_SERVER_ROLE_WHITELIST,
    MINECRAFT_PLAYER_MEMBERS,
    MEMBER_ROLES,
    EVENTS,
    EVENT_MEMBERS,
];

const KEY_PREFIX: &str = "minecraft_whitelist";

/// One step of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Server,
    IpPolicy,
    Player,
    PlayerPolicy,
    RoleGrant,
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::IpPolicy => "ip_policy",
            Self::Player => "player",
            Self::PlayerPolicy => "player_policy",
            Self::RoleGrant => "role_grant",
        }
    }

    /// Tables whose mutation must invalidate this stage's cached results.
    pub const fn dependencies(self) -> &'static [&'static str] {
        match self {
            Self::Server => &[MINECRAFT_SERVERS],
            Self::IpPolicy => &[MINECRAFT_IP_BLOCKLIST],
            Self::Player => &[MINECRAFT_PLAYERS],
            Self::PlayerPolicy => &[MINECRAFT_SERVER_PLAYER_WHITELIST],
            Self::RoleGrant => &[
                MEMBER_ROLES,
                MINECRAFT_PLAYER_MEMBERS,
                MINECRAFT_SERVER_ROLE_WHITELIST,
                EVENT_MEMBERS,
                EVENTS,
            ],
        }
    }

    /// Denial reported when this stage fails.
    pub const fn denial(self) -> WhitelistCode {
        match self {
            Self::Server => WhitelistCode::ServerNotFound,
            Self::IpPolicy => WhitelistCode::IpNotWhitelisted,
            Self::Player => WhitelistCode::PlayerNotFound,
            Self::PlayerPolicy => WhitelistCode::PlayerNotWhitelisted,
            Self::RoleGrant => WhitelistCode::PlayerRoleNotWhitelisted,
        }
    }
}

/// Cache keys (and tags) of each stage.
pub mod keys {
    use super::*;

    pub fn server(ip: IpAddr, port: u16) -> String {
        format!("{KEY_PREFIX}:server:{ip}:{port}")
    }

    pub fn ip_policy(server: ServerId, ip: IpAddr) -> String {
        format!("{KEY_PREFIX}:id:{server}:ip:{ip}")
    }

    pub fn player(identity: &PlayerIdentity) -> String {
        match identity {
            PlayerIdentity::Uuid(uuid) => format!("{KEY_PREFIX}:player:uuid:{uuid}"),
            PlayerIdentity::Name(name) => format!("{KEY_PREFIX}:player:name:{name}"),
        }
    }

    pub fn player_policy(server: ServerId, player: PlayerId) -> String {
        format!("{KEY_PREFIX}:id:{server}:player:{player}")
    }

    pub fn role_grant(server: ServerId, player: PlayerId) -> String {
        format!("{KEY_PREFIX}:id:{server}:player:{player}:roles")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_every_dependency_is_catalogued() {
        for stage in [
            Stage::Server,
            Stage::IpPolicy,
            Stage::Player,
            Stage::PlayerPolicy,
            Stage::RoleGrant,
        ] {
            for table in stage.dependencies() {
                assert!(ALL_TABLES.contains(table), "{table} missing from ALL_TABLES");
            }
        }
    }

    #[test]
    fn test_key_shapes() {
        let server = ServerId(Uuid::nil());
        let player = PlayerId(7);
        assert_eq!(
            keys::server("10.0.0.1".parse().unwrap(), 25565),
            "minecraft_whitelist:server:10.0.0.1:25565"
        );
        assert_eq!(
            keys::role_grant(server, player),
            "minecraft_whitelist:id:00000000-0000-0000-0000-000000000000:player:7:roles"
        );
        assert_ne!(keys::player_policy(server, player), keys::role_grant(server, player));
        assert_eq!(
            keys::player(&PlayerIdentity::Name("Steve".into())),
            "minecraft_whitelist:player:name:Steve"
        );
    }
}
