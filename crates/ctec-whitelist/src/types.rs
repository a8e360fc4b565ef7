//! Request, identifier and verdict types.

use std::fmt;
use std::net::{AddrParseError, IpAddr};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Port assumed when a request omits `serverPort`.
pub const DEFAULT_SERVER_PORT: i64 = 25565;

/// Minecraft player names: 2-16 characters of letters, digits and underscore.
static PLAYER_NAME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9_]{2,16}$").expect("Invalid player name regex")
});

// =============================================================================
// Identifiers
// =============================================================================

/// Internal identifier of a registered game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub Uuid);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Internal identifier of a known player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Validated way of identifying a player.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerIdentity {
    Uuid(Uuid),
    Name(String),
}

impl PlayerIdentity {
    /// Parse a player UUID in any of the accepted textual forms.
    pub fn parse_uuid(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self::Uuid)
    }

    /// Accept a player name if it is a well-formed Minecraft name.
    pub fn parse_name(raw: &str) -> Option<Self> {
        PLAYER_NAME_REGEX
            .is_match(raw)
            .then(|| Self::Name(raw.to_string()))
    }
}

// =============================================================================
// Request
// =============================================================================

/// How the request identifies the player. Exactly one form must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerLookup {
    Uuid {
        uuid: String,
    },
    Name {
        #[serde(rename = "playerName")]
        player_name: String,
    },
}

/// A whitelist check as submitted by a game server.
///
/// Fields are kept as received; [`WhitelistCascade`](crate::WhitelistCascade)
/// validates them stage by stage so a malformed value yields that stage's denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistRequest {
    #[serde(rename = "serverIP")]
    pub server_ip: String,

    #[serde(default = "default_server_port")]
    pub server_port: i64,

    #[serde(flatten)]
    pub player: PlayerLookup,

    /// Address the player connects from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

fn default_server_port() -> i64 {
    DEFAULT_SERVER_PORT
}

impl WhitelistRequest {
    /// Request identifying the player by UUID.
    pub fn by_uuid(
        server_ip: impl Into<String>,
        server_port: i64,
        uuid: impl Into<String>,
    ) -> Self {
        Self {
            server_ip: server_ip.into(),
            server_port,
            player: PlayerLookup::Uuid { uuid: uuid.into() },
            ip: None,
        }
    }

    /// Request identifying the player by name.
    pub fn by_name(
        server_ip: impl Into<String>,
        server_port: i64,
        player_name: impl Into<String>,
    ) -> Self {
        Self {
            server_ip: server_ip.into(),
            server_port,
            player: PlayerLookup::Name {
                player_name: player_name.into(),
            },
            ip: None,
        }
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Parsed server address, or `None` if the IP or port is malformed.
    pub fn server_address(&self) -> Option<(IpAddr, u16)> {
        let ip = self.server_ip.trim().parse().ok()?;
        let port = u16::try_from(self.server_port).ok().filter(|p| *p != 0)?;
        Some((ip, port))
    }

    /// Parsed client address. `Ok(None)` when the request carries no IP.
    pub fn client_ip(&self) -> Result<Option<IpAddr>, AddrParseError> {
        self.ip.as_deref().map(|raw| raw.trim().parse()).transpose()
    }

    /// Validated player identity, or `None` if the identifier is malformed.
    pub fn player_identity(&self) -> Option<PlayerIdentity> {
        match &self.player {
            PlayerLookup::Uuid { uuid } => PlayerIdentity::parse_uuid(uuid),
            PlayerLookup::Name { player_name } => PlayerIdentity::parse_name(player_name),
        }
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Result code of a whitelist check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitelistCode {
    Success,
    ServerNotFound,
    IpNotWhitelisted,
    PlayerNotFound,
    PlayerNotWhitelisted,
    PlayerRoleNotWhitelisted,
}

impl WhitelistCode {
    /// Every code, in cascade order.
    pub const ALL: [WhitelistCode; 6] = [
        Self::Success,
        Self::ServerNotFound,
        Self::IpNotWhitelisted,
        Self::PlayerNotFound,
        Self::PlayerNotWhitelisted,
        Self::PlayerRoleNotWhitelisted,
    ];

    /// Numeric response code reported to game servers.
    pub const fn response_code(self) -> u16 {
        match self {
            Self::Success => 0,
            Self::ServerNotFound => 1001,
            Self::PlayerNotFound => 1002,
            Self::IpNotWhitelisted => 1003,
            Self::PlayerNotWhitelisted => 1004,
            Self::PlayerRoleNotWhitelisted => 1005,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::ServerNotFound => "SERVER_NOT_FOUND",
            Self::IpNotWhitelisted => "IP_NOT_WHITELISTED",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",
            Self::PlayerNotWhitelisted => "PLAYER_NOT_WHITELISTED",
            Self::PlayerRoleNotWhitelisted => "PLAYER_ROLE_NOT_WHITELISTED",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    fn reason(self) -> &'static str {
        match self {
            Self::Success => "Player is whitelisted",
            Self::ServerNotFound => "Server is not registered",
            Self::IpNotWhitelisted => "IP address is not whitelisted on this server",
            Self::PlayerNotFound => "Player is not registered",
            Self::PlayerNotWhitelisted => "Player is not whitelisted on this server",
            Self::PlayerRoleNotWhitelisted => {
                "None of the player's roles is whitelisted on this server"
            }
        }
    }
}

impl fmt::Display for WhitelistCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a whitelist check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistVerdict {
    pub code: WhitelistCode,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WhitelistVerdict {
    /// The player may join.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            code: WhitelistCode::Success,
            ok: true,
            reason: Some(WhitelistCode::Success.reason().to_string()),
        }
    }

    /// The player may not join, for the reason `code` names.
    #[must_use]
    pub fn deny(code: WhitelistCode) -> Self {
        Self {
            code,
            ok: code.is_success(),
            reason: Some(code.reason().to_string()),
        }
    }

    /// Returns `true` if the player may join.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.ok
    }

    pub fn response_code(&self) -> u16 {
        self.code.response_code()
    }
}
