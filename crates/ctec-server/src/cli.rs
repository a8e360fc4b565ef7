use clap::{ArgGroup, Parser, Subcommand};
use ctec_whitelist::{DEFAULT_SERVER_PORT, WhitelistRequest};

#[derive(Parser)]
#[command(name = "ctec")]
#[command(about = "ctec operator CLI: whitelist checks and query cache maintenance")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ctec.toml)
    #[arg(short, long, global = true, env = "CTEC_CONFIG")]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a whitelist check and print the verdict as JSON
    Check(CheckArgs),
    /// Invalidate cached results by table and/or tag
    Invalidate(InvalidateArgs),
    /// Delete every cache key in the configured namespace
    ClearCache,
    /// Check that the cache store and the database are reachable
    Ping,
    /// Apply pending database migrations
    Migrate,
}

#[derive(clap::Args)]
#[command(group(ArgGroup::new("player").required(true).args(["uuid", "player_name"])))]
pub struct CheckArgs {
    /// Game server address
    #[arg(long = "server-ip")]
    pub server_ip: String,
    /// Game server port
    #[arg(long = "server-port", default_value_t = DEFAULT_SERVER_PORT)]
    pub server_port: i64,
    /// Player UUID
    #[arg(long)]
    pub uuid: Option<String>,
    /// Player name
    #[arg(long = "player-name")]
    pub player_name: Option<String>,
    /// Client address
    #[arg(long)]
    pub ip: Option<String>,
}

impl CheckArgs {
    pub fn to_request(&self) -> WhitelistRequest {
        let request = match (&self.uuid, &self.player_name) {
            (Some(uuid), _) => {
                WhitelistRequest::by_uuid(self.server_ip.as_str(), self.server_port, uuid.as_str())
            }
            (None, name) => WhitelistRequest::by_name(
                self.server_ip.as_str(),
                self.server_port,
                name.as_deref().unwrap_or_default(),
            ),
        };
        match &self.ip {
            Some(ip) => request.with_ip(ip.as_str()),
            None => request,
        }
    }
}

#[derive(clap::Args)]
#[command(group(ArgGroup::new("target").required(true).multiple(true).args(["tables", "tags"])))]
pub struct InvalidateArgs {
    /// Table whose dependent results are dropped (repeatable)
    #[arg(long = "table")]
    pub tables: Vec<String>,
    /// Tag of an entry to drop (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use ctec_whitelist::PlayerIdentity;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_by_name() {
        let cli = Cli::try_parse_from([
            "ctec",
            "check",
            "--server-ip",
            "10.0.0.1",
            "--player-name",
            "Steve",
            "--ip",
            "1.2.3.4",
        ])
        .unwrap();
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        let request = args.to_request();
        assert_eq!(request.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(request.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(
            request.player_identity(),
            Some(PlayerIdentity::Name("Steve".into()))
        );
    }

    #[test]
    fn test_check_requires_player() {
        let result = Cli::try_parse_from(["ctec", "check", "--server-ip", "10.0.0.1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalidate_requires_target() {
        assert!(Cli::try_parse_from(["ctec", "invalidate"]).is_err());

        let cli = Cli::try_parse_from([
            "ctec",
            "invalidate",
            "--table",
            "minecraft_players",
            "--table",
            "member_roles",
            "--tag",
            "t1",
        ])
        .unwrap();
        let Commands::Invalidate(args) = cli.command else {
            panic!("expected invalidate");
        };
        assert_eq!(args.tables, ["minecraft_players", "member_roles"]);
        assert_eq!(args.tags, ["t1"]);
    }
}
