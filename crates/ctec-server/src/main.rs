use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ctec_cache::Invalidation;
use ctec_server::cli::{CheckArgs, Cli, Commands, InvalidateArgs};
use ctec_server::config::AppConfig;
use ctec_server::config::loader::load_config;
use ctec_server::{Services, connect_postgres, connect_query_cache, observability};
use ctec_whitelist_postgres::{migrations, test_connection};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        let missing = matches!(
            &e,
            dotenvy::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound
        );
        if !missing {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref())
        .map_err(anyhow::Error::msg)
        .context("configuration error")?;
    observability::apply_logging_level(&cfg.logging.level);

    match &cli.command {
        Commands::Check(args) => check(&cfg, args).await,
        Commands::Invalidate(args) => {
            invalidate(&cfg, args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ClearCache => {
            let cache = connect_query_cache(&cfg.redis, &cfg.cache).await?;
            let removed = cache.clear_namespace().await?;
            println!("Removed {removed} keys from namespace {}", cache.namespace());
            cache.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ping => {
            let cache = connect_query_cache(&cfg.redis, &cfg.cache).await?;
            cache.ping().await.context("cache store unreachable")?;
            println!("cache: ok ({})", cache.namespace());
            cache.shutdown().await;

            let pool = connect_postgres(&cfg.postgres).await?;
            test_connection(&pool)
                .await
                .context("PostgreSQL unreachable")?;
            println!("postgres: ok");
            pool.close().await;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate => {
            let pool = connect_postgres(&cfg.postgres).await?;
            migrations::run(&pool).await?;
            println!("Migrations applied");
            pool.close().await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Prints the verdict; a denial exits with status 1.
async fn check(cfg: &AppConfig, args: &CheckArgs) -> Result<ExitCode> {
    let services = Services::build(cfg, false).await?;
    let verdict = services.cascade.check(&args.to_request()).await;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    services.shutdown().await;

    Ok(if verdict.is_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

async fn invalidate(cfg: &AppConfig, args: &InvalidateArgs) -> Result<()> {
    let cache = connect_query_cache(&cfg.redis, &cfg.cache).await?;
    let request = Invalidation::new()
        .with_tables(args.tables.iter().cloned())
        .with_tags(args.tags.iter().cloned());

    let result = cache.invalidate_request(&request).await;
    cache.shutdown().await;
    result.context("invalidation failed")?;

    println!(
        "Invalidated {} table(s) and {} tag(s) in namespace {}",
        request.tables.len(),
        request.tags.len(),
        cache.namespace()
    );
    Ok(())
}
