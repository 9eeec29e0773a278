use aaa_core::{AaaService, CoreConfig};
use clap::Parser;
use std::process;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// AAA core configuration and storage check
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "aaa-check")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "aaa.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't touch storage)
    #[arg(short, long)]
    validate: bool,

    /// Write an example configuration to CONFIG and exit
    #[arg(long)]
    init: bool,

    /// Purge accounting history older than radius.acct_history_days and
    /// online sessions idle longer than radius.online_session_ttl_secs
    #[arg(long)]
    purge: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.init {
        if let Err(e) = CoreConfig::example().to_file(&cli.config_path) {
            eprintln!("Error creating example config: {}", e);
            process::exit(1);
        }
        println!("Example configuration written to {}", cli.config_path);
        process::exit(0);
    }

    let config = match CoreConfig::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation failed!");
            eprintln!("   Error: {}", e);
            eprintln!("   Run with --init to create an example configuration");
            process::exit(1);
        }
    };

    if cli.validate {
        println!("Configuration validated successfully!");
        println!();
        println!("Configuration summary:");
        println!(
            "  Profile cache: ttl {}s, sweep {}s, max {} entries",
            config.profile_cache.ttl_secs,
            config.profile_cache.sweep_interval_secs,
            config.profile_cache.max_entries
        );
        println!(
            "  Session counts: ttl {}ms, max {} entries",
            config.session_count_ttl_ms, config.session_count_max_entries
        );
        match config.storage_timeout_ms {
            Some(ms) => println!("  Storage timeout: {}ms", ms),
            None => println!("  Storage timeout: none"),
        }
        println!("  Log level: {}", config.log_level.as_deref().unwrap_or("info"));
        match &config.postgres {
            Some(pg) => println!("  Storage: postgres ({} connections)", pg.max_connections),
            None => println!("  Storage: in-memory"),
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("aaa-check v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);

    let service = match start(&config).await {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to start AAA core: {}", e);
            process::exit(1);
        }
    };

    info!("Runtime settings:");
    for (key, value) in service.settings.snapshot() {
        info!("  {} = {}", key, value);
    }

    if cli.purge {
        let purged = match service.purge_history().await {
            Ok(records) => {
                info!("Purged {} accounting records", records);
                service.purge_stale_sessions().await
            }
            Err(e) => Err(e),
        };
        match purged {
            Ok(sessions) => info!("Purged {} stale online sessions", sessions),
            Err(e) => {
                error!("Purge failed: {}", e);
                service.shutdown().await;
                process::exit(1);
            }
        }
    }

    print!("{}", service.render_metrics());
    service.shutdown().await;
}

#[cfg(feature = "postgres")]
async fn start(config: &CoreConfig) -> aaa_core::Result<AaaService> {
    AaaService::connect(config).await
}

#[cfg(not(feature = "postgres"))]
async fn start(config: &CoreConfig) -> aaa_core::Result<AaaService> {
    if config.postgres.is_some() {
        tracing::warn!("Built without the postgres feature, using in-memory storage");
    }
    Ok(AaaService::in_memory(config).await?.0)
}
