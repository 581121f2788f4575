use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchboard::loader::descriptor_tree;
use switchboard::{
    gateway, Engine, EngineOptions, HttpCatalog, InMemoryCatalog, LoadReport, RemoteCatalog, SwitchboardConfig,
    SyncMode,
};

mod builtins;

#[derive(Parser)]
#[command(name = "switchboard-gateway")]
#[command(version)]
#[command(about = "Command registry, catalog sync and dispatch gateway")]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(long, env = "SWITCHBOARD_CONFIG", default_value = "switchboard.toml", global = true)]
    config: PathBuf,

    /// Directory of JSON command descriptors loaded next to the built-ins
    #[arg(long, global = true)]
    commands_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve interaction events over HTTP
    Serve {
        #[arg(long)]
        bind_addr: Option<String>,
    },
    /// Push the loaded commands to the remote catalog
    Sync {
        #[arg(long)]
        mode: Option<SyncMode>,
    },
    /// Remove every command from every catalog scope
    Clear,
    /// Validate the configuration and list what would be loaded
    CheckConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SwitchboardConfig::load(&cli.config)?;
    for warning in config.validate()? {
        warn!("[Gateway] {}", warning);
    }

    let (engine, report) = build_engine(&config, cli.commands_dir.as_deref())?;

    match cli.command {
        Commands::Serve { bind_addr } => {
            if config.sync.on_startup {
                let sync = engine.synchronize(config.sync.mode).await?;
                info!(
                    "[Gateway] Startup sync: {} created, {} updated",
                    sync.created(),
                    sync.updated()
                );
            }
            let bind_addr = bind_addr.unwrap_or_else(|| config.gateway.bind_addr.clone());
            gateway::serve(Arc::new(engine), &bind_addr).await?;
        }
        Commands::Sync { mode } => {
            let sync = engine.synchronize(mode.unwrap_or(config.sync.mode)).await?;
            println!("{}", serde_json::to_string_pretty(&sync)?);
        }
        Commands::Clear => {
            let cleared = engine.clear_all().await?;
            println!("{}", serde_json::to_string_pretty(&cleared)?);
        }
        Commands::CheckConfig => {
            println!("Configuration OK ({})", cli.config.display());
            println!("Commands: {}", engine.registry().names().join(", "));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn build_engine(
    config: &SwitchboardConfig,
    commands_dir: Option<&std::path::Path>,
) -> anyhow::Result<(Engine, LoadReport)> {
    let directory = builtins::Directory::default();
    let mut commands = builtins::manifest(&directory);
    if let Some(dir) = commands_dir {
        let scanned = descriptor_tree::scan(dir, &builtins::handler_table(&directory))?;
        commands.push_group("descriptors", scanned);
    }

    let catalog: Arc<dyn RemoteCatalog> = match &config.catalog.base_url {
        Some(base_url) => Arc::new(HttpCatalog::new(
            base_url,
            config.catalog.application_id.clone(),
            config.catalog.token(),
        )?),
        None => {
            warn!("[Gateway] No catalog.base_url configured, using an in-memory catalog");
            Arc::new(InMemoryCatalog::new())
        }
    };

    let (engine, report) = Engine::load_all(
        EngineOptions::from(config),
        commands,
        config.rule_manifest(),
        catalog,
    );
    directory.attach(engine.registry().clone());
    Ok((engine, report))
}
