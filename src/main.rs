//! Replidb - Master/Replica Relational Data Coordinator
//!
//! Runs a master or replica node in front of a relational backend.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replidb::backend;
use replidb::config::{BackendKind, LoggingConfig, ReplidbConfig, Role};
use replidb::error::Result;
use replidb::node::Node;

/// Replidb - Master/Replica Relational Data Coordinator
#[derive(Parser)]
#[command(name = "replidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "replidb.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [logging].level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Override the configured role
        #[arg(long, value_enum)]
        role: Option<Role>,

        /// Override the configured bind address (host:port)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "replidb.toml")]
        output: PathBuf,

        /// Role of the generated node
        #[arg(long, value_enum, default_value = "master")]
        role: Role,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The file's [logging] section only matters when starting a node
    let logging = match cli.command {
        Commands::Start { .. } => ReplidbConfig::from_file(&cli.config)
            .map(|c| c.logging)
            .unwrap_or_default(),
        _ => LoggingConfig::default(),
    };
    let level = cli.log_level.clone().unwrap_or(logging.level);
    init_logging(&level, &logging.format);

    match cli.command {
        Commands::Start { role, bind } => run_start(cli.config, role, bind).await,
        Commands::Init { output, role } => run_init(output, role),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Start a master or replica node
async fn run_start(config_path: PathBuf, role: Option<Role>, bind: Option<String>) -> Result<()> {
    tracing::info!("Starting Replidb node...");

    // Load configuration
    let mut config = match ReplidbConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };

    if let Some(role) = role {
        config.node.role = role;
    }
    if let Some(bind) = bind {
        config.node.bind_address = bind;
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration after command-line overrides: {}", e);
        return Err(e);
    }
    tracing::info!("Loaded configuration for {} node: {}", config.role(), config.node.id);

    // Connect to the relational backend
    let backend = match backend::connect(&config.backend).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to connect to {:?} backend: {}", config.backend.kind, e);
            return Err(e);
        }
    };
    match backend.health_check().await {
        Ok(true) => tracing::info!("Backend {} is healthy", backend.name()),
        Ok(false) => tracing::warn!("Backend {} reported unhealthy", backend.name()),
        Err(e) => {
            tracing::error!("Backend health check failed: {}", e);
            return Err(e);
        }
    }

    // Bind the node
    let node = match Node::bind(&config, backend.clone()).await {
        Ok(n) => Arc::new(n),
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.node.bind_address, e);
            return Err(e);
        }
    };

    let runner = node.clone();
    let server = tokio::spawn(async move { runner.run().await });

    tracing::info!("Replidb node {} is running. Press Ctrl+C to stop.", config.node.id);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    node.stop();
    match server.await {
        Ok(result) => result?,
        Err(e) => tracing::error!("Accept loop terminated abnormally: {}", e),
    }
    backend.close().await;

    tracing::info!("Replidb node stopped");
    Ok(())
}

/// Write a commented configuration file
fn run_init(output: PathBuf, role: Role) -> Result<()> {
    let (node_id, bind_address, replicas) = match role {
        Role::Master => (
            "master-1",
            "0.0.0.0:8000",
            r#"replicas = []
# replicas = ["10.0.0.2:8001", "10.0.0.3:8002"]"#,
        ),
        Role::Replica => (
            "replica-1",
            "0.0.0.0:8001",
            r#"# accept_client_writes = false   # serve SEARCH only to clients
# masters = ["10.0.0.1"]          # hosts allowed to replicate; required with the line above"#,
        ),
    };

    let config_content = format!(
        r#"# Replidb Configuration
# Generated configuration file

[node]
id = "{node_id}"
role = "{role}"
bind_address = "{bind_address}"

[backend]
kind = "mariadb"             # or "sqlite"
host = "localhost"
port = 3306
user = "replidb"
password = "changeme"
pool_size = 10
connect_timeout_secs = 30
# data_dir = "/var/lib/replidb"   # sqlite only; omitted = in-memory

[replication]
{replicas}
connect_timeout_ms = 5000
write_timeout_ms = 5000

[server]
read_timeout_ms = 30000
write_timeout_ms = 30000
max_frame_bytes = 1048576
max_connections = 1024

[logging]
level = "info"
format = "pretty"            # or "compact"
"#
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your backend and replicas.");
    println!("Then start with: replidb --config {} start", output.display());

    Ok(())
}

fn run_validate(config_path: PathBuf) -> Result<()> {
    match ReplidbConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Node ID: {}", config.node.id);
            println!("  Role: {}", config.role());
            println!("  Bind Address: {}", config.node.bind_address);
            match config.backend.kind {
                BackendKind::MariaDb => println!(
                    "  Backend: mariadb {}@{}:{}",
                    config.backend.user, config.backend.host, config.backend.port
                ),
                BackendKind::Sqlite => println!("  Backend: sqlite {:?}", config.backend.data_dir),
            }
            println!("  Replicas: {}", config.replication.replicas.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

fn run_info(config_path: PathBuf) -> Result<()> {
    let config = ReplidbConfig::from_file(&config_path)?;

    println!("Replidb Node Information");
    println!("========================");
    println!();
    println!("Node ID:          {}", config.node.id);
    println!("Role:             {}", config.role());
    println!("Bind Address:     {}", config.node.bind_address);
    println!();
    println!("Backend Configuration:");
    match config.backend.kind {
        BackendKind::MariaDb => {
            println!("  Kind:           mariadb");
            println!("  Host:           {}:{}", config.backend.host, config.backend.port);
            println!("  Pool Size:      {}", config.backend.pool_size);
        }
        BackendKind::Sqlite => {
            println!("  Kind:           sqlite");
            match &config.backend.data_dir {
                Some(dir) => println!("  Data Directory: {}", dir.display()),
                None => println!("  Data Directory: (in-memory)"),
            }
        }
    }
    println!();
    println!("Replication:");
    match config.role() {
        Role::Master => {
            println!("  Replicas:       {:?}", config.replication.replicas);
            println!("  Connect:        {} ms", config.replication.connect_timeout_ms);
            println!("  Write:          {} ms", config.replication.write_timeout_ms);
        }
        Role::Replica => {
            println!("  Client Writes:  {}", config.replication.accept_client_writes);
            println!("  Masters:        {:?}", config.replication.masters);
        }
    }
    println!();
    println!("Server Limits:");
    println!("  Read Timeout:   {} ms", config.server.read_timeout_ms);
    println!("  Write Timeout:  {} ms", config.server.write_timeout_ms);
    println!("  Max Frame:      {} bytes", config.server.max_frame_bytes);
    println!("  Connections:    {}", config.server.max_connections);

    Ok(())
}
