use anyhow::Result;
use clap::{Parser, Subcommand};
use fileshare::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileshare", about = "Multi-user file sharing server", version)]
struct Cli {
    /// Path to config.toml (default: platform config dir)
    #[arg(long, env = "FILESHARE_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind (overrides [gateway] host)
        #[arg(long, env = "FILESHARE_HOST")]
        host: Option<String>,
        /// Port to listen on (overrides [gateway] port)
        #[arg(long, env = "FILESHARE_PORT")]
        port: Option<u16>,
        /// Directory for the database and uploaded files (overrides [storage] data_dir)
        #[arg(long, env = "FILESHARE_DATA_DIR")]
        data_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.storage.data_dir = data_dir;
            }
            fileshare::gateway::run_gateway(config).await
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
