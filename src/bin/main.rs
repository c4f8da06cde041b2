use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use visitor_gateway::{Environment, RedisIdentityStore, ServeArgs, StoreArgs, StoreConfig};

#[derive(Parser)]
#[command(name = "visitor-gateway")]
#[command(about = "HTTP gateway assigning durable anonymous visitor identities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway HTTP server
    Serve(ServeArgs),
    /// Check that the identity store is reachable
    Ping {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config()?;
            visitor_gateway::logging::init_tracing(config.environment)?;

            info!(
                environment = %config.environment,
                token_bytes = config.identity.token_bytes,
                expire_days = config.identity.expire_days,
                "Starting visitor gateway"
            );

            visitor_gateway::server::serve(config).await?;
        }
        Commands::Ping { store } => {
            visitor_gateway::logging::init_tracing(Environment::Dev)?;

            let store_config = StoreConfig::from(store);
            let store = RedisIdentityStore::connect(&store_config).await?;
            store.ping().await?;

            println!(
                "Identity store at {}:{} (db {}) is reachable.",
                store_config.host, store_config.port, store_config.database
            );
        }
    }

    Ok(())
}
