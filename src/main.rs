//! Chainrelay - supply chain orchestrator relay

use chainrelay_core::agents::{supply_chain_tree, DEFAULT_MODEL};
use chainrelay_core::RelayConfig;
use chainrelay_engine::{EngineAdmin, EngineClient, ToolboxClient};
use chainrelay_gateway::start_gateway;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chainrelay",
    about = "Chat relay in front of a hosted supply chain agent"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web gateway (default)
    Serve {
        /// Overrides PORT
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print the agent tree and its environment for deployment
    Agents,
    /// Configure memory generation on the agent engine
    ProvisionMemory {
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chainrelay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            let mut config = RelayConfig::from_env()?;
            if let Some(port) = port {
                config.port = port;
            }
            start_gateway(config).await?;
        }

        Commands::Agents => {
            let config = RelayConfig::from_env()?;
            let tools = ToolboxClient::new(&config.toolbox_server)
                .load_toolset(&config.toolbox_toolset)
                .await?;
            let tree = supply_chain_tree(DEFAULT_MODEL, &tools);
            tree.validate()?;
            let deployment = serde_json::json!({
                "env_vars": config.agent_env(),
                "root_agent": tree,
            });
            println!("{}", serde_json::to_string_pretty(&deployment)?);
        }

        Commands::ProvisionMemory { model } => {
            let config = RelayConfig::from_env()?;
            let admin = EngineAdmin::new(EngineClient::from_config(&config));
            let updated = admin
                .configure_memory_bank(&config.publisher_model(&model))
                .await?;
            tracing::info!("Memory bank configured with {}", model);
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }

        Commands::Version => {
            println!("chainrelay v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
