mod config;
mod ethereum;
mod server;

use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use config::Config;
use server::ProfilerMcpServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries MCP frames and CLI output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("archive-profiler")
        .version("0.1.0")
        .about("Transaction profiling and block lookup against an Ethereum archive node")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .help("Default network to use (base_sepolia, ethereum, local)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("Archive node RPC endpoint URL"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .value_name("ADDRESS")
                .help("Print the transaction profile of an address and exit")
                .conflicts_with("block-hash"),
        )
        .arg(
            Arg::new("block-hash")
                .short('b')
                .long("block-hash")
                .value_name("HASH")
                .help("Fetch a block by hash, print it and exit"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("generate-config") {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    info!("Default network: {}", config.default_network);

    let server = ProfilerMcpServer::new(config)?;

    if let Some(block_hash) = matches.get_one::<String>("block-hash") {
        return match server.lookup_block(block_hash, None).await {
            Ok(block) => {
                println!("{}", serde_json::to_string_pretty(&block)?);
                Ok(())
            }
            Err(e) => {
                println!("{}", serde_json::to_string_pretty(&e.report())?);
                Err(anyhow!("Block fetch failed with {}: {}", e.kind(), e))
            }
        };
    }

    if let Some(address) = matches.get_one::<String>("profile") {
        let report = server.build_profile(address, None).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    info!("Starting Archive Profiler MCP Server");

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
