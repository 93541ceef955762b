//! # Quorum Ledger Node Runtime
//!
//! ```text
//! node-runtime --config node.toml [--node-id 2]   # one replica over TCP
//! node-runtime local-cluster --nodes 4            # in-process cluster
//! ```
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then `QL_*` environment, then flags)
//! 2. Install logging
//! 3. Open the Ledger Store and wire the subsystems
//! 4. Listen for envelopes and run until Ctrl+C

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use node_runtime::adapters::{TcpConfig, TcpTransport};
use node_runtime::container::open_store;
use node_runtime::telemetry::init_telemetry;
use node_runtime::{LocalCluster, Node, NodeConfig};
use shared_crypto::Ed25519KeyPair;
use shared_types::{Address, NodeId, Request, Transaction};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc::unbounded_channel, watch};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "node-runtime", version, about = "Quorum Ledger replica")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short, env = "QL_CONFIG")]
    config: Option<PathBuf>,

    /// Override `node.id` from the configuration.
    #[arg(long)]
    node_id: Option<NodeId>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a whole cluster in this process over the in-memory network.
    LocalCluster {
        #[arg(long, default_value_t = 4)]
        nodes: usize,

        /// Submit a few sample transactions once the cluster is up.
        #[arg(long)]
        demo: bool,
    },
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::local(0, 4, 7000),
    };
    config.apply_env_overrides()?;
    if let Some(id) = cli.node_id {
        config.node.id = id;
        if let Some(address) = config.peer_address(id).map(str::to_string) {
            config.node.listen = address;
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli).context("loading configuration")?;
    init_telemetry(&config.telemetry)?;

    match cli.command {
        Some(Command::LocalCluster { nodes, demo }) => run_local_cluster(config, nodes, demo).await,
        None => run_replica(config).await,
    }
}

async fn run_replica(config: NodeConfig) -> Result<()> {
    for warning in config.validate()? {
        warn!("{warning}");
    }
    if config.uses_development_keys() {
        warn!("consensus keys missing from the config; falling back to public development keys");
    }
    let node_id = config.node.id;
    let listen = config.node.listen.clone();
    let peers = config
        .peers
        .iter()
        .map(|p| (p.id, p.address.clone()))
        .collect();

    let store = open_store(&config.storage)?;
    let transport = Arc::new(TcpTransport::new(peers, TcpConfig::default())?);
    let max_frame = TcpConfig::default().max_frame_bytes;
    let node = Arc::new(Node::build(config, store, transport, None)?);

    let (inbox_tx, inbox) = unbounded_channel();
    let listener = TcpTransport::listen(&listen, inbox_tx, max_frame)
        .await
        .with_context(|| format!("binding {listen}"))?;

    let (stop, shutdown) = watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&node).run(inbox, shutdown));

    info!(node = node_id, %listen, "replica is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!(node = node_id, "shutting down");
    let _ = stop.send(true);
    listener.abort();
    worker.await?;
    Ok(())
}

async fn run_local_cluster(template: NodeConfig, nodes: usize, demo: bool) -> Result<()> {
    let cluster = LocalCluster::with_system_clock(nodes, |config| {
        config.consensus = template.consensus.clone();
        config.ledger = template.ledger.clone();
        config.cross_chain = template.cross_chain.clone();
    })?;
    let (stop, shutdown) = watch::channel(false);
    let workers = cluster.spawn(shutdown);
    info!(nodes, "local cluster running");

    if demo {
        run_demo(&cluster).await?;
    }

    info!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    let _ = stop.send(true);
    for worker in workers {
        worker.await?;
    }
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Register two accounts and move funds between them.
async fn run_demo(cluster: &LocalCluster) -> Result<()> {
    let client = cluster.client("demo-client");
    let alice = Ed25519KeyPair::generate();
    let bob = Ed25519KeyPair::generate();
    let alice_address = Address::from_public_key(alice.public_key().as_bytes());
    let bob_address = Address::from_public_key(bob.public_key().as_bytes());

    let transactions = [
        Transaction::register(alice.public_key().as_bytes()),
        Transaction::register(bob.public_key().as_bytes()),
        Transaction::transfer(alice_address, bob_address, 25, 1).signed(&alice),
    ];
    for tx in &transactions {
        let request = Request::for_transaction(tx, client.address(), now_millis())?;
        client.submit(&request)?;
        match client
            .wait_for(&request.message_id, Duration::from_secs(10))
            .await
        {
            Some(status) => info!(kind = tx.kind.as_str(), ?status, "demo transaction settled"),
            None => warn!(kind = tx.kind.as_str(), "demo transaction timed out"),
        }
    }

    for account in cluster.node(0).query().get_all_accounts()? {
        info!(address = %account.address, balance = account.balance, "account");
    }
    Ok(())
}
