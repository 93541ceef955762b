//! # Subsystem Container
//!
//! Builds one replica's subsystems in dependency order and holds them for
//! the node's lifetime.
//!
//! ```text
//! Level 0: Ledger Store (memory | rocksdb)
//! Level 1: Account Ledger → Contract Runtime (+ oracle system module)
//! Level 2: Cross-Chain Verifier, Oracle Bridge → Transaction Dispatcher
//! Level 3: Block Builder → Commit Pipeline
//! Level 4: Consensus Engine → Client Gateway, Query Service
//! ```
//!
//! All subsystems are shared through `Arc`; each guards its own mutable
//! state, so the container itself needs no lock.

use crate::container::config::{NodeConfig, StorageBackend, StorageConfig};
use crate::handlers::{ClientGateway, CommitPipeline, QueryService};
use anyhow::{Context, Result};
use ql_01_consensus::{
    ConsensusApi, ConsensusDependencies, ConsensusService, TimeSource, Transport,
};
use ql_02_block_storage::{BlockStorageApi, BlockStorageService};
use ql_03_accounts::AccountLedger;
use ql_04_contracts::ContractRuntime;
use ql_05_cross_chain::{CrossChainVerifier, StaticRootTable};
use ql_06_oracle::{OracleBridge, OracleModule, ORACLE_CONTRACT};
use ql_07_execution::{ExecutionDependencies, RequestValidator, TransactionDispatcher};
use shared_types::{InMemoryKVStore, KeyValueStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Consensus engine as wired in a node.
pub type NodeConsensus = ConsensusService<dyn Transport, CommitPipeline>;

/// Open the configured Ledger Store backend.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryKVStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => {
            use crate::adapters::storage::{RocksDbConfig, RocksDbStore};
            std::fs::create_dir_all(&config.data_dir).with_context(|| {
                format!("creating data directory {}", config.data_dir.display())
            })?;
            let store = RocksDbStore::open(RocksDbConfig::at(&config.data_dir))
                .context("opening RocksDB ledger store")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => {
            anyhow::bail!("storage backend 'rocksdb' requires the `rocksdb` feature")
        }
    }
}

/// Central container holding one replica's subsystems.
pub struct SubsystemContainer {
    pub config: NodeConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub blocks: Arc<BlockStorageService>,
    pub dispatcher: Arc<TransactionDispatcher>,
    pub consensus: Arc<NodeConsensus>,
    pub gateway: ClientGateway,
    pub query: QueryService,
}

impl SubsystemContainer {
    /// Wire every subsystem on top of `store` and `transport`.
    ///
    /// `clock` replaces the system clock for consensus timeouts (tests).
    #[instrument(skip_all, fields(node = config.node.id))]
    pub fn build(
        config: NodeConfig,
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        clock: Option<Arc<dyn TimeSource>>,
    ) -> Result<Self> {
        let node_id = config.node.id;

        let runtime = Arc::new(
            ContractRuntime::new(
                config.ledger.runtime_config(),
                AccountLedger::new(config.ledger.ledger_config()),
            )
            .with_system_module(ORACLE_CONTRACT, Arc::new(OracleModule::new())),
        );
        let roots = Arc::new(StaticRootTable::from_roots(&config.cross_chain.roots));
        let dispatcher = Arc::new(TransactionDispatcher::new(ExecutionDependencies {
            store: Arc::clone(&store),
            runtime: Arc::clone(&runtime),
            cross_chain: CrossChainVerifier::new(roots),
            oracle: OracleBridge::new(),
        }));
        let validator = Arc::new(RequestValidator::new(Arc::clone(&store), runtime));

        let blocks = Arc::new(
            BlockStorageService::with_store(Arc::clone(&store), config.consensus.batch)
                .context("opening block storage")?,
        );
        let pipeline = Arc::new(CommitPipeline::new(
            node_id,
            Arc::clone(&blocks),
            Arc::clone(&dispatcher),
            Arc::clone(&transport),
        ));
        pipeline
            .recover()
            .context("executing blocks persisted before shutdown")?;

        let mut consensus = ConsensusService::new(ConsensusDependencies {
            transport: Arc::clone(&transport),
            sink: pipeline,
            config: config.consensus_config().context("reading consensus keys")?,
        })
        .context("configuring consensus")?;
        if let Some(clock) = clock {
            consensus = consensus.with_time_source(Box::new(clock));
        }
        let consensus = Arc::new(consensus);
        let consensus_api: Arc<dyn ConsensusApi> = consensus.clone();

        let gateway = ClientGateway::new(
            node_id,
            Arc::clone(&consensus_api),
            validator,
            dispatcher.clone(),
            transport,
        );
        let query = QueryService::new(Arc::clone(&blocks), Arc::clone(&dispatcher), consensus_api);

        info!(
            node = node_id,
            validators = config.peers.len(),
            backend = ?config.storage.backend,
            tip = blocks.tip().height,
            "subsystems initialized"
        );

        Ok(Self {
            config,
            store,
            blocks,
            dispatcher,
            consensus,
            gateway,
            query,
        })
    }
}
