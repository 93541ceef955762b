//! # Adapter Implementations
//!
//! Concrete implementations of the outbound ports the subsystems need:
//!
//! ```text
//! ql-01 Transport ──→ LocalNetwork (in-process)  |  TcpTransport (length-prefixed bincode)
//! KeyValueStore   ──→ InMemoryKVStore            |  RocksDbStore (feature "rocksdb")
//! ```

pub mod local_network;
pub mod storage;
pub mod tcp;

pub use local_network::{Delivery, FaultHook, LocalNetwork, NetworkStats};
pub use tcp::{encode_frame, read_frame, FrameError, TcpConfig, TcpTransport};
