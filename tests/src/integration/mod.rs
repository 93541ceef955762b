//! Cross-subsystem scenarios driven through the client protocol.

pub mod fixtures;

mod consensus_flows;
mod contract_flows;
mod cross_chain_flows;
mod ledger_flows;
