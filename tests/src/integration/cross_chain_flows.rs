//! # Cross-Chain Flows
//!
//! Transactions carrying a Merkle proof from a foreign chain whose root the
//! replicas trust through configuration.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{address, expect_committed, int_args, keypair, Harness};
    use ql_05_cross_chain::{recompute_root, TrustedRoot};
    use shared_crypto::{sha256, Ed25519KeyPair, MerkleTree};
    use shared_types::{
        CrossChainCall, CrossTranParam, CrossTranProof, Hash, Outcome, ReplyStatus, Transaction,
        Value,
    };

    const REMOTE: &str = "remote";
    const REMOTE_HEIGHT: u64 = 40;

    struct Remote {
        leaves: Vec<Hash>,
        tree: MerkleTree,
    }

    impl Remote {
        fn new() -> Self {
            let leaves: Vec<Hash> = (0..5u8).map(|i| sha256(&[b'x', i])).collect();
            let tree = MerkleTree::build(leaves.clone());
            Self { leaves, tree }
        }

        fn root(&self) -> TrustedRoot {
            TrustedRoot {
                chain: REMOTE.into(),
                height: REMOTE_HEIGHT,
                root: self.tree.root(),
            }
        }

        fn call(&self, leaf: usize, amount: i64) -> CrossChainCall {
            let path = self.tree.path(leaf).unwrap();
            CrossChainCall {
                proof: CrossTranProof {
                    merkle_path: path.siblings,
                    transaction_hash: self.leaves[leaf],
                    height: REMOTE_HEIGHT,
                    merkle_index: path.sides,
                },
                param: CrossTranParam {
                    contract_name: "vault".into(),
                    contract_func: "deposit".into(),
                    contract_args: int_args("amount", amount),
                },
            }
        }
    }

    fn setup() -> (Harness, Remote, Ed25519KeyPair) {
        let remote = Remote::new();
        let trusted = remote.root();
        let h = Harness::with(move |config| config.cross_chain.roots = vec![trusted.clone()]);
        let alice = keypair(1);
        h.register(&alice);
        h.publish_vault(&alice, 1);
        (h, remote, alice)
    }

    #[test]
    fn test_proven_call_executes_once() {
        let (h, remote, alice) = setup();
        let first = Transaction::cross_chain(address(&alice), REMOTE, remote.call(3, 11), 2)
            .signed(&alice);
        let receipt = h.commit(&first);
        assert_eq!(receipt.kind, "cross_chain");
        assert_eq!(receipt.outcome, Outcome::Success(Value::Int(11)));

        // A new local transaction replaying the same foreign one has no effect.
        let replay = Transaction::cross_chain(address(&alice), REMOTE, remote.call(3, 11), 3)
            .signed(&alice);
        let replayed = h.commit(&replay);
        assert_eq!(replayed.outcome, receipt.outcome);

        for id in 0..4 {
            assert_eq!(h.vault(id, "total"), Value::Int(11));
            let markers = h.node(id).query().get_cross_chain_markers(Some(REMOTE)).unwrap();
            assert_eq!(markers.len(), 1);
        }
        assert!(h
            .node(0)
            .query()
            .get_cross_chain_markers(Some("elsewhere"))
            .unwrap()
            .is_empty());
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_bad_proof_fails_without_marker() {
        let (h, remote, alice) = setup();
        let mut call = remote.call(0, 4);
        call.proof.transaction_hash = remote.leaves[1];
        let tx = Transaction::cross_chain(address(&alice), REMOTE, call, 2).signed(&alice);
        let receipt = h.commit(&tx);
        assert!(matches!(&receipt.outcome, Outcome::Failed(msg) if msg.contains("proof")));

        for id in 0..4 {
            assert_eq!(h.vault(id, "total"), Value::Int(0));
            assert!(h.node(id).query().get_cross_chain_markers(None).unwrap().is_empty());
        }
    }

    #[test]
    fn test_untrusted_chain_fails() {
        let (h, remote, alice) = setup();
        let tx = Transaction::cross_chain(address(&alice), "unknown", remote.call(2, 4), 2)
            .signed(&alice);
        let receipt = h.commit(&tx);
        assert!(!receipt.outcome.is_success());
        assert_eq!(h.vault(0, "total"), Value::Int(0));
    }

    #[test]
    fn test_missing_payload_is_rejected() {
        let (h, remote, alice) = setup();
        let mut call = remote.call(2, 4);
        call.param.contract_func.clear();
        let tx = Transaction::cross_chain(address(&alice), REMOTE, call, 2).signed(&alice);
        let request = h.submit(&tx);
        assert!(matches!(h.result(&request), Some(ReplyStatus::Rejected(_))));
    }

    #[test]
    fn test_local_blocks_serve_outbound_proofs() {
        let (h, _, alice) = setup();
        let bob = keypair(2);
        h.register(&bob);
        let tx = Transaction::transfer(address(&alice), address(&bob), 3, 2).signed(&alice);
        let request = h.submit(&tx);
        let receipt = expect_committed(h.result(&request));

        let query = h.node(3).query();
        let proof = query.get_transaction_proof(receipt.height, &tx.hash).unwrap();
        let block = query.get_block(receipt.height).unwrap();
        assert_eq!(recompute_root(&proof).unwrap(), block.merkle_root);
    }
}
