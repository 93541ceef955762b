//! # Consensus Flows
//!
//! Ordering and liveness of the replicated log under an honest cluster,
//! a crashed primary, a lossy or reordering network and lying replicas.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{address, expect_committed, keypair, Harness};
    use node_runtime::adapters::Delivery;
    use ql_01_consensus::{
        ConsensusMessage, PrePrepare, ReplicaKey, SlotCertificate, Transport, ViewChange, Vote,
    };
    use ql_02_block_storage::BatchPolicy;
    use shared_types::{
        Endpoint, Envelope, EnvelopeKind, NodeState, ReplyStatus, Request, Transaction,
    };
    use std::sync::Arc;

    // =========================================================================
    // ORDERING
    // =========================================================================

    #[test]
    fn test_every_replica_builds_the_same_chain() {
        let h = Harness::new();
        let requests: Vec<_> = (1..=5u8)
            .map(|seed| {
                let tx = Transaction::register(keypair(seed).public_key().as_bytes());
                let request = h.request(&tx);
                h.client.submit(&request).unwrap();
                request
            })
            .collect();
        h.cluster.pump();

        let reference = h.node(0).query().get_chain().unwrap();
        assert_eq!(reference.len(), 6);
        for node in h.cluster.nodes() {
            let chain = node.query().get_chain().unwrap();
            let hashes: Vec<_> = chain.iter().map(|b| b.hash).collect();
            let expected: Vec<_> = reference.iter().map(|b| b.hash).collect();
            assert_eq!(hashes, expected, "replica {} chain differs", node.id());
        }
        for request in &requests {
            assert!(matches!(h.result(request), Some(ReplyStatus::Committed(_))));
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_window_batching_cuts_identical_blocks() {
        let h = Harness::with(|config| config.consensus.batch = BatchPolicy::Window(2));
        for seed in 1..=4u8 {
            let tx = Transaction::register(keypair(seed).public_key().as_bytes());
            h.client.submit(&h.request(&tx)).unwrap();
        }
        h.cluster.pump();

        for node in h.cluster.nodes() {
            assert_eq!(node.query().tip_height(), 2);
            assert_eq!(node.query().get_block(1).unwrap().requests.len(), 2);
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    // =========================================================================
    // VIEW CHANGE
    // =========================================================================

    #[test]
    fn test_crashed_primary_is_replaced() {
        let h = Harness::new();
        h.cluster.network().isolate(0);

        let alice = keypair(1);
        let request = h.submit(&Transaction::register(alice.public_key().as_bytes()));
        assert!(h.result(&request).is_none());

        h.cluster.advance(2_500);
        let receipt = expect_committed(h.result(&request));
        assert!(receipt.outcome.is_success());

        for id in 1..4 {
            let status = h.node(id).query().consensus_status();
            assert_eq!(status.view, 1);
            assert_eq!(status.primary, 1);
            assert_eq!(h.node(id).query().tip_height(), 1);
        }
        assert_eq!(h.node(0).query().tip_height(), 0);

        // The new primary keeps ordering client traffic.
        let bob = keypair(2);
        let receipt = h.commit(&Transaction::register(bob.public_key().as_bytes()));
        assert!(receipt.outcome.is_success());
        h.assert_replicas_agree(&[1, 2, 3]);
    }

    #[test]
    fn test_no_progress_without_quorum() {
        let h = Harness::new();
        h.cluster.network().isolate(2);
        h.cluster.network().isolate(3);

        let request = h.submit(&Transaction::register(keypair(1).public_key().as_bytes()));
        h.cluster.advance(2_500);
        assert!(h.result(&request).is_none());
        for node in h.cluster.nodes() {
            assert_eq!(node.query().tip_height(), 0);
        }
    }

    // =========================================================================
    // UNRELIABLE NETWORK
    // =========================================================================

    #[test]
    fn test_duplicated_messages_commit_once() {
        let h = Harness::new();
        h.cluster.network().set_fault_hook(Arc::new(|envelope: &Envelope, _: &Endpoint| {
            if envelope.kind == EnvelopeKind::Consensus {
                Delivery::Duplicate
            } else {
                Delivery::Deliver
            }
        }));

        let receipt = h.commit(&Transaction::register(keypair(1).public_key().as_bytes()));
        assert!(receipt.outcome.is_success());
        for node in h.cluster.nodes() {
            assert_eq!(node.query().tip_height(), 1);
            assert_eq!(node.query().get_all_transactions().unwrap().len(), 1);
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_reordered_messages_reach_the_same_state() {
        let h = Harness::new();
        let alice = keypair(1);
        let bob = keypair(2);
        h.register(&alice);
        h.register(&bob);

        h.cluster.network().set_fault_hook(Arc::new(|envelope: &Envelope, _: &Endpoint| {
            if envelope.kind == EnvelopeKind::Consensus {
                Delivery::Defer
            } else {
                Delivery::Deliver
            }
        }));
        let transfers: Vec<_> = (1..=3u64)
            .map(|nonce| {
                let tx = Transaction::transfer(address(&alice), address(&bob), 10, nonce)
                    .signed(&alice);
                let request = h.request(&tx);
                h.client.submit(&request).unwrap();
                request
            })
            .collect();
        h.cluster.pump();
        while h.cluster.network().flush_deferred() > 0 {
            h.cluster.pump();
        }

        for request in &transfers {
            let receipt = expect_committed(h.result(request));
            assert!(receipt.outcome.is_success(), "{receipt:?}");
        }
        for id in 0..4 {
            assert_eq!(h.balance(id, &address(&alice)), Some(70));
            assert_eq!(h.balance(id, &address(&bob)), Some(130));
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    // =========================================================================
    // BYZANTINE BEHAVIOUR AND HALTING
    // =========================================================================

    #[test]
    fn test_forged_pre_prepare_is_recorded_as_evidence() {
        let h = Harness::new();
        let forged = h.request(&Transaction::register(keypair(9).public_key().as_bytes()));
        let message = ConsensusMessage::PrePrepare(PrePrepare {
            view: 0,
            sequence: 1,
            digest: forged.digest(),
            request: Some(forged),
            sender: 2,
        });
        let bytes = ReplicaKey::development(2).sign(message).unwrap().encode().unwrap();
        h.cluster
            .network()
            .send(Envelope::consensus(bytes, 2, 1), Endpoint::Node(1));
        h.cluster.pump();

        let evidence = h.node(1).query().byzantine_evidence();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind(), "unauthorized_pre_prepare");
        assert_eq!(evidence[0].offender(), Some(2));

        // The honest log is unaffected.
        let receipt = h.commit(&Transaction::register(keypair(1).public_key().as_bytes()));
        assert!(receipt.outcome.is_success());
        assert_eq!(h.node(1).query().tip_height(), 1);
    }

    /// Replica 3 reports slots it never saw prepared, signed only by itself.
    fn fabricated_view_change(mallory: &Request) -> Vec<Vec<u8>> {
        let digest = mallory.digest();
        let liar = ReplicaKey::development(3);
        let own_proof = vec![
            liar.sign(ConsensusMessage::PrePrepare(PrePrepare {
                view: 0,
                sequence: 1,
                digest,
                request: Some(mallory.clone()),
                sender: 3,
            }))
            .unwrap(),
            liar.sign(ConsensusMessage::Prepare(Vote {
                view: 0,
                sequence: 1,
                digest,
                sender: 3,
            }))
            .unwrap(),
        ];
        let certificates = [
            SlotCertificate {
                view: 0,
                sequence: 1,
                digest,
                request: Some(mallory.clone()),
                proof: own_proof,
            },
            // A view above the one being elected wins any highest-view pick.
            SlotCertificate {
                view: 9,
                sequence: 1,
                digest,
                request: Some(mallory.clone()),
                proof: Vec::new(),
            },
        ];
        certificates
            .into_iter()
            .map(|cert| {
                let message = ConsensusMessage::ViewChange(ViewChange {
                    new_view: 1,
                    last_delivered: 0,
                    prepared: vec![cert],
                    committed: Vec::new(),
                    sender: 3,
                });
                liar.sign(message).unwrap().encode().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_fabricated_view_change_cannot_steer_the_new_view() {
        let h = Harness::new();
        h.cluster.network().isolate(0);

        let alice = keypair(1);
        let mallory = keypair(66);
        let request = h.submit(&Transaction::register(alice.public_key().as_bytes()));
        let injected = h.request(&Transaction::register(mallory.public_key().as_bytes()));
        for bytes in fabricated_view_change(&injected) {
            for to in 1..3 {
                h.cluster
                    .network()
                    .send(Envelope::consensus(bytes.clone(), 3, to), Endpoint::Node(to));
            }
        }
        h.cluster.pump();

        for id in 1..3 {
            let evidence = h.node(id).query().byzantine_evidence();
            assert_eq!(evidence.len(), 2, "replica {id}: {evidence:?}");
            assert!(evidence
                .iter()
                .all(|e| e.kind() == "invalid_view_change" && e.offender() == Some(3)));
        }

        // The honest replicas still elect replica 1 and order the real request.
        h.cluster.advance(2_500);
        let receipt = expect_committed(h.result(&request));
        assert!(receipt.outcome.is_success());
        for id in 1..4 {
            assert_eq!(h.node(id).query().consensus_status().view, 1);
            assert_eq!(h.balance(id, &address(&mallory)), None);
        }
        assert!(h.result(&injected).is_none());
        h.assert_replicas_agree(&[1, 2, 3]);
    }

    #[test]
    fn test_storage_failure_halts_one_replica() {
        let h = Harness::new();
        h.cluster.store(3).inject_write_failure(true);

        let request = h.submit(&Transaction::register(keypair(1).public_key().as_bytes()));
        let receipt = expect_committed(h.result(&request));
        assert!(receipt.outcome.is_success());

        assert_eq!(h.node(3).state(), NodeState::HaltedAwaitingIntervention);
        assert!(!h.client.replies(&request.message_id).contains_key(&3));
        for id in 0..3 {
            assert_eq!(h.node(id).state(), NodeState::Running);
        }

        // Three healthy replicas still form a quorum.
        let receipt = h.commit(&Transaction::register(keypair(2).public_key().as_bytes()));
        assert!(receipt.outcome.is_success());
        h.assert_replicas_agree(&[0, 1, 2]);
    }
}
