//! # Ledger Flows
//!
//! Account registration and transfers end to end: admission checks,
//! replies and resubmission of already-committed transactions.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{address, expect_committed, keypair, Harness};
    use shared_types::{Outcome, ReplyStatus, Transaction, Value};

    #[test]
    fn test_transfer_moves_funds_on_every_replica() {
        let h = Harness::new();
        let alice = keypair(1);
        let bob = keypair(2);
        h.register(&alice);
        h.register(&bob);

        let tx = Transaction::transfer(address(&alice), address(&bob), 40, 1).signed(&alice);
        let receipt = h.commit(&tx);
        assert_eq!(receipt.outcome, Outcome::Success(Value::Null));
        assert_eq!(receipt.kind, "transfer");
        assert_eq!(receipt.tx_hash, tx.hash);
        assert_eq!(receipt.height, 3);

        for id in 0..4 {
            assert_eq!(h.balance(id, &address(&alice)), Some(60));
            assert_eq!(h.balance(id, &address(&bob)), Some(140));
            let stored = h.node(id).query().get_receipt(&tx.hash).unwrap();
            assert_eq!(stored.as_ref(), Some(&receipt));
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_every_replica_replies() {
        let h = Harness::new();
        let request = h.submit(&Transaction::register(keypair(1).public_key().as_bytes()));
        let replies = h.client.replies(&request.message_id);
        assert_eq!(replies.len(), 4);
        let first = replies.values().next().unwrap();
        assert!(replies.values().all(|status| status == first));
    }

    #[test]
    fn test_invalid_transfers_are_rejected_before_ordering() {
        let h = Harness::new();
        let alice = keypair(1);
        let bob = keypair(2);
        h.register(&alice);
        h.register(&bob);

        let overdraft =
            Transaction::transfer(address(&alice), address(&bob), 1_000, 1).signed(&alice);
        let to_self =
            Transaction::transfer(address(&alice), address(&alice), 5, 2).signed(&alice);
        let unknown = keypair(3);
        let from_stranger =
            Transaction::transfer(address(&unknown), address(&bob), 5, 1).signed(&unknown);
        let mut forged = Transaction::transfer(address(&alice), address(&bob), 5, 3).signed(&alice);
        forged.value = 50;

        for tx in [overdraft, to_self, from_stranger, forged] {
            let request = h.submit(&tx);
            match h.result(&request) {
                Some(ReplyStatus::Rejected(reason)) => assert!(!reason.is_empty()),
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        for node in h.cluster.nodes() {
            assert_eq!(node.query().tip_height(), 2);
        }
        assert_eq!(h.balance(0, &address(&alice)), Some(100));
    }

    #[test]
    fn test_register_twice_replays_the_first_receipt() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);

        // Same key, different client timestamp: the transaction hash is
        // unchanged, so this is a resubmission and replays the receipt.
        let again = h.request(&Transaction::register(alice.public_key().as_bytes()));
        h.client.forget(&again.message_id);
        h.send(&again);
        let receipt = expect_committed(h.result(&again));
        assert_eq!(receipt.height, 1);
        assert_eq!(h.node(0).query().tip_height(), 1);
    }

    #[test]
    fn test_resubmission_returns_the_stored_receipt() {
        let h = Harness::new();
        let alice = keypair(1);
        let bob = keypair(2);
        h.register(&alice);
        h.register(&bob);

        let tx = Transaction::transfer(address(&alice), address(&bob), 25, 1).signed(&alice);
        let request = h.submit(&tx);
        let first = expect_committed(h.result(&request));

        h.client.forget(&request.message_id);
        h.send(&request);
        let second = expect_committed(h.result(&request));

        assert_eq!(first, second);
        assert_eq!(h.balance(0, &address(&alice)), Some(75));
        for node in h.cluster.nodes() {
            assert_eq!(node.query().tip_height(), 3);
        }
    }

    #[test]
    fn test_accounts_listing() {
        let h = Harness::new();
        for seed in 1..=3u8 {
            h.register(&keypair(seed));
        }
        let accounts = h.node(2).query().get_all_accounts().unwrap();
        assert_eq!(accounts.len(), 3);
        assert!(accounts.iter().all(|a| a.balance == 100));
    }
}
