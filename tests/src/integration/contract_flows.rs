//! # Contract and Oracle Flows
//!
//! Publishing and invoking sandboxed contracts across the cluster, and the
//! oracle round trip: a contract asks, an off-chain reporter answers with
//! an event, and the callback runs on every replica.

#[cfg(test)]
mod tests {
    use crate::integration::fixtures::{
        address, expect_committed, int_args, keypair, Harness, CLIENT,
    };
    use shared_crypto::Ed25519KeyPair;
    use shared_types::{
        Address, Args, EventMessage, Outcome, ReplyStatus, Request, Transaction, Value,
    };

    fn deposit(h: &Harness, owner: &Ed25519KeyPair, amount: i64, value: u64, nonce: u64) -> Outcome {
        let args = int_args("amount", amount);
        let tx = Transaction::invoke(address(owner), "vault", "deposit", args, value, nonce)
            .signed(owner);
        h.commit(&tx).outcome
    }

    #[test]
    fn test_publish_and_invoke() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);
        h.publish_vault(&alice, 1);

        assert_eq!(deposit(&h, &alice, 5, 30, 2), Outcome::Success(Value::Int(5)));
        assert_eq!(deposit(&h, &alice, 7, 0, 3), Outcome::Success(Value::Int(12)));

        let vault = Address::for_contract("vault", &address(&alice));
        for id in 0..4 {
            assert_eq!(h.vault(id, "total"), Value::Int(12));
            assert_eq!(h.balance(id, &address(&alice)), Some(70));
            assert_eq!(h.balance(id, &vault), Some(30));
        }
        let contracts = h.node(1).query().get_contracts().unwrap();
        assert_eq!(contracts.len(), 1);
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_failed_method_rolls_back_value() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);
        h.publish_vault(&alice, 1);

        let outcome = deposit(&h, &alice, 0, 30, 2);
        assert!(matches!(&outcome, Outcome::Failed(msg) if msg.contains("amount must be positive")));
        for id in 0..4 {
            assert_eq!(h.balance(id, &address(&alice)), Some(100));
            assert_eq!(h.vault(id, "total"), Value::Int(0));
        }
        // The failure is still ordered and recorded.
        assert_eq!(h.node(0).query().tip_height(), 3);
    }

    #[test]
    fn test_read_only_query_does_not_commit() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);
        h.publish_vault(&alice, 1);
        deposit(&h, &alice, 4, 0, 2);

        let query = h.node(2).query();
        assert_eq!(query.query_contract("vault", "total", &Args::new()).unwrap(), Value::Int(4));
        assert!(query.query_contract("vault", "deposit", &int_args("amount", 1)).is_err());
        assert_eq!(h.vault(2, "total"), Value::Int(4));
    }

    #[test]
    fn test_invoke_unknown_contract_is_rejected() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);
        let tx = Transaction::invoke(address(&alice), "ghost", "x", Args::new(), 0, 1).signed(&alice);
        let request = h.submit(&tx);
        assert!(matches!(h.result(&request), Some(ReplyStatus::Rejected(reason)) if reason.contains("ghost")));
    }

    #[test]
    fn test_oracle_callback_runs_everywhere() {
        let h = Harness::new();
        let alice = keypair(1);
        h.register(&alice);
        h.publish_vault(&alice, 1);

        let ask = Transaction::invoke(address(&alice), "vault", "ask", Args::new(), 0, 2)
            .signed(&alice);
        let Outcome::Success(Value::Str(key)) = h.commit(&ask).outcome else {
            panic!("ask did not return an event key");
        };
        let reporter = keypair(42);
        let event = EventMessage::new(Address::default(), key, Args::new(), Value::Int(42))
            .signed(&reporter);
        let request = Request::for_event(&event, CLIENT, 100).unwrap();
        h.send(&request);
        let receipt = expect_committed(h.result(&request));

        assert_eq!(receipt.kind, "event");
        assert_eq!(receipt.tx_hash, event.compute_hash());
        assert_eq!(receipt.outcome, Outcome::Success(Value::Int(42)));
        for id in 0..4 {
            assert_eq!(h.vault(id, "price"), Value::Int(42));
            assert_eq!(h.node(id).query().get_oracle_reports().unwrap().len(), 1);
        }
        h.assert_replicas_agree(&[0, 1, 2, 3]);
    }

    #[test]
    fn test_tampered_event_is_rejected() {
        let h = Harness::new();
        let reporter = keypair(42);
        let mut event = EventMessage::new(Address::default(), "price", Args::new(), Value::Int(1))
            .signed(&reporter);
        event.report = Value::Int(2);
        let request = Request::for_event(&event, CLIENT, 1).unwrap();
        h.send(&request);
        assert!(matches!(h.result(&request), Some(ReplyStatus::Rejected(_))));
        assert_eq!(h.node(0).query().tip_height(), 0);
    }
}
