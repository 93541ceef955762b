use super::*;
use crate::ports::ContractHost;
use ql_03_accounts::LedgerConfig;
use serde_json::json;
use shared_types::InMemoryKVStore;

fn counter_code() -> String {
    json!({
        "module": "contract",
        "init": [
            {"op": "set", "path": [{"lit": "count"}], "value": {"lit": 0}},
            {"op": "set", "path": [{"lit": "owner"}], "value": "caller"}
        ],
        "methods": {
            "incr": {
                "params": {"by": "int"},
                "body": [
                    {"op": "require", "cond": {"gt": [{"arg": "by"}, {"lit": 0}]}, "message": "by must be positive"},
                    {"op": "let", "name": "next", "value": {"add": [{"get": {"path": [{"lit": "count"}]}}, {"arg": "by"}]}},
                    {"op": "set", "path": [{"lit": "count"}], "value": {"var": "next"}},
                    {"op": "info", "message": {"concat": [{"lit": "count is "}, {"var": "next"}]}},
                    {"op": "return", "value": {"var": "next"}}
                ]
            },
            "read": {
                "body": [{"op": "return", "value": {"get": {"path": [{"lit": "count"}]}}}]
            },
            "recurse": {
                "body": [{"op": "call", "contract": "counter", "method": "recurse"}]
            },
            "payout": {
                "params": {"to": "address", "amount": "int"},
                "body": [{"op": "transfer", "from": "self_address", "to": {"arg": "to"}, "amount": {"arg": "amount"}}]
            },
            "move_funds": {
                "params": {"from": "address", "to": "address"},
                "body": [{"op": "transfer", "from": {"arg": "from"}, "to": {"arg": "to"}, "amount": {"lit": 1}}]
            }
        }
    })
    .to_string()
}

fn relay_code() -> String {
    json!({
        "module": "contract",
        "methods": {
            "bump": {
                "params": {"by": "int"},
                "body": [
                    {"op": "set", "path": [{"lit": "attempts"}], "value": {"lit": 1}},
                    {"op": "let", "name": "r", "value": {"lit": null}},
                    {"op": "let", "name": "err", "value": {"lit": null}},
                    {"op": "call", "contract": "counter", "method": "incr",
                     "args": {"by": {"arg": "by"}}, "into": "r", "error_into": "err"},
                    {"op": "return", "value": {"map": {"result": {"var": "r"}, "error": {"var": "err"}}}}
                ]
            },
            "bump_strict": {
                "params": {"by": "int"},
                "body": [
                    {"op": "set", "path": [{"lit": "attempts"}], "value": {"lit": 1}},
                    {"op": "call", "contract": "counter", "method": "incr", "args": {"by": {"arg": "by"}}}
                ]
            },
            "whoami": {
                "body": [
                    {"op": "call", "contract": "mirror", "method": "whoami", "into": "r"},
                    {"op": "return", "value": {"var": "r"}}
                ]
            },
            "spend_via_counter": {
                "params": {"to": "address"},
                "body": [
                    {"op": "call", "contract": "counter", "method": "move_funds",
                     "args": {"from": "self_address", "to": {"arg": "to"}}}
                ]
            }
        }
    })
    .to_string()
}

/// Contract whose every method fans out into six calls to itself.
fn fan_code() -> String {
    let call = json!({"op": "call", "contract": "fan", "method": "go", "error_into": "err"});
    json!({
        "module": "contract",
        "methods": {
            "go": {"body": [call.clone(), call.clone(), call.clone(), call.clone(), call.clone(), call]}
        }
    })
    .to_string()
}

/// Native module reporting what the host tells it.
struct Mirror;

impl ContractModule for Mirror {
    fn call(&self, host: &mut dyn ContractHost, method: &str, _args: &Args) -> ContractResult<Value> {
        match method {
            "whoami" => {
                let mut out = BTreeMap::new();
                out.insert("caller".into(), Value::Str(host.caller().to_string()));
                out.insert(
                    "caller_contract".into(),
                    host.caller_contract().map(Value::from).unwrap_or_default(),
                );
                out.insert("depth".into(), Value::Int(i64::from(host.depth())));
                Ok(Value::Map(out))
            }
            other => Err(ContractError::MethodNotFound {
                contract: host.name().to_string(),
                method: other.to_string(),
            }),
        }
    }
}

struct Fixture {
    store: Arc<InMemoryKVStore>,
    runtime: ContractRuntime,
    alice: Address,
    bob: Address,
    carol: Address,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    fn with_config(config: RuntimeConfig) -> Self {
        let store = Arc::new(InMemoryKVStore::new());
        let ledger = AccountLedger::new(LedgerConfig { initial_balance: 100 });
        let runtime = ContractRuntime::new(config, ledger.clone())
            .with_system_module("mirror", Arc::new(Mirror));

        let mut state = StateOverlay::new(store.clone());
        let alice = ledger.register(&mut state, b"alice").unwrap().address;
        let bob = ledger.register(&mut state, b"bob").unwrap().address;
        let carol = ledger.register(&mut state, b"carol").unwrap().address;
        state.commit().unwrap();

        Self {
            store,
            runtime,
            alice,
            bob,
            carol,
        }
    }

    fn state(&self) -> StateOverlay {
        StateOverlay::new(self.store.clone())
    }

    fn deploy(&self, name: &str, code: &str) -> Execution {
        let mut state = self.state();
        let exec = self.runtime.deploy(&mut state, &self.alice, name, code);
        if exec.is_success() {
            state.commit().unwrap();
        }
        exec
    }

    fn invoke(&self, caller: &Address, contract: &str, method: &str, args: Args, value: u64) -> Execution {
        let mut state = self.state();
        let exec = self
            .runtime
            .invoke(&mut state, caller, contract, method, &args, value);
        if exec.is_success() {
            state.commit().unwrap();
        }
        exec
    }

    fn get(&self, contract: &str, path: &[&str]) -> Value {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.runtime.get(&self.state(), contract, &path).unwrap()
    }

    fn balance(&self, address: &Address) -> u64 {
        self.runtime.ledger().balance(&self.state(), address).unwrap()
    }
}

fn args(pairs: &[(&str, Value)]) -> Args {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_deploy_runs_init_and_opens_account() {
    let fx = Fixture::new();
    let exec = fx.deploy("counter", &counter_code());
    let address = Address::for_contract("counter", &fx.alice);
    assert_eq!(exec.result, Ok(Value::Str(address.to_string())));
    assert_eq!(fx.get("counter", &["count"]), Value::Int(0));
    assert_eq!(fx.get("counter", &["owner"]), Value::Str(fx.alice.to_string()));
    assert_eq!(fx.balance(&address), 0);
}

#[test]
fn test_deploy_rejections() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    assert!(matches!(
        fx.deploy("counter", &counter_code()).result,
        Err(ContractError::ContractExists { .. })
    ));
    assert!(matches!(
        fx.deploy("mirror", &counter_code()).result,
        Err(ContractError::ContractExists { .. })
    ));
    assert!(matches!(
        fx.deploy("bad-name", &counter_code()).result,
        Err(ContractError::InvalidName { .. })
    ));
    assert!(matches!(
        fx.deploy("other", r#"{"module":"main"}"#).result,
        Err(ContractError::InvalidModule(_))
    ));
}

#[test]
fn test_invoke_updates_storage_and_logs() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "counter", "incr", args(&[("by", Value::Int(5))]), 0);
    assert_eq!(exec.result, Ok(Value::Int(5)));
    assert_eq!(exec.logs.len(), 1);
    assert_eq!(exec.logs[0].message, "count is 5");
    assert_eq!(exec.logs[0].contract, "counter");
    assert_eq!(fx.get("counter", &["count"]), Value::Int(5));
}

#[test]
fn test_failed_invoke_writes_nothing() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let mut state = fx.state();
    let exec = fx.runtime.invoke(
        &mut state,
        &fx.bob,
        "counter",
        "incr",
        &args(&[("by", Value::Int(0))]),
        0,
    );
    assert_eq!(
        exec.result,
        Err(ContractError::Requirement("by must be positive".into()))
    );
    assert!(!state.is_dirty());
}

#[test]
fn test_lookup_and_schema_errors() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    assert!(matches!(
        fx.invoke(&fx.bob, "nope", "incr", Args::new(), 0).result,
        Err(ContractError::ContractNotFound { .. })
    ));
    assert!(matches!(
        fx.invoke(&fx.bob, "counter", "nope", Args::new(), 0).result,
        Err(ContractError::MethodNotFound { .. })
    ));
    assert!(matches!(
        fx.invoke(&fx.bob, "counter", "incr", args(&[("by", Value::from("5"))]), 0).result,
        Err(ContractError::ArgumentMismatch { .. })
    ));
}

#[test]
fn test_recursion_is_bounded() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "counter", "recurse", Args::new(), 0);
    assert_eq!(
        exec.result,
        Err(ContractError::CallDepthExceeded { depth: 9, max: 8 })
    );
}

#[test]
fn test_call_fan_out_is_bounded_by_steps() {
    let fx = Fixture::with_config(RuntimeConfig {
        max_steps: 500,
        ..RuntimeConfig::default()
    });
    fx.deploy("fan", &fan_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "fan", "go", Args::new(), 0);
    // `error_into` does not swallow the exhausted budget.
    assert_eq!(exec.result, Err(ContractError::StepLimitExceeded { limit: 500 }));
}

#[test]
fn test_steps_count_frames_and_instructions() {
    // `incr` is one frame plus five instructions.
    let exact = Fixture::with_config(RuntimeConfig {
        max_steps: 6,
        ..RuntimeConfig::default()
    });
    exact.deploy("counter", &counter_code()).result.unwrap();
    let exec = exact.invoke(&exact.bob, "counter", "incr", args(&[("by", Value::Int(1))]), 0);
    assert_eq!(exec.result, Ok(Value::Int(1)));

    let short = Fixture::with_config(RuntimeConfig {
        max_steps: 5,
        ..RuntimeConfig::default()
    });
    short.deploy("counter", &counter_code()).result.unwrap();
    let exec = short.invoke(&short.bob, "counter", "incr", args(&[("by", Value::Int(1))]), 0);
    assert_eq!(exec.result, Err(ContractError::StepLimitExceeded { limit: 5 }));
    assert_eq!(short.get("counter", &["count"]), Value::Int(0));
}

#[test]
fn test_caught_nested_failure_discards_only_callee() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    fx.deploy("relay", &relay_code()).result.unwrap();

    let exec = fx.invoke(&fx.bob, "relay", "bump", args(&[("by", Value::Int(0))]), 0);
    let result = exec.result.unwrap();
    let map = result.as_map().unwrap();
    assert_eq!(map["result"], Value::Null);
    assert!(map["error"].as_str().unwrap().contains("by must be positive"));
    assert_eq!(fx.get("relay", &["attempts"]), Value::Int(1));
    assert_eq!(fx.get("counter", &["count"]), Value::Int(0));

    let exec = fx.invoke(&fx.bob, "relay", "bump", args(&[("by", Value::Int(2))]), 0);
    assert_eq!(exec.result.unwrap().as_map().unwrap()["result"], Value::Int(2));
    assert_eq!(fx.get("counter", &["count"]), Value::Int(2));
}

#[test]
fn test_uncaught_nested_failure_aborts_caller() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    fx.deploy("relay", &relay_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "relay", "bump_strict", args(&[("by", Value::Int(0))]), 0);
    assert!(matches!(exec.result, Err(ContractError::Requirement(_))));
    assert_eq!(fx.get("relay", &["attempts"]), Value::Null);
}

#[test]
fn test_nested_frame_sees_calling_contract() {
    let fx = Fixture::new();
    fx.deploy("relay", &relay_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "relay", "whoami", Args::new(), 0);
    let info = exec.result.unwrap();
    let info = info.as_map().unwrap();
    assert_eq!(info["caller_contract"], Value::from("relay"));
    assert_eq!(
        info["caller"],
        Value::Str(Address::for_contract("relay", &fx.alice).to_string())
    );
    assert_eq!(info["depth"], Value::Int(1));
}

#[test]
fn test_invoke_value_and_payout() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let contract = Address::for_contract("counter", &fx.alice);

    let exec = fx.invoke(&fx.bob, "counter", "read", Args::new(), 30);
    assert!(exec.is_success());
    assert_eq!(fx.balance(&fx.bob), 70);
    assert_eq!(fx.balance(&contract), 30);

    let payout = args(&[
        ("to", Value::Str(fx.carol.to_string())),
        ("amount", Value::Int(10)),
    ]);
    assert!(fx.invoke(&fx.bob, "counter", "payout", payout, 0).is_success());
    assert_eq!(fx.balance(&contract), 20);
    assert_eq!(fx.balance(&fx.carol), 110);
}

#[test]
fn test_value_transfer_rolls_back_with_failed_method() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let exec = fx.invoke(&fx.bob, "counter", "incr", args(&[("by", Value::Int(0))]), 30);
    assert!(!exec.is_success());
    assert_eq!(fx.balance(&fx.bob), 100);
}

#[test]
fn test_transfer_authorization() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();

    // carol is neither caller, deployer nor the contract.
    let steal = args(&[
        ("from", Value::Str(fx.carol.to_string())),
        ("to", Value::Str(fx.bob.to_string())),
    ]);
    assert!(matches!(
        fx.invoke(&fx.bob, "counter", "move_funds", steal, 0).result,
        Err(ContractError::TransferNotAuthorized { .. })
    ));

    // The caller may move its own funds; so may the deployer's contract.
    let own = args(&[
        ("from", Value::Str(fx.bob.to_string())),
        ("to", Value::Str(fx.carol.to_string())),
    ]);
    assert!(fx.invoke(&fx.bob, "counter", "move_funds", own, 0).is_success());
    let deployer = args(&[
        ("from", Value::Str(fx.alice.to_string())),
        ("to", Value::Str(fx.carol.to_string())),
    ]);
    assert!(fx.invoke(&fx.bob, "counter", "move_funds", deployer, 0).is_success());
    assert_eq!(fx.balance(&fx.carol), 102);
}

#[test]
fn test_callee_cannot_spend_calling_contract_funds() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    fx.deploy("relay", &relay_code()).result.unwrap();
    let relay = Address::for_contract("relay", &fx.alice);
    assert!(fx.invoke(&fx.bob, "relay", "whoami", Args::new(), 40).is_success());
    assert_eq!(fx.balance(&relay), 40);

    let to = args(&[("to", Value::Str(fx.carol.to_string()))]);
    let exec = fx.invoke(&fx.bob, "relay", "spend_via_counter", to, 0);
    assert!(matches!(
        exec.result,
        Err(ContractError::TransferNotAuthorized { ref contract, ref from })
            if contract == "counter" && *from == relay
    ));
    assert_eq!(fx.balance(&relay), 40);
    assert_eq!(fx.balance(&fx.carol), 100);
}

#[test]
fn test_insufficient_contract_balance() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    let payout = args(&[
        ("to", Value::Str(fx.carol.to_string())),
        ("amount", Value::Int(1)),
    ]);
    assert!(matches!(
        fx.invoke(&fx.bob, "counter", "payout", payout, 0).result,
        Err(ContractError::Account(ql_03_accounts::AccountError::InsufficientBalance { .. }))
    ));
}

#[test]
fn test_query_mode_is_read_only() {
    let fx = Fixture::new();
    fx.deploy("counter", &counter_code()).result.unwrap();
    fx.invoke(&fx.bob, "counter", "incr", args(&[("by", Value::Int(3))]), 0)
        .result
        .unwrap();

    let mut state = fx.state();
    let read = fx.runtime.query(&mut state, "counter", "read", &Args::new());
    assert_eq!(read.result, Ok(Value::Int(3)));

    let write = fx
        .runtime
        .query(&mut state, "counter", "incr", &args(&[("by", Value::Int(1))]));
    assert_eq!(
        write.result,
        Err(ContractError::NotInCommittedContext("storage write"))
    );
    assert!(!state.is_dirty());
}

#[test]
fn test_get_unknown_contract() {
    let fx = Fixture::new();
    assert!(matches!(
        fx.runtime.get(&fx.state(), "ghost", &[]),
        Err(ContractError::ContractNotFound { .. })
    ));
}

#[test]
fn test_same_requests_same_state() {
    let run = || {
        let fx = Fixture::new();
        fx.deploy("counter", &counter_code()).result.unwrap();
        fx.deploy("relay", &relay_code()).result.unwrap();
        fx.invoke(&fx.bob, "counter", "incr", args(&[("by", Value::Int(4))]), 7);
        fx.invoke(&fx.carol, "relay", "bump", args(&[("by", Value::Int(0))]), 0);
        fx.invoke(&fx.carol, "relay", "bump", args(&[("by", Value::Int(9))]), 0);
        fx.store.snapshot()
    };
    assert_eq!(run(), run());
}
