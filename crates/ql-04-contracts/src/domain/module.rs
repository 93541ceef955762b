//! # Contract Module Format
//!
//! Contracts are deployed as a JSON document instead of source code:
//!
//! ```json
//! {
//!   "module": "contract",
//!   "init": [ { "op": "set", "path": [{"lit": "owner"}], "value": "caller" } ],
//!   "methods": {
//!     "deposit": {
//!       "params": { "amount": "int" },
//!       "body": [ { "op": "return", "value": {"arg": "amount"} } ]
//!     }
//!   }
//! }
//! ```
//!
//! There are no loops, so every method terminates after at most one pass
//! over its instructions.

use serde::{Deserialize, Serialize};
use shared_types::{Address, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed top-level module identifier.
pub const MODULE_IDENTIFIER: &str = "contract";

/// Parsed contract module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSource {
    pub module: String,
    /// Runs once at deployment with the deployer as caller.
    #[serde(default)]
    pub init: Vec<Instr>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodDef>,
}

/// One callable method.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodDef {
    #[serde(default)]
    pub params: BTreeMap<String, Param>,
    #[serde(default)]
    pub body: Vec<Instr>,
}

/// Declared argument type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Str,
    Bool,
    List,
    Map,
    /// A string holding a well-formed ledger address.
    Address,
    Any,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Str => "str",
            ParamType::Bool => "bool",
            ParamType::List => "list",
            ParamType::Map => "map",
            ParamType::Address => "address",
            ParamType::Any => "any",
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ParamType::Any, _) => true,
            (ParamType::Int, Value::Int(_)) => true,
            (ParamType::Str, Value::Str(_)) => true,
            (ParamType::Bool, Value::Bool(_)) => true,
            (ParamType::List, Value::List(_)) => true,
            (ParamType::Map, Value::Map(_)) => true,
            (ParamType::Address, Value::Str(s)) => Address::new(s.as_str()).is_well_formed(),
            _ => false,
        }
    }
}

/// Argument declaration: a type name, optionally suffixed with `?`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Param {
    pub ty: ParamType,
    pub optional: bool,
}

impl TryFrom<String> for Param {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let (name, optional) = match raw.strip_suffix('?') {
            Some(name) => (name, true),
            None => (raw.as_str(), false),
        };
        let ty = match name {
            "int" => ParamType::Int,
            "str" => ParamType::Str,
            "bool" => ParamType::Bool,
            "list" => ParamType::List,
            "map" => ParamType::Map,
            "address" => ParamType::Address,
            "any" => ParamType::Any,
            other => return Err(format!("unknown parameter type {other:?}")),
        };
        Ok(Self { ty, optional })
    }
}

impl From<Param> for String {
    fn from(param: Param) -> Self {
        param.to_string()
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ty.as_str())?;
        if self.optional {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    /// Bind a local variable.
    Let { name: String, value: Expr },
    /// Write own storage at `path`.
    Set { path: Vec<Expr>, value: Expr },
    /// Remove own storage at `path`.
    Delete { path: Vec<Expr> },
    /// `transferFrom(from, to, amount)`.
    Transfer { from: Expr, to: Expr, amount: Expr },
    /// Nested invocation; the result is bound to `into` when given.
    ///
    /// A failed call aborts the caller unless `error_into` is given, in
    /// which case the error message is bound there and execution continues.
    Call {
        contract: String,
        method: String,
        #[serde(default)]
        args: BTreeMap<String, Expr>,
        #[serde(default)]
        into: Option<String>,
        #[serde(default)]
        error_into: Option<String>,
    },
    /// Diagnostic message.
    Info { message: Expr },
    /// Fail the call with `message` unless `cond` is true.
    Require { cond: Expr, message: String },
    If {
        cond: Expr,
        #[serde(default)]
        then: Vec<Instr>,
        #[serde(default, rename = "else")]
        otherwise: Vec<Instr>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
}

/// Expression.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Lit(Value),
    Arg(String),
    Var(String),
    Caller,
    SelfName,
    SelfAddress,
    Deployer,
    /// Storage read; `contract` defaults to the executing contract.
    Get {
        #[serde(default)]
        contract: Option<String>,
        path: Vec<Expr>,
    },
    /// Ledger balance of an address.
    Balance(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Concat(Vec<Expr>),
    ToStr(Box<Expr>),
    /// Map lookup; a missing key yields null.
    Field(Box<Expr>, Box<Expr>),
    Has(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
    Map(BTreeMap<String, Expr>),
}

impl Expr {
    /// Direct sub-expressions.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Lit(_)
            | Expr::Arg(_)
            | Expr::Var(_)
            | Expr::Caller
            | Expr::SelfName
            | Expr::SelfAddress
            | Expr::Deployer => Vec::new(),
            Expr::Get { path, .. } => path.iter().collect(),
            Expr::Balance(e) | Expr::Not(e) | Expr::ToStr(e) => vec![e.as_ref()],
            Expr::Add(a, b)
            | Expr::Sub(a, b)
            | Expr::Mul(a, b)
            | Expr::Div(a, b)
            | Expr::Eq(a, b)
            | Expr::Ne(a, b)
            | Expr::Lt(a, b)
            | Expr::Le(a, b)
            | Expr::Gt(a, b)
            | Expr::Ge(a, b)
            | Expr::And(a, b)
            | Expr::Or(a, b)
            | Expr::Field(a, b)
            | Expr::Has(a, b) => vec![a.as_ref(), b.as_ref()],
            Expr::Concat(items) | Expr::List(items) => items.iter().collect(),
            Expr::Map(entries) => entries.values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_document() {
        let src = r#"{
            "module": "contract",
            "init": [{"op": "set", "path": [{"lit": "owner"}], "value": "caller"}],
            "methods": {
                "add": {
                    "params": {"a": "int", "b": "int?"},
                    "body": [
                        {"op": "if", "cond": {"eq": [{"arg": "b"}, {"lit": null}]},
                         "then": [{"op": "return", "value": {"arg": "a"}}]},
                        {"op": "return", "value": {"add": [{"arg": "a"}, {"arg": "b"}]}}
                    ]
                }
            }
        }"#;
        let module: ModuleSource = serde_json::from_str(src).unwrap();
        assert_eq!(module.module, MODULE_IDENTIFIER);
        let add = &module.methods["add"];
        assert_eq!(add.params["b"], Param { ty: ParamType::Int, optional: true });
        assert_eq!(add.body.len(), 2);
        assert!(matches!(
            module.init[0],
            Instr::Set { value: Expr::Caller, .. }
        ));
    }

    #[test]
    fn test_unknown_param_type_rejected() {
        let src = r#"{"module":"contract","methods":{"m":{"params":{"x":"float"}}}}"#;
        assert!(serde_json::from_str::<ModuleSource>(src).is_err());
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let src = r#"{"module":"contract","imports":["net"]}"#;
        assert!(serde_json::from_str::<ModuleSource>(src).is_err());
    }

    #[test]
    fn test_address_param_checks_format() {
        let ok = Value::Str("a".repeat(64));
        assert!(ParamType::Address.accepts(&ok));
        assert!(!ParamType::Address.accepts(&Value::Str("xyz".into())));
        assert!(!ParamType::Int.accepts(&Value::Str("1".into())));
        assert!(ParamType::Any.accepts(&Value::Null));
    }
}
