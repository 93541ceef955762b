//! # Module Interpreter
//!
//! Executes [`ModuleSource`] methods against a [`ContractHost`]. Evaluation
//! is a single forward pass over the instruction tree: integers are checked
//! `i64`, there is no floating point and no iteration. Every executed
//! instruction is charged to the host's step budget.

use crate::domain::{check_args, Expr, Instr, ModuleSource};
use crate::errors::{ContractError, ContractResult};
use crate::ports::{ContractHost, ContractModule};
use shared_types::{Address, Args, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A deployed user module.
#[derive(Debug, Clone)]
pub struct InterpretedModule {
    source: ModuleSource,
}

impl InterpretedModule {
    pub fn new(source: ModuleSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }
}

impl ContractModule for InterpretedModule {
    fn init(&self, host: &mut dyn ContractHost) -> ContractResult<()> {
        let args = Args::new();
        Interpreter::new(host, &args).run(&self.source.init)?;
        Ok(())
    }

    fn call(&self, host: &mut dyn ContractHost, method: &str, args: &Args) -> ContractResult<Value> {
        let def = self
            .source
            .methods
            .get(method)
            .ok_or_else(|| ContractError::MethodNotFound {
                contract: host.name().to_string(),
                method: method.to_string(),
            })?;
        check_args(method, def, args)?;
        Interpreter::new(host, args).run(&def.body)
    }
}

enum Flow {
    Next,
    Return(Value),
}

struct Interpreter<'h, 'a> {
    host: &'h mut dyn ContractHost,
    args: &'a Args,
    vars: BTreeMap<String, Value>,
}

impl<'h, 'a> Interpreter<'h, 'a> {
    fn new(host: &'h mut dyn ContractHost, args: &'a Args) -> Self {
        Self {
            host,
            args,
            vars: BTreeMap::new(),
        }
    }

    fn run(&mut self, body: &[Instr]) -> ContractResult<Value> {
        match self.block(body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Null),
        }
    }

    fn block(&mut self, body: &[Instr]) -> ContractResult<Flow> {
        for instr in body {
            if let Flow::Return(value) = self.exec(instr)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, instr: &Instr) -> ContractResult<Flow> {
        self.host.charge(1)?;
        match instr {
            Instr::Let { name, value } => {
                let value = self.eval(value)?;
                self.vars.insert(name.clone(), value);
            }
            Instr::Set { path, value } => {
                let path = self.path(path)?;
                let value = self.eval(value)?;
                self.host.set(&path, value)?;
            }
            Instr::Delete { path } => {
                let path = self.path(path)?;
                self.host.delete(&path)?;
            }
            Instr::Transfer { from, to, amount } => {
                let from = self.address("transfer", from)?;
                let to = self.address("transfer", to)?;
                let amount = match self.eval(amount)? {
                    Value::Int(n) if n > 0 => n as u64,
                    other => return Err(ContractError::InvalidAmount(other.render())),
                };
                self.host.transfer_from(&from, &to, amount)?;
            }
            Instr::Call {
                contract,
                method,
                args,
                into,
                error_into,
            } => {
                let mut call_args = Args::new();
                for (name, expr) in args {
                    call_args.insert(name.clone(), self.eval(expr)?);
                }
                match self.host.call(contract, method, call_args) {
                    Ok(result) => {
                        if let Some(var) = into {
                            self.vars.insert(var.clone(), result);
                        }
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err @ ContractError::StepLimitExceeded { .. }) => return Err(err),
                    Err(err) => match error_into {
                        Some(var) => {
                            self.vars.insert(var.clone(), Value::Str(err.to_string()));
                        }
                        None => return Err(err),
                    },
                }
            }
            Instr::Info { message } => {
                let message = self.eval(message)?.render();
                self.host.info(&message);
            }
            Instr::Require { cond, message } => {
                if !self.boolean("require", cond)? {
                    return Err(ContractError::Requirement(message.clone()));
                }
            }
            Instr::If {
                cond,
                then,
                otherwise,
            } => {
                let branch = if self.boolean("if", cond)? { then } else { otherwise };
                return self.block(branch);
            }
            Instr::Return { value } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn eval(&mut self, expr: &Expr) -> ContractResult<Value> {
        Ok(match expr {
            Expr::Lit(value) => value.clone(),
            Expr::Arg(name) => self.args.get(name).cloned().unwrap_or_default(),
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| ContractError::UndefinedVariable(name.clone()))?,
            Expr::Caller => Value::Str(self.host.caller().to_string()),
            Expr::SelfName => Value::Str(self.host.name().to_string()),
            Expr::SelfAddress => Value::Str(self.host.address().to_string()),
            Expr::Deployer => Value::Str(self.host.deployer().to_string()),
            Expr::Get { contract, path } => {
                let path = self.path(path)?;
                let contract = match contract {
                    Some(name) => name.clone(),
                    None => self.host.name().to_string(),
                };
                self.host.get(&contract, &path)?
            }
            Expr::Balance(address) => {
                let address = self.address("balance", address)?;
                let balance = self.host.balance(&address)?;
                Value::Int(
                    i64::try_from(balance).map_err(|_| ContractError::Arithmetic("balance exceeds int range"))?,
                )
            }
            Expr::Add(a, b) => {
                let (a, b) = self.ints("add", a, b)?;
                Value::Int(a.checked_add(b).ok_or(ContractError::Arithmetic("overflow in add"))?)
            }
            Expr::Sub(a, b) => {
                let (a, b) = self.ints("sub", a, b)?;
                Value::Int(a.checked_sub(b).ok_or(ContractError::Arithmetic("overflow in sub"))?)
            }
            Expr::Mul(a, b) => {
                let (a, b) = self.ints("mul", a, b)?;
                Value::Int(a.checked_mul(b).ok_or(ContractError::Arithmetic("overflow in mul"))?)
            }
            Expr::Div(a, b) => {
                let (a, b) = self.ints("div", a, b)?;
                if b == 0 {
                    return Err(ContractError::Arithmetic("division by zero"));
                }
                Value::Int(a.checked_div(b).ok_or(ContractError::Arithmetic("overflow in div"))?)
            }
            Expr::Eq(a, b) => Value::Bool(self.eval(a)? == self.eval(b)?),
            Expr::Ne(a, b) => Value::Bool(self.eval(a)? != self.eval(b)?),
            Expr::Lt(a, b) => Value::Bool(self.compare(a, b)? == Ordering::Less),
            Expr::Le(a, b) => Value::Bool(self.compare(a, b)? != Ordering::Greater),
            Expr::Gt(a, b) => Value::Bool(self.compare(a, b)? == Ordering::Greater),
            Expr::Ge(a, b) => Value::Bool(self.compare(a, b)? != Ordering::Less),
            Expr::And(a, b) => Value::Bool(self.boolean("and", a)? && self.boolean("and", b)?),
            Expr::Or(a, b) => Value::Bool(self.boolean("or", a)? || self.boolean("or", b)?),
            Expr::Not(a) => Value::Bool(!self.boolean("not", a)?),
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.eval(part)?.render());
                }
                Value::Str(out)
            }
            Expr::ToStr(a) => Value::Str(self.eval(a)?.render()),
            Expr::Field(map, key) => {
                let key = self.key("field", key)?;
                match self.eval(map)? {
                    Value::Map(mut entries) => entries.remove(&key).unwrap_or_default(),
                    Value::Null => Value::Null,
                    other => {
                        return Err(ContractError::TypeMismatch {
                            op: "field",
                            expected: "map",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            Expr::Has(map, key) => {
                let key = self.key("has", key)?;
                match self.eval(map)? {
                    Value::Map(entries) => Value::Bool(entries.contains_key(&key)),
                    Value::Null => Value::Bool(false),
                    other => {
                        return Err(ContractError::TypeMismatch {
                            op: "has",
                            expected: "map",
                            actual: other.type_name(),
                        })
                    }
                }
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Value::List(out)
            }
            Expr::Map(entries) => {
                let mut out = BTreeMap::new();
                for (name, item) in entries {
                    out.insert(name.clone(), self.eval(item)?);
                }
                Value::Map(out)
            }
        })
    }

    fn boolean(&mut self, op: &'static str, expr: &Expr) -> ContractResult<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(ContractError::TypeMismatch {
                op,
                expected: "bool",
                actual: other.type_name(),
            }),
        }
    }

    fn ints(&mut self, op: &'static str, a: &Expr, b: &Expr) -> ContractResult<(i64, i64)> {
        let a = self.eval(a)?;
        let b = self.eval(b)?;
        match (a.as_int(), b.as_int()) {
            (Some(a), Some(b)) => Ok((a, b)),
            (None, _) => Err(ContractError::TypeMismatch {
                op,
                expected: "int",
                actual: a.type_name(),
            }),
            (_, None) => Err(ContractError::TypeMismatch {
                op,
                expected: "int",
                actual: b.type_name(),
            }),
        }
    }

    fn compare(&mut self, a: &Expr, b: &Expr) -> ContractResult<Ordering> {
        match (self.eval(a)?, self.eval(b)?) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(&b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(&b)),
            (a, _) => Err(ContractError::TypeMismatch {
                op: "compare",
                expected: "two ints or two strs",
                actual: a.type_name(),
            }),
        }
    }

    fn key(&mut self, op: &'static str, expr: &Expr) -> ContractResult<String> {
        match self.eval(expr)? {
            Value::Str(s) => Ok(s),
            Value::Int(n) => Ok(n.to_string()),
            other => Err(ContractError::TypeMismatch {
                op,
                expected: "str or int",
                actual: other.type_name(),
            }),
        }
    }

    fn path(&mut self, path: &[Expr]) -> ContractResult<Vec<String>> {
        path.iter().map(|segment| self.key("path", segment)).collect()
    }

    fn address(&mut self, op: &'static str, expr: &Expr) -> ContractResult<Address> {
        match self.eval(expr)? {
            Value::Str(s) => Ok(Address::new(s)),
            other => Err(ContractError::TypeMismatch {
                op,
                expected: "str",
                actual: other.type_name(),
            }),
        }
    }
}
