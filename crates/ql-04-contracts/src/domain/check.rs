//! # Deployment Checks
//!
//! Name rules, the static check run on every module before it is wrapped
//! into a transaction (and again at execution), and per-method argument
//! schema validation.

use crate::domain::module::{Expr, Instr, MethodDef, ModuleSource, MODULE_IDENTIFIER};
use crate::errors::{ContractError, ContractResult};
use shared_types::Args;
use std::collections::BTreeSet;

/// Maximum length of contract, method and parameter names.
pub const MAX_NAME_LEN: usize = 64;

fn name_problem(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("name is empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Some("name is longer than 64 characters");
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Some("only letters, digits and underscores are allowed");
    }
    None
}

/// Contract names: 1..=64 characters of `[A-Za-z0-9_]`.
pub fn validate_contract_name(name: &str) -> ContractResult<()> {
    match name_problem(name) {
        Some(reason) => Err(ContractError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_identifier(kind: &str, name: &str) -> ContractResult<()> {
    match name_problem(name) {
        Some(reason) => Err(ContractError::InvalidModule(format!(
            "{kind} {name:?}: {reason}"
        ))),
        None => Ok(()),
    }
}

/// Parse `code` and check it can be deployed.
///
/// Rejects malformed JSON, a wrong module identifier, bad method/parameter
/// names, references to undeclared arguments or unbound variables, empty
/// `require` messages and modules over `max_instructions` instructions.
pub fn static_check(code: &str, max_instructions: usize) -> ContractResult<ModuleSource> {
    let module: ModuleSource =
        serde_json::from_str(code).map_err(|e| ContractError::InvalidModule(e.to_string()))?;
    if module.module != MODULE_IDENTIFIER {
        return Err(ContractError::InvalidModule(format!(
            "module identifier must be {MODULE_IDENTIFIER:?}, found {:?}",
            module.module
        )));
    }

    let mut count = 0usize;
    let no_params = BTreeSet::new();
    Scope::new("init", &no_params).check_block(&module.init, &mut count)?;

    for (name, method) in &module.methods {
        validate_identifier("method", name)?;
        for param in method.params.keys() {
            validate_identifier("parameter", param)?;
        }
        let params: BTreeSet<&str> = method.params.keys().map(String::as_str).collect();
        Scope::new(name, &params).check_block(&method.body, &mut count)?;
    }

    if count > max_instructions {
        return Err(ContractError::InvalidModule(format!(
            "{count} instructions exceed the limit of {max_instructions}"
        )));
    }
    Ok(module)
}

struct Scope<'a> {
    method: &'a str,
    params: &'a BTreeSet<&'a str>,
    vars: BTreeSet<String>,
}

impl<'a> Scope<'a> {
    fn new(method: &'a str, params: &'a BTreeSet<&'a str>) -> Self {
        Self {
            method,
            params,
            vars: BTreeSet::new(),
        }
    }

    fn check_block(&mut self, body: &[Instr], count: &mut usize) -> ContractResult<()> {
        for instr in body {
            *count += 1;
            self.check_instr(instr, count)?;
        }
        Ok(())
    }

    fn check_instr(&mut self, instr: &Instr, count: &mut usize) -> ContractResult<()> {
        match instr {
            Instr::Let { name, value } => {
                self.check_expr(value)?;
                validate_identifier("variable", name)?;
                self.vars.insert(name.clone());
            }
            Instr::Set { path, value } => {
                self.check_path(path)?;
                self.check_expr(value)?;
            }
            Instr::Delete { path } => self.check_path(path)?,
            Instr::Transfer { from, to, amount } => {
                self.check_expr(from)?;
                self.check_expr(to)?;
                self.check_expr(amount)?;
            }
            Instr::Call {
                contract,
                method,
                args,
                into,
                error_into,
            } => {
                validate_identifier("called contract", contract)?;
                validate_identifier("called method", method)?;
                for value in args.values() {
                    self.check_expr(value)?;
                }
                for var in into.iter().chain(error_into.iter()) {
                    validate_identifier("variable", var)?;
                    self.vars.insert(var.clone());
                }
            }
            Instr::Info { message } => self.check_expr(message)?,
            Instr::Require { cond, message } => {
                self.check_expr(cond)?;
                if message.trim().is_empty() {
                    return Err(ContractError::InvalidModule(format!(
                        "require in {} has an empty message",
                        self.method
                    )));
                }
            }
            Instr::If {
                cond,
                then,
                otherwise,
            } => {
                self.check_expr(cond)?;
                self.check_block(then, count)?;
                self.check_block(otherwise, count)?;
            }
            Instr::Return { value } => {
                if let Some(value) = value {
                    self.check_expr(value)?;
                }
            }
        }
        Ok(())
    }

    fn check_path(&self, path: &[Expr]) -> ContractResult<()> {
        if path.is_empty() {
            return Err(ContractError::InvalidModule(format!(
                "storage path in {} is empty",
                self.method
            )));
        }
        path.iter().try_for_each(|e| self.check_expr(e))
    }

    fn check_expr(&self, expr: &Expr) -> ContractResult<()> {
        match expr {
            Expr::Arg(name) if !self.params.contains(name.as_str()) => {
                return Err(ContractError::InvalidModule(format!(
                    "{} reads undeclared argument {name:?}",
                    self.method
                )));
            }
            Expr::Var(name) if !self.vars.contains(name) => {
                return Err(ContractError::InvalidModule(format!(
                    "{} reads unbound variable {name:?}",
                    self.method
                )));
            }
            Expr::Get {
                contract: Some(contract),
                ..
            } => validate_identifier("contract", contract)?,
            _ => {}
        }
        expr.children().into_iter().try_for_each(|e| self.check_expr(e))
    }
}

/// Validate `args` against the method's declared schema.
pub fn check_args(method: &str, def: &MethodDef, args: &Args) -> ContractResult<()> {
    if let Some(extra) = args.keys().find(|k| !def.params.contains_key(*k)) {
        return Err(ContractError::UnexpectedArgument {
            method: method.to_string(),
            arg: extra.clone(),
        });
    }
    for (name, param) in &def.params {
        match args.get(name) {
            None if param.optional => {}
            None => {
                return Err(ContractError::MissingArgument {
                    method: method.to_string(),
                    arg: name.clone(),
                })
            }
            Some(value) if !param.ty.accepts(value) => {
                return Err(ContractError::ArgumentMismatch {
                    method: method.to_string(),
                    arg: name.clone(),
                    expected: param.ty.as_str(),
                    actual: value.type_name(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
