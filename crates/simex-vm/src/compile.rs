//! Validation of contract definitions and metadata extraction.

use crate::ast::{mapping_shape, BinOp, ContractDef, Expr, FunctionDef, Stmt, UnaryOp};
use crate::error::{VmError, VmResult};
use crate::storage::Storage;
use simex_abi::{AbiType, ContractMeta, MethodSig, StateVar};
use std::collections::HashSet;

impl ContractDef {
    /// Parse and validate a JSON contract definition.
    pub fn from_json(src: &str) -> VmResult<Self> {
        let def: ContractDef = serde_json::from_str(src)?;
        def.validate()?;
        Ok(def)
    }

    /// Check names, references and types of the whole contract.
    pub fn validate(&self) -> VmResult<()> {
        let mut names = HashSet::new();
        for decl in &self.storage {
            if !names.insert(decl.name.as_str()) {
                return Err(self.duplicate("storage variable", &decl.name));
            }
        }
        Storage::new(&self.storage)?;

        let mut sigs = HashSet::new();
        for function in &self.functions {
            if function.name.is_empty() || function.name == MethodSig::CONSTRUCTOR_NAME {
                return Err(VmError::Invalid {
                    function: format!("{}.{}", self.name, function.name),
                    message: "function name is empty or reserved".into(),
                });
            }
            if !sigs.insert(function.signature()) {
                return Err(self.duplicate("function", &function.signature().to_string()));
            }
            Checker::new(self, function, false).check()?;
        }
        if let Some(ctor) = &self.constructor {
            Checker::new(self, ctor, true).check()?;
        }
        Ok(())
    }

    /// The method table of this contract.
    pub fn metadata(&self) -> ContractMeta {
        ContractMeta {
            name: self.name.clone(),
            state_vars: self
                .storage
                .iter()
                .map(|d| StateVar {
                    name: d.name.clone(),
                    ty: d.ty.clone(),
                })
                .collect(),
            constructor: self
                .constructor
                .as_ref()
                .map(|c| MethodSig::constructor(c.params.clone(), c.mutability)),
            methods: self.functions.iter().map(FunctionDef::method_sig).collect(),
        }
    }

    fn duplicate(&self, what: &'static str, name: &str) -> VmError {
        VmError::Duplicate {
            contract: self.name.clone(),
            what,
            name: name.to_string(),
        }
    }
}

impl FunctionDef {
    pub fn method_sig(&self) -> MethodSig {
        MethodSig::new(
            self.name.clone(),
            self.params.clone(),
            self.returns.clone(),
            self.visibility,
            self.mutability,
        )
    }
}

/// Static type of an expression. Integer literals stay open until they
/// meet a typed operand.
#[derive(Debug, Clone, PartialEq)]
enum ExprTy {
    Exact(AbiType),
    IntLit(i64),
    UintLit(u64),
}

impl ExprTy {
    fn is_integer(&self) -> bool {
        match self {
            ExprTy::Exact(ty) => matches!(ty, AbiType::Uint(_) | AbiType::Int(_)),
            ExprTy::IntLit(_) | ExprTy::UintLit(_) => true,
        }
    }

    /// Whether a value of this static type can be stored as `ty`.
    fn fits(&self, ty: &AbiType) -> bool {
        match (self, ty) {
            (ExprTy::Exact(t), _) => t == ty,
            (ExprTy::IntLit(v), AbiType::Int(bits)) => {
                let (lo, hi) = AbiType::int_bounds(*bits);
                lo <= *v as i128 && *v as i128 <= hi
            }
            (ExprTy::IntLit(v), AbiType::Uint(bits)) => *v >= 0 && *v as u128 <= AbiType::uint_max(*bits),
            (ExprTy::UintLit(v), AbiType::Uint(bits)) => *v as u128 <= AbiType::uint_max(*bits),
            (ExprTy::UintLit(v), AbiType::Int(bits)) => *v as i128 <= AbiType::int_bounds(*bits).1,
            _ => false,
        }
    }

    /// Common type of two operands.
    fn unify(self, other: ExprTy) -> Option<ExprTy> {
        match (self, other) {
            (ExprTy::Exact(a), o) => o.fits(&a).then_some(ExprTy::Exact(a)),
            (s, ExprTy::Exact(b)) => s.fits(&b).then_some(ExprTy::Exact(b)),
            (ExprTy::UintLit(_), o @ ExprTy::IntLit(_)) => Some(o),
            (s, _) => Some(s),
        }
    }
}

impl std::fmt::Display for ExprTy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprTy::Exact(ty) => write!(f, "{}", ty),
            ExprTy::IntLit(v) => write!(f, "literal {}", v),
            ExprTy::UintLit(v) => write!(f, "literal {}", v),
        }
    }
}

struct Checker<'a> {
    contract: &'a ContractDef,
    function: &'a FunctionDef,
    is_constructor: bool,
}

impl<'a> Checker<'a> {
    fn new(contract: &'a ContractDef, function: &'a FunctionDef, is_constructor: bool) -> Self {
        Self {
            contract,
            function,
            is_constructor,
        }
    }

    fn invalid(&self, message: impl Into<String>) -> VmError {
        let name = if self.is_constructor {
            MethodSig::CONSTRUCTOR_NAME
        } else {
            self.function.name.as_str()
        };
        VmError::Invalid {
            function: format!("{}.{}", self.contract.name, name),
            message: message.into(),
        }
    }

    fn check(&self) -> VmResult<()> {
        if self.is_constructor {
            if !self.function.returns.is_empty() {
                return Err(self.invalid("constructor cannot return values"));
            }
            if self.function.mutability.is_read_only() {
                return Err(self.invalid("constructor cannot be view or pure"));
            }
        }
        let mut params = HashSet::new();
        for p in &self.function.params {
            if !p.name.is_empty() && !params.insert(p.name.as_str()) {
                return Err(self.invalid(format!("duplicate parameter '{}'", p.name)));
            }
            if matches!(p.ty, AbiType::Mapping(..)) {
                return Err(self.invalid(format!("parameter '{}' cannot be a mapping", p.name)));
            }
        }
        for ty in &self.function.returns {
            if ty.zero_value().is_none() {
                return Err(self.invalid(format!("unsupported return type {}", ty)));
            }
        }
        self.check_block(&self.function.body)
    }

    fn check_block(&self, stmts: &[Stmt]) -> VmResult<()> {
        stmts.iter().try_for_each(|s| self.check_stmt(s))
    }

    fn check_stmt(&self, stmt: &Stmt) -> VmResult<()> {
        match stmt {
            Stmt::Assign { var, keys, value } => {
                if self.function.mutability.is_read_only() {
                    return Err(self.invalid("storage write in a view or pure function"));
                }
                let target = self.storage_type(*var, keys)?;
                self.expect(value, &target)
            }
            Stmt::Require { cond, .. } => self.expect(cond, &AbiType::Bool),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expect(cond, &AbiType::Bool)?;
                self.check_block(then_branch)?;
                self.check_block(else_branch)
            }
            Stmt::Return { values } => {
                if values.len() != self.function.returns.len() {
                    return Err(self.invalid(format!(
                        "returns {} values, declared {}",
                        values.len(),
                        self.function.returns.len()
                    )));
                }
                values
                    .iter()
                    .zip(&self.function.returns)
                    .try_for_each(|(v, ty)| self.expect(v, ty))
            }
            Stmt::Revert { .. } => Ok(()),
        }
    }

    fn expect(&self, expr: &Expr, ty: &AbiType) -> VmResult<()> {
        let found = self.type_of(expr)?;
        if found.fits(ty) {
            Ok(())
        } else {
            Err(self.invalid(format!("expected {}, found {}", ty, found)))
        }
    }

    /// Leaf type of `storage[var][keys..]`, checking every key.
    fn storage_type(&self, var: usize, keys: &[Expr]) -> VmResult<AbiType> {
        let decl = self
            .contract
            .storage
            .get(var)
            .ok_or_else(|| self.invalid(format!("storage index {} out of range", var)))?;
        let (key_types, leaf) = mapping_shape(&decl.ty);
        if key_types.len() != keys.len() {
            return Err(self.invalid(format!(
                "'{}' takes {} keys, got {}",
                decl.name,
                key_types.len(),
                keys.len()
            )));
        }
        for (key, ty) in keys.iter().zip(key_types) {
            self.expect(key, ty)?;
        }
        Ok(leaf.clone())
    }

    fn type_of(&self, expr: &Expr) -> VmResult<ExprTy> {
        Ok(match expr {
            Expr::Bool { .. } => ExprTy::Exact(AbiType::Bool),
            Expr::Int { value } => ExprTy::IntLit(*value),
            Expr::Uint { value } => ExprTy::UintLit(*value),
            Expr::Address { .. } => ExprTy::Exact(AbiType::Address),
            Expr::Str { .. } => ExprTy::Exact(AbiType::String),
            Expr::Storage { var, keys } => ExprTy::Exact(self.storage_type(*var, keys)?),
            Expr::Param { index } => {
                let param = self
                    .function
                    .params
                    .get(*index)
                    .ok_or_else(|| self.invalid(format!("parameter index {} out of range", index)))?;
                ExprTy::Exact(param.ty.clone())
            }
            Expr::Sender => ExprTy::Exact(AbiType::Address),
            Expr::CallValue | Expr::Balance => ExprTy::Exact(AbiType::uint256()),
            Expr::Index { base, index } => {
                let elem = match self.type_of(base)? {
                    ExprTy::Exact(AbiType::Array(elem, Some(_))) => *elem,
                    other => return Err(self.invalid(format!("cannot index into {}", other))),
                };
                if !self.type_of(index)?.is_integer() {
                    return Err(self.invalid("array index must be an integer"));
                }
                ExprTy::Exact(elem)
            }
            Expr::Binary { op, left, right } => {
                let l = self.type_of(left)?;
                let r = self.type_of(right)?;
                match op {
                    BinOp::And | BinOp::Or => {
                        self.expect(left, &AbiType::Bool)?;
                        self.expect(right, &AbiType::Bool)?;
                        ExprTy::Exact(AbiType::Bool)
                    }
                    _ => {
                        let mismatch = format!("operands of {:?} disagree: {} vs {}", op, l, r);
                        let common = l.unify(r).ok_or_else(|| self.invalid(mismatch))?;
                        if (op.is_arithmetic() || op.is_ordering()) && !common.is_integer() {
                            return Err(self.invalid(format!("{:?} needs integer operands", op)));
                        }
                        if op.is_arithmetic() {
                            common
                        } else {
                            ExprTy::Exact(AbiType::Bool)
                        }
                    }
                }
            }
            Expr::Unary { op, operand } => match (op, self.type_of(operand)?) {
                (UnaryOp::Not, ExprTy::Exact(AbiType::Bool)) => ExprTy::Exact(AbiType::Bool),
                (UnaryOp::Neg, ExprTy::Exact(AbiType::Int(bits))) => ExprTy::Exact(AbiType::Int(bits)),
                (UnaryOp::Neg, ExprTy::IntLit(v)) => match v.checked_neg() {
                    Some(n) => ExprTy::IntLit(n),
                    None => return Err(self.invalid("literal negation overflows")),
                },
                (UnaryOp::Neg, ExprTy::UintLit(v)) => match i64::try_from(v) {
                    Ok(n) => ExprTy::IntLit(-n),
                    Err(_) => return Err(self.invalid("literal negation overflows")),
                },
                (op, other) => return Err(self.invalid(format!("cannot apply {:?} to {}", op, other))),
            },
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expect(cond, &AbiType::Bool)?;
                let a = self.type_of(then_branch)?;
                let b = self.type_of(else_branch)?;
                let mismatch = format!("branches disagree: {} vs {}", a, b);
                a.unify(b).ok_or_else(|| self.invalid(mismatch))?
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simex_abi::{MethodKind, Mutability, Visibility};

    const COUNTER: &str = r#"{
        "name": "Counter",
        "storage": [{"name": "x", "ty": "uint8"}],
        "functions": [
            {"name": "inc", "body": [
                {"kind": "Assign", "var": 0, "value":
                    {"kind": "Binary", "op": "Add", "left": {"kind": "Storage", "var": 0}, "right": {"kind": "Int", "value": 1}}}
            ]},
            {"name": "get", "mutability": "view", "returns": ["uint8"],
             "body": [{"kind": "Return", "values": [{"kind": "Storage", "var": 0}]}]},
            {"name": "helper", "visibility": "internal", "body": []}
        ]
    }"#;

    fn with_function(function: &str) -> String {
        format!(
            r#"{{"name": "C", "storage": [{{"name": "x", "ty": "uint8"}}, {{"name": "m", "ty": "mapping(address=>bool)"}}],
                "functions": [{}]}}"#,
            function
        )
    }

    #[test]
    fn test_valid_contract_metadata() {
        let def = ContractDef::from_json(COUNTER).unwrap();
        let meta = def.metadata();
        assert_eq!(meta.name, "Counter");
        assert!(!meta.has_constructor());
        assert_eq!(meta.state_vars[0].ty, AbiType::Uint(8));
        assert_eq!(meta.methods.len(), 3);
        assert_eq!(meta.methods[0].kind(), MethodKind::Mutator);
        assert_eq!(meta.methods[1].kind(), MethodKind::Observer);
        assert_eq!(meta.methods[1].outputs, vec![AbiType::Uint(8)]);
        assert_eq!(meta.methods[2].visibility, Visibility::Internal);
    }

    #[test]
    fn test_explicit_constructor_metadata() {
        let json = r#"{"name": "C", "storage": [{"name": "x", "ty": "int256"}],
            "constructor": {"params": [{"name": "v", "ty": "int256"}], "mutability": "payable",
                "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Param", "index": 0}}]}}"#;
        let meta = ContractDef::from_json(json).unwrap().metadata();
        let ctor = meta.constructor.unwrap();
        assert!(ctor.is_constructor());
        assert!(ctor.is_payable());
        assert_eq!(ctor.inputs.len(), 1);
    }

    #[test]
    fn test_rejects_write_in_view() {
        let json = with_function(
            r#"{"name": "f", "mutability": "view",
                "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Uint", "value": 1}}]}"#,
        );
        let err = ContractDef::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("storage write"), "{}", err);
    }

    #[test]
    fn test_rejects_out_of_range_references() {
        let storage = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 7, "value": {"kind": "Uint", "value": 1}}]}"#,
        );
        assert!(matches!(ContractDef::from_json(&storage), Err(VmError::Invalid { .. })));

        let param = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Param", "index": 0}}]}"#,
        );
        assert!(matches!(ContractDef::from_json(&param), Err(VmError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_ill_typed_writes() {
        let bool_into_uint = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Bool", "value": true}}]}"#,
        );
        assert!(ContractDef::from_json(&bool_into_uint).is_err());

        let literal_too_big = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Uint", "value": 256}}]}"#,
        );
        assert!(ContractDef::from_json(&literal_too_big).is_err());

        let negative_into_uint = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 0, "value": {"kind": "Int", "value": -1}}]}"#,
        );
        assert!(ContractDef::from_json(&negative_into_uint).is_err());
    }

    #[test]
    fn test_mapping_keys_are_checked() {
        let ok = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 1, "keys": [{"kind": "Sender"}],
                "value": {"kind": "Bool", "value": true}}]}"#,
        );
        ContractDef::from_json(&ok).unwrap();

        let missing_key = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 1, "value": {"kind": "Bool", "value": true}}]}"#,
        );
        assert!(ContractDef::from_json(&missing_key).is_err());

        let wrong_key = with_function(
            r#"{"name": "f", "body": [{"kind": "Assign", "var": 1, "keys": [{"kind": "Uint", "value": 1}],
                "value": {"kind": "Bool", "value": true}}]}"#,
        );
        assert!(ContractDef::from_json(&wrong_key).is_err());
    }

    #[test]
    fn test_return_arity() {
        let json = with_function(r#"{"name": "f", "returns": ["uint8"], "body": [{"kind": "Return"}]}"#);
        assert!(ContractDef::from_json(&json).is_err());
    }

    #[test]
    fn test_duplicates() {
        let json = r#"{"name": "C", "functions": [{"name": "f"}, {"name": "f"}]}"#;
        assert!(matches!(ContractDef::from_json(json), Err(VmError::Duplicate { .. })));

        let overload = r#"{"name": "C", "functions": [{"name": "f"},
            {"name": "f", "params": [{"name": "a", "ty": "bool"}]}]}"#;
        ContractDef::from_json(overload).unwrap();

        let storage = r#"{"name": "C", "storage": [{"name": "x", "ty": "bool"}, {"name": "x", "ty": "bool"}]}"#;
        assert!(matches!(ContractDef::from_json(storage), Err(VmError::Duplicate { .. })));
    }

    #[test]
    fn test_reserved_function_name() {
        let json = r#"{"name": "C", "functions": [{"name": "constructor"}]}"#;
        assert!(ContractDef::from_json(json).is_err());
    }

    #[test]
    fn test_view_constructor_rejected() {
        let json = r#"{"name": "C", "constructor": {"mutability": "view"}}"#;
        assert!(ContractDef::from_json(json).is_err());
    }

    #[test]
    fn test_literal_unification() {
        let signed = with_function(
            r#"{"name": "f", "params": [{"name": "a", "ty": "int8"}], "returns": ["bool"],
                "body": [{"kind": "Return", "values": [{"kind": "Binary", "op": "Lt",
                    "left": {"kind": "Param", "index": 0}, "right": {"kind": "Int", "value": -5}}]}]}"#,
        );
        ContractDef::from_json(&signed).unwrap();

        let mixed = with_function(
            r#"{"name": "f", "params": [{"name": "a", "ty": "int8"}], "returns": ["bool"],
                "body": [{"kind": "Return", "values": [{"kind": "Binary", "op": "Lt",
                    "left": {"kind": "Param", "index": 0}, "right": {"kind": "Storage", "var": 0}}]}]}"#,
        );
        assert!(ContractDef::from_json(&mixed).is_err());
    }

    #[test]
    fn test_method_sig_round_trip() {
        let def = ContractDef::from_json(COUNTER).unwrap();
        let sig = def.functions[1].method_sig();
        assert_eq!(sig.mutability, Mutability::View);
        assert_eq!(sig.signature(), def.functions[1].signature());
    }
}
