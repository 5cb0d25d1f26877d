//! Statement interpreter.

use crate::ast::{BinOp, ContractDef, Expr, FunctionDef, Stmt, UnaryOp};
use crate::error::VmError;
use crate::storage::Storage;
use simex_abi::{AbiType, Address, Value};
use std::cmp::Ordering;

/// Why a call stopped before returning normally.
#[derive(Debug)]
pub(crate) enum Halt {
    Revert(Option<String>),
    Panic(&'static str),
    Fault(VmError),
}

type Exec<T> = Result<T, Halt>;

/// An evaluated expression. Integer literals carry no type until they
/// meet a typed operand.
struct Operand {
    value: Value,
    ty: Option<AbiType>,
}

impl Operand {
    fn typed(value: Value, ty: AbiType) -> Self {
        Self { value, ty: Some(ty) }
    }
}

/// Execution environment of one call.
pub(crate) struct Frame<'a> {
    pub contract: &'a ContractDef,
    pub function: &'a FunctionDef,
    pub args: &'a [Value],
    pub sender: Address,
    pub value: u128,
    pub balance: u128,
    pub storage: &'a mut Storage,
}

impl Frame<'_> {
    /// Run the body; a body that falls off the end returns zero values.
    pub(crate) fn run(&mut self) -> Exec<Vec<Value>> {
        let function = self.function;
        let returned = self.exec_block(&function.body)?;
        match returned {
            Some(values) => values
                .into_iter()
                .zip(&function.returns)
                .map(|(v, ty)| self.coerce(v, ty))
                .collect(),
            None => function
                .returns
                .iter()
                .map(|ty| {
                    ty.zero_value()
                        .ok_or_else(|| self.fault(format!("no zero value for {}", ty)))
                })
                .collect(),
        }
    }

    fn fault(&self, message: impl Into<String>) -> Halt {
        Halt::Fault(VmError::Fault {
            function: format!("{}.{}", self.contract.name, self.function.name),
            message: message.into(),
        })
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Exec<Option<Vec<Operand>>> {
        for stmt in stmts {
            if let Some(values) = self.exec(stmt)? {
                return Ok(Some(values));
            }
        }
        Ok(None)
    }

    fn exec(&mut self, stmt: &Stmt) -> Exec<Option<Vec<Operand>>> {
        match stmt {
            Stmt::Assign { var, keys, value } => {
                let keys = self.eval_keys(*var, keys)?;
                let value = self.eval(value)?;
                let ty = self.leaf_type(*var)?;
                let value = self.coerce(value, &ty)?;
                if !self.storage.write(*var, keys, value) {
                    return Err(self.fault(format!("bad write to storage {}", var)));
                }
                Ok(None)
            }
            Stmt::Require { cond, reason } => {
                if self.eval_bool(cond)? {
                    Ok(None)
                } else {
                    Err(Halt::Revert(reason.clone()))
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(cond)? {
                    self.exec_block(then_branch)
                } else {
                    self.exec_block(else_branch)
                }
            }
            Stmt::Return { values } => Ok(Some(
                values.iter().map(|v| self.eval(v)).collect::<Exec<Vec<_>>>()?,
            )),
            Stmt::Revert { reason } => Err(Halt::Revert(reason.clone())),
        }
    }

    fn leaf_type(&self, var: usize) -> Exec<AbiType> {
        let decl = self
            .contract
            .storage
            .get(var)
            .ok_or_else(|| self.fault(format!("storage index {} out of range", var)))?;
        Ok(crate::ast::mapping_shape(&decl.ty).1.clone())
    }

    fn eval_keys(&self, var: usize, keys: &[Expr]) -> Exec<Vec<Value>> {
        let decl = self
            .contract
            .storage
            .get(var)
            .ok_or_else(|| self.fault(format!("storage index {} out of range", var)))?;
        let (key_types, _) = crate::ast::mapping_shape(&decl.ty);
        keys.iter()
            .zip(key_types)
            .map(|(k, ty)| {
                let key = self.eval(k)?;
                self.coerce(key, ty)
            })
            .collect()
    }

    fn eval_bool(&self, expr: &Expr) -> Exec<bool> {
        match self.eval(expr)?.value {
            Value::Bool(b) => Ok(b),
            other => Err(self.fault(format!("expected bool, got {}", other.kind_name()))),
        }
    }

    fn eval(&self, expr: &Expr) -> Exec<Operand> {
        match expr {
            Expr::Bool { value } => Ok(Operand::typed(Value::Bool(*value), AbiType::Bool)),
            Expr::Int { value } => Ok(Operand {
                value: Value::Int(*value as i128),
                ty: None,
            }),
            Expr::Uint { value } => Ok(Operand {
                value: Value::Uint(*value as u128),
                ty: None,
            }),
            Expr::Address { value } => Ok(Operand::typed(Value::Address(*value), AbiType::Address)),
            Expr::Str { value } => Ok(Operand::typed(Value::String(value.clone()), AbiType::String)),

            Expr::Storage { var, keys } => {
                let ty = self.leaf_type(*var)?;
                let keys = self.eval_keys(*var, keys)?;
                let value = self
                    .storage
                    .read(*var, &keys)
                    .ok_or_else(|| self.fault(format!("bad read of storage {}", var)))?;
                Ok(Operand::typed(value, ty))
            }
            Expr::Param { index } => {
                let value = self
                    .args
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| self.fault(format!("parameter {} not supplied", index)))?;
                let ty = self.function.params.get(*index).map(|p| p.ty.clone());
                Ok(Operand { value, ty })
            }
            Expr::Sender => Ok(Operand::typed(Value::Address(self.sender), AbiType::Address)),
            Expr::CallValue => Ok(Operand::typed(Value::Uint(self.value), AbiType::uint256())),
            Expr::Balance => Ok(Operand::typed(Value::Uint(self.balance), AbiType::uint256())),

            Expr::Index { base, index } => {
                let base = self.eval(base)?;
                let elem_ty = match &base.ty {
                    Some(AbiType::Array(elem, _)) => Some((**elem).clone()),
                    _ => None,
                };
                let items = match base.value {
                    Value::Array(items) => items,
                    other => return Err(self.fault(format!("cannot index {}", other.kind_name()))),
                };
                let i = match self.eval(index)?.value {
                    Value::Uint(n) => usize::try_from(n).ok(),
                    Value::Int(n) => usize::try_from(n).ok(),
                    other => return Err(self.fault(format!("bad index {}", other.kind_name()))),
                };
                let value = i
                    .and_then(|i| items.into_iter().nth(i))
                    .ok_or(Halt::Panic("array index out of bounds"))?;
                Ok(Operand { value, ty: elem_ty })
            }
            Expr::Binary { op, left, right } => match op {
                BinOp::And => {
                    let l = self.eval_bool(left)?;
                    Ok(Operand::typed(Value::Bool(l && self.eval_bool(right)?), AbiType::Bool))
                }
                BinOp::Or => {
                    let l = self.eval_bool(left)?;
                    Ok(Operand::typed(Value::Bool(l || self.eval_bool(right)?), AbiType::Bool))
                }
                _ => {
                    let l = self.eval(left)?;
                    let r = self.eval(right)?;
                    self.binary(*op, l, r)
                }
            },
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                match (op, v.value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Operand::typed(Value::Bool(!b), AbiType::Bool)),
                    (UnaryOp::Neg, Value::Int(n)) => {
                        let ty = v.ty.unwrap_or_else(AbiType::int256);
                        let negated = n.checked_neg().map(Value::Int);
                        match negated {
                            Some(value) if ty.admits(&value) => Ok(Operand::typed(value, ty)),
                            _ => Err(Halt::Panic("arithmetic overflow")),
                        }
                    }
                    (UnaryOp::Neg, Value::Uint(n)) if v.ty.is_none() => {
                        let n = i128::try_from(n).map_err(|_| Halt::Panic("arithmetic overflow"))?;
                        Ok(Operand {
                            value: Value::Int(-n),
                            ty: None,
                        })
                    }
                    (op, other) => Err(self.fault(format!("cannot apply {:?} to {}", op, other.kind_name()))),
                }
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(cond)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }
        }
    }

    /// Common type of two operands: the typed side wins; two literals are
    /// signed if either is.
    fn common_type(&self, l: &Operand, r: &Operand) -> AbiType {
        match (&l.ty, &r.ty) {
            (Some(ty), _) | (None, Some(ty)) => ty.clone(),
            (None, None) => match (&l.value, &r.value) {
                (Value::Int(_), _) | (_, Value::Int(_)) => AbiType::int256(),
                _ => AbiType::uint256(),
            },
        }
    }

    fn binary(&self, op: BinOp, l: Operand, r: Operand) -> Exec<Operand> {
        let ty = self.common_type(&l, &r);
        let is_int = matches!(ty, AbiType::Uint(_) | AbiType::Int(_));
        let (a, b) = if is_int {
            (self.coerce(l, &ty)?, self.coerce(r, &ty)?)
        } else {
            (l.value, r.value)
        };

        if op.is_arithmetic() {
            return self.arith(op, a, b, ty);
        }
        let result = match op {
            BinOp::Eq => a == b,
            BinOp::Ne => a != b,
            _ => {
                let ord = match (&a, &b) {
                    (Value::Uint(x), Value::Uint(y)) => x.cmp(y),
                    (Value::Int(x), Value::Int(y)) => x.cmp(y),
                    _ => return Err(self.fault(format!("cannot order {} and {}", a.kind_name(), b.kind_name()))),
                };
                match op {
                    BinOp::Lt => ord == Ordering::Less,
                    BinOp::Le => ord != Ordering::Greater,
                    BinOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }
            }
        };
        Ok(Operand::typed(Value::Bool(result), AbiType::Bool))
    }

    fn arith(&self, op: BinOp, a: Value, b: Value, ty: AbiType) -> Exec<Operand> {
        let zero_divisor = matches!(op, BinOp::Div | BinOp::Mod) && matches!(b, Value::Uint(0) | Value::Int(0));
        if zero_divisor {
            return Err(Halt::Panic("division by zero"));
        }
        let result = match (a, b) {
            (Value::Uint(x), Value::Uint(y)) => match op {
                BinOp::Add => x.checked_add(y),
                BinOp::Sub => x.checked_sub(y),
                BinOp::Mul => x.checked_mul(y),
                BinOp::Div => x.checked_div(y),
                _ => x.checked_rem(y),
            }
            .map(Value::Uint),
            (Value::Int(x), Value::Int(y)) => match op {
                BinOp::Add => x.checked_add(y),
                BinOp::Sub => x.checked_sub(y),
                BinOp::Mul => x.checked_mul(y),
                BinOp::Div => x.checked_div(y),
                _ => x.checked_rem(y),
            }
            .map(Value::Int),
            (a, b) => {
                return Err(self.fault(format!("{:?} on {} and {}", op, a.kind_name(), b.kind_name())));
            }
        };
        match result {
            Some(value) if ty.admits(&value) => Ok(Operand::typed(value, ty)),
            _ => Err(Halt::Panic("arithmetic overflow")),
        }
    }

    /// Convert an operand to `ty`; untyped integer literals are converted
    /// across signedness when in range.
    fn coerce(&self, operand: Operand, ty: &AbiType) -> Exec<Value> {
        let value = match (operand.value, ty) {
            (Value::Int(n), AbiType::Uint(_)) if operand.ty.is_none() => match u128::try_from(n) {
                Ok(n) => Value::Uint(n),
                Err(_) => return Err(self.fault(format!("literal {} does not fit {}", n, ty))),
            },
            (Value::Uint(n), AbiType::Int(_)) if operand.ty.is_none() => match i128::try_from(n) {
                Ok(n) => Value::Int(n),
                Err(_) => return Err(self.fault(format!("literal {} does not fit {}", n, ty))),
            },
            (value, _) => value,
        };
        if ty.admits(&value) {
            Ok(value)
        } else {
            Err(self.fault(format!("{} value does not fit {}", value.kind_name(), ty)))
        }
    }
}
