//! Contract definition format.
//!
//! A contract is a JSON document: storage declarations, an optional
//! constructor and a list of functions whose bodies are statement trees.
//! Storage and parameters are referenced by index.

use serde::{Deserialize, Serialize};
use simex_abi::{AbiType, Mutability, Param, Signature, Visibility};

/// A whole contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractDef {
    pub name: String,
    /// Storage variables, referenced by position.
    #[serde(default)]
    pub storage: Vec<StorageDecl>,
    /// Explicit constructor. Its `name` is ignored.
    #[serde(default)]
    pub constructor: Option<FunctionDef>,
    #[serde(default)]
    pub functions: Vec<FunctionDef>,
}

/// A storage variable declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageDecl {
    pub name: String,
    pub ty: AbiType,
}

/// A function (or the constructor).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Vec<AbiType>,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default = "default_mutability")]
    pub mutability: Mutability,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

fn default_mutability() -> Mutability {
    Mutability::Nonpayable
}

impl FunctionDef {
    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            inputs: self.params.iter().map(|p| p.ty.clone()).collect(),
        }
    }
}

/// Statements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Stmt {
    /// `storage[var][keys..] = value`
    Assign {
        var: usize,
        #[serde(default)]
        keys: Vec<Expr>,
        value: Expr,
    },
    Require {
        cond: Expr,
        #[serde(default)]
        reason: Option<String>,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Vec<Stmt>,
    },
    Return {
        #[serde(default)]
        values: Vec<Expr>,
    },
    Revert {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Expressions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Expr {
    // Literals. Integer literals take the type of the other operand.
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Uint {
        value: u64,
    },
    Address {
        value: simex_abi::Address,
    },
    Str {
        value: String,
    },

    /// `storage[var][keys..]`
    Storage {
        var: usize,
        #[serde(default)]
        keys: Vec<Expr>,
    },
    Param {
        index: usize,
    },
    /// `msg.sender`
    Sender,
    /// `msg.value`
    CallValue,
    /// `address(this).balance`
    Balance,

    /// Element of a fixed-length array value.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BinOp {
    // Logical
    And,
    Or,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Split a (possibly nested) mapping type into its key types and leaf type.
pub fn mapping_shape(ty: &AbiType) -> (Vec<&AbiType>, &AbiType) {
    let mut keys = Vec::new();
    let mut leaf = ty;
    while let AbiType::Mapping(key, value) = leaf {
        keys.push(key.as_ref());
        leaf = value.as_ref();
    }
    (keys, leaf)
}
