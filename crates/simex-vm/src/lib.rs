//! Reference execution backend for simex.
//!
//! Contracts are JSON documents ([`ContractDef`]) validated up front and
//! run by a small interpreter with checked integer arithmetic. Reverts
//! and panics surface as error outcomes, never as Rust errors.

pub mod ast;
pub mod backend;
pub mod compile;
pub mod error;
mod eval;
pub mod storage;

pub use ast::{BinOp, ContractDef, Expr, FunctionDef, Stmt, StorageDecl, UnaryOp};
pub use backend::{VmBackend, VmInstance, ACCOUNTS};
pub use error::{VmError, VmResult};
pub use storage::{Slot, Storage};
