//! ABI types, contract metadata and the typed value domain for simex.
//!
//! This crate is the vocabulary shared between the contract front end
//! (which produces [`ContractMeta`]), the execution backends, and the
//! exploration core.

pub mod domain;
pub mod error;
pub mod metadata;
pub mod types;
pub mod value;

pub use domain::{cartesian, ValueDomain};
pub use error::{AbiError, AbiResult};
pub use metadata::{ContractMeta, MethodKind, MethodSig, Mutability, Param, Signature, StateVar, Visibility};
pub use types::AbiType;
pub use value::{Address, Value};
