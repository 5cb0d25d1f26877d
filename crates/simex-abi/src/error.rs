//! Errors raised while generating or checking typed values.

use crate::types::AbiType;
use thiserror::Error;

/// A typed-value error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("unsupported type: {ty} ({reason})")]
    UnsupportedType { ty: AbiType, reason: &'static str },

    #[error("wrong number of arguments for {method}: expected {expected}, found {found}")]
    ArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {position} of {method}: value {value} does not have type {expected}")]
    TypeMismatch {
        method: String,
        position: usize,
        expected: AbiType,
        value: String,
    },

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

pub type AbiResult<T> = Result<T, AbiError>;
