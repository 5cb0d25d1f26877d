//! Error types for exploration and example generation.

use crate::history::State;
use simex_abi::AbiError;
use std::fmt;
use thiserror::Error;

/// Infrastructure failure reported by an execution backend.
///
/// A reverted or panicking call is not a `BackendError`: it is an
/// [`Outcome::Error`](crate::Outcome) and part of normal exploration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("invalid call to {method}: {message}")]
    InvalidCall { method: String, message: String },

    #[error("backend failure: {0}")]
    Internal(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Structural precondition failure while aligning target methods with
/// source methods.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("no matching constructor: target {target} has no compatible source constructor (source declares {available})")]
    NoMatchingConstructor { target: String, available: String },

    #[error("incompatible signatures for '{name}': target {target} vs source {candidates}")]
    IncompatibleSignatures {
        name: String,
        target: String,
        candidates: String,
    },
}

pub type MappingResult<T> = Result<T, MappingError>;

/// A source and a target state with equal traces but inconsistent
/// observations.
#[derive(Debug, Clone)]
pub struct CounterExample {
    pub source: State,
    pub target: State,
}

impl fmt::Display for CounterExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trace {} yields source observation {} but target observation {}",
            self.source.trace, self.source.observation, self.target.observation
        )
    }
}

/// Top-level error of a simulation run.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("simulation counterexample: {0}")]
    CounterExample(Box<CounterExample>),
}

impl SimError {
    pub fn counter_example(source: State, target: State) -> Self {
        SimError::CounterExample(Box::new(CounterExample { source, target }))
    }

    /// The offending state pair, if this is a counterexample.
    pub fn as_counter_example(&self) -> Option<&CounterExample> {
        match self {
            SimError::CounterExample(cex) => Some(cex),
            _ => None,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
