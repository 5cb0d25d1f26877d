//! Execution history model: invocations, results, traces, observations
//! and states.
//!
//! All of these are immutable values with structural equality. Traces and
//! observations share their operation lists through `Arc`, so cloning a
//! [`State`] is cheap.

use serde::{Deserialize, Serialize};
use simex_abi::{AbiError, AbiResult, MethodSig, Signature, Value};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A method call with concrete arguments and an optional payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Invocation {
    pub method: Signature,
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u128>,
}

impl Invocation {
    /// Build an invocation, checking argument count and types against the
    /// method's declared parameters.
    pub fn new(method: &MethodSig, args: Vec<Value>, value: Option<u128>) -> AbiResult<Self> {
        if args.len() != method.inputs.len() {
            return Err(AbiError::ArityMismatch {
                method: method.signature().to_string(),
                expected: method.inputs.len(),
                found: args.len(),
            });
        }
        for (position, (param, arg)) in method.inputs.iter().zip(&args).enumerate() {
            if !param.ty.admits(arg) {
                return Err(AbiError::TypeMismatch {
                    method: method.signature().to_string(),
                    position,
                    expected: param.ty.clone(),
                    value: arg.to_string(),
                });
            }
        }
        Ok(Self {
            method: method.signature(),
            args,
            value,
        })
    }

    pub fn is_constructor(&self) -> bool {
        self.method.is_constructor()
    }

    /// The attached payment, zero when absent.
    pub fn payment(&self) -> u128 {
        self.value.unwrap_or(0)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.method.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")?;
        if let Some(v) = self.value {
            write!(f, "{{value: {}}}", v)?;
        }
        Ok(())
    }
}

/// Classification of an error result, decided by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Explicit revert or failed `require`.
    Reverted,
    /// Arithmetic fault, out-of-bounds access and the like.
    Panicked,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Reverted => write!(f, "reverted"),
            ErrorKind::Panicked => write!(f, "panicked"),
        }
    }
}

/// The result of executing an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Normal(Vec<Value>),
    Error {
        kind: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Outcome {
    pub fn unit() -> Self {
        Outcome::Normal(Vec::new())
    }

    pub fn reverted(reason: impl Into<String>) -> Self {
        Outcome::Error {
            kind: ErrorKind::Reverted,
            reason: Some(reason.into()),
        }
    }

    pub fn panicked(reason: impl Into<String>) -> Self {
        Outcome::Error {
            kind: ErrorKind::Panicked,
            reason: Some(reason.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }

    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Outcome::Normal(values) => Some(values),
            Outcome::Error { .. } => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Normal(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Outcome::Error { kind, reason: None } => write!(f, "{}", kind),
            Outcome::Error {
                kind,
                reason: Some(reason),
            } => write!(f, "{}({:?})", kind, reason),
        }
    }
}

/// An invocation paired with its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Operation {
    pub invocation: Invocation,
    pub outcome: Outcome,
}

impl Operation {
    pub fn new(invocation: Invocation, outcome: Outcome) -> Self {
        Self {
            invocation,
            outcome,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.invocation, self.outcome)
    }
}

/// The full call history that produced a state, constructor first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace(Arc<Vec<Operation>>);

impl Trace {
    /// The initial marker, used before any constructor has run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new trace equal to this one followed by `op`.
    pub fn extend(&self, op: Operation) -> Self {
        let mut ops = Vec::with_capacity(self.0.len() + 1);
        ops.extend(self.0.iter().cloned());
        ops.push(op);
        Trace(Arc::new(ops))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }

    /// Number of operations after the constructor.
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// The literal call sequence, for replay or code emission.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.0.iter().map(|op| op.invocation.clone()).collect()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", op)?;
        }
        write!(f, "]")
    }
}

/// The results of every observer invocation in one state.
///
/// `Eq`/`Hash` are structural and serve as the index key. Whether two
/// observations agree is [`Observation::consistent_with`], which is weaker:
/// only invocations present on both sides are compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observation(Arc<Vec<Operation>>);

impl Observation {
    pub fn new(mut ops: Vec<Operation>) -> Self {
        ops.sort();
        Observation(Arc::new(ops))
    }

    pub fn operations(&self) -> &[Operation] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Results recorded for `invocation`.
    pub fn results_of<'a>(&'a self, invocation: &Invocation) -> impl Iterator<Item = &'a Outcome> + 'a {
        let start = self.0.partition_point(|op| op.invocation < *invocation);
        let invocation = invocation.clone();
        self.0[start..]
            .iter()
            .take_while(move |op| op.invocation == invocation)
            .map(|op| &op.outcome)
    }

    /// True unless some invocation observed on both sides has differing
    /// results. Invocations present on one side only are ignored.
    pub fn consistent_with(&self, other: &Observation) -> bool {
        self.0.iter().all(|op| {
            other
                .results_of(&op.invocation)
                .all(|outcome| *outcome == op.outcome)
        })
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", op)?;
        }
        write!(f, "}}")
    }
}

/// A reachable contract state, identified by the history that produced it.
///
/// Equality and hashing use the contract name and the trace only: within
/// one exploration run the trace determines the observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub contract: Arc<str>,
    pub trace: Trace,
    pub observation: Observation,
}

impl State {
    pub fn new(contract: Arc<str>, trace: Trace, observation: Observation) -> Self {
        Self {
            contract,
            trace,
            observation,
        }
    }

    pub fn depth(&self) -> usize {
        self.trace.depth()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.contract == other.contract && self.trace == other.trace
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.contract.hash(state);
        self.trace.hash(state);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} observing {}", self.contract, self.trace, self.observation)
    }
}

/// An edge of the exploration graph. Initial transitions have no
/// predecessor and no operation.
#[derive(Debug, Clone)]
pub struct Transition {
    pub pre: Option<State>,
    pub operation: Option<Operation>,
    pub post: State,
}

impl Transition {
    pub fn initial(post: State) -> Self {
        Self {
            pre: None,
            operation: None,
            post,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.pre.is_none()
    }
}

/// Whether an example witnesses or refutes the simulation relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExampleKind {
    Positive,
    Negative,
}

impl fmt::Display for ExampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExampleKind::Positive => write!(f, "positive"),
            ExampleKind::Negative => write!(f, "negative"),
        }
    }
}

/// A classified (source, target) state pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationExample {
    pub id: usize,
    pub kind: ExampleKind,
    pub source: State,
    pub target: State,
}

impl SimulationExample {
    /// Conventional name for the emitted example method.
    pub fn name(&self) -> String {
        format!("{}_example_{}", self.kind, self.id)
    }
}
