//! Bounded exploration and simulation-example generation for contract pairs.

pub mod backend;
pub mod context;
pub mod error;
pub mod explorer;
pub mod history;
pub mod invocation;
pub mod limiter;
pub mod mapping;

#[cfg(test)]
mod mock;

pub use backend::{Backend, ContractInstance, Deployment};
pub use context::{simulation_examples, ExampleSet, ExampleStats, SimulationExamples};
pub use error::{
    BackendError, BackendResult, CounterExample, MappingError, MappingResult, SimError, SimResult,
};
pub use explorer::{transitions, ExplorationStats, ExploreConfig, Explorer, Transitions};
pub use history::{
    ErrorKind, ExampleKind, Invocation, Observation, Operation, Outcome, SimulationExample, State,
    Trace, Transition,
};
pub use invocation::{InvocationGenerator, Invocations, DEFAULT_PAYMENTS};
pub use limiter::{Both, DepthLimit, Limiter, LimiterFactory, StateBudget, Unlimited};
pub use mapping::{get_mapping, FunctionMapping, MappingEntry};
