//! BFS state space explorer over one contract.
//!
//! Every state is identified by the trace that produced it. Expanding a
//! state replays that trace from scratch against a fresh deployment and
//! then applies one candidate invocation; candidates whose result is an
//! error are dropped from the graph.

use crate::backend::{Backend, ContractInstance, Deployment};
use crate::error::{BackendError, BackendResult, SimError, SimResult};
use crate::history::{Invocation, Operation, State, Trace, Transition};
use crate::invocation::{InvocationGenerator, DEFAULT_PAYMENTS};
use crate::limiter::{Both, DepthLimit, Limiter, LimiterFactory, StateBudget, Unlimited};
use rayon::prelude::*;
use simex_abi::{ContractMeta, MethodKind};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Configuration for an exploration run.
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Number of (state, invocation) pairs each run may expand (0 = unlimited).
    pub max_states: usize,
    /// Maximum number of operations after the constructor (0 = unlimited).
    pub max_depth: usize,
    /// Replay the candidate transitions of one state on the rayon pool.
    pub parallel: bool,
    /// Payment amounts tried for payable methods.
    pub payments: Vec<u128>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_states: 10,
            max_depth: 0,
            parallel: true,
            payments: DEFAULT_PAYMENTS.to_vec(),
        }
    }
}

impl LimiterFactory for ExploreConfig {
    fn limiter(&self) -> Box<dyn Limiter> {
        match (self.max_states, self.max_depth) {
            (0, 0) => Box::new(Unlimited),
            (states, 0) => Box::new(StateBudget::new(states)),
            (0, depth) => Box::new(DepthLimit::new(depth)),
            (states, depth) => Box::new(Both(DepthLimit::new(depth), StateBudget::new(states))),
        }
    }
}

/// Counters describing a finished or ongoing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplorationStats {
    /// States yielded, initial states included.
    pub states: usize,
    /// Non-initial transitions yielded.
    pub transitions: usize,
    /// Candidates dropped because of an error result.
    pub discarded: usize,
    /// Longest trace seen, counted after the constructor.
    pub max_depth: usize,
}

/// The fixed per-contract part of a run: the backend and the candidate
/// invocations split by kind.
pub struct Explorer<'a, B: Backend> {
    backend: &'a B,
    contract: Arc<str>,
    constructors: Vec<Invocation>,
    mutators: Vec<Invocation>,
    observers: Vec<Invocation>,
    parallel: bool,
}

impl<'a, B: Backend> Explorer<'a, B> {
    pub fn new(
        meta: &ContractMeta,
        generator: &InvocationGenerator,
        backend: &'a B,
        parallel: bool,
    ) -> SimResult<Self> {
        let constructors = generator.collect(MethodKind::Constructor)?;
        let mutators = generator.collect(MethodKind::Mutator)?;
        let observers = generator.collect(MethodKind::Observer)?;
        debug!(
            contract = %meta.name,
            constructors = constructors.len(),
            mutators = mutators.len(),
            observers = observers.len(),
            "prepared invocations"
        );
        Ok(Self {
            backend,
            contract: Arc::from(meta.name.as_str()),
            constructors,
            mutators,
            observers,
            parallel,
        })
    }

    /// Start a run bounded by `limiter`.
    pub fn transitions(self, limiter: Box<dyn Limiter>) -> Transitions<'a, B> {
        let roots = self.constructors.iter().cloned().collect();
        Transitions {
            explorer: self,
            limiter,
            roots,
            queue: VecDeque::new(),
            ready: VecDeque::new(),
            stats: ExplorationStats::default(),
            done: false,
        }
    }

    fn initial(&self, constructor: &Invocation) -> BackendResult<Option<Transition>> {
        match self.backend.create(constructor)? {
            Deployment::Rejected(outcome) => {
                debug!(constructor = %constructor, outcome = %outcome, "constructor rejected");
                Ok(None)
            }
            Deployment::Deployed {
                mut instance,
                outcome,
            } => {
                let observation = instance.observe(&self.observers)?;
                let trace = Trace::empty().extend(Operation::new(constructor.clone(), outcome));
                let post = State::new(self.contract.clone(), trace, observation);
                Ok(Some(Transition::initial(post)))
            }
        }
    }

    /// Replay `pre` on a fresh deployment and apply `invocation`.
    fn step(&self, pre: &State, invocation: &Invocation) -> BackendResult<Option<Transition>> {
        let Some((root, rest)) = pre.trace.operations().split_first() else {
            return Err(BackendError::Internal("cannot replay an empty trace".into()));
        };
        let mut instance = match self.backend.create(&root.invocation)? {
            Deployment::Deployed { instance, .. } => instance,
            Deployment::Rejected(outcome) => {
                warn!(outcome = %outcome, trace = %pre.trace, "constructor rejected during replay");
                return Ok(None);
            }
        };
        let replay: Vec<Invocation> = rest.iter().map(|op| op.invocation.clone()).collect();
        instance.invoke_sequence(&replay)?;

        let outcome = instance.invoke(invocation)?;
        if outcome.is_error() {
            trace!(invocation = %invocation, outcome = %outcome, "discarding rejected transition");
            return Ok(None);
        }
        let observation = instance.observe(&self.observers)?;
        let op = Operation::new(invocation.clone(), outcome);
        let post = State::new(self.contract.clone(), pre.trace.extend(op.clone()), observation);
        Ok(Some(Transition {
            pre: Some(pre.clone()),
            operation: Some(op),
            post,
        }))
    }
}

/// Lazy stream of transitions in breadth-first order.
///
/// Initial transitions come first, one per constructor invocation that
/// returns normally. The stream ends when the worklist empties or the
/// limiter is exhausted, and stops after the first backend error.
pub struct Transitions<'a, B: Backend> {
    explorer: Explorer<'a, B>,
    limiter: Box<dyn Limiter>,
    roots: VecDeque<Invocation>,
    queue: VecDeque<State>,
    ready: VecDeque<Transition>,
    stats: ExplorationStats,
    done: bool,
}

impl<B: Backend> Transitions<'_, B> {
    pub fn stats(&self) -> ExplorationStats {
        self.stats
    }

    fn record(&mut self, transition: &Transition) {
        self.stats.states += 1;
        if !transition.is_initial() {
            self.stats.transitions += 1;
        }
        self.stats.max_depth = self.stats.max_depth.max(transition.post.depth());
    }

    fn finish(&mut self) {
        self.done = true;
        info!(
            contract = %self.explorer.contract,
            states = self.stats.states,
            transitions = self.stats.transitions,
            discarded = self.stats.discarded,
            max_depth = self.stats.max_depth,
            "exploration complete"
        );
    }

    fn fail(&mut self, error: SimError) -> Option<SimResult<Transition>> {
        self.done = true;
        Some(Err(error))
    }
}

impl<B: Backend> Iterator for Transitions<'_, B> {
    type Item = SimResult<Transition>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(transition) = self.ready.pop_front() {
                return Some(Ok(transition));
            }

            if let Some(constructor) = self.roots.pop_front() {
                match self.explorer.initial(&constructor) {
                    Ok(Some(transition)) => {
                        self.record(&transition);
                        self.queue.push_back(transition.post.clone());
                        return Some(Ok(transition));
                    }
                    Ok(None) => {
                        self.stats.discarded += 1;
                        continue;
                    }
                    Err(e) => return self.fail(e.into()),
                }
            }

            if self.limiter.exhausted() {
                info!(queued = self.queue.len(), "exploration budget exhausted");
                self.finish();
                return None;
            }
            let Some(pre) = self.queue.pop_front() else {
                self.finish();
                return None;
            };
            trace!(depth = pre.depth(), trace = %pre.trace, "expanding state");

            let explorer = &self.explorer;
            let limiter = &mut self.limiter;
            let granted: Vec<&Invocation> = explorer
                .mutators
                .iter()
                .filter(|inv| limiter.admit(&pre, inv))
                .collect();
            let results: Vec<BackendResult<Option<Transition>>> =
                if explorer.parallel && granted.len() > 1 {
                    granted
                        .par_iter()
                        .map(|inv| explorer.step(&pre, inv))
                        .collect()
                } else {
                    granted.iter().map(|inv| explorer.step(&pre, inv)).collect()
                };

            for result in results {
                match result {
                    Ok(Some(transition)) => {
                        self.record(&transition);
                        self.queue.push_back(transition.post.clone());
                        self.ready.push_back(transition);
                    }
                    Ok(None) => self.stats.discarded += 1,
                    Err(e) => return self.fail(e.into()),
                }
            }
        }
    }
}

/// Explore `meta` on `backend`, drawing candidate invocations from
/// `generator` and bounding the run with `limiter`.
pub fn transitions<'a, B: Backend>(
    meta: &ContractMeta,
    generator: &InvocationGenerator,
    backend: &'a B,
    limiter: Box<dyn Limiter>,
    parallel: bool,
) -> SimResult<Transitions<'a, B>> {
    Ok(Explorer::new(meta, generator, backend, parallel)?.transitions(limiter))
}
