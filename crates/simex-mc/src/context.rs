//! Example generation over a source and a target exploration.
//!
//! The source run is indexed first. Target states are then matched
//! against that index as they are discovered: an equal trace yields a
//! positive example (or a counterexample when the observations disagree),
//! an inconsistent observation seeds a negative example. Negatives are
//! finally grown backward along operation labels shared by both
//! predecessor graphs.

use crate::backend::Backend;
use crate::error::{SimError, SimResult};
use crate::explorer::{ExploreConfig, Explorer, Transitions};
use crate::history::{ExampleKind, Observation, Operation, SimulationExample, State, Trace, Transition};
use crate::invocation::InvocationGenerator;
use crate::limiter::LimiterFactory;
use crate::mapping::get_mapping;
use serde::{Deserialize, Serialize};
use simex_abi::{ContractMeta, ValueDomain};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, trace};

type Predecessors = HashMap<State, BTreeMap<Operation, Vec<State>>>;

/// Counters for one example generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExampleStats {
    pub source_states: usize,
    pub target_states: usize,
    pub positives: usize,
    /// Negatives seeded by observation inconsistency.
    pub seeded: usize,
    /// Negatives reached through joint predecessors.
    pub propagated: usize,
}

/// Indices owned by one example generation run.
#[derive(Default)]
struct Context {
    by_trace: HashMap<Trace, Vec<State>>,
    by_observation: Vec<(Observation, Vec<State>)>,
    observation_slot: HashMap<Observation, usize>,
    source_preds: Predecessors,
    target_preds: Predecessors,
    visited: HashMap<State, HashSet<State>>,
    worklist: VecDeque<(State, State)>,
    next_id: usize,
    stats: ExampleStats,
}

fn record_predecessor(preds: &mut Predecessors, transition: &Transition) {
    if let (Some(pre), Some(op)) = (&transition.pre, &transition.operation) {
        preds
            .entry(transition.post.clone())
            .or_default()
            .entry(op.clone())
            .or_default()
            .push(pre.clone());
    }
}

impl Context {
    fn index_source(&mut self, transition: Transition) {
        self.stats.source_states += 1;
        record_predecessor(&mut self.source_preds, &transition);
        let post = transition.post;
        self.by_trace
            .entry(post.trace.clone())
            .or_default()
            .push(post.clone());
        match self.observation_slot.get(&post.observation) {
            Some(&slot) => self.by_observation[slot].1.push(post),
            None => {
                self.observation_slot
                    .insert(post.observation.clone(), self.by_observation.len());
                self.by_observation.push((post.observation.clone(), vec![post]));
            }
        }
    }

    /// Match one target transition against the source index, returning
    /// the positives it produces.
    fn cross_reference(&mut self, transition: Transition) -> SimResult<Vec<SimulationExample>> {
        self.stats.target_states += 1;
        record_predecessor(&mut self.target_preds, &transition);
        let target = transition.post;

        let same_trace = self.by_trace.get(&target.trace).cloned().unwrap_or_default();
        if let Some(source) = same_trace
            .iter()
            .find(|s| !s.observation.consistent_with(&target.observation))
        {
            info!(trace = %target.trace, "observations diverge on equal traces");
            return Err(SimError::counter_example(source.clone(), target));
        }

        let mut seeds = Vec::new();
        for (observation, states) in &self.by_observation {
            if observation.consistent_with(&target.observation) {
                continue;
            }
            seeds.extend(states.iter().cloned());
        }
        for source in seeds {
            if self.mark_visited(&source, &target) {
                self.stats.seeded += 1;
                self.worklist.push_back((source, target.clone()));
            }
        }

        let positives: Vec<SimulationExample> = same_trace
            .into_iter()
            .map(|source| self.example(ExampleKind::Positive, source, target.clone()))
            .collect();
        self.stats.positives += positives.len();
        Ok(positives)
    }

    /// Pop the next negative and enqueue its unvisited joint predecessors.
    fn next_negative(&mut self) -> Option<SimulationExample> {
        let (source, target) = self.worklist.pop_front()?;
        let mut joint = Vec::new();
        if let (Some(sp), Some(tp)) = (self.source_preds.get(&source), self.target_preds.get(&target)) {
            for (op, source_pres) in sp {
                let Some(target_pres) = tp.get(op) else {
                    continue;
                };
                for s in source_pres {
                    for t in target_pres {
                        joint.push((s.clone(), t.clone()));
                    }
                }
            }
        }
        for (s, t) in joint {
            if self.mark_visited(&s, &t) {
                trace!(source = %s.trace, target = %t.trace, "joint predecessor");
                self.stats.propagated += 1;
                self.worklist.push_back((s, t));
            }
        }
        Some(self.example(ExampleKind::Negative, source, target))
    }

    fn mark_visited(&mut self, source: &State, target: &State) -> bool {
        self.visited
            .entry(source.clone())
            .or_default()
            .insert(target.clone())
    }

    fn example(&mut self, kind: ExampleKind, source: State, target: State) -> SimulationExample {
        let id = self.next_id;
        self.next_id += 1;
        SimulationExample {
            id,
            kind,
            source,
            target,
        }
    }
}

/// Lazy stream of simulation examples.
///
/// Positives are yielded while the target is explored; negatives follow
/// once both explorations are finished. The stream ends after the first
/// error.
pub struct SimulationExamples<'a, SB: Backend, TB: Backend> {
    source: Option<Transitions<'a, SB>>,
    target: Option<Transitions<'a, TB>>,
    context: Context,
    pending: VecDeque<SimulationExample>,
    done: bool,
}

impl<SB: Backend, TB: Backend> SimulationExamples<'_, SB, TB> {
    pub fn stats(&self) -> ExampleStats {
        self.context.stats
    }

    fn fail(&mut self, error: SimError) -> Option<SimResult<SimulationExample>> {
        self.done = true;
        self.source = None;
        self.target = None;
        Some(Err(error))
    }
}

impl<SB: Backend, TB: Backend> Iterator for SimulationExamples<'_, SB, TB> {
    type Item = SimResult<SimulationExample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(example) = self.pending.pop_front() {
                return Some(Ok(example));
            }

            if let Some(source) = self.source.as_mut() {
                match source.next() {
                    Some(Ok(transition)) => self.context.index_source(transition),
                    Some(Err(e)) => return self.fail(e),
                    None => {
                        info!(
                            states = self.context.stats.source_states,
                            observations = self.context.by_observation.len(),
                            "source indexed"
                        );
                        self.source = None;
                    }
                }
                continue;
            }

            if let Some(target) = self.target.as_mut() {
                match target.next() {
                    Some(Ok(transition)) => match self.context.cross_reference(transition) {
                        Ok(positives) => self.pending.extend(positives),
                        Err(e) => return self.fail(e),
                    },
                    Some(Err(e)) => return self.fail(e),
                    None => {
                        info!(
                            states = self.context.stats.target_states,
                            positives = self.context.stats.positives,
                            seeded = self.context.stats.seeded,
                            "target cross-referenced"
                        );
                        self.target = None;
                    }
                }
                continue;
            }

            match self.context.next_negative() {
                Some(example) => return Some(Ok(example)),
                None => {
                    let stats = self.context.stats;
                    info!(
                        positives = stats.positives,
                        negatives = stats.seeded + stats.propagated,
                        propagated = stats.propagated,
                        "example generation complete"
                    );
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

/// Generate simulation examples for `target` against `source`.
///
/// Fails before any exploration if the method mapping is structurally
/// invalid or a mapped method has an unsupported parameter type. Each side
/// is explored with its own limiter built from `config`.
pub fn simulation_examples<'a, SB: Backend, TB: Backend>(
    source: &ContractMeta,
    target: &ContractMeta,
    source_backend: &'a SB,
    target_backend: &'a TB,
    config: &ExploreConfig,
) -> SimResult<SimulationExamples<'a, SB, TB>> {
    let mapping = get_mapping(source, target)?;
    debug!(source = %source.name, target = %target.name, entries = mapping.len(), "mapping ready");

    let source_generator = InvocationGenerator::new(
        mapping.source_methods(),
        ValueDomain::new(source_backend.accounts().to_vec()),
    )
    .with_payments(config.payments.clone());
    let target_generator = InvocationGenerator::new(
        mapping.target_methods(),
        ValueDomain::new(target_backend.accounts().to_vec()),
    )
    .with_payments(config.payments.clone());

    let source_run = Explorer::new(source, &source_generator, source_backend, config.parallel)?
        .transitions(config.limiter());
    let target_run = Explorer::new(target, &target_generator, target_backend, config.parallel)?
        .transitions(config.limiter());

    Ok(SimulationExamples {
        source: Some(source_run),
        target: Some(target_run),
        context: Context::default(),
        pending: VecDeque::new(),
        done: false,
    })
}

/// A drained example stream, split by kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExampleSet {
    pub positive: Vec<SimulationExample>,
    pub negative: Vec<SimulationExample>,
}

impl ExampleSet {
    /// Drain `examples`, stopping at the first error.
    pub fn collect<I>(examples: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = SimResult<SimulationExample>>,
    {
        let mut set = ExampleSet::default();
        for example in examples {
            let example = example?;
            match example.kind {
                ExampleKind::Positive => set.positive.push(example),
                ExampleKind::Negative => set.negative.push(example),
            }
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positive.is_empty() && self.negative.is_empty()
    }
}
