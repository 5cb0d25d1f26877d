//! Budget policies bounding an exploration run.

use crate::history::{Invocation, State};

/// Decides whether a (pre-state, invocation) pair may still be explored.
pub trait Limiter: Send {
    /// Ask for permission to explore `invocation` from `pre`. A granted
    /// request consumes budget.
    fn admit(&mut self, pre: &State, invocation: &Invocation) -> bool;

    /// Whether no further request can ever be granted.
    fn exhausted(&self) -> bool {
        false
    }
}

/// Issues one fresh limiter per exploration run.
pub trait LimiterFactory {
    fn limiter(&self) -> Box<dyn Limiter>;
}

impl<F> LimiterFactory for F
where
    F: Fn() -> Box<dyn Limiter>,
{
    fn limiter(&self) -> Box<dyn Limiter> {
        self()
    }
}

/// Grants everything. Only safe for contracts with finite state spaces.
#[derive(Debug, Clone, Default)]
pub struct Unlimited;

impl Limiter for Unlimited {
    fn admit(&mut self, _pre: &State, _invocation: &Invocation) -> bool {
        true
    }
}

/// A fixed global count of explorable transitions.
#[derive(Debug, Clone)]
pub struct StateBudget {
    remaining: usize,
}

impl StateBudget {
    pub fn new(states: usize) -> Self {
        Self { remaining: states }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl Limiter for StateBudget {
    fn admit(&mut self, _pre: &State, _invocation: &Invocation) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Rejects pre-states whose trace already holds `max_depth` operations
/// after the constructor.
#[derive(Debug, Clone)]
pub struct DepthLimit {
    max_depth: usize,
}

impl DepthLimit {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Limiter for DepthLimit {
    fn admit(&mut self, pre: &State, _invocation: &Invocation) -> bool {
        pre.depth() < self.max_depth
    }
}

/// Grants a request only if both limiters do; the second is not asked
/// (and so not charged) when the first refuses.
pub struct Both<A, B>(pub A, pub B);

impl<A: Limiter, B: Limiter> Limiter for Both<A, B> {
    fn admit(&mut self, pre: &State, invocation: &Invocation) -> bool {
        self.0.admit(pre, invocation) && self.1.admit(pre, invocation)
    }

    fn exhausted(&self) -> bool {
        self.0.exhausted() || self.1.exhausted()
    }
}
