//! Enumeration of candidate invocations per method kind.

use crate::history::Invocation;
use simex_abi::{AbiResult, MethodKind, MethodSig, ValueDomain};
use std::collections::VecDeque;

/// Payment amounts tried for payable methods.
pub const DEFAULT_PAYMENTS: [u128; 2] = [0, 1];

/// Produces invocations for a fixed set of methods.
#[derive(Debug, Clone)]
pub struct InvocationGenerator {
    methods: Vec<MethodSig>,
    domain: ValueDomain,
    payments: Vec<u128>,
}

impl InvocationGenerator {
    pub fn new(methods: Vec<MethodSig>, domain: ValueDomain) -> Self {
        Self {
            methods,
            domain,
            payments: DEFAULT_PAYMENTS.to_vec(),
        }
    }

    /// Override the payment amounts crossed with payable methods.
    pub fn with_payments(mut self, payments: Vec<u128>) -> Self {
        self.payments = payments;
        self
    }

    pub fn methods(&self) -> &[MethodSig] {
        &self.methods
    }

    /// Lazily enumerate invocations of visible methods, optionally
    /// restricted to one kind.
    pub fn invocations(&self, kind: Option<MethodKind>) -> Invocations<'_> {
        Invocations {
            generator: self,
            kind,
            next_method: 0,
            buffer: VecDeque::new(),
        }
    }

    /// All invocations of `kind`, or the first unsupported-type error.
    pub fn collect(&self, kind: MethodKind) -> AbiResult<Vec<Invocation>> {
        self.invocations(Some(kind)).collect()
    }

    fn invocations_of(&self, method: &MethodSig) -> AbiResult<Vec<Invocation>> {
        let tuples = self.domain.values_of_types(&method.input_types())?;
        let payments: Vec<Option<u128>> = if method.is_payable() {
            self.payments.iter().copied().map(Some).collect()
        } else {
            vec![None]
        };
        let mut out = Vec::with_capacity(tuples.len() * payments.len());
        for args in tuples {
            for value in &payments {
                out.push(Invocation::new(method, args.clone(), *value)?);
            }
        }
        Ok(out)
    }
}

/// Lazy invocation stream; argument tuples are computed one method at a
/// time.
pub struct Invocations<'a> {
    generator: &'a InvocationGenerator,
    kind: Option<MethodKind>,
    next_method: usize,
    buffer: VecDeque<Invocation>,
}

impl Iterator for Invocations<'_> {
    type Item = AbiResult<Invocation>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inv) = self.buffer.pop_front() {
                return Some(Ok(inv));
            }
            let method = self.generator.methods.get(self.next_method)?;
            self.next_method += 1;
            if !method.is_visible() || self.kind.is_some_and(|k| method.kind() != k) {
                continue;
            }
            match self.generator.invocations_of(method) {
                Ok(invs) => self.buffer.extend(invs),
                Err(e) => {
                    self.next_method = self.generator.methods.len();
                    return Some(Err(e));
                }
            }
        }
    }
}
