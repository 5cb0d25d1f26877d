//! In-memory backend over integer slots, for unit tests.

use crate::backend::{Backend, ContractInstance, Deployment};
use crate::error::{BackendError, BackendResult};
use crate::history::{Invocation, Outcome};
use simex_abi::{AbiType, Address, ContractMeta, MethodSig, Mutability, Param, Value, Visibility};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) type MethodFn = fn(&mut Vec<i128>, &[Value]) -> Outcome;

#[derive(Clone)]
pub(crate) struct MockMethod {
    sig: MethodSig,
    body: MethodFn,
}

pub(crate) struct MockBackend {
    meta: ContractMeta,
    methods: Arc<Vec<MockMethod>>,
    slots: usize,
    accounts: Vec<Address>,
    deployments: AtomicUsize,
}

impl MockBackend {
    pub(crate) fn new(name: &str, slots: usize) -> Self {
        Self {
            meta: ContractMeta {
                name: name.to_string(),
                state_vars: vec![],
                constructor: None,
                methods: vec![],
            },
            methods: Arc::new(Vec::new()),
            slots,
            accounts: vec![Address::from_low_u64(1), Address::from_low_u64(2)],
            deployments: AtomicUsize::new(0),
        }
    }

    pub(crate) fn method(mut self, sig: MethodSig, body: MethodFn) -> Self {
        if sig.is_constructor() {
            self.meta.constructor = Some(sig.clone());
        } else {
            self.meta.methods.push(sig.clone());
        }
        Arc::make_mut(&mut self.methods).push(MockMethod { sig, body });
        self
    }

    /// A zero-argument nonpayable method returning nothing.
    pub(crate) fn mutator(self, name: &str, body: MethodFn) -> Self {
        let sig = MethodSig::new(name, vec![], vec![], Visibility::Public, Mutability::Nonpayable);
        self.method(sig, body)
    }

    /// A mutator taking one `int256`.
    pub(crate) fn setter(self, name: &str, body: MethodFn) -> Self {
        let sig = MethodSig::new(
            name,
            vec![Param::new("v", AbiType::int256())],
            vec![],
            Visibility::Public,
            Mutability::Nonpayable,
        );
        self.method(sig, body)
    }

    /// A zero-argument view returning one `int256`.
    pub(crate) fn observer(self, name: &str, body: MethodFn) -> Self {
        let sig = MethodSig::new(
            name,
            vec![],
            vec![AbiType::int256()],
            Visibility::Public,
            Mutability::View,
        );
        self.method(sig, body)
    }

    pub(crate) fn meta(&self) -> &ContractMeta {
        &self.meta
    }

    pub(crate) fn deployments(&self) -> usize {
        self.deployments.load(Ordering::Relaxed)
    }
}

pub(crate) struct MockInstance {
    methods: Arc<Vec<MockMethod>>,
    storage: Vec<i128>,
}

impl Backend for MockBackend {
    type Instance = MockInstance;

    fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn create(&self, constructor: &Invocation) -> BackendResult<Deployment<MockInstance>> {
        self.deployments.fetch_add(1, Ordering::Relaxed);
        let mut instance = MockInstance {
            methods: self.methods.clone(),
            storage: vec![0; self.slots],
        };
        let outcome = if self.meta.constructor.is_some() {
            instance.invoke(constructor)?
        } else {
            Outcome::unit()
        };
        if outcome.is_error() {
            return Ok(Deployment::Rejected(outcome));
        }
        Ok(Deployment::Deployed { instance, outcome })
    }
}

impl ContractInstance for MockInstance {
    fn invoke(&mut self, invocation: &Invocation) -> BackendResult<Outcome> {
        let method = self
            .methods
            .iter()
            .find(|m| m.sig.signature() == invocation.method)
            .ok_or_else(|| BackendError::UnknownMethod(invocation.method.to_string()))?;
        if invocation.payment() > 0 && !method.sig.is_payable() {
            return Ok(Outcome::reverted("non-payable"));
        }
        let mut scratch = self.storage.clone();
        let outcome = (method.body)(&mut scratch, &invocation.args);
        if !outcome.is_error() && !method.sig.mutability.is_read_only() {
            self.storage = scratch;
        }
        Ok(outcome)
    }
}

pub(crate) fn int(n: i128) -> Outcome {
    Outcome::Normal(vec![Value::Int(n)])
}
