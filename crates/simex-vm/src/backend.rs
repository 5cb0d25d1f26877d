//! [`Backend`] implementation over the interpreter.

use crate::ast::{ContractDef, FunctionDef};
use crate::error::{VmError, VmResult};
use crate::eval::{Frame, Halt};
use crate::storage::Storage;
use simex_abi::{Address, ContractMeta, Mutability};
use simex_mc::{
    Backend, BackendResult, ContractInstance, Deployment, ErrorKind, Invocation, Outcome,
};
use std::sync::Arc;
use tracing::trace;

/// Number of deterministic accounts every deployment sees.
pub const ACCOUNTS: usize = 3;

/// Deploys fresh interpreter instances of one contract.
#[derive(Debug, Clone)]
pub struct VmBackend {
    contract: Arc<ContractDef>,
    accounts: Vec<Address>,
}

impl VmBackend {
    /// Validate `contract` and wrap it in a backend.
    pub fn new(contract: ContractDef) -> VmResult<Self> {
        contract.validate()?;
        Ok(Self {
            contract: Arc::new(contract),
            accounts: (1..=ACCOUNTS as u64)
                .map(|n| Address::from_low_u64(0x1000 + n))
                .collect(),
        })
    }

    pub fn from_json(src: &str) -> VmResult<Self> {
        Self::new(serde_json::from_str(src)?)
    }

    pub fn contract(&self) -> &ContractDef {
        &self.contract
    }

    pub fn metadata(&self) -> ContractMeta {
        self.contract.metadata()
    }

    /// Account used as `msg.sender` for every call.
    pub fn sender(&self) -> Address {
        self.accounts.first().copied().unwrap_or(Address::ZERO)
    }
}

impl Backend for VmBackend {
    type Instance = VmInstance;

    fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    fn create(&self, constructor: &Invocation) -> BackendResult<Deployment<VmInstance>> {
        if !constructor.is_constructor() {
            return Err(VmError::BadCall {
                method: constructor.method.to_string(),
                message: "not a constructor".into(),
            }
            .into());
        }
        let mut instance = VmInstance {
            contract: self.contract.clone(),
            storage: Storage::new(&self.contract.storage)?,
            balance: 0,
            sender: self.sender(),
        };
        let outcome = match &self.contract.constructor {
            Some(def) => {
                let contract = self.contract.clone();
                instance.call(&contract, def, constructor)?
            }
            None if !constructor.args.is_empty() => {
                return Err(VmError::BadCall {
                    method: constructor.method.to_string(),
                    message: "implicit constructor takes no arguments".into(),
                }
                .into());
            }
            None if constructor.payment() > 0 => non_payable(),
            None => Outcome::unit(),
        };
        if outcome.is_error() {
            return Ok(Deployment::Rejected(outcome));
        }
        Ok(Deployment::Deployed { instance, outcome })
    }
}

fn non_payable() -> Outcome {
    Outcome::Error {
        kind: ErrorKind::Reverted,
        reason: Some("non-payable".into()),
    }
}

/// One deployment: storage plus the contract's ether balance.
#[derive(Debug, Clone)]
pub struct VmInstance {
    contract: Arc<ContractDef>,
    storage: Storage,
    balance: u128,
    sender: Address,
}

impl VmInstance {
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn balance(&self) -> u128 {
        self.balance
    }

    fn call(&mut self, contract: &ContractDef, def: &FunctionDef, invocation: &Invocation) -> BackendResult<Outcome> {
        if invocation.args.len() != def.params.len() {
            return Err(VmError::BadCall {
                method: invocation.method.to_string(),
                message: format!("expected {} arguments, got {}", def.params.len(), invocation.args.len()),
            }
            .into());
        }
        let payment = invocation.payment();
        if payment > 0 && def.mutability != Mutability::Payable {
            return Ok(non_payable());
        }
        let Some(balance) = self.balance.checked_add(payment) else {
            return Ok(Outcome::panicked("balance overflow"));
        };

        let mut scratch = self.storage.clone();
        let result = Frame {
            contract,
            function: def,
            args: &invocation.args,
            sender: self.sender,
            value: payment,
            balance,
            storage: &mut scratch,
        }
        .run();

        let outcome = match result {
            Ok(values) => {
                if !def.mutability.is_read_only() {
                    self.storage = scratch;
                    self.balance = balance;
                }
                Outcome::Normal(values)
            }
            Err(Halt::Revert(reason)) => Outcome::Error {
                kind: ErrorKind::Reverted,
                reason,
            },
            Err(Halt::Panic(reason)) => Outcome::panicked(reason),
            Err(Halt::Fault(e)) => return Err(e.into()),
        };
        trace!(call = %invocation, outcome = %outcome, "executed");
        Ok(outcome)
    }
}

impl ContractInstance for VmInstance {
    fn invoke(&mut self, invocation: &Invocation) -> BackendResult<Outcome> {
        if invocation.is_constructor() {
            return Err(VmError::BadCall {
                method: invocation.method.to_string(),
                message: "constructor called on a deployed instance".into(),
            }
            .into());
        }
        let contract = self.contract.clone();
        let def = contract
            .functions
            .iter()
            .find(|f| f.signature() == invocation.method)
            .ok_or_else(|| VmError::UnknownMethod(invocation.method.to_string()))?;
        self.call(&contract, def, invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simex_abi::{MethodSig, Value};

    const BANK: &str = r#"{
        "name": "Bank",
        "storage": [
            {"name": "total", "ty": "uint8"},
            {"name": "deposits", "ty": "mapping(address=>uint256)"}
        ],
        "functions": [
            {"name": "deposit", "mutability": "payable", "body": [
                {"kind": "Require", "cond": {"kind": "Binary", "op": "Gt", "left": {"kind": "CallValue"}, "right": {"kind": "Uint", "value": 0}}, "reason": "empty deposit"},
                {"kind": "Assign", "var": 1, "keys": [{"kind": "Sender"}], "value":
                    {"kind": "Binary", "op": "Add",
                     "left": {"kind": "Storage", "var": 1, "keys": [{"kind": "Sender"}]},
                     "right": {"kind": "CallValue"}}}
            ]},
            {"name": "bump", "params": [{"name": "by", "ty": "uint8"}], "body": [
                {"kind": "Assign", "var": 0, "value": {"kind": "Binary", "op": "Add", "left": {"kind": "Storage", "var": 0}, "right": {"kind": "Param", "index": 0}}}
            ]},
            {"name": "halve", "params": [{"name": "d", "ty": "uint8"}], "returns": ["uint8"], "mutability": "view", "body": [
                {"kind": "Return", "values": [{"kind": "Binary", "op": "Div", "left": {"kind": "Storage", "var": 0}, "right": {"kind": "Param", "index": 0}}]}
            ]},
            {"name": "total", "returns": ["uint8"], "mutability": "view", "body": [
                {"kind": "Return", "values": [{"kind": "Storage", "var": 0}]}
            ]},
            {"name": "mine", "returns": ["uint256"], "mutability": "view", "body": [
                {"kind": "Return", "values": [{"kind": "Storage", "var": 1, "keys": [{"kind": "Sender"}]}]}
            ]},
            {"name": "held", "returns": ["uint256"], "mutability": "view", "body": [
                {"kind": "Return", "values": [{"kind": "Balance"}]}
            ]},
            {"name": "nothing", "returns": ["bool"], "mutability": "pure"}
        ]
    }"#;

    fn deploy() -> (VmBackend, VmInstance) {
        let backend = VmBackend::from_json(BANK).unwrap();
        let ctor = Invocation::new(&MethodSig::default_constructor(), vec![], None).unwrap();
        match backend.create(&ctor).unwrap() {
            Deployment::Deployed { instance, outcome } => {
                assert_eq!(outcome, Outcome::unit());
                (backend, instance)
            }
            Deployment::Rejected(o) => panic!("rejected: {}", o),
        }
    }

    fn call(backend: &VmBackend, instance: &mut VmInstance, name: &str, args: Vec<Value>, value: Option<u128>) -> Outcome {
        let meta = backend.metadata();
        let sig = meta
            .methods_named(name)
            .next()
            .unwrap_or_else(|| panic!("no method {}", name));
        let inv = Invocation::new(sig, args, value).unwrap();
        instance.invoke(&inv).unwrap()
    }

    fn u(n: u128) -> Outcome {
        Outcome::Normal(vec![Value::Uint(n)])
    }

    #[test]
    fn test_accounts_are_deterministic() {
        let a = VmBackend::from_json(BANK).unwrap();
        let b = VmBackend::from_json(BANK).unwrap();
        assert_eq!(a.accounts().len(), ACCOUNTS);
        assert_eq!(a.accounts(), b.accounts());
        assert_eq!(a.sender(), a.accounts()[0]);
    }

    #[test]
    fn test_payable_deposit() {
        let (backend, mut inst) = deploy();
        assert_eq!(call(&backend, &mut inst, "deposit", vec![], Some(5)), Outcome::unit());
        assert_eq!(call(&backend, &mut inst, "mine", vec![], None), u(5));
        assert_eq!(call(&backend, &mut inst, "held", vec![], None), u(5));
    }

    #[test]
    fn test_require_reverts_with_reason_and_keeps_state() {
        let (backend, mut inst) = deploy();
        let out = call(&backend, &mut inst, "deposit", vec![], Some(0));
        assert_eq!(
            out,
            Outcome::Error {
                kind: ErrorKind::Reverted,
                reason: Some("empty deposit".into())
            }
        );
        assert_eq!(call(&backend, &mut inst, "held", vec![], None), u(0));
    }

    #[test]
    fn test_overflow_panics_and_rolls_back() {
        let (backend, mut inst) = deploy();
        assert_eq!(call(&backend, &mut inst, "bump", vec![Value::Uint(200)], None), Outcome::unit());
        let out = call(&backend, &mut inst, "bump", vec![Value::Uint(100)], None);
        assert_eq!(out, Outcome::panicked("arithmetic overflow"));
        assert_eq!(call(&backend, &mut inst, "total", vec![], None), u(200));
    }

    #[test]
    fn test_division_by_zero_panics() {
        let (backend, mut inst) = deploy();
        let out = call(&backend, &mut inst, "halve", vec![Value::Uint(0)], None);
        assert_eq!(out, Outcome::panicked("division by zero"));
        assert_eq!(call(&backend, &mut inst, "halve", vec![Value::Uint(2)], None), u(0));
    }

    #[test]
    fn test_non_payable_rejects_payment() {
        let (backend, mut inst) = deploy();
        let meta = backend.metadata();
        let sig = meta.methods_named("bump").next().unwrap().clone();
        let inv = Invocation {
            method: sig.signature(),
            args: vec![Value::Uint(1)],
            value: Some(3),
        };
        assert_eq!(inst.invoke(&inv).unwrap(), non_payable());
        assert_eq!(call(&backend, &mut inst, "total", vec![], None), u(0));
    }

    #[test]
    fn test_fall_through_returns_zero_values() {
        let (backend, mut inst) = deploy();
        assert_eq!(
            call(&backend, &mut inst, "nothing", vec![], None),
            Outcome::Normal(vec![Value::Bool(false)])
        );
    }

    #[test]
    fn test_unknown_method() {
        let (_, mut inst) = deploy();
        let sig = MethodSig::new("ghost", vec![], vec![], simex_abi::Visibility::Public, simex_abi::Mutability::Nonpayable);
        let inv = Invocation::new(&sig, vec![], None).unwrap();
        assert!(matches!(inst.invoke(&inv), Err(simex_mc::BackendError::UnknownMethod(_))));
    }

    #[test]
    fn test_constructor_arguments_and_rejection() {
        let json = r#"{"name": "C", "storage": [{"name": "x", "ty": "uint8"}],
            "constructor": {"params": [{"name": "v", "ty": "uint8"}], "body": [
                {"kind": "Require", "cond": {"kind": "Binary", "op": "Ne", "left": {"kind": "Param", "index": 0}, "right": {"kind": "Uint", "value": 0}}},
                {"kind": "Assign", "var": 0, "value": {"kind": "Param", "index": 0}}
            ]}}"#;
        let backend = VmBackend::from_json(json).unwrap();
        let ctor = backend.metadata().constructor.unwrap();

        let zero = Invocation::new(&ctor, vec![Value::Uint(0)], None).unwrap();
        assert!(matches!(backend.create(&zero).unwrap(), Deployment::Rejected(_)));

        let two = Invocation::new(&ctor, vec![Value::Uint(2)], None).unwrap();
        match backend.create(&two).unwrap() {
            Deployment::Deployed { instance, .. } => {
                assert_eq!(instance.storage().read(0, &[]), Some(Value::Uint(2)));
            }
            Deployment::Rejected(o) => panic!("rejected: {}", o),
        }
    }

    #[test]
    fn test_implicit_constructor_rejects_payment() {
        let backend = VmBackend::from_json(BANK).unwrap();
        let ctor = Invocation {
            method: MethodSig::default_constructor().signature(),
            args: vec![],
            value: Some(1),
        };
        assert!(matches!(backend.create(&ctor).unwrap(), Deployment::Rejected(_)));
    }
}
