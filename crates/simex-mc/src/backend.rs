//! The execution backend seam.
//!
//! A [`Backend`] is bound to one contract and deploys fresh instances of
//! it; a [`ContractInstance`] executes calls against one deployment.
//! States are never resumed: the explorer replays whole traces against
//! fresh instances, so a backend needs no snapshot support.

use crate::error::BackendResult;
use crate::history::{Invocation, Observation, Operation, Outcome};
use simex_abi::Address;

/// Result of running a constructor.
#[derive(Debug)]
pub enum Deployment<I> {
    /// The constructor returned normally.
    Deployed { instance: I, outcome: Outcome },
    /// The constructor returned an error result; nothing was deployed.
    Rejected(Outcome),
}

/// A deployer for one contract.
///
/// Backends must be `Sync`: candidate transitions of one state may be
/// replayed concurrently, each against its own instance.
pub trait Backend: Sync {
    type Instance: ContractInstance;

    /// Accounts available as `address` arguments.
    fn accounts(&self) -> &[Address];

    /// Deploy a fresh instance by running `constructor`.
    fn create(&self, constructor: &Invocation) -> BackendResult<Deployment<Self::Instance>>;
}

/// A live deployment.
pub trait ContractInstance {
    /// Execute one call and commit its effects if it returns normally.
    fn invoke(&mut self, invocation: &Invocation) -> BackendResult<Outcome>;

    /// Replay a call sequence without observing intermediate results.
    fn invoke_sequence(&mut self, invocations: &[Invocation]) -> BackendResult<()> {
        for invocation in invocations {
            self.invoke(invocation)?;
        }
        Ok(())
    }

    /// Evaluate every observer invocation once in the current state.
    fn observe(&mut self, observers: &[Invocation]) -> BackendResult<Observation> {
        let ops = observers
            .iter()
            .map(|inv| Ok(Operation::new(inv.clone(), self.invoke(inv)?)))
            .collect::<BackendResult<Vec<_>>>()?;
        Ok(Observation::new(ops))
    }
}
