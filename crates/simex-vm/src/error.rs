use simex_abi::AbiType;
use simex_mc::BackendError;
use thiserror::Error;

/// Errors raised while loading a contract definition or by the
/// interpreter itself. Reverts and panics of the executed code are not
/// errors; they become error outcomes.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("failed to parse contract definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate {what} '{name}' in contract {contract}")]
    Duplicate {
        contract: String,
        what: &'static str,
        name: String,
    },

    #[error("storage variable '{name}' has unsupported type {ty}")]
    UnsupportedStorage { name: String, ty: AbiType },

    #[error("in {function}: {message}")]
    Invalid { function: String, message: String },

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("bad call to {method}: {message}")]
    BadCall { method: String, message: String },

    #[error("interpreter fault in {function}: {message}")]
    Fault { function: String, message: String },
}

pub type VmResult<T> = Result<T, VmError>;

impl From<VmError> for BackendError {
    fn from(e: VmError) -> Self {
        match e {
            VmError::UnknownMethod(method) => BackendError::UnknownMethod(method),
            VmError::BadCall { method, message } => BackendError::InvalidCall { method, message },
            other => BackendError::Internal(other.to_string()),
        }
    }
}
