//! Compiled contract metadata: method signatures and state variables.

use crate::types::AbiType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who may call a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

impl Visibility {
    /// Callable from outside the contract.
    pub fn is_accessible(self) -> bool {
        matches!(self, Visibility::Public | Visibility::External)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::External => "external",
            Visibility::Internal => "internal",
            Visibility::Private => "private",
        };
        f.write_str(s)
    }
}

/// State mutability of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Pure,
    View,
    Nonpayable,
    Payable,
}

impl Mutability {
    pub fn is_read_only(self) -> bool {
        matches!(self, Mutability::Pure | Mutability::View)
    }
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mutability::Pure => "pure",
            Mutability::View => "view",
            Mutability::Nonpayable => "nonpayable",
            Mutability::Payable => "payable",
        };
        f.write_str(s)
    }
}

/// Role of a method during exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    Constructor,
    /// Not pure/view: may change state.
    Mutator,
    /// Pure/view: evaluated to build observations.
    Observer,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodKind::Constructor => "constructor",
            MethodKind::Mutator => "mutator",
            MethodKind::Observer => "observer",
        };
        f.write_str(s)
    }
}

/// A named, typed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub name: String,
    pub ty: AbiType,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: AbiType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Method identity: name plus parameter types.
///
/// This is what invocations carry, so that a source and a target method
/// mapped onto each other produce equal invocations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub inputs: Vec<AbiType>,
}

impl Signature {
    pub fn is_constructor(&self) -> bool {
        self.name == MethodSig::CONSTRUCTOR_NAME
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, ty) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, ")")
    }
}

/// A method as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSig {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Param>,
    #[serde(default)]
    pub outputs: Vec<AbiType>,
    pub visibility: Visibility,
    pub mutability: Mutability,
}

impl MethodSig {
    pub const CONSTRUCTOR_NAME: &'static str = "constructor";

    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Param>,
        outputs: Vec<AbiType>,
        visibility: Visibility,
        mutability: Mutability,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            visibility,
            mutability,
        }
    }

    pub fn constructor(inputs: Vec<Param>, mutability: Mutability) -> Self {
        Self::new(
            Self::CONSTRUCTOR_NAME,
            inputs,
            Vec::new(),
            Visibility::Public,
            mutability,
        )
    }

    /// The implicit zero-argument constructor of a contract that declares none.
    pub fn default_constructor() -> Self {
        Self::constructor(Vec::new(), Mutability::Nonpayable)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == Self::CONSTRUCTOR_NAME
    }

    pub fn kind(&self) -> MethodKind {
        if self.is_constructor() {
            MethodKind::Constructor
        } else if self.mutability.is_read_only() {
            MethodKind::Observer
        } else {
            MethodKind::Mutator
        }
    }

    pub fn is_payable(&self) -> bool {
        self.mutability == Mutability::Payable
    }

    /// Anything but private.
    pub fn is_visible(&self) -> bool {
        self.visibility != Visibility::Private
    }

    pub fn input_types(&self) -> Vec<AbiType> {
        self.inputs.iter().map(|p| p.ty.clone()).collect()
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            inputs: self.input_types(),
        }
    }

    /// Equal arity and pairwise-equal declared types, for both parameters
    /// and returns. Names of parameters are irrelevant.
    pub fn is_compatible_with(&self, other: &MethodSig) -> bool {
        self.inputs.len() == other.inputs.len()
            && self
                .inputs
                .iter()
                .zip(&other.inputs)
                .all(|(a, b)| a.ty == b.ty)
            && self.outputs == other.outputs
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())?;
        if !self.outputs.is_empty() {
            write!(f, " returns (")?;
            for (i, ty) in self.outputs.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", ty)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A state variable declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateVar {
    pub name: String,
    pub ty: AbiType,
}

/// Everything the exploration core needs to know about a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMeta {
    pub name: String,
    #[serde(default)]
    pub state_vars: Vec<StateVar>,
    /// Explicit constructor, if the contract declares one.
    #[serde(default)]
    pub constructor: Option<MethodSig>,
    /// Non-constructor methods.
    #[serde(default)]
    pub methods: Vec<MethodSig>,
}

impl ContractMeta {
    pub fn has_constructor(&self) -> bool {
        self.constructor.is_some()
    }

    /// The declared constructor, or the implicit one.
    pub fn constructor_or_default(&self) -> MethodSig {
        self.constructor
            .clone()
            .unwrap_or_else(MethodSig::default_constructor)
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a MethodSig> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    /// Constructor (declared or implicit) followed by every other method.
    pub fn all_methods(&self) -> Vec<MethodSig> {
        let mut methods = Vec::with_capacity(self.methods.len() + 1);
        methods.push(self.constructor_or_default());
        methods.extend(self.methods.iter().cloned());
        methods
    }
}
