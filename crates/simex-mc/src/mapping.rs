//! Alignment of target methods with source methods.

use crate::error::{MappingError, MappingResult};
use serde::Serialize;
use simex_abi::{ContractMeta, MethodSig, Mutability};
use tracing::debug;

/// One aligned method pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingEntry {
    pub source: MethodSig,
    pub target: MethodSig,
}

impl MappingEntry {
    /// Mutability both sides are explored with. A read-only target keeps
    /// the pair an observer; otherwise the pair is payable if either side
    /// is, so both generators cross the same payments.
    pub fn mutability(&self) -> Mutability {
        let (source, target) = (self.source.mutability, self.target.mutability);
        if target.is_read_only() {
            target
        } else if source == Mutability::Payable || target == Mutability::Payable {
            Mutability::Payable
        } else {
            Mutability::Nonpayable
        }
    }

    fn aligned(&self, sig: &MethodSig) -> MethodSig {
        MethodSig {
            mutability: self.mutability(),
            ..sig.clone()
        }
    }
}

/// Target methods paired with same-named, signature-compatible source
/// methods. The constructor pair is always the first entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionMapping {
    entries: Vec<MappingEntry>,
}

impl FunctionMapping {
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn constructor(&self) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.target.is_constructor())
    }

    /// Whether `method` is the target side of some entry.
    pub fn maps_target(&self, method: &MethodSig) -> bool {
        self.entries.iter().any(|e| e.target == *method)
    }

    /// Source side of every entry, with the pair's shared mutability, to
    /// restrict the source generator.
    pub fn source_methods(&self) -> Vec<MethodSig> {
        self.entries.iter().map(|e| e.aligned(&e.source)).collect()
    }

    /// Target side of every entry, with the pair's shared mutability, to
    /// restrict the target generator.
    pub fn target_methods(&self) -> Vec<MethodSig> {
        self.entries.iter().map(|e| e.aligned(&e.target)).collect()
    }
}

/// Map every accessible target method onto its source counterpart.
///
/// Target methods that are not public/external, or that have no
/// same-named accessible source method, are left unmapped. A same-named
/// method with a different signature is a structural error, as is a
/// constructor mismatch.
pub fn get_mapping(source: &ContractMeta, target: &ContractMeta) -> MappingResult<FunctionMapping> {
    let mut entries = Vec::with_capacity(target.methods.len() + 1);

    let target_ctor = target.constructor_or_default();
    let source_ctor = source.constructor_or_default();
    if !source_ctor.is_compatible_with(&target_ctor) {
        return Err(MappingError::NoMatchingConstructor {
            target: target_ctor.to_string(),
            available: source_ctor.to_string(),
        });
    }
    entries.push(MappingEntry {
        source: source_ctor,
        target: target_ctor,
    });

    for method in &target.methods {
        if !method.visibility.is_accessible() {
            debug!(method = %method, "skipping inaccessible target method");
            continue;
        }
        let candidates: Vec<&MethodSig> = source
            .methods_named(&method.name)
            .filter(|m| m.visibility.is_accessible())
            .collect();
        if candidates.is_empty() {
            debug!(method = %method, "no source counterpart, leaving unmapped");
            continue;
        }
        match candidates.iter().find(|m| m.is_compatible_with(method)) {
            Some(found) => entries.push(MappingEntry {
                source: (*found).clone(),
                target: method.clone(),
            }),
            None => {
                return Err(MappingError::IncompatibleSignatures {
                    name: method.name.clone(),
                    target: method.to_string(),
                    candidates: candidates
                        .iter()
                        .map(|m| m.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
        }
    }

    debug!(entries = entries.len(), "function mapping computed");
    Ok(FunctionMapping { entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use simex_abi::{AbiType, Mutability, Param, Visibility};

    fn method(name: &str, inputs: Vec<AbiType>, visibility: Visibility) -> MethodSig {
        MethodSig::new(
            name,
            inputs.into_iter().map(|ty| Param::new("", ty)).collect(),
            vec![],
            visibility,
            Mutability::Nonpayable,
        )
    }

    fn contract(name: &str, constructor: Option<MethodSig>, methods: Vec<MethodSig>) -> ContractMeta {
        ContractMeta {
            name: name.into(),
            state_vars: vec![],
            constructor,
            methods,
        }
    }

    #[test]
    fn test_implicit_constructors_match() {
        let s = contract("S", None, vec![method("inc", vec![], Visibility::Public)]);
        let t = contract("T", None, vec![method("inc", vec![], Visibility::External)]);
        let mapping = get_mapping(&s, &t).unwrap();
        assert_eq!(mapping.len(), 2);
        assert!(mapping.constructor().is_some());
        assert_eq!(mapping.target_methods()[1].name, "inc");
    }

    #[test]
    fn test_constructor_mismatch_is_fatal() {
        let s = contract("S", None, vec![]);
        let t = contract(
            "T",
            Some(MethodSig::constructor(
                vec![Param::new("x", AbiType::uint256())],
                Mutability::Nonpayable,
            )),
            vec![],
        );
        assert!(matches!(
            get_mapping(&s, &t),
            Err(MappingError::NoMatchingConstructor { .. })
        ));
    }

    #[test]
    fn test_unmapped_and_inaccessible_are_skipped() {
        let s = contract(
            "S",
            None,
            vec![
                method("a", vec![], Visibility::Public),
                method("hidden", vec![], Visibility::Internal),
            ],
        );
        let t = contract(
            "T",
            None,
            vec![
                method("a", vec![], Visibility::Public),
                method("b", vec![], Visibility::Public),
                method("c", vec![], Visibility::Private),
                method("hidden", vec![], Visibility::Public),
            ],
        );
        let mapping = get_mapping(&s, &t).unwrap();
        let names: Vec<_> = mapping.target_methods().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["constructor", "a"]);
    }

    #[test]
    fn test_incompatible_signatures() {
        let s = contract("S", None, vec![method("set", vec![AbiType::Uint(8)], Visibility::Public)]);
        let t = contract("T", None, vec![method("set", vec![AbiType::Uint(16)], Visibility::Public)]);
        match get_mapping(&s, &t) {
            Err(MappingError::IncompatibleSignatures { name, .. }) => assert_eq!(name, "set"),
            other => panic!("expected incompatible signatures, got {:?}", other),
        }
    }

    fn with_mutability(name: &str, outputs: Vec<AbiType>, mutability: Mutability) -> MethodSig {
        MethodSig::new(name, vec![], outputs, Visibility::Public, mutability)
    }

    #[test]
    fn test_differing_mutability_is_aligned() {
        let s = contract(
            "S",
            None,
            vec![
                with_mutability("inc", vec![], Mutability::Payable),
                with_mutability("get", vec![AbiType::int256()], Mutability::Nonpayable),
            ],
        );
        let t = contract(
            "T",
            None,
            vec![
                with_mutability("inc", vec![], Mutability::Nonpayable),
                with_mutability("get", vec![AbiType::int256()], Mutability::View),
            ],
        );
        let mapping = get_mapping(&s, &t).unwrap();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.entries()[1].mutability(), Mutability::Payable);
        assert_eq!(mapping.entries()[2].mutability(), Mutability::View);

        let sources = mapping.source_methods();
        let targets = mapping.target_methods();
        for (s, t) in sources.iter().zip(&targets) {
            assert_eq!(s.mutability, t.mutability);
            assert_eq!(s.kind(), t.kind());
        }
        assert!(targets[1].is_payable());
        assert_eq!(sources[2].kind(), simex_abi::MethodKind::Observer);

        // the declared target signatures are still recognised as mapped
        assert!(t.methods.iter().all(|m| mapping.maps_target(m)));
    }

    #[test]
    fn test_overload_resolution() {
        let s = contract(
            "S",
            None,
            vec![
                method("set", vec![AbiType::Uint(8)], Visibility::Public),
                method("set", vec![AbiType::Bool], Visibility::Public),
            ],
        );
        let t = contract("T", None, vec![method("set", vec![AbiType::Bool], Visibility::Public)]);
        let mapping = get_mapping(&s, &t).unwrap();
        assert_eq!(mapping.entries()[1].source.inputs[0].ty, AbiType::Bool);
    }
}
