//! Small, deterministic value samples per declared type.
//!
//! This is boundary-value sampling, not fuzzing: every type maps to a fixed
//! handful of representatives so that exploration is reproducible.

use crate::error::{AbiError, AbiResult};
use crate::types::AbiType;
use crate::value::{Address, Value};

/// Integers sampled for every integer type.
pub const SAMPLE_INTEGERS: [u8; 3] = [0, 1, 2];

/// Number of accounts sampled for `address` parameters.
pub const SAMPLE_ADDRESSES: usize = 2;

/// Largest sample set built for one type or one argument list.
pub const MAX_SAMPLES: usize = 1 << 16;

/// Size of the product of domains of the given sizes, or `None` past
/// [`MAX_SAMPLES`].
fn bounded_product(sizes: impl IntoIterator<Item = usize>) -> Option<usize> {
    sizes
        .into_iter()
        .try_fold(1usize, |acc, n| acc.checked_mul(n))
        .filter(|&n| n <= MAX_SAMPLES)
}

/// Value generator over a fixed account list.
#[derive(Debug, Clone, Default)]
pub struct ValueDomain {
    accounts: Vec<Address>,
}

impl ValueDomain {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self { accounts }
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    /// Representative values of `ty`.
    pub fn values_of_type(&self, ty: &AbiType) -> AbiResult<Vec<Value>> {
        match ty {
            AbiType::Bool => Ok(vec![Value::Bool(false), Value::Bool(true)]),
            AbiType::Uint(_) => Ok(SAMPLE_INTEGERS
                .iter()
                .map(|&n| Value::Uint(n as u128))
                .collect()),
            AbiType::Int(_) => Ok(SAMPLE_INTEGERS
                .iter()
                .map(|&n| Value::Int(n as i128))
                .collect()),
            AbiType::Address => {
                // The zero address stands in when no accounts are available.
                if self.accounts.is_empty() {
                    return Ok(vec![Value::Address(Address::ZERO)]);
                }
                Ok(self
                    .accounts
                    .iter()
                    .take(SAMPLE_ADDRESSES)
                    .map(|a| Value::Address(*a))
                    .collect())
            }
            AbiType::FixedBytes(size) => {
                let n = *size as usize;
                let mut one = vec![0u8; n];
                one[n - 1] = 1;
                Ok(vec![
                    Value::Bytes(vec![0u8; n]),
                    Value::Bytes(one),
                    Value::Bytes(vec![0xffu8; n]),
                ])
            }
            AbiType::Bytes => Ok(vec![Value::Bytes(Vec::new()), Value::Bytes(vec![0x01])]),
            AbiType::String => Ok(vec![
                Value::String(String::new()),
                Value::String("a".to_string()),
            ]),
            AbiType::Array(elem, Some(len)) => {
                let elem_values = self.values_of_type(elem)?;
                if bounded_product(std::iter::repeat(elem_values.len()).take(*len)).is_none() {
                    return Err(AbiError::UnsupportedType {
                        ty: ty.clone(),
                        reason: "fixed-length array sample set too large",
                    });
                }
                let positions = vec![elem_values; *len];
                Ok(cartesian(&positions).into_iter().map(Value::Array).collect())
            }
            AbiType::Array(_, None) => Err(AbiError::UnsupportedType {
                ty: ty.clone(),
                reason: "dynamic-length arrays are not sampled",
            }),
            AbiType::Tuple(elems) => Ok(self
                .values_of_types(elems)?
                .into_iter()
                .map(Value::Tuple)
                .collect()),
            AbiType::Mapping(..) => Err(AbiError::UnsupportedType {
                ty: ty.clone(),
                reason: "mappings cannot be passed as values",
            }),
        }
    }

    /// Cross product of the samples of every type; a single empty tuple
    /// when `types` is empty.
    pub fn values_of_types(&self, types: &[AbiType]) -> AbiResult<Vec<Vec<Value>>> {
        let domains = types
            .iter()
            .map(|ty| self.values_of_type(ty))
            .collect::<AbiResult<Vec<_>>>()?;
        if bounded_product(domains.iter().map(Vec::len)).is_none() {
            return Err(AbiError::UnsupportedType {
                ty: AbiType::Tuple(types.to_vec()),
                reason: "argument sample set too large",
            });
        }
        Ok(cartesian(&domains))
    }
}

/// Cartesian product of per-position domains, in lexicographic order with
/// the last position varying fastest.
pub fn cartesian(domains: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut result: Vec<Vec<Value>> = vec![Vec::with_capacity(domains.len())];
    for domain in domains {
        let mut next = Vec::with_capacity(result.len() * domain.len());
        for prefix in &result {
            for value in domain {
                let mut tuple = prefix.clone();
                tuple.push(value.clone());
                next.push(tuple);
            }
        }
        result = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domain() -> ValueDomain {
        ValueDomain::new((1..=3).map(Address::from_low_u64).collect())
    }

    #[test]
    fn test_empty_types_give_one_empty_tuple() {
        assert_eq!(domain().values_of_types(&[]).unwrap(), vec![Vec::<Value>::new()]);
    }

    #[test]
    fn test_integer_samples() {
        let values = domain().values_of_type(&AbiType::uint256()).unwrap();
        assert_eq!(values, vec![Value::Uint(0), Value::Uint(1), Value::Uint(2)]);
    }

    #[test]
    fn test_first_two_accounts() {
        let values = domain().values_of_type(&AbiType::Address).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Address(Address::from_low_u64(1)),
                Value::Address(Address::from_low_u64(2))
            ]
        );
        let empty = ValueDomain::default().values_of_type(&AbiType::Address).unwrap();
        assert_eq!(empty, vec![Value::Address(Address::ZERO)]);
    }

    #[test]
    fn test_fixed_array_is_per_position_product() {
        let ty: AbiType = "bool[2]".parse().unwrap();
        let values = domain().values_of_type(&ty).unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| ty.admits(v)));
    }

    #[test]
    fn test_fixed_array_samples_are_capped() {
        let small: AbiType = "uint8[4]".parse().unwrap();
        assert_eq!(domain().values_of_type(&small).unwrap().len(), 81);

        let large: AbiType = "uint8[32]".parse().unwrap();
        let err = domain().values_of_type(&large).unwrap_err();
        assert!(matches!(err, AbiError::UnsupportedType { ty, .. } if ty == large));

        let huge: AbiType = "bool[100000]".parse().unwrap();
        assert!(domain().values_of_type(&huge).is_err());
    }

    #[test]
    fn test_argument_samples_are_capped() {
        // 3^11 tuples
        let params = vec![AbiType::Uint(8); 11];
        assert!(matches!(
            domain().values_of_types(&params),
            Err(AbiError::UnsupportedType { .. })
        ));
        let nested = vec!["uint8[8]".parse::<AbiType>().unwrap(); 2];
        assert!(domain().values_of_types(&nested).is_err());
    }

    #[test]
    fn test_unsupported_types() {
        let dynamic: AbiType = "uint8[]".parse().unwrap();
        assert!(matches!(
            domain().values_of_type(&dynamic),
            Err(AbiError::UnsupportedType { .. })
        ));
        let map: AbiType = "mapping(uint8=>bool)".parse().unwrap();
        assert!(domain().values_of_types(&[AbiType::Bool, map]).is_err());
    }

    #[test]
    fn test_cross_product_order() {
        let tuples = domain()
            .values_of_types(&[AbiType::Bool, AbiType::Uint(8)])
            .unwrap();
        assert_eq!(tuples.len(), 6);
        assert_eq!(tuples[0], vec![Value::Bool(false), Value::Uint(0)]);
        assert_eq!(tuples[1], vec![Value::Bool(false), Value::Uint(1)]);
        assert_eq!(tuples[5], vec![Value::Bool(true), Value::Uint(2)]);
    }

    fn elementary() -> impl Strategy<Value = AbiType> {
        prop_oneof![
            Just(AbiType::Bool),
            (1u16..=32).prop_map(|n| AbiType::Uint(n * 8)),
            (1u16..=32).prop_map(|n| AbiType::Int(n * 8)),
            Just(AbiType::Address),
            (1u8..=32).prop_map(AbiType::FixedBytes),
            Just(AbiType::Bytes),
            Just(AbiType::String),
        ]
    }

    proptest! {
        #[test]
        fn samples_are_deterministic_and_well_typed(types in prop::collection::vec(elementary(), 0..4)) {
            let d = domain();
            let first = d.values_of_types(&types).unwrap();
            let second = d.values_of_types(&types).unwrap();
            prop_assert_eq!(&first, &second);
            for tuple in &first {
                prop_assert_eq!(tuple.len(), types.len());
                for (ty, v) in types.iter().zip(tuple) {
                    prop_assert!(ty.admits(v));
                }
            }
        }
    }
}
