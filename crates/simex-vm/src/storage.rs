//! Contract storage.

use crate::ast::{mapping_shape, StorageDecl};
use crate::error::{VmError, VmResult};
use simex_abi::Value;
use std::collections::BTreeMap;

/// One storage variable. Mappings store only written entries and read
/// the leaf type's zero value everywhere else.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Mapping {
        depth: usize,
        default: Value,
        entries: BTreeMap<Vec<Value>, Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Storage {
    slots: Vec<Slot>,
}

impl Storage {
    /// Zero-initialised storage for `decls`.
    pub fn new(decls: &[StorageDecl]) -> VmResult<Self> {
        let slots = decls
            .iter()
            .map(|decl| {
                let (keys, leaf) = mapping_shape(&decl.ty);
                let unsupported = || VmError::UnsupportedStorage {
                    name: decl.name.clone(),
                    ty: decl.ty.clone(),
                };
                if keys.iter().any(|k| !k.is_elementary()) {
                    return Err(unsupported());
                }
                let default = leaf.zero_value().ok_or_else(unsupported)?;
                Ok(if keys.is_empty() {
                    Slot::Value(default)
                } else {
                    Slot::Mapping {
                        depth: keys.len(),
                        default,
                        entries: BTreeMap::new(),
                    }
                })
            })
            .collect::<VmResult<Vec<_>>>()?;
        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Read `var[keys..]`; `None` if the variable does not exist or the key
    /// count does not match its shape.
    pub fn read(&self, var: usize, keys: &[Value]) -> Option<Value> {
        match self.slots.get(var)? {
            Slot::Value(v) if keys.is_empty() => Some(v.clone()),
            Slot::Mapping {
                depth,
                default,
                entries,
            } if *depth == keys.len() => Some(entries.get(keys).unwrap_or(default).clone()),
            _ => None,
        }
    }

    /// Write `var[keys..] = value`; false on a shape mismatch.
    pub fn write(&mut self, var: usize, keys: Vec<Value>, value: Value) -> bool {
        match self.slots.get_mut(var) {
            Some(Slot::Value(v)) if keys.is_empty() => {
                *v = value;
                true
            }
            Some(Slot::Mapping {
                depth,
                default,
                entries,
            }) if *depth == keys.len() => {
                if value == *default {
                    entries.remove(&keys);
                } else {
                    entries.insert(keys, value);
                }
                true
            }
            _ => false,
        }
    }
}
