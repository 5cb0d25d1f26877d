//! ABI type descriptors.
//!
//! Types are written in their canonical Solidity spelling (`uint256`,
//! `bytes32`, `address[2]`, `(uint8,bool)`, `mapping(address=>uint256)`)
//! and serialize as that string.

use crate::value::{Address, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A declared parameter, return or storage type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AbiType {
    Bool,
    /// Unsigned integer of the given bit width (8..=256, multiple of 8).
    Uint(u16),
    /// Signed integer of the given bit width (8..=256, multiple of 8).
    Int(u16),
    Address,
    /// `bytesN` for N in 1..=32.
    FixedBytes(u8),
    /// Dynamic `bytes`.
    Bytes,
    String,
    /// `T[N]` when the length is known, `T[]` otherwise.
    Array(Box<AbiType>, Option<usize>),
    Tuple(Vec<AbiType>),
    /// Storage-only key/value mapping.
    Mapping(Box<AbiType>, Box<AbiType>),
}

impl AbiType {
    pub fn uint256() -> Self {
        AbiType::Uint(256)
    }

    pub fn int256() -> Self {
        AbiType::Int(256)
    }

    /// Whether this is a fixed-size value type usable as a mapping key.
    pub fn is_elementary(&self) -> bool {
        matches!(
            self,
            AbiType::Bool
                | AbiType::Uint(_)
                | AbiType::Int(_)
                | AbiType::Address
                | AbiType::FixedBytes(_)
                | AbiType::Bytes
                | AbiType::String
        )
    }

    /// Largest value of an unsigned type. Widths above 128 bits are capped
    /// at the `u128` range.
    pub fn uint_max(bits: u16) -> u128 {
        if bits >= 128 {
            u128::MAX
        } else {
            (1u128 << bits) - 1
        }
    }

    /// Inclusive bounds of a signed type, capped at the `i128` range.
    pub fn int_bounds(bits: u16) -> (i128, i128) {
        if bits >= 128 {
            (i128::MIN, i128::MAX)
        } else {
            let half = 1i128 << (bits - 1);
            (-half, half - 1)
        }
    }

    /// Whether `value` inhabits this type, including integer range checks.
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (AbiType::Bool, Value::Bool(_)) => true,
            (AbiType::Uint(bits), Value::Uint(n)) => *n <= Self::uint_max(*bits),
            (AbiType::Int(bits), Value::Int(n)) => {
                let (lo, hi) = Self::int_bounds(*bits);
                lo <= *n && *n <= hi
            }
            (AbiType::Address, Value::Address(_)) => true,
            (AbiType::FixedBytes(size), Value::Bytes(b)) => b.len() == *size as usize,
            (AbiType::Bytes, Value::Bytes(_)) => true,
            (AbiType::String, Value::String(_)) => true,
            (AbiType::Array(elem, len), Value::Array(items)) => {
                len.map_or(true, |n| n == items.len()) && items.iter().all(|v| elem.admits(v))
            }
            (AbiType::Tuple(elems), Value::Tuple(items)) => {
                elems.len() == items.len() && elems.iter().zip(items).all(|(t, v)| t.admits(v))
            }
            _ => false,
        }
    }

    /// The default (all-zero) value of this type. Mappings have none.
    pub fn zero_value(&self) -> Option<Value> {
        Some(match self {
            AbiType::Bool => Value::Bool(false),
            AbiType::Uint(_) => Value::Uint(0),
            AbiType::Int(_) => Value::Int(0),
            AbiType::Address => Value::Address(Address::ZERO),
            AbiType::FixedBytes(size) => Value::Bytes(vec![0; *size as usize]),
            AbiType::Bytes => Value::Bytes(Vec::new()),
            AbiType::String => Value::String(String::new()),
            AbiType::Array(elem, Some(n)) => {
                let zero = elem.zero_value()?;
                Value::Array(vec![zero; *n])
            }
            AbiType::Array(_, None) => Value::Array(Vec::new()),
            AbiType::Tuple(elems) => Value::Tuple(
                elems
                    .iter()
                    .map(|t| t.zero_value())
                    .collect::<Option<Vec<_>>>()?,
            ),
            AbiType::Mapping(..) => return None,
        })
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Bool => write!(f, "bool"),
            AbiType::Uint(bits) => write!(f, "uint{}", bits),
            AbiType::Int(bits) => write!(f, "int{}", bits),
            AbiType::Address => write!(f, "address"),
            AbiType::FixedBytes(size) => write!(f, "bytes{}", size),
            AbiType::Bytes => write!(f, "bytes"),
            AbiType::String => write!(f, "string"),
            AbiType::Array(elem, Some(n)) => write!(f, "{}[{}]", elem, n),
            AbiType::Array(elem, None) => write!(f, "{}[]", elem),
            AbiType::Tuple(elems) => {
                write!(f, "(")?;
                for (i, t) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, ")")
            }
            AbiType::Mapping(key, value) => write!(f, "mapping({}=>{})", key, value),
        }
    }
}

impl From<AbiType> for String {
    fn from(ty: AbiType) -> String {
        ty.to_string()
    }
}

impl TryFrom<String> for AbiType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for AbiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let mut parser = TypeParser {
            src: &compact,
            pos: 0,
        };
        let ty = parser.parse_type()?;
        if parser.pos != compact.len() {
            return Err(format!("trailing input in type '{}'", s));
        }
        Ok(ty)
    }
}

/// Recursive-descent parser over the canonical type spelling.
struct TypeParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected '{}' at offset {} in '{}'", token, self.pos, self.src))
        }
    }

    fn number(&mut self) -> Option<usize> {
        let digits: String = self.rest().chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        self.pos += digits.len();
        digits.parse().ok()
    }

    fn parse_type(&mut self) -> Result<AbiType, String> {
        let mut ty = self.parse_base()?;
        while self.eat("[") {
            let len = self.number();
            self.expect("]")?;
            ty = AbiType::Array(Box::new(ty), len);
        }
        Ok(ty)
    }

    fn parse_base(&mut self) -> Result<AbiType, String> {
        if self.eat("(") {
            let mut elems = Vec::new();
            if !self.eat(")") {
                loop {
                    elems.push(self.parse_type()?);
                    if self.eat(")") {
                        break;
                    }
                    self.expect(",")?;
                }
            }
            return Ok(AbiType::Tuple(elems));
        }
        if self.eat("mapping(") {
            let key = self.parse_type()?;
            self.expect("=>")?;
            let value = self.parse_type()?;
            self.expect(")")?;
            return Ok(AbiType::Mapping(Box::new(key), Box::new(value)));
        }
        if self.eat("bool") {
            return Ok(AbiType::Bool);
        }
        if self.eat("address") {
            return Ok(AbiType::Address);
        }
        if self.eat("string") {
            return Ok(AbiType::String);
        }
        if self.eat("uint") {
            return Ok(AbiType::Uint(self.int_width()?));
        }
        if self.eat("int") {
            return Ok(AbiType::Int(self.int_width()?));
        }
        if self.eat("bytes") {
            return match self.number() {
                None => Ok(AbiType::Bytes),
                Some(n) if (1..=32).contains(&n) => Ok(AbiType::FixedBytes(n as u8)),
                Some(n) => Err(format!("invalid fixed bytes width {}", n)),
            };
        }
        Err(format!("unknown type at offset {} in '{}'", self.pos, self.src))
    }

    fn int_width(&mut self) -> Result<u16, String> {
        match self.number() {
            None => Ok(256),
            Some(n) if n % 8 == 0 && (8..=256).contains(&n) => Ok(n as u16),
            Some(n) => Err(format!("invalid integer width {}", n)),
        }
    }
}
