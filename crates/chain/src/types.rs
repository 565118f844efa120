//! Core Sui value types: addresses, object references and Move type tags.
//!
//! Every type here serializes to the canonical BCS layout when the serializer
//! is binary and to the JSON-RPC text form when it is human readable, so the
//! same value can travel in a transaction payload and in an RPC parameter.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Length of an address / object id in bytes.
pub const ADDRESS_LENGTH: usize = 32;

/// A 32-byte Sui account address.
///
/// Object ids share the same representation, see [`ObjectId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SuiAddress([u8; ADDRESS_LENGTH]);

/// Object ids are addresses on Sui.
pub type ObjectId = SuiAddress;

impl SuiAddress {
    pub const ZERO: Self = Self([0u8; ADDRESS_LENGTH]);

    /// The Sui framework package (`0x2`).
    pub const FRAMEWORK: Self = Self::from_low_byte(2);

    /// The shared system clock object (`0x6`).
    pub const CLOCK: Self = Self::from_low_byte(6);

    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    const fn from_low_byte(b: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[ADDRESS_LENGTH - 1] = b;
        Self(bytes)
    }

    /// Build from a byte slice that must be exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ChainError> {
        let arr: [u8; ADDRESS_LENGTH] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidAddress(format!("0x{}", hex::encode(bytes))))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }
}

impl FromStr for SuiAddress {
    type Err = ChainError;

    /// Accepts full (`0x` + 64 hex) and short (`0x6`) forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > ADDRESS_LENGTH * 2 {
            return Err(ChainError::InvalidAddress(s.to_string()));
        }

        let padded = format!("{:0>64}", digits);
        let bytes = hex::decode(padded).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for SuiAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Object content digest.
///
/// BCS encodes it as a length-prefixed byte vector; JSON-RPC as base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectDigest([u8; 32]);

impl ObjectDigest {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for ObjectDigest {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| ChainError::InvalidDigest(format!("{s}: {e}")))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::InvalidDigest(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for ObjectDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for ObjectDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for ObjectDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(deserializer)?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| de::Error::custom("object digest must be 32 bytes"))?;
            Ok(Self(arr))
        }
    }
}

/// `(id, version, digest)` reference to an owned or immutable object.
pub type ObjectRef = (ObjectId, u64, ObjectDigest);

/// A Move type, in the variant order the ledger's BCS layout expects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    U8,
    U64,
    U128,
    Address,
    Signer,
    Vector(Box<TypeTag>),
    Struct(Box<StructTag>),
    U16,
    U32,
    U256,
}

/// A fully qualified Move struct type such as `0x2::coin::Coin<0x2::sui::SUI>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructTag {
    pub address: SuiAddress,
    pub module: String,
    pub name: String,
    pub type_params: Vec<TypeTag>,
}

impl StructTag {
    pub fn new(address: SuiAddress, module: &str, name: &str, type_params: Vec<TypeTag>) -> Self {
        Self {
            address,
            module: module.to_string(),
            name: name.to_string(),
            type_params,
        }
    }
}

impl TypeTag {
    pub fn structure(tag: StructTag) -> Self {
        TypeTag::Struct(Box::new(tag))
    }

    /// `0x2::coin::Coin<inner>`
    pub fn coin_of(inner: TypeTag) -> Self {
        Self::structure(StructTag::new(SuiAddress::FRAMEWORK, "coin", "Coin", vec![inner]))
    }

    /// `0x2::sui::SUI`
    pub fn sui() -> Self {
        Self::structure(StructTag::new(SuiAddress::FRAMEWORK, "sui", "SUI", vec![]))
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.address, self.module, self.name)?;
        if !self.type_params.is_empty() {
            f.write_str("<")?;
            for (i, param) in self.type_params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::U8 => f.write_str("u8"),
            TypeTag::U16 => f.write_str("u16"),
            TypeTag::U32 => f.write_str("u32"),
            TypeTag::U64 => f.write_str("u64"),
            TypeTag::U128 => f.write_str("u128"),
            TypeTag::U256 => f.write_str("u256"),
            TypeTag::Address => f.write_str("address"),
            TypeTag::Signer => f.write_str("signer"),
            TypeTag::Vector(inner) => write!(f, "vector<{inner}>"),
            TypeTag::Struct(tag) => write!(f, "{tag}"),
        }
    }
}

impl FromStr for TypeTag {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type_tag(s.trim()).map_err(|reason| ChainError::InvalidTypeTag {
            input: s.to_string(),
            reason,
        })
    }
}

impl FromStr for StructTag {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<TypeTag>()? {
            TypeTag::Struct(tag) => Ok(*tag),
            other => Err(ChainError::InvalidTypeTag {
                input: s.to_string(),
                reason: format!("{other} is not a struct type"),
            }),
        }
    }
}

fn parse_type_tag(s: &str) -> Result<TypeTag, String> {
    let tag = match s {
        "bool" => TypeTag::Bool,
        "u8" => TypeTag::U8,
        "u16" => TypeTag::U16,
        "u32" => TypeTag::U32,
        "u64" => TypeTag::U64,
        "u128" => TypeTag::U128,
        "u256" => TypeTag::U256,
        "address" => TypeTag::Address,
        "signer" => TypeTag::Signer,
        _ => {
            if let Some(inner) = s.strip_prefix("vector<").and_then(|r| r.strip_suffix('>')) {
                return Ok(TypeTag::Vector(Box::new(parse_type_tag(inner.trim())?)));
            }
            return parse_struct_tag(s).map(TypeTag::structure);
        }
    };
    Ok(tag)
}

fn parse_struct_tag(s: &str) -> Result<StructTag, String> {
    let (path, params) = match s.find('<') {
        Some(open) => {
            let inner = s[open + 1..]
                .strip_suffix('>')
                .ok_or_else(|| "unbalanced type parameter list".to_string())?;
            (&s[..open], split_type_params(inner)?)
        }
        None => (s, Vec::new()),
    };

    let mut parts = path.split("::");
    let (Some(address), Some(module), Some(name), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected address::module::name, got {path:?}"));
    };

    let address = address.parse::<SuiAddress>().map_err(|e| e.to_string())?;
    if module.is_empty() || name.is_empty() {
        return Err("empty module or struct name".to_string());
    }

    let type_params = params
        .iter()
        .map(|p| parse_type_tag(p))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StructTag {
        address,
        module: module.to_string(),
        name: name.to_string(),
        type_params,
    })
}

/// Split `A, B<C, D>, E` at depth-zero commas.
fn split_type_params(s: &str) -> Result<Vec<&str>, String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        if depth < 0 {
            return Err("unbalanced type parameter list".to_string());
        }
    }
    if depth != 0 {
        return Err("unbalanced type parameter list".to_string());
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_address_is_left_padded() {
        let clock: SuiAddress = "0x6".parse().unwrap();
        assert_eq!(clock, SuiAddress::CLOCK);
        assert_eq!(
            clock.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000006"
        );
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!("0xzz".parse::<SuiAddress>().is_err());
        assert!("".parse::<SuiAddress>().is_err());
        assert!(format!("0x{}", "1".repeat(65)).parse::<SuiAddress>().is_err());
    }

    #[test]
    fn test_address_bcs_is_raw_bytes() {
        let addr: SuiAddress = "0x2".parse().unwrap();
        let bytes = bcs::to_bytes(&addr).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[31], 2);
        assert_eq!(bcs::from_bytes::<SuiAddress>(&bytes).unwrap(), addr);
    }

    #[test]
    fn test_address_json_is_hex_string() {
        let json = serde_json::to_string(&SuiAddress::CLOCK).unwrap();
        assert_eq!(json, format!("\"{}\"", SuiAddress::CLOCK));
    }

    #[test]
    fn test_digest_bcs_is_length_prefixed() {
        let digest = ObjectDigest::new([7u8; 32]);
        let bytes = bcs::to_bytes(&digest).unwrap();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 32);

        let text = digest.to_string();
        assert_eq!(text.parse::<ObjectDigest>().unwrap(), digest);
    }

    #[test]
    fn test_parse_nested_struct_tag() {
        let tag: TypeTag = "0x2::coin::Coin<0xabc::usdc6::USDC6>".parse().unwrap();
        let TypeTag::Struct(outer) = &tag else {
            panic!("expected struct");
        };
        assert_eq!(outer.module, "coin");
        assert_eq!(outer.name, "Coin");
        assert_eq!(outer.type_params.len(), 1);
        assert_eq!(tag, TypeTag::coin_of("0xabc::usdc6::USDC6".parse().unwrap()));
    }

    #[test]
    fn test_parse_multiple_params_and_vectors() {
        let tag: TypeTag = "0x1::table::Table<vector<u8>, 0x2::m::K<u64, bool>>"
            .parse()
            .unwrap();
        let TypeTag::Struct(outer) = tag else {
            panic!("expected struct");
        };
        assert_eq!(outer.type_params[0], TypeTag::Vector(Box::new(TypeTag::U8)));
        assert!(matches!(outer.type_params[1], TypeTag::Struct(_)));
    }

    #[test]
    fn test_short_and_long_coin_types_compare_equal() {
        let short: TypeTag = "0x2::sui::SUI".parse().unwrap();
        let long: TypeTag = format!("{}::sui::SUI", SuiAddress::FRAMEWORK).parse().unwrap();
        assert_eq!(short, long);
        assert_eq!(short, TypeTag::sui());
    }

    #[test]
    fn test_type_tag_bcs_variant_order() {
        assert_eq!(bcs::to_bytes(&TypeTag::U256).unwrap(), vec![10]);
        assert_eq!(bcs::to_bytes(&TypeTag::Address).unwrap(), vec![4]);
        let coin = bcs::to_bytes(&TypeTag::sui()).unwrap();
        assert_eq!(coin[0], 7);
    }

    #[test]
    fn test_unbalanced_generics_rejected() {
        assert!("0x2::coin::Coin<0x2::sui::SUI".parse::<TypeTag>().is_err());
        assert!("0x2::coin".parse::<TypeTag>().is_err());
    }
}
