//! Result template decoding.
//!
//! A [`ResultTemplate`] declares which outputs of a simulated batch the caller
//! wants and how each one is decoded. Decoding is best effort: a missing or
//! malformed slot is recorded as a [`DecodeError`] and logged, and the
//! remaining slots are still decoded.

use std::collections::HashMap;

use alloy::primitives::U256;
use keeper_chain::CallOutput;
use tracing::warn;

use crate::error::DecodeError;

/// Bytes in one address-sized block.
const BLOCK_LEN: usize = 32;

/// How a raw output is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    /// `1` is true, `0` is false.
    Bool,
    /// Little-endian unsigned integer up to 256 bits.
    Uint,
    /// `0x`-prefixed lowercase hex of the raw bytes.
    Hex,
    /// Length-prefixed vector of 32-byte blocks, each rendered as hex.
    HexArray,
}

/// A decoded slot value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    Bool(bool),
    Uint(U256),
    Hex(String),
    HexArray(Vec<String>),
}

/// One declared output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    pub name: String,
    pub kind: DecodeKind,
    /// Position of the producing call within the batch.
    pub call: usize,
    /// Which return value of that call.
    pub index: usize,
}

/// Declared output shape of a simulated batch.
#[derive(Debug, Clone, Default)]
pub struct ResultTemplate {
    slots: Vec<OutputSlot>,
}

impl ResultTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the first return value of call `call`.
    pub fn slot(self, name: impl Into<String>, kind: DecodeKind, call: usize) -> Self {
        self.slot_at(name, kind, call, 0)
    }

    /// Declare return value `index` of call `call`.
    pub fn slot_at(mut self, name: impl Into<String>, kind: DecodeKind, call: usize, index: usize) -> Self {
        self.slots.push(OutputSlot {
            name: name.into(),
            kind,
            call,
            index,
        });
        self
    }

    /// Decode every declared slot from the per-call outputs of a simulation.
    pub fn decode(&self, outputs: &[CallOutput]) -> Decoded {
        let mut decoded = Decoded::default();

        for slot in &self.slots {
            let raw = outputs
                .get(slot.call)
                .and_then(|output| output.return_values.get(slot.index));

            let result = match raw {
                Some(bytes) => decode_value(&slot.name, slot.kind, bytes),
                None => Err(DecodeError::MissingOutput {
                    slot: slot.name.clone(),
                    call: slot.call,
                    index: slot.index,
                }),
            };

            match result {
                Ok(value) => {
                    decoded.values.insert(slot.name.clone(), value);
                }
                Err(err) => {
                    warn!(error = %err, "Skipping undecodable output");
                    decoded.errors.push(err);
                }
            }
        }

        decoded
    }
}

/// Filled template: decoded values by slot name plus any per-slot errors.
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    values: HashMap<String, DecodedValue>,
    errors: Vec<DecodeError>,
}

impl Decoded {
    pub fn get(&self, name: &str) -> Option<&DecodedValue> {
        self.values.get(name)
    }

    pub fn errors(&self) -> &[DecodeError] {
        &self.errors
    }

    /// Boolean slot; anything missing or non-boolean reads as false.
    pub fn bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(DecodedValue::Bool(true)))
    }

    pub fn uint(&self, name: &str) -> Option<U256> {
        match self.values.get(name) {
            Some(DecodedValue::Uint(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn hex(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(DecodedValue::Hex(s)) => Some(s),
            _ => None,
        }
    }

    /// Hex array slot; missing reads as empty.
    pub fn hex_array(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(DecodedValue::HexArray(items)) => items,
            _ => &[],
        }
    }
}

/// Decode one raw value. Pure.
pub fn decode_value(slot: &str, kind: DecodeKind, bytes: &[u8]) -> Result<DecodedValue, DecodeError> {
    let malformed = |reason: String| DecodeError::Malformed {
        slot: slot.to_string(),
        reason,
    };

    match kind {
        DecodeKind::Bool => match bytes.first() {
            Some(1) => Ok(DecodedValue::Bool(true)),
            Some(0) => Ok(DecodedValue::Bool(false)),
            Some(other) => {
                warn!(slot, byte = other, "Unexpected boolean byte, reading as false");
                Ok(DecodedValue::Bool(false))
            }
            None => Err(malformed("empty boolean".to_string())),
        },
        DecodeKind::Uint => {
            if bytes.len() > BLOCK_LEN {
                return Err(malformed(format!("{} bytes exceed 256 bits", bytes.len())));
            }
            Ok(DecodedValue::Uint(U256::from_le_slice(bytes)))
        }
        DecodeKind::Hex => Ok(DecodedValue::Hex(to_hex(bytes))),
        DecodeKind::HexArray => {
            let (count, header) = read_uleb128(bytes).ok_or_else(|| malformed("missing or oversized element count".to_string()))?;
            let body = &bytes[header..];
            let available = body.len() / BLOCK_LEN;
            if available < count {
                warn!(slot, declared = count, available, "Address array truncated");
            }
            let items = body
                .chunks_exact(BLOCK_LEN)
                .take(count)
                .map(to_hex)
                .collect();
            Ok(DecodedValue::HexArray(items))
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Vector lengths are ULEB128; a single byte for fewer than 128 elements.
/// Lengths above `u32::MAX` are rejected, as BCS does.
fn read_uleb128(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate().take(5) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            let value = u32::try_from(value).ok()?;
            return Some((value as usize, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(values: Vec<Vec<u8>>) -> Vec<CallOutput> {
        values.into_iter().map(CallOutput::single).collect()
    }

    #[test]
    fn test_decode_bool() {
        assert_eq!(decode_value("b", DecodeKind::Bool, &[1]).unwrap(), DecodedValue::Bool(true));
        assert_eq!(decode_value("b", DecodeKind::Bool, &[0]).unwrap(), DecodedValue::Bool(false));
        assert_eq!(decode_value("b", DecodeKind::Bool, &[2]).unwrap(), DecodedValue::Bool(false));
        assert!(decode_value("b", DecodeKind::Bool, &[]).is_err());
    }

    #[test]
    fn test_decode_uint_little_endian() {
        assert_eq!(
            decode_value("n", DecodeKind::Uint, &[1, 0]).unwrap(),
            DecodedValue::Uint(U256::from(1u64))
        );
        assert_eq!(
            decode_value("n", DecodeKind::Uint, &[255, 0]).unwrap(),
            DecodedValue::Uint(U256::from(255u64))
        );
        assert_eq!(
            decode_value("n", DecodeKind::Uint, &[0, 1]).unwrap(),
            DecodedValue::Uint(U256::from(256u64))
        );
    }

    #[test]
    fn test_decode_uint_precision_at_2_pow_53() {
        let at = 1u64 << 53;
        let above = at + 1;

        let DecodedValue::Uint(v) = decode_value("n", DecodeKind::Uint, &at.to_le_bytes()).unwrap() else {
            panic!("expected uint");
        };
        assert_eq!(v, U256::from(at));

        let DecodedValue::Uint(v) = decode_value("n", DecodeKind::Uint, &above.to_le_bytes()).unwrap() else {
            panic!("expected uint");
        };
        assert_eq!(v, U256::from(9_007_199_254_740_993u64));
        assert_ne!(v, U256::from(at));

        let max = decode_value("n", DecodeKind::Uint, &u128::MAX.to_le_bytes()).unwrap();
        assert_eq!(max, DecodedValue::Uint(U256::from(u128::MAX)));
    }

    #[test]
    fn test_decode_uint_rejects_oversized() {
        assert!(decode_value("n", DecodeKind::Uint, &[0u8; 33]).is_err());
        assert_eq!(
            decode_value("n", DecodeKind::Uint, &[0xff; 32]).unwrap(),
            DecodedValue::Uint(U256::MAX)
        );
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(
            decode_value("h", DecodeKind::Hex, &[0x00, 0x0a, 0xff]).unwrap(),
            DecodedValue::Hex("0x000aff".to_string())
        );
    }

    #[test]
    fn test_decode_hex_array() {
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(&[0x11; 32]);
        bytes.extend_from_slice(&[0x22; 32]);

        let DecodedValue::HexArray(items) = decode_value("a", DecodeKind::HexArray, &bytes).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|s| s.len() == 66));
        assert_eq!(items[0], format!("0x{}", "11".repeat(32)));
        assert_eq!(items[1], format!("0x{}", "22".repeat(32)));
    }

    #[test]
    fn test_decode_hex_array_matches_bcs_vector() {
        let addrs: Vec<[u8; 32]> = (0..130u8).map(|i| [i; 32]).collect();
        let bytes = bcs::to_bytes(&addrs).unwrap();
        let DecodedValue::HexArray(items) = decode_value("a", DecodeKind::HexArray, &bytes).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 130);
        assert_eq!(items[129], format!("0x{}", "81".repeat(32)));
    }

    #[test]
    fn test_decode_hex_array_truncated_keeps_complete_blocks() {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(&[0x33; 32]);
        bytes.extend_from_slice(&[0x44; 10]);
        let DecodedValue::HexArray(items) = decode_value("a", DecodeKind::HexArray, &bytes).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_template_decode_is_best_effort() {
        let template = ResultTemplate::new()
            .slot("flag", DecodeKind::Bool, 0)
            .slot("missing", DecodeKind::Uint, 5)
            .slot("amount", DecodeKind::Uint, 1);

        let decoded = template.decode(&outputs(vec![vec![1], vec![255, 0]]));

        assert!(decoded.bool("flag"));
        assert_eq!(decoded.uint("amount"), Some(U256::from(255u64)));
        assert_eq!(decoded.uint("missing"), None);
        assert_eq!(decoded.errors().len(), 1);
        assert!(matches!(
            decoded.errors()[0],
            DecodeError::MissingOutput { call: 5, .. }
        ));
    }

    #[test]
    fn test_template_reads_nested_return_values() {
        let template = ResultTemplate::new().slot_at("second", DecodeKind::Uint, 0, 1);
        let output = CallOutput {
            return_values: vec![vec![9], vec![7]],
        };
        let decoded = template.decode(&[output]);
        assert_eq!(decoded.uint("second"), Some(U256::from(7u64)));
    }

    #[test]
    fn test_missing_values_read_conservatively() {
        let decoded = ResultTemplate::new()
            .slot("flag", DecodeKind::Bool, 0)
            .slot("list", DecodeKind::HexArray, 1)
            .decode(&[]);
        assert!(!decoded.bool("flag"));
        assert!(decoded.hex_array("list").is_empty());
        assert_eq!(decoded.errors().len(), 2);
    }

    #[test]
    fn test_element_count_capped_at_u32() {
        assert_eq!(read_uleb128(&[0x05]), Some((5, 1)));
        assert_eq!(read_uleb128(&[0x80, 0x01]), Some((128, 2)));
        assert_eq!(read_uleb128(&[0xff, 0xff, 0xff, 0xff, 0x0f]), Some((u32::MAX as usize, 5)));
        assert_eq!(read_uleb128(&[0xff, 0xff, 0xff, 0xff, 0x1f]), None);
        assert_eq!(read_uleb128(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]), None);

        let oversized = [0xff, 0xff, 0xff, 0xff, 0x7f];
        assert!(matches!(
            decode_value("addrs", DecodeKind::HexArray, &oversized),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
