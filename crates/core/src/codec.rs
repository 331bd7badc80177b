//! Record codec
//!
//! Maps a [`StateValue`] to the bytes kept in the `value` column and back.
//! The `is_binary` flag stored next to the payload selects the decoder:
//!
//! | Variant | Stored bytes | `is_binary` |
//! |---------|--------------|-------------|
//! | `Bytes` | verbatim | true |
//! | `Json` | compact UTF-8 JSON text | false |

use crate::error::{Error, Result};
use crate::value::StateValue;

/// Payload ready to be written to the records table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// Stored bytes
    pub bytes: Vec<u8>,
    /// Whether `bytes` is an opaque binary payload
    pub is_binary: bool,
}

/// Encode a value for storage.
pub fn encode(value: &StateValue) -> Result<EncodedValue> {
    match value {
        StateValue::Bytes(b) => Ok(EncodedValue {
            bytes: b.clone(),
            is_binary: true,
        }),
        StateValue::Json(v) => {
            let bytes = serde_json::to_vec(v)
                .map_err(|e| Error::InvalidRequest(format!("value is not serializable: {e}")))?;
            Ok(EncodedValue {
                bytes,
                is_binary: false,
            })
        }
    }
}

/// Decode a stored payload.
///
/// Fails with [`Error::CorruptRecord`] when a text payload is not valid
/// JSON, which only happens if the table was edited out of band.
pub fn decode(bytes: &[u8], is_binary: bool) -> Result<StateValue> {
    if is_binary {
        return Ok(StateValue::Bytes(bytes.to_vec()));
    }
    serde_json::from_slice(bytes)
        .map(StateValue::Json)
        .map_err(|e| Error::corrupt(format!("stored value is not valid JSON: {e}")))
}
