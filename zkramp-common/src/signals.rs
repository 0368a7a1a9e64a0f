//! Packed public-signal decoding.
//!
//! The circuit packs ASCII text into its public outputs a fixed number of
//! bytes per signal, little-endian within each chunk. Which slice of the
//! signal vector holds which field is a contract with the circuit; it lives
//! here as configuration so a circuit revision only changes the layout.

use std::fmt;
use std::ops::Range;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes packed into one signal by the current circuit.
pub const DEFAULT_CHUNK_BYTES: usize = 7;

/// Signal slice holding the sender address field.
pub const DEFAULT_FROM_SLICE: Range<usize> = 0..12;

/// Signal slice holding the recipient field.
pub const DEFAULT_TO_SLICE: Range<usize> = 12..147;

/// Signal slice holding the identifying payment-handle label.
pub const DEFAULT_USERNAME_SLICE: Range<usize> = 147..150;

/// Slice layout of the circuit's public-signal vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalLayout {
    pub chunk_bytes: usize,
    pub from: Range<usize>,
    pub to: Range<usize>,
    pub username: Range<usize>,
}

impl Default for SignalLayout {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            from: DEFAULT_FROM_SLICE,
            to: DEFAULT_TO_SLICE,
            username: DEFAULT_USERNAME_SLICE,
        }
    }
}

/// Human-readable fields decoded from the public signals.
///
/// This is one of two independent renderings of the signals; the raw decimal
/// vector stays available alongside it and neither overwrites the other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSignals {
    pub from: String,
    pub to: String,
    pub username: String,
}

impl fmt::Display for DecodedSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "From: {}\nTo: {}\nUsername: {}",
            self.from, self.to, self.username
        )
    }
}

/// Decode the configured slices of a signal vector into text fields.
pub fn decode_signals(signals: &[String], layout: &SignalLayout) -> Result<DecodedSignals> {
    Ok(DecodedSignals {
        from: decode_packed_slice(signals, &layout.from, layout.chunk_bytes)?,
        to: decode_packed_slice(signals, &layout.to, layout.chunk_bytes)?,
        username: decode_packed_slice(signals, &layout.username, layout.chunk_bytes)?,
    })
}

/// Decode one slice of packed signals into a string.
///
/// Each signal is parsed as a decimal integer, rendered as its minimal
/// big-endian byte string, reversed into chunk-local little-endian order and
/// concatenated; trailing zero padding is stripped before UTF-8 conversion.
pub fn decode_packed_slice(
    signals: &[String],
    range: &Range<usize>,
    chunk_bytes: usize,
) -> Result<String> {
    let vals = signals.get(range.clone()).ok_or_else(|| {
        Error::SignalDecode(format!(
            "slice {}..{} out of bounds for {} signals",
            range.start,
            range.end,
            signals.len()
        ))
    })?;
    let mut bytes = Vec::with_capacity(vals.len() * chunk_bytes);
    for (i, s) in vals.iter().enumerate() {
        let n: BigUint = s.parse().map_err(|_| {
            Error::SignalDecode(format!("signal {} is not a decimal integer", range.start + i))
        })?;
        let mut chunk = n.to_bytes_be();
        if chunk.len() > chunk_bytes {
            return Err(Error::SignalDecode(format!(
                "signal {} wider than the {chunk_bytes}-byte chunk",
                range.start + i
            )));
        }
        chunk.reverse();
        bytes.extend_from_slice(&chunk);
    }
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    String::from_utf8(bytes)
        .map_err(|err| Error::SignalDecode(format!("packed bytes are not UTF-8: {err}")))
}

/// Pack text into the circuit's chunked signal encoding.
///
/// Inverse of [`decode_packed_slice`]; used by fixtures and tests.
pub fn pack_bytes(text: &[u8], chunk_bytes: usize, chunk_count: usize) -> Result<Vec<String>> {
    if text.len() > chunk_bytes * chunk_count {
        return Err(Error::SignalDecode(format!(
            "{} bytes do not fit in {chunk_count} chunks of {chunk_bytes}",
            text.len()
        )));
    }
    let mut out = Vec::with_capacity(chunk_count);
    for c in 0..chunk_count {
        let start = (c * chunk_bytes).min(text.len());
        let end = ((c + 1) * chunk_bytes).min(text.len());
        out.push(BigUint::from_bytes_le(&text[start..end]).to_str_radix(10));
    }
    Ok(out)
}
