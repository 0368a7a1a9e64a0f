//! Email canonicalization ahead of circuit-input construction.
//!
//! The DKIM header parser downstream requires CRLF line terminators, while
//! mail clients and copy-paste frequently hand us bare LFs.

use crate::error::{Error, Result};

/// Rewrite every LF that is not preceded by a CR into a CRLF pair.
///
/// Empty input fails with [`Error::MalformedEmail`]; the circuit-input
/// builder cannot do anything useful with it and the failure is clearer here.
pub fn normalize_email(raw: &str) -> Result<Vec<u8>> {
    if raw.is_empty() {
        return Err(Error::MalformedEmail("empty email body"));
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 64);
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' && (i == 0 || bytes[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(b);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_bare_lf(bytes: &[u8]) -> bool {
        bytes
            .iter()
            .enumerate()
            .any(|(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] != b'\r'))
    }

    #[test]
    fn bare_lfs_become_crlf() {
        let out = normalize_email("From: a\nTo: b\n\nbody\n").unwrap();
        assert!(!has_bare_lf(&out));
        assert_eq!(out, b"From: a\r\nTo: b\r\n\r\nbody\r\n");
    }

    #[test]
    fn existing_crlfs_are_untouched() {
        let input = "From: a\r\nTo: b\r\n";
        assert_eq!(normalize_email(input).unwrap(), input.as_bytes());
    }

    #[test]
    fn leading_lf_gets_a_cr() {
        assert_eq!(normalize_email("\nx").unwrap(), b"\r\nx");
    }

    #[test]
    fn mixed_terminators_all_normalized() {
        let out = normalize_email("a\r\nb\nc\r\nd\n").unwrap();
        assert!(!has_bare_lf(&out));
        assert_eq!(out, b"a\r\nb\r\nc\r\nd\r\n");
    }

    #[test]
    fn empty_input_is_malformed() {
        assert!(matches!(
            normalize_email(""),
            Err(Error::MalformedEmail(_))
        ));
    }
}
