//! C1: delimiter detection. The ISA segment is fixed-width (106 bytes
//! including its trailing segment terminator) and therefore the only
//! segment whose structure must be known before any delimiter has been
//! discovered. See SPEC_FULL.md §4.1.

use crate::error::{EdiError, Result};

/// The four characters/bytes an interchange establishes for itself:
/// element, sub-element (component), repetition separators and the
/// segment terminator. Every subsequent segment in the interchange is
/// split using these, not hardcoded punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiters {
    pub element: u8,
    pub sub_element: u8,
    pub repetition: u8,
    pub segment_terminator: u8,
}

/// Minimum byte length of a well-formed ISA segment: 105 fixed-width
/// data bytes plus the one-byte segment terminator.
const ISA_FIXED_LEN: usize = 106;

/// Detects delimiters from the first 106 bytes of the input, which must
/// begin with the literal `ISA` segment id. Per the fixed ISA layout:
/// byte index 3 is the element separator, 105 is the sub-element
/// separator (ISA16), and the terminator follows immediately after.
///
/// The `ISA11` repetition separator only exists in the 00403+ versions
/// of the standard; when the byte found there is alphanumeric (no
/// separator was actually placed, a common pre-00403 artifact) the
/// repetition separator falls back to `^`, matching common trading
/// partner behavior.
pub fn detect(input: &[u8]) -> Result<Delimiters> {
    if input.len() < ISA_FIXED_LEN || &input[0..3] != b"ISA" {
        return Err(EdiError::InvalidHeader(
            "input does not begin with a complete ISA segment".to_string(),
        ));
    }

    let element = input[3];
    let repetition_candidate = input[82];
    let sub_element = input[104];
    let segment_terminator = input[105];

    if element == sub_element || element == segment_terminator || sub_element == segment_terminator {
        return Err(EdiError::InvalidHeader(
            "ISA delimiters must be three distinct bytes".to_string(),
        ));
    }

    let repetition = if repetition_candidate.is_ascii_alphanumeric() {
        b'^'
    } else {
        repetition_candidate
    };

    Ok(Delimiters {
        element,
        sub_element,
        repetition,
        segment_terminator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_isa() -> Vec<u8> {
        // 106-byte ISA with '*' element, '>' sub-element, '~' terminator.
        let mut isa = String::from("ISA*00*          *00*          *ZZ*SENDER123      *ZZ*RECEIVER456    *210101*1253*^*00501*000000001*0*P*>");
        isa.push('~');
        isa.into_bytes()
    }

    #[test]
    fn detects_standard_delimiters() {
        let input = sample_isa();
        let d = detect(&input).unwrap();
        assert_eq!(d.element, b'*');
        assert_eq!(d.sub_element, b'>');
        assert_eq!(d.segment_terminator, b'~');
    }

    #[test]
    fn rejects_short_input() {
        let err = detect(b"ISA*too short").unwrap_err();
        assert!(matches!(err, EdiError::InvalidHeader(_)));
    }

    #[test]
    fn rejects_missing_isa_prefix() {
        let mut input = sample_isa();
        input[0] = b'X';
        assert!(detect(&input).is_err());
    }
}
