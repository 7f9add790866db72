//! Text encodings used within NTLM messages.
//!
//! Strings are transferred either as UTF-16 in little-endian byte order (when Unicode has been
//! negotiated) or in the "OEM" character set. The OEM character set depends on the configuration
//! of the peer; we only accept the 7-bit ASCII subset that all OEM code pages share.


use crate::Flags;
use crate::error::{ParsingError, StoringError};


/// Encodes the given string as UTF-16 in little-endian byte order without a Byte Order Mark.
pub fn encode_utf16_le(string: &str) -> Vec<u8> {
    string.encode_utf16()
        .flat_map(|w| w.to_le_bytes())
        .collect()
}

/// Converts UTF-16 values stored as bytes in little-endian format into a string.
pub fn utf16_le_bytes_to_string(bytes: &[u8]) -> Result<String, ParsingError> {
    if bytes.len() % 2 != 0 {
        return Err(ParsingError::ItemLengthNotDivisible { expected_divisor: 2, obtained_length: bytes.len() });
    }
    let u16s: Vec<u16> = bytes.chunks_exact(2)
        .map(|chk| u16::from_le_bytes([chk[0], chk[1]]))
        .collect();
    String::from_utf16(&u16s)
        .or(Err(ParsingError::InvalidUtf16 { value: u16s }))
}

/// Converts the given Rust string into an OEM string.
///
/// Returns `None` if the string contains characters outside of 7-bit ASCII.
pub fn string_to_oem(string: &str) -> Option<Vec<u8>> {
    if string.is_ascii() {
        Some(Vec::from(string.as_bytes()))
    } else {
        None
    }
}

/// Encodes a string for the wire, using OEM or UTF-16 encoding depending on the `flags`.
pub fn string_to_ntlm_bytes(field: &'static str, flags: Flags, string: &str) -> Result<Vec<u8>, StoringError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        Ok(encode_utf16_le(string))
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        string_to_oem(string)
            .ok_or_else(|| StoringError::NonOemEncodable { field, string: string.to_owned() })
    } else {
        Err(StoringError::NeitherUnicodeNorOem)
    }
}

/// Converts the given OEM string into a Rust string.
pub fn oem_bytes_to_string(bytes: &[u8]) -> Result<String, ParsingError> {
    if !bytes.is_ascii() {
        return Err(ParsingError::InvalidOemEncoding { value: Vec::from(bytes) });
    }
    String::from_utf8(Vec::from(bytes))
        .or(Err(ParsingError::InvalidOemEncoding { value: Vec::from(bytes) }))
}

/// Converts a string from the wire, using OEM or UTF-16 encoding depending on the `flags`.
pub fn ntlm_bytes_to_string(flags: Flags, bytes: &[u8]) -> Result<String, ParsingError> {
    if flags.contains(Flags::NEGOTIATE_UNICODE) {
        utf16_le_bytes_to_string(bytes)
    } else if flags.contains(Flags::NEGOTIATE_OEM) {
        oem_bytes_to_string(bytes)
    } else {
        Err(ParsingError::NeitherUnicodeNorOem)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_both_ways() {
        let bytes = encode_utf16_le("Dömäin");
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..4], &[0x44, 0x00, 0xf6, 0x00]);
        assert_eq!(utf16_le_bytes_to_string(&bytes).unwrap(), "Dömäin");
    }

    #[test]
    fn utf16_odd_length() {
        assert_eq!(
            utf16_le_bytes_to_string(&[0x41, 0x00, 0x42]),
            Err(ParsingError::ItemLengthNotDivisible { expected_divisor: 2, obtained_length: 3 }),
        );
    }

    #[test]
    fn utf16_lone_surrogate() {
        let err = utf16_le_bytes_to_string(&[0x00, 0xd8]).unwrap_err();
        assert_eq!(err, ParsingError::InvalidUtf16 { value: vec![0xd800] });
    }

    #[test]
    fn oem_is_ascii_only() {
        assert_eq!(string_to_oem("WORKSTATION"), Some(b"WORKSTATION".to_vec()));
        assert_eq!(string_to_oem("Zürich"), None);
        assert!(oem_bytes_to_string(&[0x5a, 0xfc]).is_err());
    }

    #[test]
    fn no_encoding_selected() {
        assert_eq!(
            ntlm_bytes_to_string(Flags::NEGOTIATE_NTLM, b"abc"),
            Err(ParsingError::NeitherUnicodeNorOem),
        );
        assert_eq!(
            string_to_ntlm_bytes("user name", Flags::NEGOTIATE_NTLM, "abc"),
            Err(StoringError::NeitherUnicodeNorOem),
        );
    }

    #[test]
    fn unicode_preferred_over_oem() {
        let both = Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_OEM;
        assert_eq!(string_to_ntlm_bytes("user name", both, "Jürgen"), Ok(encode_utf16_le("Jürgen")));
        assert_eq!(
            string_to_ntlm_bytes("user name", Flags::NEGOTIATE_OEM, "Jürgen"),
            Err(StoringError::NonOemEncodable { field: "user name", string: "Jürgen".to_owned() }),
        );
    }
}
