//! Errors raised while reading, building or writing NTLM messages.


use std::fmt;

use crate::Flags;


/// An error that may occur while parsing existing NTLM packets.
///
/// Every variant describes a structurally invalid message; callers usually treat all of them
/// alike as a malformed message sent by the peer.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ParsingError {
    /// The header is shorter than expected.
    ShortHeader { expected_min_len: usize, obtained_len: usize },

    /// The magic value does not match the expected one.
    MagicMismatch { expected: [u8; 8], obtained: Vec<u8> },

    /// The message type is not the one the caller asked for.
    UnexpectedMessageType { expected: u32, obtained: u32 },

    /// A field (or the data a security buffer points to) reaches beyond the end of the message.
    FieldOutOfRange { field: &'static str, offset: usize, length: usize, message_len: usize },

    /// An internal item's length is not divisible by an expected divisor.
    ItemLengthNotDivisible { expected_divisor: usize, obtained_length: usize },

    /// A byte string cannot be decoded using the OEM encoding.
    InvalidOemEncoding { value: Vec<u8> },

    /// A string of 16-bit characters could not be decoded as UTF-16.
    InvalidUtf16 { value: Vec<u16> },

    /// The transport text is not valid base64.
    InvalidBase64 { reason: String },

    /// Neither Unicode nor OEM encoding was selected.
    NeitherUnicodeNorOem,
}
impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShortHeader { expected_min_len, obtained_len }
                => write!(f, "header too short (expected at least {} bytes, obtained {})", expected_min_len, obtained_len),
            Self::MagicMismatch { expected, obtained }
                => write!(f, "mismatched magic (expected {:?}, obtained {:?})", expected, obtained),
            Self::UnexpectedMessageType { expected, obtained }
                => write!(f, "unexpected message type (expected {}, obtained {})", expected, obtained),
            Self::FieldOutOfRange { field, offset, length, message_len }
                => write!(f, "{} at offset {} with length {} exceeds the message ({} bytes)", field, offset, length, message_len),
            Self::ItemLengthNotDivisible { expected_divisor, obtained_length }
                => write!(f, "item length {} not divisible by {}", obtained_length, expected_divisor),
            Self::InvalidOemEncoding { value }
                => write!(f, "failed to decode value with the OEM encoding: {:?}", value),
            Self::InvalidUtf16 { value }
                => write!(f, "failed to decode value as UTF-16: {:?}", value),
            Self::InvalidBase64 { reason }
                => write!(f, "failed to decode base64 text: {}", reason),
            Self::NeitherUnicodeNorOem
                => write!(f, "neither Unicode nor OEM encoding was selected"),
        }
    }
}
impl std::error::Error for ParsingError {
}

/// An error that may occur while writing an NTLM packet.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StoringError {
    /// The string cannot be encoded using the OEM encoding.
    NonOemEncodable { field: &'static str, string: String },

    /// The encoded value is longer than a security buffer can describe.
    FieldTooLong { field: &'static str, length: usize },

    /// Neither Unicode nor OEM encoding was selected.
    NeitherUnicodeNorOem,
}
impl fmt::Display for StoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonOemEncodable { field, string }
                => write!(f, "failed to encode {} {:?} using OEM encoding", field, string),
            Self::FieldTooLong { field, length }
                => write!(f, "{} is {} bytes long, more than a security buffer can hold", field, length),
            Self::NeitherUnicodeNorOem
                => write!(f, "neither Unicode nor OEM encoding was selected"),
        }
    }
}
impl std::error::Error for StoringError {
}

/// An error that terminates the current NTLM handshake attempt.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A received message is structurally invalid.
    MalformedMessage(ParsingError),

    /// The peer negotiated a capability combination that is not supported.
    UnsupportedFlags { flags: Flags, reason: &'static str },

    /// Credentials or host names cannot be represented in the negotiated text encoding.
    CredentialEncoding(StoringError),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage(e)
                => write!(f, "malformed message: {}", e),
            Self::UnsupportedFlags { flags, reason }
                => write!(f, "unsupported flags 0x{:08x}: {}", flags.bits(), reason),
            Self::CredentialEncoding(e)
                => write!(f, "credential encoding error: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MalformedMessage(e) => Some(e),
            Self::UnsupportedFlags { .. } => None,
            Self::CredentialEncoding(e) => Some(e),
        }
    }
}
impl From<ParsingError> for Error {
    fn from(e: ParsingError) -> Self {
        Self::MalformedMessage(e)
    }
}
impl From<StoringError> for Error {
    fn from(e: StoringError) -> Self {
        Self::CredentialEncoding(e)
    }
}
