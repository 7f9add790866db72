//! The server's Challenge message and the target information it carries.


use tracing::trace;

use crate::Flags;
use crate::buffer::{
    check_header, field_slice, header_end, read_array, read_security_buffer, read_u16_le, read_u32_le, MessageWriter,
    SECURITY_BUFFER_LEN,
};
use crate::encoding::{encode_utf16_le, ntlm_bytes_to_string, utf16_le_bytes_to_string};
use crate::error::{ParsingError, StoringError};
use crate::message::{OsVersion, CHALLENGE_MESSAGE_TYPE};


const TARGET_NAME_SECBUF_OFFSET: usize = 12;
const FLAGS_OFFSET: usize = 20;
const CHALLENGE_OFFSET: usize = 24;
const CONTEXT_OFFSET: usize = 32;
const TARGET_INFO_SECBUF_OFFSET: usize = 40;
const VERSION_OFFSET: usize = 48;

/// The smallest Challenge message: magic, type, target name, flags and challenge.
pub const MIN_CHALLENGE_LEN: usize = 32;

const HEADER_LEN: usize
    = 8 // magic
    + 4 // message type
    + SECURITY_BUFFER_LEN // target name secbuffer
    + 4 // flags
    + 8 // challenge
    + 8 // context
    + SECURITY_BUFFER_LEN // target information secbuffer
    + 8 // version
    ;


/// The contents of an NTLM Challenge message.
///
/// The Challenge message is sent by the server in response to the client's Negotiate message; the
/// client is expected to respond with an Authenticate message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChallengeMessage {
    /// The host against which the client is authenticating.
    pub target_name: String,

    /// Stores which NTLM behavior has been accepted by the server from the client's request.
    pub flags: Flags,

    /// The challenge value.
    pub challenge: [u8; 8],

    /// The context value.
    pub context: (u32, u32),

    /// Information about the targets of the authentication, as a sequence of encoded
    /// [`TargetInfoEntry`] values. Empty if the server did not send any.
    pub target_information: Vec<u8>,

    /// Version information about the server's operating system.
    pub os_version: OsVersion,
}

impl ChallengeMessage {
    /// Serializes the Challenge message into bytes, including magic and message type.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(CHALLENGE_MESSAGE_TYPE, HEADER_LEN);
        writer.write_string("target name", self.flags, &self.target_name)?;
        writer.write_u32(self.flags.bits());
        writer.write_bytes(&self.challenge);
        writer.write_u32(self.context.0);
        writer.write_u32(self.context.1);
        writer.write_security_buffer("target information", &self.target_information)?;
        writer.write_bytes(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    /// Parses a complete Challenge message, including magic and message type.
    ///
    /// Fields that older servers omit (context, target information, version) are only read if
    /// the fixed header extends far enough to contain them.
    pub fn parse(value: &[u8]) -> Result<Self, ParsingError> {
        check_header(value, CHALLENGE_MESSAGE_TYPE, MIN_CHALLENGE_LEN)?;

        let flags = Flags::from_bits_retain(read_u32_le(value, FLAGS_OFFSET, "flags")?);
        let challenge = read_array(value, CHALLENGE_OFFSET, "challenge")?;
        let target_name_bytes = read_security_buffer(value, TARGET_NAME_SECBUF_OFFSET, "target name")?;

        let header_len = header_end(value, &[TARGET_NAME_SECBUF_OFFSET, TARGET_INFO_SECBUF_OFFSET]);
        trace!(header_len, message_len = value.len(), "parsing challenge message");

        let context = if header_len >= CONTEXT_OFFSET + 8 {
            let context_0 = read_u32_le(value, CONTEXT_OFFSET, "context")?;
            let context_1 = read_u32_le(value, CONTEXT_OFFSET + 4, "context")?;
            (context_0, context_1)
        } else {
            (0, 0)
        };
        let target_information = if header_len >= TARGET_INFO_SECBUF_OFFSET + SECURITY_BUFFER_LEN {
            Vec::from(read_security_buffer(value, TARGET_INFO_SECBUF_OFFSET, "target information")?)
        } else {
            Vec::new()
        };
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && header_len >= VERSION_OFFSET + 8 {
            OsVersion::read(value, VERSION_OFFSET)?
        } else {
            OsVersion::default()
        };

        // an absent name decodes without an encoding so the flags can be judged later
        let target_name = if target_name_bytes.is_empty() {
            String::new()
        } else {
            ntlm_bytes_to_string(flags, target_name_bytes)?
        };

        // reject garbage early instead of handing it back to the server in the NTLMv2 blob
        TargetInfoEntry::decode_all(&target_information)?;

        Ok(Self {
            target_name,
            flags,
            challenge,
            context,
            target_information,
            os_version,
        })
    }

    /// Decodes the target information into its entries.
    pub fn target_info_entries(&self) -> Result<Vec<TargetInfoEntry>, ParsingError> {
        TargetInfoEntry::decode_all(&self.target_information)
    }

    /// Returns the server's timestamp from the target information, if it supplied one.
    pub fn timestamp(&self) -> Option<i64> {
        self.target_info_entries().ok()?
            .into_iter()
            .find(|entry| entry.entry_type == TargetInfoType::Timestamp)
            .and_then(|entry| <[u8; 8]>::try_from(entry.data.as_slice()).ok())
            .map(i64::from_le_bytes)
    }
}


/// The type of additional target information included in the Challenge message.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TargetInfoType {
    Terminator,
    NtServer,
    NtDomain,
    DnsDomain,
    DnsServer,
    DnsForest,
    Flags,
    Timestamp,
    SingleHost,
    TargetName,
    ChannelBindings,
    Unknown(u16),
}
impl From<TargetInfoType> for u16 {
    fn from(t: TargetInfoType) -> Self {
        match t {
            TargetInfoType::Terminator => 0x0000,
            TargetInfoType::NtServer => 0x0001,
            TargetInfoType::NtDomain => 0x0002,
            TargetInfoType::DnsServer => 0x0003,
            TargetInfoType::DnsDomain => 0x0004,
            TargetInfoType::DnsForest => 0x0005,
            TargetInfoType::Flags => 0x0006,
            TargetInfoType::Timestamp => 0x0007,
            TargetInfoType::SingleHost => 0x0008,
            TargetInfoType::TargetName => 0x0009,
            TargetInfoType::ChannelBindings => 0x000A,
            TargetInfoType::Unknown(w) => w,
        }
    }
}
impl From<u16> for TargetInfoType {
    fn from(w: u16) -> Self {
        match w {
            0x0000 => TargetInfoType::Terminator,
            0x0001 => TargetInfoType::NtServer,
            0x0002 => TargetInfoType::NtDomain,
            0x0003 => TargetInfoType::DnsServer,
            0x0004 => TargetInfoType::DnsDomain,
            0x0005 => TargetInfoType::DnsForest,
            0x0006 => TargetInfoType::Flags,
            0x0007 => TargetInfoType::Timestamp,
            0x0008 => TargetInfoType::SingleHost,
            0x0009 => TargetInfoType::TargetName,
            0x000A => TargetInfoType::ChannelBindings,
            other => TargetInfoType::Unknown(other),
        }
    }
}

/// An entry of additional target information included in the Challenge message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetInfoEntry {
    pub entry_type: TargetInfoType,
    pub data: Vec<u8>,
}

impl TargetInfoEntry {
    /// Serializes the target info entry into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let entry_type_u16: u16 = self.entry_type.into();
        let bytes_len = u16::try_from(self.data.len())
            .or(Err(StoringError::FieldTooLong { field: "target info entry", length: self.data.len() }))?;

        let mut ret = Vec::with_capacity(4 + self.data.len());
        ret.extend_from_slice(&entry_type_u16.to_le_bytes());
        ret.extend_from_slice(&bytes_len.to_le_bytes());
        ret.extend_from_slice(&self.data);
        Ok(ret)
    }

    /// Attempts to deserialize a target info entry from the given byte slice. If successful,
    /// returns the deserialized target info entry as well as any bytes remaining in the slice (that
    /// are not part of the freshly deserialized target info entry).
    pub fn try_from_bytes(bytes: &[u8]) -> Result<(Self, &[u8]), ParsingError> {
        let (entry, end) = Self::read_at(bytes, 0)?;
        Ok((entry, &bytes[end..]))
    }

    /// Reads the entry starting at `offset`, returning it and the offset just past it.
    ///
    /// Errors report offsets relative to the start of `bytes`.
    fn read_at(bytes: &[u8], offset: usize) -> Result<(Self, usize), ParsingError> {
        let entry_type: TargetInfoType = read_u16_le(bytes, offset, "target info entry")?.into();
        let length: usize = read_u16_le(bytes, offset + 2, "target info entry")?.into();
        let data = field_slice(bytes, offset + 4, length, "target info entry")?;

        let entry = Self {
            entry_type,
            data: Vec::from(data),
        };
        Ok((entry, offset + 4 + length))
    }

    /// Decodes a sequence of target info entries, up to and including the terminator.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Self>, ParsingError> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (entry, next) = Self::read_at(bytes, offset)?;
            let is_terminator = entry.entry_type == TargetInfoType::Terminator;
            entries.push(entry);
            if is_terminator {
                break;
            }
            offset = next;
        }
        Ok(entries)
    }

    /// Encodes a sequence of target info entries.
    pub fn encode_all(entries: &[Self]) -> Result<Vec<u8>, StoringError> {
        let mut ret = Vec::new();
        for entry in entries {
            ret.extend_from_slice(&entry.to_bytes()?);
        }
        Ok(ret)
    }

    /// Attempts to convert the data within this target info entry into a string.
    pub fn to_string(&self) -> Result<String, ParsingError> {
        // always Unicode, even if flags claim OEM
        utf16_le_bytes_to_string(&self.data)
    }

    /// Creates a target info entry from an entry type and a string.
    pub fn from_string(entry_type: TargetInfoType, string: &str) -> Self {
        // always Unicode, even if flags claim OEM
        Self {
            entry_type,
            data: encode_utf16_le(string),
        }
    }

    /// Creates the entry terminating a sequence of target info entries.
    pub fn terminator() -> Self {
        Self {
            entry_type: TargetInfoType::Terminator,
            data: Vec::new(),
        }
    }
}


#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use super::*;

    const DAVENPORT_CHALLENGE: [u8; 158] = hex!(
        "4e544c4d53535000020000000c000c003000000001028100"
        "0123456789abcdef0000000000000000620062003c000000"
        "44004f004d00410049004e0002000c0044004f004d004100"
        "49004e0001000c0053004500520056004500520004001400"
        "64006f006d00610069006e002e0063006f006d0003002200"
        "7300650072007600650072002e0064006f006d0061006900"
        "6e002e0063006f006d0000000000"
    );

    #[test]
    fn parse_challenge() {
        let challenge = ChallengeMessage::parse(&DAVENPORT_CHALLENGE)
            .expect("can't read NTLM challenge");

        assert_eq!(challenge.flags, Flags::NEGOTIATE_UNICODE
                                  | Flags::NEGOTIATE_NTLM
                                  | Flags::TARGET_TYPE_DOMAIN
                                  | Flags::NEGOTIATE_TARGET_INFO);
        assert_eq!(challenge.target_name, "DOMAIN");
        assert_eq!(challenge.challenge, hex!("0123456789abcdef"));
        assert_eq!(challenge.context, (0, 0));
        assert_eq!(challenge.os_version, OsVersion::default());
        assert_eq!(challenge.target_information, &DAVENPORT_CHALLENGE[60..]);

        let entries = challenge.target_info_entries().unwrap();
        assert_eq!(entries, vec![
            TargetInfoEntry::from_string(TargetInfoType::NtDomain, "DOMAIN"),
            TargetInfoEntry::from_string(TargetInfoType::NtServer, "SERVER"),
            TargetInfoEntry::from_string(TargetInfoType::DnsDomain, "domain.com"),
            TargetInfoEntry::from_string(TargetInfoType::DnsServer, "server.domain.com"),
            TargetInfoEntry::terminator(),
        ]);
        assert_eq!(entries[3].to_string().unwrap(), "server.domain.com");
        assert_eq!(challenge.timestamp(), None);
    }

    #[test]
    fn minimal_challenge() {
        // no context, no target info, no version
        let mut raw = Vec::from(&b"NTLMSSP\0"[..]);
        raw.extend_from_slice(&hex!("02000000" "0000000020000000" "02020000" "1122334455667788"));
        let challenge = ChallengeMessage::parse(&raw).unwrap();
        assert_eq!(challenge.flags, Flags::NEGOTIATE_OEM | Flags::NEGOTIATE_NTLM);
        assert_eq!(challenge.challenge, hex!("1122334455667788"));
        assert_eq!(challenge.target_name, "");
        assert!(challenge.target_information.is_empty());
    }

    #[test]
    fn rejects_short_buffers() {
        for len in 0..MIN_CHALLENGE_LEN {
            assert!(ChallengeMessage::parse(&DAVENPORT_CHALLENGE[..len]).is_err(), "length {}", len);
        }
        assert!(matches!(
            ChallengeMessage::parse(&DAVENPORT_CHALLENGE[..31]),
            Err(ParsingError::ShortHeader { expected_min_len: 32, obtained_len: 31 }),
        ));
    }

    #[test]
    fn rejects_wrong_signature_and_type() {
        let mut wrong_magic = DAVENPORT_CHALLENGE;
        wrong_magic[4] = b'X';
        assert!(matches!(ChallengeMessage::parse(&wrong_magic), Err(ParsingError::MagicMismatch { .. })));

        let mut wrong_type = DAVENPORT_CHALLENGE;
        wrong_type[8] = 0x03;
        assert_eq!(
            ChallengeMessage::parse(&wrong_type),
            Err(ParsingError::UnexpectedMessageType { expected: 2, obtained: 3 }),
        );
    }

    #[test]
    fn rejects_truncated_payload() {
        let truncated = &DAVENPORT_CHALLENGE[..100];
        assert_eq!(
            ChallengeMessage::parse(truncated),
            Err(ParsingError::FieldOutOfRange {
                field: "target information",
                offset: 60,
                length: 98,
                message_len: 100,
            }),
        );
    }

    #[test]
    fn rejects_broken_target_info() {
        let mut broken = DAVENPORT_CHALLENGE;
        // first entry claims more bytes than the target information holds
        broken[62] = 0xff;
        assert_eq!(
            ChallengeMessage::parse(&broken),
            Err(ParsingError::FieldOutOfRange {
                field: "target info entry",
                offset: 4,
                length: 0xff,
                message_len: 98,
            }),
        );

        // second entry cut off after its type
        let target_info = hex!("02000c0044004f004d00410049004e000100");
        assert_eq!(
            TargetInfoEntry::decode_all(&target_info),
            Err(ParsingError::FieldOutOfRange {
                field: "target info entry",
                offset: 18,
                length: 2,
                message_len: 18,
            }),
        );
    }

    #[test]
    fn serialized_challenge_parses_back() {
        let target_information = TargetInfoEntry::encode_all(&[
            TargetInfoEntry::from_string(TargetInfoType::NtDomain, "Domain"),
            TargetInfoEntry::from_string(TargetInfoType::NtServer, "Server"),
            TargetInfoEntry {
                entry_type: TargetInfoType::Timestamp,
                data: 0x01d2_0000_1234_5678_i64.to_le_bytes().to_vec(),
            },
            TargetInfoEntry::terminator(),
        ]).unwrap();
        let challenge = ChallengeMessage {
            target_name: "Server".to_owned(),
            flags: Flags::NEGOTIATE_UNICODE
                | Flags::NEGOTIATE_NTLM
                | Flags::NEGOTIATE_TARGET_INFO
                | Flags::NEGOTIATE_VERSION,
            challenge: hex!("0123456789abcdef"),
            context: (0, 0),
            target_information,
            os_version: OsVersion::new(6, 0, 6000),
        };

        let bytes = challenge.to_bytes().unwrap();
        assert_eq!(read_u32_le(&bytes, 16, "offset"), Ok(56));
        let parsed = ChallengeMessage::parse(&bytes).unwrap();
        assert_eq!(parsed, challenge);
        assert_eq!(parsed.timestamp(), Some(0x01d2_0000_1234_5678));
    }
}
