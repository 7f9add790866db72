//! The Negotiate message, opening the handshake.


use crate::Flags;
use crate::buffer::{
    check_header, header_end, read_security_buffer, read_u32_le, MessageWriter, SECURITY_BUFFER_LEN,
};
use crate::encoding::oem_bytes_to_string;
use crate::error::{ParsingError, StoringError};
use crate::message::{OsVersion, NEGOTIATE_MESSAGE_TYPE};


const DOMAIN_SECBUF_OFFSET: usize = 16;
const WORKSTATION_SECBUF_OFFSET: usize = 24;
const VERSION_OFFSET: usize = 32;

/// The size of a Negotiate message without the version structure, as sent by older clients.
const MIN_HEADER_LEN: usize = 32;

const HEADER_LEN: usize
    = 8 // magic
    + 4 // message type
    + 4 // flags
    + SECURITY_BUFFER_LEN // supplied domain secbuffer
    + SECURITY_BUFFER_LEN // supplied workstation secbuffer
    + 8 // version
    ;


/// The contents of an NTLM Negotiate message.
///
/// The Negotiate message is the first message in an NTLM challenge-response process and is sent by
/// the client to the server; the server is expected to respond with a Challenge message.
///
/// Domain and workstation are always transferred in the OEM encoding, regardless of the Unicode
/// flag. An empty string means the value has not been supplied.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NegotiateMessage {
    /// Stores which information has been specified and which NTLM behavior should be negotiated.
    pub flags: Flags,

    /// The domain against which the client wishes to authenticate.
    pub supplied_domain: String,

    /// The NT hostname of the client.
    pub supplied_workstation: String,

    /// Version information about the client's operating system.
    pub os_version: OsVersion,
}

impl NegotiateMessage {
    /// Creates a Negotiate message, flagging the domain and workstation as supplied if they are
    /// present.
    pub fn new(flags: Flags, domain: Option<&str>, workstation: Option<&str>, os_version: OsVersion) -> Self {
        let supplied_domain = domain.unwrap_or("").to_owned();
        let supplied_workstation = workstation.unwrap_or("").to_owned();

        let mut flags = flags;
        flags.set(Flags::NEGOTIATE_DOMAIN_SUPPLIED, !supplied_domain.is_empty());
        flags.set(Flags::NEGOTIATE_WORKSTATION_SUPPLIED, !supplied_workstation.is_empty());

        Self {
            flags,
            supplied_domain,
            supplied_workstation,
            os_version,
        }
    }

    /// Serializes the Negotiate message into bytes, including magic and message type.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(NEGOTIATE_MESSAGE_TYPE, HEADER_LEN);
        writer.write_u32(self.flags.bits());
        writer.write_oem_string("supplied domain", &self.supplied_domain)?;
        writer.write_oem_string("supplied workstation", &self.supplied_workstation)?;
        writer.write_bytes(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    /// Parses a complete Negotiate message, including magic and message type.
    pub fn parse(value: &[u8]) -> Result<Self, ParsingError> {
        check_header(value, NEGOTIATE_MESSAGE_TYPE, MIN_HEADER_LEN)?;

        let flags = Flags::from_bits_retain(read_u32_le(value, 12, "flags")?);
        let supplied_domain_bytes = read_security_buffer(value, DOMAIN_SECBUF_OFFSET, "supplied domain")?;
        let supplied_workstation_bytes = read_security_buffer(value, WORKSTATION_SECBUF_OFFSET, "supplied workstation")?;

        let header_len = header_end(value, &[DOMAIN_SECBUF_OFFSET, WORKSTATION_SECBUF_OFFSET]);
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && header_len >= VERSION_OFFSET + 8 {
            OsVersion::read(value, VERSION_OFFSET)?
        } else {
            OsVersion::default()
        };

        let supplied_domain = oem_bytes_to_string(supplied_domain_bytes)?;
        let supplied_workstation = oem_bytes_to_string(supplied_workstation_bytes)?;

        Ok(Self {
            flags,
            supplied_domain,
            supplied_workstation,
            os_version,
        })
    }
}


#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use super::*;

    fn davenport_flags() -> Flags {
        Flags::NEGOTIATE_UNICODE
            | Flags::NEGOTIATE_OEM
            | Flags::REQUEST_TARGET
            | Flags::NEGOTIATE_NTLM
    }

    #[test]
    fn layout_with_domain_and_workstation() {
        let msg = NegotiateMessage::new(
            davenport_flags(),
            Some("DOMAIN"),
            Some("WORKSTATION"),
            OsVersion::new(5, 0, 2195),
        );
        assert_eq!(
            msg.flags,
            davenport_flags() | Flags::NEGOTIATE_DOMAIN_SUPPLIED | Flags::NEGOTIATE_WORKSTATION_SUPPLIED,
        );

        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes, hex!(
            "4e544c4d535350000100000007320000"
            "06000600280000000b000b002e000000"
            "050093080000000f444f4d41494e574f"
            "524b53544154494f4e"
        ));
    }

    #[test]
    fn absent_fields_point_past_header() {
        let msg = NegotiateMessage::new(davenport_flags(), None, None, OsVersion::default());
        let bytes = msg.to_bytes().unwrap();

        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[16..32], hex!("00000000280000000000000028000000"));
        assert!(!msg.flags.contains(Flags::NEGOTIATE_DOMAIN_SUPPLIED));
        assert!(!msg.flags.contains(Flags::NEGOTIATE_WORKSTATION_SUPPLIED));
    }

    #[test]
    fn round_trip() {
        let msg = NegotiateMessage::new(
            davenport_flags() | Flags::NEGOTIATE_VERSION,
            Some("CORP"),
            Some("LAPTOP-17"),
            OsVersion::new(10, 0, 19041),
        );
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(NegotiateMessage::parse(&bytes), Ok(msg));
    }

    #[test]
    fn short_legacy_message() {
        // 32-byte header without version structure
        let raw = hex!(
            "4e544c4d535350000100000007b20000"
            "00000000200000000000000020000000"
        );
        let msg = NegotiateMessage::parse(&raw).unwrap();
        assert_eq!(msg.supplied_domain, "");
        assert_eq!(msg.supplied_workstation, "");
        assert_eq!(msg.os_version, OsVersion::default());
    }

    #[test]
    fn non_ascii_domain_is_rejected() {
        let msg = NegotiateMessage::new(davenport_flags(), Some("MÜNCHEN"), None, OsVersion::default());
        assert!(matches!(msg.to_bytes(), Err(StoringError::NonOemEncodable { field: "supplied domain", .. })));
    }
}
