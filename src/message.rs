//! Message type dispatch and the version structure shared by all messages.


use crate::{AuthenticateMessage, ChallengeMessage, NegotiateMessage, NTLMSSP_MAGIC};
use crate::buffer::{read_array, read_u32_le};
use crate::error::{ParsingError, StoringError};


/// The message type of a Negotiate message.
pub const NEGOTIATE_MESSAGE_TYPE: u32 = 0x0000_0001;

/// The message type of a Challenge message.
pub const CHALLENGE_MESSAGE_TYPE: u32 = 0x0000_0002;

/// The message type of an Authenticate message.
pub const AUTHENTICATE_MESSAGE_TYPE: u32 = 0x0000_0003;


/// An NTLM message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Message {
    Negotiate(NegotiateMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
    Other(u32, Vec<u8>),
}
impl Message {
    /// Returns the 32-bit message number identifying the type of this message.
    pub fn message_number(&self) -> u32 {
        match self {
            Self::Negotiate(_) => NEGOTIATE_MESSAGE_TYPE,
            Self::Challenge(_) => CHALLENGE_MESSAGE_TYPE,
            Self::Authenticate(_) => AUTHENTICATE_MESSAGE_TYPE,
            Self::Other(t, _data) => *t,
        }
    }

    /// Serializes the NTLM message into bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        match self {
            Self::Negotiate(t1m) => t1m.to_bytes(),
            Self::Challenge(t2m) => t2m.to_bytes(),
            Self::Authenticate(t3m) => t3m.to_bytes(),
            Self::Other(msg_num, data) => {
                let mut buf = Vec::with_capacity(12 + data.len());
                buf.extend_from_slice(&NTLMSSP_MAGIC);
                buf.extend_from_slice(&msg_num.to_le_bytes());
                buf.extend_from_slice(data);
                Ok(buf)
            },
        }
    }
}
impl TryFrom<&[u8]> for Message {
    type Error = ParsingError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 12 {
            // assume magic mismatch
            return Err(ParsingError::ShortHeader { expected_min_len: 12, obtained_len: value.len() });
        }
        let obtained_magic: [u8; 8] = read_array(value, 0, "signature")?;
        if obtained_magic != NTLMSSP_MAGIC {
            return Err(ParsingError::MagicMismatch { expected: NTLMSSP_MAGIC, obtained: Vec::from(obtained_magic) });
        }
        match read_u32_le(value, 8, "message type")? {
            NEGOTIATE_MESSAGE_TYPE => NegotiateMessage::parse(value)
                .map(Message::Negotiate),
            CHALLENGE_MESSAGE_TYPE => ChallengeMessage::parse(value)
                .map(Message::Challenge),
            AUTHENTICATE_MESSAGE_TYPE => AuthenticateMessage::parse(value)
                .map(Message::Authenticate),
            other_type => Ok(Message::Other(other_type, Vec::from(&value[12..]))),
        }
    }
}

/// A structure representing the version of an operating system as well as the NTLM revision used.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OsVersion {
    pub major_version: u8,
    pub minor_version: u8,
    pub build_number: u16,
    pub reserved: [u8; 3],
    pub ntlm_revision: u8,
}
impl OsVersion {
    /// The NTLM revision implemented by this crate (NTLMSSP_REVISION_W2K3).
    pub const NTLM_REVISION_CURRENT: u8 = 0x0F;

    /// Creates a version structure for the given operating system version.
    pub fn new(major_version: u8, minor_version: u8, build_number: u16) -> Self {
        Self {
            major_version,
            minor_version,
            build_number,
            reserved: [0, 0, 0],
            ntlm_revision: Self::NTLM_REVISION_CURRENT,
        }
    }

    /// Serializes the OS version structure into bytes.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut ret = [0u8; 8];
        ret[0] = self.major_version;
        ret[1] = self.minor_version;
        ret[2..4].copy_from_slice(&self.build_number.to_le_bytes());
        ret[4..7].copy_from_slice(&self.reserved);
        ret[7] = self.ntlm_revision;
        ret
    }

    /// Reads the OS version structure stored at `offset` within `message`.
    pub fn read(message: &[u8], offset: usize) -> Result<Self, ParsingError> {
        let value: [u8; 8] = read_array(message, offset, "version")?;
        Ok(OsVersion {
            major_version: value[0],
            minor_version: value[1],
            build_number: u16::from_le_bytes([value[2], value[3]]),
            reserved: [value[4], value[5], value[6]],
            ntlm_revision: value[7],
        })
    }
}
