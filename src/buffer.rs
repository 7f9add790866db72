//! Reading and writing the binary fields of an NTLM message.
//!
//! An NTLM message consists of a fixed-size header followed by a payload area. Variable-length
//! fields are stored in the payload and referenced from the header by a security buffer, which
//! records the length of the data and its offset from the start of the message.


use crate::{Flags, NTLMSSP_MAGIC};
use crate::encoding::string_to_ntlm_bytes;
use crate::error::{ParsingError, StoringError};


/// The number of bytes occupied by a security buffer within the header.
pub const SECURITY_BUFFER_LEN: usize = 8;


/// Appends a 32-bit value in little-endian byte order.
pub fn write_u32_le(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

/// Obtains the slice `offset..offset+length` of `buffer`, failing if it does not fit.
pub fn field_slice<'a>(buffer: &'a [u8], offset: usize, length: usize, field: &'static str) -> Result<&'a [u8], ParsingError> {
    let out_of_range = || ParsingError::FieldOutOfRange {
        field,
        offset,
        length,
        message_len: buffer.len(),
    };
    let end = offset.checked_add(length)
        .ok_or_else(out_of_range)?;
    buffer.get(offset..end)
        .ok_or_else(out_of_range)
}

/// Reads a fixed-size array of bytes starting at `offset`.
pub fn read_array<const N: usize>(buffer: &[u8], offset: usize, field: &'static str) -> Result<[u8; N], ParsingError> {
    let slice = field_slice(buffer, offset, N, field)?;
    let mut ret = [0u8; N];
    ret.copy_from_slice(slice);
    Ok(ret)
}

/// Reads a 16-bit little-endian value starting at `offset`.
pub fn read_u16_le(buffer: &[u8], offset: usize, field: &'static str) -> Result<u16, ParsingError> {
    read_array(buffer, offset, field)
        .map(u16::from_le_bytes)
}

/// Reads a 32-bit little-endian value starting at `offset`.
pub fn read_u32_le(buffer: &[u8], offset: usize, field: &'static str) -> Result<u32, ParsingError> {
    read_array(buffer, offset, field)
        .map(u32::from_le_bytes)
}

/// Reads the security buffer at `offset` in `message` and returns the data it points to.
pub fn read_security_buffer<'a>(message: &'a [u8], offset: usize, field: &'static str) -> Result<&'a [u8], ParsingError> {
    SecurityBuffer::read(message, offset, field)?
        .apply_to_slice(message, field)
}

/// Checks that `message` starts with the NTLMSSP magic and the given message type.
pub fn check_header(message: &[u8], message_type: u32, min_len: usize) -> Result<(), ParsingError> {
    if message.len() < min_len {
        return Err(ParsingError::ShortHeader { expected_min_len: min_len, obtained_len: message.len() });
    }
    let obtained_magic: [u8; 8] = read_array(message, 0, "signature")?;
    if obtained_magic != NTLMSSP_MAGIC {
        return Err(ParsingError::MagicMismatch { expected: NTLMSSP_MAGIC, obtained: Vec::from(obtained_magic) });
    }
    let obtained_type = read_u32_le(message, 8, "message type")?;
    if obtained_type != message_type {
        return Err(ParsingError::UnexpectedMessageType { expected: message_type, obtained: obtained_type });
    }
    Ok(())
}

/// Returns the end of the fixed header of a received message.
///
/// Peers place the payload directly behind the header, so the smallest offset of any non-empty
/// security buffer bounds the header. Older peers send shorter headers than current ones; fields
/// beyond this boundary must be considered absent.
pub fn header_end(message: &[u8], sec_buffer_offsets: &[usize]) -> usize {
    sec_buffer_offsets.iter()
        .filter_map(|&at| SecurityBuffer::read(message, at, "security buffer").ok())
        .filter(|sb| sb.length > 0)
        .filter_map(|sb| usize::try_from(sb.offset).ok())
        .fold(message.len(), usize::min)
}


/// An NTLM security buffer, pointing to data contained later in the message.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SecurityBuffer {
    pub length: u16,
    pub capacity: u16,
    pub offset: u32,
}
impl SecurityBuffer {
    /// Serializes the security buffer into bytes.
    pub fn to_bytes(&self) -> [u8; SECURITY_BUFFER_LEN] {
        let mut ret = [0u8; SECURITY_BUFFER_LEN];
        ret[0..2].copy_from_slice(&self.length.to_le_bytes());
        ret[2..4].copy_from_slice(&self.capacity.to_le_bytes());
        ret[4..8].copy_from_slice(&self.offset.to_le_bytes());
        ret
    }

    /// Reads the security buffer located at `offset` within `message`.
    pub fn read(message: &[u8], offset: usize, field: &'static str) -> Result<Self, ParsingError> {
        let raw: [u8; SECURITY_BUFFER_LEN] = read_array(message, offset, field)?;
        Ok(Self {
            length: u16::from_le_bytes([raw[0], raw[1]]),
            capacity: u16::from_le_bytes([raw[2], raw[3]]),
            offset: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
        })
    }

    /// Applies the security buffer to a message, extracting the data itself.
    ///
    /// The offset is relative to the start of the message, i.e. the first byte of the magic.
    pub fn apply_to_slice<'a>(&self, message: &'a [u8], field: &'static str) -> Result<&'a [u8], ParsingError> {
        if self.length == 0 {
            // short-circuit; the offset of an empty buffer is meaningless
            return Ok(&message[0..0]);
        }

        let offset = usize::try_from(self.offset)
            .map_err(|_| ParsingError::FieldOutOfRange {
                field,
                offset: usize::MAX,
                length: self.length.into(),
                message_len: message.len(),
            })?;
        field_slice(message, offset, self.length.into(), field)
    }
}


/// Assembles an NTLM message from its header fields and security buffer contents.
///
/// Fixed fields are appended to the header in the order they are written; the data referenced by
/// security buffers is collected separately and appended once the header is complete.
#[derive(Clone, Debug)]
pub struct MessageWriter {
    header: Vec<u8>,
    payload: Vec<u8>,
    header_len: usize,
}
impl MessageWriter {
    /// Starts a message of the given type whose fixed header will be `header_len` bytes long.
    pub fn new(message_type: u32, header_len: usize) -> Self {
        let mut header = Vec::with_capacity(header_len);
        header.extend_from_slice(&NTLMSSP_MAGIC);
        write_u32_le(&mut header, message_type);
        Self {
            header,
            payload: Vec::new(),
            header_len,
        }
    }

    /// Appends a 32-bit value to the header.
    pub fn write_u32(&mut self, value: u32) {
        write_u32_le(&mut self.header, value);
    }

    /// Appends raw bytes to the header.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.header.extend_from_slice(bytes);
    }

    /// Appends a security buffer to the header and its data to the payload.
    ///
    /// Empty buffers point to the end of the fixed header.
    pub fn write_security_buffer(&mut self, field: &'static str, data: &[u8]) -> Result<SecurityBuffer, StoringError> {
        let length = u16::try_from(data.len())
            .or(Err(StoringError::FieldTooLong { field, length: data.len() }))?;
        let position = if data.is_empty() {
            self.header_len
        } else {
            self.header_len + self.payload.len()
        };
        let offset = u32::try_from(position)
            .or(Err(StoringError::FieldTooLong { field, length: position }))?;

        let sb = SecurityBuffer {
            length,
            capacity: length,
            offset,
        };
        self.header.extend_from_slice(&sb.to_bytes());
        self.payload.extend_from_slice(data);
        Ok(sb)
    }

    /// Appends a string security buffer, encoded as selected by `flags`.
    pub fn write_string(&mut self, field: &'static str, flags: Flags, data: &str) -> Result<SecurityBuffer, StoringError> {
        let bs = string_to_ntlm_bytes(field, flags, data)?;
        self.write_security_buffer(field, &bs)
    }

    /// Appends an OEM string security buffer regardless of the negotiated encoding.
    pub fn write_oem_string(&mut self, field: &'static str, data: &str) -> Result<SecurityBuffer, StoringError> {
        self.write_string(field, Flags::NEGOTIATE_OEM, data)
    }

    /// Joins header and payload into the finished message.
    pub fn finish(mut self) -> Vec<u8> {
        debug_assert_eq!(self.header.len(), self.header_len, "fixed header length mismatch");
        self.header.append(&mut self.payload);
        self.header
    }
}
