//! The Authenticate message answering a challenge.


use tracing::debug;

use crate::{Credentials, Flags};
use crate::buffer::{check_header, header_end, read_security_buffer, read_u32_le, MessageWriter, SECURITY_BUFFER_LEN};
use crate::challenge::ChallengeMessage;
use crate::config::{Config, LmCompatibility};
use crate::encoding::{ntlm_bytes_to_string, string_to_ntlm_bytes};
use crate::error::{Error, ParsingError, StoringError};
use crate::message::{OsVersion, AUTHENTICATE_MESSAGE_TYPE};
use crate::response::{
    encrypt_session_key, get_ntlm_time, random_client_challenge, random_session_key,
    respond_challenge_ntlm_v1, respond_challenge_ntlm_v1_extended, respond_challenge_ntlm_v1_no_lm,
    respond_challenge_ntlm_v2, ChallengeResponse,
};


const LM_RESPONSE_SECBUF_OFFSET: usize = 12;
const NTLM_RESPONSE_SECBUF_OFFSET: usize = 20;
const DOMAIN_SECBUF_OFFSET: usize = 28;
const USER_SECBUF_OFFSET: usize = 36;
const WORKSTATION_SECBUF_OFFSET: usize = 44;
const SESSION_KEY_SECBUF_OFFSET: usize = 52;
const FLAGS_OFFSET: usize = 60;
const VERSION_OFFSET: usize = 64;

/// The smallest Authenticate message this crate accepts: everything up to and including the
/// flags.
const MIN_HEADER_LEN: usize = 64;

const HEADER_LEN: usize
    = 8 // magic
    + 4 // message type
    + SECURITY_BUFFER_LEN // LM response secbuffer
    + SECURITY_BUFFER_LEN // NTLM response secbuffer
    + SECURITY_BUFFER_LEN // domain name secbuffer
    + SECURITY_BUFFER_LEN // user name secbuffer
    + SECURITY_BUFFER_LEN // workstation name secbuffer
    + SECURITY_BUFFER_LEN // session key secbuffer
    + 4 // flags
    + 8 // version
    ;

/// The flags that are kept in the Authenticate message if both sides agree on them.
const NEGOTIABLE_FLAGS: Flags = Flags::NEGOTIATE_NTLM2_KEY
    .union(Flags::NEGOTIATE_ALWAYS_SIGN)
    .union(Flags::NEGOTIATE_SIGN)
    .union(Flags::NEGOTIATE_SEAL)
    .union(Flags::NEGOTIATE_128BIT)
    .union(Flags::NEGOTIATE_56BIT)
    .union(Flags::NEGOTIATE_KEY_EXCHANGE)
    .union(Flags::NEGOTIATE_TARGET_INFO)
    .union(Flags::NEGOTIATE_VERSION);


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ResponseVariant {
    LmAndNtlmV1,
    NtlmV1Only,
    NtlmV1Extended,
    NtlmV2,
}
impl ResponseVariant {
    fn select(lm_compatibility: LmCompatibility, extended_session_security: bool) -> Self {
        match (lm_compatibility, extended_session_security) {
            (LmCompatibility::NtlmV2, _) => Self::NtlmV2,
            (LmCompatibility::Negotiated, true) => Self::NtlmV2,
            (_, true) => Self::NtlmV1Extended,
            (LmCompatibility::NtlmOnly, false) => Self::NtlmV1Only,
            (LmCompatibility::LmAndNtlm, false) => Self::LmAndNtlmV1,
            (LmCompatibility::Negotiated, false) => Self::LmAndNtlmV1,
        }
    }
}


/// The contents of an NTLM Authenticate message.
///
/// The Authenticate message is the final message of the handshake and is sent by the client in
/// response to the server's Challenge message.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AuthenticateMessage {
    /// The response to the challenge derived from the LanManager hash, or the value taking its
    /// place.
    pub lm_response: Vec<u8>,

    /// The response to the challenge derived from the NT hash.
    pub ntlm_response: Vec<u8>,

    /// The domain of the user.
    pub domain_name: String,

    /// The name of the user.
    pub user_name: String,

    /// The NT hostname of the client.
    pub workstation_name: String,

    /// The session key encrypted with the key exchange key; empty unless key exchange has been
    /// negotiated.
    pub session_key: Vec<u8>,

    /// The negotiated flags.
    pub flags: Flags,

    /// Version information about the client's operating system.
    pub os_version: OsVersion,
}

impl AuthenticateMessage {
    /// Answers the given challenge with the given credentials.
    ///
    /// The response variant is chosen according to [`Config::lm_compatibility`]; the client
    /// challenge, timestamp and exported session key are taken from the configuration if set.
    pub fn build(challenge: &ChallengeMessage, creds: &Credentials, workstation: &str, config: &Config) -> Result<Self, Error> {
        let server_flags = challenge.flags;
        if server_flags.contains(Flags::NEGOTIATE_DATAGRAM) {
            return Err(Error::UnsupportedFlags {
                flags: server_flags,
                reason: "connectionless authentication is not supported",
            });
        }
        let encoding = if server_flags.contains(Flags::NEGOTIATE_UNICODE) {
            Flags::NEGOTIATE_UNICODE
        } else if server_flags.contains(Flags::NEGOTIATE_OEM) {
            Flags::NEGOTIATE_OEM
        } else {
            return Err(Error::UnsupportedFlags {
                flags: server_flags,
                reason: "neither Unicode nor OEM encoding negotiated",
            });
        };

        let agreed = server_flags & config.negotiate_flags & NEGOTIABLE_FLAGS;
        let flags = Flags::NEGOTIATE_NTLM | encoding | agreed;

        let names = [
            ("domain name", creds.domain.as_str()),
            ("user name", creds.username.as_str()),
            ("workstation name", workstation),
        ];
        for (field, name) in names {
            string_to_ntlm_bytes(field, flags, name)?;
        }

        let variant = ResponseVariant::select(
            config.lm_compatibility,
            agreed.contains(Flags::NEGOTIATE_NTLM2_KEY),
        );
        debug!(?variant, flags = flags.bits(), "answering NTLM challenge");

        let client_challenge = config.client_challenge
            .unwrap_or_else(random_client_challenge);
        let response: ChallengeResponse = match variant {
            ResponseVariant::LmAndNtlmV1 => respond_challenge_ntlm_v1(challenge.challenge, creds),
            ResponseVariant::NtlmV1Only => respond_challenge_ntlm_v1_no_lm(challenge.challenge, creds),
            ResponseVariant::NtlmV1Extended => respond_challenge_ntlm_v1_extended(
                challenge.challenge,
                client_challenge,
                creds,
            ),
            ResponseVariant::NtlmV2 => {
                let time = config.timestamp
                    .or_else(|| challenge.timestamp())
                    .unwrap_or_else(get_ntlm_time);
                respond_challenge_ntlm_v2(
                    challenge.challenge,
                    client_challenge,
                    &challenge.target_information,
                    time,
                    creds,
                )
            },
        };

        let session_key = if flags.contains(Flags::NEGOTIATE_KEY_EXCHANGE) {
            let exported_session_key = config.exported_session_key
                .unwrap_or_else(random_session_key);
            Vec::from(encrypt_session_key(response.key_exchange_key, exported_session_key))
        } else {
            Vec::new()
        };

        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) {
            config.os_version
        } else {
            OsVersion::default()
        };

        Ok(Self {
            lm_response: response.lm_response,
            ntlm_response: response.ntlm_response,
            domain_name: creds.domain.clone(),
            user_name: creds.username.clone(),
            workstation_name: workstation.to_owned(),
            session_key,
            flags,
            os_version,
        })
    }

    /// Serializes the Authenticate message into bytes, including magic and message type.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoringError> {
        let mut writer = MessageWriter::new(AUTHENTICATE_MESSAGE_TYPE, HEADER_LEN);
        writer.write_security_buffer("LM response", &self.lm_response)?;
        writer.write_security_buffer("NTLM response", &self.ntlm_response)?;
        writer.write_string("domain name", self.flags, &self.domain_name)?;
        writer.write_string("user name", self.flags, &self.user_name)?;
        writer.write_string("workstation name", self.flags, &self.workstation_name)?;
        writer.write_security_buffer("session key", &self.session_key)?;
        writer.write_u32(self.flags.bits());
        writer.write_bytes(&self.os_version.to_bytes());
        Ok(writer.finish())
    }

    /// Parses a complete Authenticate message, including magic and message type.
    pub fn parse(value: &[u8]) -> Result<Self, ParsingError> {
        check_header(value, AUTHENTICATE_MESSAGE_TYPE, MIN_HEADER_LEN)?;

        let flags = Flags::from_bits_retain(read_u32_le(value, FLAGS_OFFSET, "flags")?);
        let lm_response = read_security_buffer(value, LM_RESPONSE_SECBUF_OFFSET, "LM response")?;
        let ntlm_response = read_security_buffer(value, NTLM_RESPONSE_SECBUF_OFFSET, "NTLM response")?;
        let domain_name = read_security_buffer(value, DOMAIN_SECBUF_OFFSET, "domain name")?;
        let user_name = read_security_buffer(value, USER_SECBUF_OFFSET, "user name")?;
        let workstation_name = read_security_buffer(value, WORKSTATION_SECBUF_OFFSET, "workstation name")?;
        let session_key = read_security_buffer(value, SESSION_KEY_SECBUF_OFFSET, "session key")?;

        let header_len = header_end(value, &[
            LM_RESPONSE_SECBUF_OFFSET,
            NTLM_RESPONSE_SECBUF_OFFSET,
            DOMAIN_SECBUF_OFFSET,
            USER_SECBUF_OFFSET,
            WORKSTATION_SECBUF_OFFSET,
            SESSION_KEY_SECBUF_OFFSET,
        ]);
        let os_version = if flags.contains(Flags::NEGOTIATE_VERSION) && header_len >= VERSION_OFFSET + 8 {
            OsVersion::read(value, VERSION_OFFSET)?
        } else {
            OsVersion::default()
        };

        Ok(Self {
            lm_response: Vec::from(lm_response),
            ntlm_response: Vec::from(ntlm_response),
            domain_name: ntlm_bytes_to_string(flags, domain_name)?,
            user_name: ntlm_bytes_to_string(flags, user_name)?,
            workstation_name: ntlm_bytes_to_string(flags, workstation_name)?,
            session_key: Vec::from(session_key),
            flags,
            os_version,
        })
    }
}
