//! The text-level adapter used by HTTP clients.
//!
//! Messages travel base64-encoded in `Authorization` and `WWW-Authenticate` headers; the engine
//! takes and produces exactly that text, leaving the header framing to the caller.


use std::fmt;

use base64::prelude::{BASE64_STANDARD, Engine as _};
use tracing::debug;

use crate::{AuthenticateMessage, ChallengeMessage, Credentials, NegotiateMessage};
use crate::config::Config;
use crate::error::{Error, ParsingError};


/// Produces the first message of an NTLM handshake.
pub trait NegotiateMessageProducer {
    /// Generates a base64-encoded Negotiate message.
    fn generate_negotiate(&self, domain: Option<&str>, workstation: Option<&str>) -> Result<String, EngineError>;
}

/// Answers the server's challenge, producing the last message of an NTLM handshake.
pub trait ChallengeConsumer {
    /// Generates a base64-encoded Authenticate message answering the base64-encoded `challenge`.
    fn generate_authenticate(&self, creds: &Credentials, workstation: &str, challenge: &str) -> Result<String, EngineError>;
}


/// An error returned by [`Engine`].
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum EngineError {
    /// The challenge text could not be decoded.
    InvalidChallenge(ParsingError),

    /// The handshake cannot continue.
    Ntlm(Error),
}
impl EngineError {
    /// Whether the error was caused by a structurally invalid message from the peer.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::InvalidChallenge(_) | Self::Ntlm(Error::MalformedMessage(_)))
    }
}
impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChallenge(e)
                => write!(f, "invalid challenge: {}", e),
            Self::Ntlm(e)
                => write!(f, "{}", e),
        }
    }
}
impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidChallenge(e) => Some(e),
            Self::Ntlm(e) => Some(e),
        }
    }
}
impl From<Error> for EngineError {
    fn from(e: Error) -> Self {
        Self::Ntlm(e)
    }
}


/// A stateless NTLM client engine.
///
/// Every call is independent of the previous ones; the same engine may serve any number of
/// concurrent handshakes.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    config: Config,
}
impl Engine {
    /// Creates an engine using the given settings.
    pub fn new(config: Config) -> Self {
        Self {
            config,
        }
    }

    /// The settings used by this engine.
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn decode_challenge(challenge: &str) -> Result<ChallengeMessage, ParsingError> {
        let bytes = BASE64_STANDARD.decode(challenge.trim())
            .map_err(|e| ParsingError::InvalidBase64 { reason: e.to_string() })?;
        ChallengeMessage::parse(&bytes)
    }
}
impl NegotiateMessageProducer for Engine {
    fn generate_negotiate(&self, domain: Option<&str>, workstation: Option<&str>) -> Result<String, EngineError> {
        let message = NegotiateMessage::new(
            self.config.negotiate_flags,
            domain,
            workstation,
            self.config.os_version,
        );
        let bytes = message.to_bytes()
            .map_err(Error::from)?;
        debug!(flags = message.flags.bits(), len = bytes.len(), "generated negotiate message");
        Ok(BASE64_STANDARD.encode(&bytes))
    }
}
impl ChallengeConsumer for Engine {
    fn generate_authenticate(&self, creds: &Credentials, workstation: &str, challenge: &str) -> Result<String, EngineError> {
        let challenge = Self::decode_challenge(challenge)
            .map_err(|e| {
                debug!(error = %e, "rejecting challenge message");
                EngineError::InvalidChallenge(e)
            })?;
        debug!(flags = challenge.flags.bits(), target = %challenge.target_name, "received challenge message");

        let message = AuthenticateMessage::build(&challenge, creds, workstation, &self.config)?;
        let bytes = message.to_bytes()
            .map_err(Error::from)?;
        debug!(flags = message.flags.bits(), len = bytes.len(), "generated authenticate message");
        Ok(BASE64_STANDARD.encode(&bytes))
    }
}
