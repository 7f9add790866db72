//! Client settings.


use crate::Flags;
use crate::message::OsVersion;


/// Selects which responses are sent to the server's challenge.
///
/// The levels follow the LAN Manager compatibility levels known from Windows, collapsed to the
/// distinctions that matter to a client.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum LmCompatibility {
    /// Send LMv1 and NTLMv1 responses (levels 0 and 1).
    ///
    /// If the server negotiates extended session security, the NTLMv1 response is sent in its
    /// extended form.
    LmAndNtlm,

    /// Send the NTLMv1 response in both response fields (level 2).
    NtlmOnly,

    /// Send NTLMv2 responses if the server negotiates extended session security and fall back
    /// to [`LmCompatibility::LmAndNtlm`] otherwise.
    Negotiated,

    /// Always send LMv2 and NTLMv2 responses (levels 3 to 5).
    NtlmV2,
}
impl Default for LmCompatibility {
    fn default() -> Self {
        Self::NtlmV2
    }
}

/// Settings of an NTLM client.
///
/// The fixed values (`client_challenge`, `timestamp`, `exported_session_key`) make the generated
/// messages reproducible; when they are `None`, fresh random values and the current time are used.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Config {
    /// The responses to send.
    pub lm_compatibility: LmCompatibility,

    /// The flags requested in the Negotiate message.
    pub negotiate_flags: Flags,

    /// The operating system version sent along if [`Flags::NEGOTIATE_VERSION`] is requested.
    pub os_version: OsVersion,

    /// A fixed client challenge.
    pub client_challenge: Option<[u8; 8]>,

    /// A fixed NTLM timestamp (tenths of a microsecond since 1601-01-01T00:00:00Z).
    pub timestamp: Option<i64>,

    /// A fixed session key to transfer if key exchange is negotiated.
    pub exported_session_key: Option<[u8; 16]>,
}
impl Config {
    /// The flags requested by default.
    pub fn default_negotiate_flags() -> Flags {
        Flags::NEGOTIATE_UNICODE
            | Flags::NEGOTIATE_OEM
            | Flags::REQUEST_TARGET
            | Flags::NEGOTIATE_NTLM
            | Flags::NEGOTIATE_ALWAYS_SIGN
            | Flags::NEGOTIATE_NTLM2_KEY
    }

    /// Selects the responses to send.
    pub fn with_lm_compatibility(mut self, lm_compatibility: LmCompatibility) -> Self {
        self.lm_compatibility = lm_compatibility;
        self
    }

    /// Replaces the flags requested in the Negotiate message.
    pub fn with_negotiate_flags(mut self, negotiate_flags: Flags) -> Self {
        self.negotiate_flags = negotiate_flags;
        self
    }

    /// Sets the version announced if version information is negotiated.
    pub fn with_os_version(mut self, os_version: OsVersion) -> Self {
        self.os_version = os_version;
        self
    }

    /// Fixes the client challenge instead of generating a random one.
    pub fn with_client_challenge(mut self, client_challenge: [u8; 8]) -> Self {
        self.client_challenge = Some(client_challenge);
        self
    }

    /// Fixes the NTLMv2 timestamp instead of using the server's or the current time.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fixes the session key transferred on key exchange.
    pub fn with_exported_session_key(mut self, exported_session_key: [u8; 16]) -> Self {
        self.exported_session_key = Some(exported_session_key);
        self
    }
}
impl Default for Config {
    fn default() -> Self {
        Self {
            lm_compatibility: LmCompatibility::default(),
            negotiate_flags: Self::default_negotiate_flags(),
            os_version: OsVersion::default(),
            client_challenge: None,
            timestamp: None,
            exported_session_key: None,
        }
    }
}
