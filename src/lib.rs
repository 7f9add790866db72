//! An NTLM authentication engine for HTTP clients.
//!
//! The engine produces the client's two messages of the NTLM handshake as base64 text, ready to be
//! sent in an `Authorization: NTLM ...` header, and computes the challenge responses (LM, NTLMv1,
//! NTLMv2) from the server's Challenge message.
//!
//! Sample usage:
//! ```
//! use ntlm_engine::{ChallengeConsumer, NegotiateMessageProducer};
//!
//! const EWS_URL: &str = "https://example.com/EWS/Exchange.asmx";
//!
//! async fn initialize_authed_client(username: &str, password: &str, domain: &str, local_hostname: &str) -> reqwest::Client {
//!     let engine = ntlm_engine::Engine::new(ntlm_engine::Config::default());
//!     let nego_b64 = engine.generate_negotiate(Some(domain), Some(local_hostname))
//!         .expect("failed to encode NTLM negotiation message");
//!
//!     let client = reqwest::Client::builder()
//!         .cookie_store(true)
//!         .build()
//!         .expect("failed to build client");
//!     let resp = client.get(EWS_URL)
//!         .header("Authorization", format!("NTLM {}", nego_b64))
//!         .send().await
//!         .expect("failed to send challenge request to Exchange");
//!     let challenge_header = resp.headers().get("www-authenticate")
//!         .expect("response missing challenge header");
//!
//!     // we might have been redirected to a specialized authentication URL
//!     let auth_url = resp.url();
//!
//!     let challenge_b64 = challenge_header.to_str()
//!         .expect("challenge header not a string")
//!         .split(" ")
//!         .nth(1).expect("second chunk of challenge header missing");
//!
//!     let creds = ntlm_engine::Credentials {
//!         username: username.to_owned(),
//!         password: password.to_owned(),
//!         domain: domain.to_owned(),
//!     };
//!     let auth_b64 = engine.generate_authenticate(&creds, local_hostname, challenge_b64)
//!         .expect("failed to answer NTLM challenge");
//!
//!     client.get(auth_url.clone())
//!         .header("Authorization", format!("NTLM {}", auth_b64))
//!         .send().await
//!         .expect("failed to send authentication request to Exchange")
//!         .error_for_status()
//!         .expect("error response to authentication message");
//!
//!     client
//! }
//! ```


mod authenticate;
mod buffer;
mod challenge;
mod config;
mod encoding;
mod engine;
mod error;
mod message;
mod negotiate;
mod response;


use bitflags::bitflags;

pub use crate::authenticate::AuthenticateMessage;
pub use crate::challenge::{ChallengeMessage, TargetInfoEntry, TargetInfoType};
pub use crate::config::{Config, LmCompatibility};
pub use crate::engine::{ChallengeConsumer, Engine, EngineError, NegotiateMessageProducer};
pub use crate::error::{Error, ParsingError, StoringError};
pub use crate::message::{
    Message, OsVersion, AUTHENTICATE_MESSAGE_TYPE, CHALLENGE_MESSAGE_TYPE, NEGOTIATE_MESSAGE_TYPE,
};
pub use crate::negotiate::NegotiateMessage;
pub use crate::response::{
    encrypt_session_key, get_ntlm_time, lm_v1_password_func, ntlm_v1_password_func,
    ntlm_v2_password_func, random_client_challenge, random_session_key, respond_challenge_ntlm_v1,
    respond_challenge_ntlm_v1_extended, respond_challenge_ntlm_v1_no_lm, respond_challenge_ntlm_v2,
    ChallengeResponse,
};


/// The magic value at the start of every NTLMSSP data packet.
pub const NTLMSSP_MAGIC: [u8; 8] = *b"NTLMSSP\0";


/// Standard NTLM credentials, consisting of username, password and domain.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Credentials {
    /// The username part of the credentials.
    pub username: String,

    /// The password part of the credentials.
    pub password: String,

    /// The domain part of the credentials.
    ///
    /// Often specified in combination with the username as `<DOMAIN>\<USERNAME>`. In credentials
    /// without a domain, the domain is an empty string.
    pub domain: String,
}


bitflags! {
    /// NTLM operation flags.
    #[derive(Clone, Copy, Debug, Default, Hash, Eq, Ord, PartialEq, PartialOrd)]
    pub struct Flags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const UNKNOWN_8 = 0x0000_0008;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_DATAGRAM = 0x0000_0040;
        const NEGOTIATE_LANMAN_KEY = 0x0000_0080;
        const NEGOTIATE_NETWARE = 0x0000_0100;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const UNKNOWN_400 = 0x0000_0400;
        const NEGOTIATE_ANONYMOUS = 0x0000_0800;
        const NEGOTIATE_DOMAIN_SUPPLIED = 0x0000_1000;
        const NEGOTIATE_WORKSTATION_SUPPLIED = 0x0000_2000;
        const NEGOTIATE_LOCAL_CALL = 0x0000_4000;
        const NEGOTIATE_ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const TARGET_TYPE_SHARE = 0x0004_0000;
        const NEGOTIATE_NTLM2_KEY = 0x0008_0000;
        const REQUEST_INIT_RESPONSE = 0x0010_0000;
        const REQUEST_ACCEPT_RESPONSE = 0x0020_0000;
        const REQUEST_NON_NT_SESSION_KEY = 0x0040_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const UNKNOWN_1000000 = 0x0100_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const UNKNOWN_4000000 = 0x0400_0000;
        const UNKNOWN_8000000 = 0x0800_0000;
        const UNKNOWN_10000000 = 0x1000_0000;
        const NEGOTIATE_128BIT = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56BIT = 0x8000_0000;
    }
}
