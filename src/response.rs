//! Calculation of the responses to an NTLM challenge.


use chrono::{NaiveDate, Utc};
use cipher::{BlockEncrypt, KeyInit, StreamCipher};
use cipher::generic_array::GenericArray;
use cipher::generic_array::typenum::{U16, U8};
use des::Des;
use digest::Digest;
use hmac::{Hmac, Mac};
use md4::Md4;
use md5::Md5;
use rand::Rng;
use rand::rngs::OsRng;
use rc4::Rc4;

use crate::Credentials;
use crate::encoding::{encode_utf16_le, string_to_oem};


/// The response to an NTLM challenge.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ChallengeResponse {
    /// The classic LanManager (LM) response, or the value taking its place.
    pub lm_response: Vec<u8>,

    /// The NT LanManager (NTLM) response.
    pub ntlm_response: Vec<u8>,

    /// The session base key, calculated from the password hash and the responses.
    pub session_base_key: [u8; 16],

    /// The key protecting the exported session key if key exchange is negotiated.
    pub key_exchange_key: [u8; 16],
}


/// Obtains the current NTLM timestamp.
pub fn get_ntlm_time() -> i64 {
    let windows_epoch = NaiveDate::from_ymd_opt(1601, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let windows_epoch = match windows_epoch {
        Some(we) => we,
        None => return 0,
    };
    let now = Utc::now();
    // the requested format is "tenths of a microsecond"
    (now - windows_epoch).num_microseconds()
        .map(|us| us * 10)
        .unwrap_or(i64::MAX)
}

/// Generates a random 8-byte client challenge.
pub fn random_client_challenge() -> [u8; 8] {
    let mut client_challenge = [0u8; 8];
    OsRng.fill(&mut client_challenge);
    client_challenge
}

/// Generates a random 16-byte session key.
pub fn random_session_key() -> [u8; 16] {
    let mut session_key = [0u8; 16];
    OsRng.fill(&mut session_key);
    session_key
}


/// Spreads a 56-bit DES key over eight bytes, leaving the (ignored) parity bits clear.
fn expand_des_key(key: &[u8; 7]) -> GenericArray<u8, U8> {
    GenericArray::from([
        key[0],
        (key[0] << 7) | (key[1] >> 1),
        (key[1] << 6) | (key[2] >> 2),
        (key[2] << 5) | (key[3] >> 3),
        (key[3] << 4) | (key[4] >> 4),
        (key[4] << 3) | (key[5] >> 5),
        (key[5] << 2) | (key[6] >> 6),
        key[6] << 1,
    ])
}

/// Encrypts a single block with DES in ECB mode using a 7-byte key.
fn des_7(key: &[u8; 7], data: [u8; 8]) -> [u8; 8] {
    let des = Des::new(&expand_des_key(key));
    let mut block = GenericArray::from(data);
    des.encrypt_block(&mut block);
    block.into()
}

/// Calculates HMAC-MD5 over the concatenation of `parts`.
fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> [u8; 16] {
    let mut hmac_md5: Hmac<Md5> = <Hmac<Md5> as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length");
    for part in parts {
        hmac_md5.update(part);
    }
    hmac_md5.finalize().into_bytes().into()
}

fn md4(data: &[u8]) -> [u8; 16] {
    let mut md4 = <Md4 as Digest>::new();
    md4.update(data);
    md4.finalize().into()
}


/// Performs the NTLMv1 DES encryption to calculate the response value to the challenge.
///
/// The 16-byte key is zero-padded to 21 bytes and split into three 7-byte DES keys, each of which
/// encrypts `data`.
pub fn des_long(key: [u8; 16], data: [u8; 8]) -> [u8; 24] {
    let key0 = [key[0], key[1], key[2], key[3], key[4], key[5], key[6]];
    let key1 = [key[7], key[8], key[9], key[10], key[11], key[12], key[13]];
    let key2 = [key[14], key[15], 0, 0, 0, 0, 0];

    let mut ret = [0u8; 24];
    ret[0..8].copy_from_slice(&des_7(&key0, data));
    ret[8..16].copy_from_slice(&des_7(&key1, data));
    ret[16..24].copy_from_slice(&des_7(&key2, data));
    ret
}


/// Derives the encryption key from a password according to the LMv1 scheme.
///
/// The LMv1 scheme consists of the following:
///
/// ```plain
///            ┌────────────┐  ┌───────────────┐  ┌─────────────┐
/// password ──┤ convert to ├──┤ encode using  ├──┤ truncate or ├──┐
///            │ uppercase  │  │ OEM codepage  │  │ pad to 14 B │  │
///            └────────────┘  └───────────────┘  └─────────────┘  │
///           ┌────────────────────────────────────────────────────┘
///           │┌───────┐
///           └┤ split │           "KGS!@#$%"
///            └─┬───┬─┘               │ input
///         0..7 │   │ 7..14    key ┌──┴──┐ output
///              │   └──────────────┤ DES ├────────────┐
///              │                  └─────┘            │ 0..8
///              │                                  ┌──┴───┐
///              │                 "KGS!@#$%"       │ join ├──── key
///              │                     │ input      └──┬───┘
///              │              key ┌──┴──┐ output     │ 8..16
///              └──────────────────┤ DES ├────────────┘
///                                 └─────┘
/// ```
///
/// Returns `None` if the password cannot be represented in the OEM encoding.
pub fn lm_v1_password_func(password: &str) -> Option<[u8; 16]> {
    const LM_MAGIC: [u8; 8] = *b"KGS!@#$%";

    let mut password_bytes = string_to_oem(&password.to_uppercase())?;
    password_bytes.resize(14, 0x00);

    let half0 = [password_bytes[0], password_bytes[1], password_bytes[2], password_bytes[3], password_bytes[4], password_bytes[5], password_bytes[6]];
    let half1 = [password_bytes[7], password_bytes[8], password_bytes[9], password_bytes[10], password_bytes[11], password_bytes[12], password_bytes[13]];

    let mut output = [0; 16];
    output[0..8].copy_from_slice(&des_7(&half0, LM_MAGIC));
    output[8..16].copy_from_slice(&des_7(&half1, LM_MAGIC));
    Some(output)
}

/// Derives the encryption key from a password according to the NTLMv1 scheme.
///
/// The NTLMv1 scheme encodes the password as UTF-16 in little-endian byte order (without the Byte
/// Order Mark) and hashes it using MD4.
pub fn ntlm_v1_password_func(password: &str) -> [u8; 16] {
    md4(&encode_utf16_le(password))
}

/// Derives the encryption key from a password according to the NTLMv2 scheme.
///
/// The NTLMv2 scheme is a HMAC-MD5 scheme whose key is the encryption key derived from the password
/// using the NTLMv1 scheme and whose plaintext is a concatenation of uppercase username and
/// unchanged-case domain, each encoded as UTF-16 in little-endian byte order without the Byte Order
/// Mark.
pub fn ntlm_v2_password_func(creds: &Credentials) -> [u8; 16] {
    // the HMAC key func is the same as the NTLMv1 password func
    let hmac_key = ntlm_v1_password_func(&creds.password);
    let upper_user_bytes = encode_utf16_le(&creds.username.to_uppercase());
    let dom_bytes = encode_utf16_le(&creds.domain);
    hmac_md5(&hmac_key, &[&upper_user_bytes[..], &dom_bytes[..]])
}


/// Calculates an NTLMv1 response to the given server challenge.
///
/// An LMv1 response is also included. If the password cannot be encoded for the LM hash, the
/// NTLMv1 response takes its place.
pub fn respond_challenge_ntlm_v1(server_challenge: [u8; 8], creds: &Credentials) -> ChallengeResponse {
    let ntlm_key = ntlm_v1_password_func(&creds.password);
    let ntlm_response = Vec::from(des_long(ntlm_key, server_challenge));

    let lm_response = match lm_v1_password_func(&creds.password) {
        Some(lm_key) => Vec::from(des_long(lm_key, server_challenge)),
        None => ntlm_response.clone(),
    };

    let session_base_key = md4(&ntlm_key);

    ChallengeResponse {
        lm_response,
        ntlm_response,
        session_base_key,
        key_exchange_key: session_base_key,
    }
}

/// Calculates an NTLMv1 response to the given server challenge.
///
/// No LM response is included; instead, the NTLMv1 response is copied.
pub fn respond_challenge_ntlm_v1_no_lm(server_challenge: [u8; 8], creds: &Credentials) -> ChallengeResponse {
    let ntlm_key = ntlm_v1_password_func(&creds.password);
    let ntlm_response = Vec::from(des_long(ntlm_key, server_challenge));

    let lm_response = ntlm_response.clone();

    let session_base_key = md4(&ntlm_key);

    ChallengeResponse {
        lm_response,
        ntlm_response,
        session_base_key,
        key_exchange_key: session_base_key,
    }
}

/// Calculates an extended NTLMv1 response to the given server challenge.
///
/// The NTLM response is in the extended format; the LM response field contains the client
/// challenge which has also influenced the calculation of the NTLM response.
pub fn respond_challenge_ntlm_v1_extended(server_challenge: [u8; 8], client_challenge: [u8; 8], creds: &Credentials) -> ChallengeResponse {
    let ntlm_key = ntlm_v1_password_func(&creds.password);

    let desl_plaintext: [u8; 8] = {
        let mut md5 = <Md5 as Digest>::new();
        md5.update(server_challenge);
        md5.update(client_challenge);
        let digest = md5.finalize();

        let mut dk = [0u8; 8];
        dk.copy_from_slice(&digest.as_slice()[0..8]);
        dk
    };

    let ntlm_response = Vec::from(des_long(ntlm_key, desl_plaintext));
    let mut lm_response = Vec::with_capacity(24);
    lm_response.extend_from_slice(&client_challenge);
    lm_response.resize(24, 0);

    let session_base_key = md4(&ntlm_key);
    let key_exchange_key = hmac_md5(&session_base_key, &[&server_challenge[..], &lm_response[0..8]]);

    ChallengeResponse {
        lm_response,
        ntlm_response,
        session_base_key,
        key_exchange_key,
    }
}

/// Calculates an NTLMv2 response to the given server challenge, including target info and time
/// value to protect against replay attacks.
pub fn respond_challenge_ntlm_v2(server_challenge: [u8; 8], client_challenge: [u8; 8], target_info: &[u8], time: i64, creds: &Credentials) -> ChallengeResponse {
    let mut temp = Vec::with_capacity(28 + target_info.len() + 4);
    temp.push(0x01); // RespType
    temp.push(0x01); // HiRespType
    temp.extend_from_slice(&[0x00; 6]);
    temp.extend_from_slice(&time.to_le_bytes());
    temp.extend_from_slice(&client_challenge);
    temp.extend_from_slice(&[0x00; 4]);
    temp.extend_from_slice(target_info);
    temp.extend_from_slice(&[0x00; 4]);

    let ntlm_key = ntlm_v2_password_func(creds);

    let nt_proof_string = hmac_md5(&ntlm_key, &[&server_challenge[..], &temp[..]]);

    let mut ntlm_response = Vec::with_capacity(16 + temp.len());
    ntlm_response.extend_from_slice(&nt_proof_string);
    ntlm_response.extend_from_slice(&temp);

    let mut lm_response = Vec::with_capacity(16 + 8);
    lm_response.extend_from_slice(&hmac_md5(&ntlm_key, &[&server_challenge[..], &client_challenge[..]]));
    lm_response.extend_from_slice(&client_challenge);

    let session_base_key = hmac_md5(&ntlm_key, &[&nt_proof_string[..]]);

    ChallengeResponse {
        lm_response,
        ntlm_response,
        session_base_key,
        key_exchange_key: session_base_key,
    }
}

/// Encrypts the exported session key with RC4 under the key exchange key.
pub fn encrypt_session_key(key_exchange_key: [u8; 16], exported_session_key: [u8; 16]) -> [u8; 16] {
    let key: GenericArray<u8, U16> = GenericArray::from(key_exchange_key);
    let mut rc4 = Rc4::<U16>::new(&key);
    let mut encrypted = exported_session_key;
    rc4.apply_keystream(&mut encrypted);
    encrypted
}
