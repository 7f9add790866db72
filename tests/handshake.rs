use base64::prelude::{BASE64_STANDARD, Engine as _};
use hex_literal::hex;
use ntlm_engine::{
    AuthenticateMessage, ChallengeConsumer, ChallengeMessage, Config, Credentials, Engine, Flags,
    LmCompatibility, Message, NegotiateMessageProducer, OsVersion, TargetInfoEntry, TargetInfoType,
};


fn creds() -> Credentials {
    Credentials {
        username: "User".to_owned(),
        password: "Password".to_owned(),
        domain: "Domain".to_owned(),
    }
}

fn server_challenge(client_flags: Flags) -> String {
    let target_information = TargetInfoEntry::encode_all(&[
        TargetInfoEntry::from_string(TargetInfoType::NtDomain, "Domain"),
        TargetInfoEntry::from_string(TargetInfoType::NtServer, "Server"),
        TargetInfoEntry {
            entry_type: TargetInfoType::Timestamp,
            data: Vec::from(&0x01d8_0000_0000_0000_i64.to_le_bytes()[..]),
        },
        TargetInfoEntry::terminator(),
    ]).unwrap();

    let challenge = ChallengeMessage {
        target_name: "Domain".to_owned(),
        flags: client_flags
            | Flags::NEGOTIATE_TARGET_INFO
            | Flags::NEGOTIATE_VERSION
            | Flags::TARGET_TYPE_DOMAIN,
        challenge: hex!("0123456789abcdef"),
        context: (0, 0),
        target_information,
        os_version: OsVersion::new(10, 0, 20348),
    };
    BASE64_STANDARD.encode(challenge.to_bytes().unwrap())
}

fn fixed_config() -> Config {
    Config::default()
        .with_negotiate_flags(Config::default_negotiate_flags() | Flags::NEGOTIATE_KEY_EXCHANGE)
        .with_client_challenge([0xaa; 8])
        .with_exported_session_key([0x55; 16])
}


#[test]
fn full_handshake() {
    let engine = Engine::new(fixed_config());

    let negotiate_text = engine.generate_negotiate(Some("DOMAIN"), Some("WORKSTATION")).unwrap();
    let negotiate_bytes = BASE64_STANDARD.decode(&negotiate_text).unwrap();
    assert_eq!(&negotiate_bytes[0..8], b"NTLMSSP\0");
    assert_eq!(&negotiate_bytes[8..12], [0x01_u8, 0x00, 0x00, 0x00]);

    let negotiate = match Message::try_from(negotiate_bytes.as_slice()).unwrap() {
        Message::Negotiate(n) => n,
        other => panic!("unexpected message: {:?}", other),
    };
    assert_eq!(negotiate.supplied_domain, "DOMAIN");
    assert_eq!(negotiate.supplied_workstation, "WORKSTATION");

    // a server accepts a subset of what the client requested
    let accepted = negotiate.flags & (
        Flags::NEGOTIATE_UNICODE
            | Flags::NEGOTIATE_NTLM
            | Flags::NEGOTIATE_NTLM2_KEY
            | Flags::NEGOTIATE_ALWAYS_SIGN
            | Flags::NEGOTIATE_KEY_EXCHANGE
    );
    let challenge_text = server_challenge(accepted);

    let authenticate_text = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    let authenticate_bytes = BASE64_STANDARD.decode(&authenticate_text).unwrap();
    let authenticate = AuthenticateMessage::parse(&authenticate_bytes).unwrap();

    assert_eq!(authenticate.user_name, "User");
    assert_eq!(authenticate.domain_name, "Domain");
    assert_eq!(authenticate.workstation_name, "WORKSTATION");
    assert_eq!(authenticate.flags, accepted);
    assert_eq!(authenticate.session_key.len(), 16);

    // LMv2 ends with the client challenge
    assert_eq!(authenticate.lm_response.len(), 24);
    assert_eq!(&authenticate.lm_response[16..], [0xaa_u8; 8]);

    // NTLMv2 blob carries the server's timestamp
    assert_eq!(&authenticate.ntlm_response[16..24], hex!("0101000000000000"));
    assert_eq!(&authenticate.ntlm_response[24..32], 0x01d8_0000_0000_0000_i64.to_le_bytes());
    assert_eq!(&authenticate.ntlm_response[32..40], [0xaa_u8; 8]);
}

#[test]
fn identical_inputs_identical_output() {
    let engine = Engine::new(fixed_config().with_timestamp(0x01d9_1234_5678_9abc));
    let challenge_text = server_challenge(Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM | Flags::NEGOTIATE_KEY_EXCHANGE);

    let first = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    let second = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    assert_eq!(first, second);
}

#[test]
fn random_values_differ_between_calls() {
    let engine = Engine::default();
    let challenge_text = server_challenge(Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM);

    let first = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    let second = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    assert_ne!(first, second);
}

#[test]
fn ntlm_v1_answer() {
    let engine = Engine::new(fixed_config().with_lm_compatibility(LmCompatibility::NtlmOnly));
    let challenge_text = server_challenge(Flags::NEGOTIATE_UNICODE | Flags::NEGOTIATE_NTLM);

    let authenticate_text = engine.generate_authenticate(&creds(), "WORKSTATION", &challenge_text).unwrap();
    let authenticate = AuthenticateMessage::parse(&BASE64_STANDARD.decode(authenticate_text).unwrap()).unwrap();
    assert_eq!(authenticate.ntlm_response, hex!("67c43011f30298a2ad35ece64f16331c44bdbed927841f94"));
    assert_eq!(authenticate.lm_response, authenticate.ntlm_response);
}

#[test]
fn malformed_challenges() {
    let engine = Engine::default();

    for garbage in ["", "%%%", "AAAA", "TlRMTVNTUAACAAAA"] {
        let err = engine.generate_authenticate(&creds(), "WORKSTATION", garbage).unwrap_err();
        assert!(err.is_malformed(), "{:?} not reported as malformed: {}", garbage, err);
    }

    // a negotiate message where a challenge is expected
    let negotiate_text = engine.generate_negotiate(None, None).unwrap();
    let err = engine.generate_authenticate(&creds(), "WORKSTATION", &negotiate_text).unwrap_err();
    assert!(err.is_malformed());
}
