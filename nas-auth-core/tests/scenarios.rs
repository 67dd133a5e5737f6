//! End-to-end authentication scenarios driven against fake host
//! collaborators.

use nas_auth_core::controller::{Controller, NasHost};
use nas_auth_core::messages::{
    AuthenticationFailure, AuthenticationRequest, AuthenticationResponse, MmStatus,
};
use nas_auth_core::usim::{NgKsi, NgKsiIe, OpType, SecurityContextType, UsimAuthState, UsimConfig};
use nas_auth_core::{Plmn, Mnc};

struct FixedSqn {
    current: [u8; 6],
    accept: bool,
}

impl nas_auth_core::autn::SqnManager for FixedSqn {
    fn get_sqn(&self) -> [u8; 6] {
        self.current
    }
    fn check_sqn(
        &mut self,
        _received: [u8; 6],
    ) -> bool {
        self.accept
    }
}

#[derive(Default)]
struct FakeHost {
    plmn: Option<Plmn>,
    cm_connected: bool,
    responses: Vec<AuthenticationResponse>,
    failures: Vec<AuthenticationFailure>,
    statuses: Vec<MmStatus>,
    t3516_running: bool,
    t3520_running: bool,
    local_release_requested: bool,
    guti_cleared: bool,
    roaming_not_allowed: bool,
    deregistered_ps: bool,
}

impl NasHost for FakeHost {
    fn send_authentication_response(
        &mut self,
        resp: AuthenticationResponse,
    ) {
        self.responses.push(resp);
    }
    fn send_authentication_failure(
        &mut self,
        fail: AuthenticationFailure,
    ) {
        self.failures.push(fail);
    }
    fn send_mm_status(
        &mut self,
        status: MmStatus,
    ) {
        self.statuses.push(status);
    }

    fn start_t3516(&mut self) {
        self.t3516_running = true;
    }
    fn stop_t3516(&mut self) {
        self.t3516_running = false;
    }
    fn start_t3520(&mut self) {
        self.t3520_running = true;
    }
    fn stop_t3520(&mut self) {
        self.t3520_running = false;
    }
    fn stop_t3510(&mut self) {}
    fn stop_t3517(&mut self) {}
    fn stop_t3519(&mut self) {}
    fn stop_t3521(&mut self) {}

    fn current_plmn(&self) -> Option<Plmn> {
        self.plmn
    }
    fn is_cm_connected(&self) -> bool {
        self.cm_connected
    }
    fn request_local_connection_release(
        &mut self,
        _reason: &str,
    ) {
        self.local_release_requested = true;
    }

    fn clear_guti_and_tai_list(&mut self) {
        self.guti_cleared = true;
    }
    fn set_update_status_roaming_not_allowed(&mut self) {
        self.roaming_not_allowed = true;
    }
    fn transition_mm_deregistered_ps(&mut self) {
        self.deregistered_ps = true;
    }
}

fn hex16(s: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    faster_hex::hex_decode(s.as_bytes(), &mut out).unwrap();
    out
}
fn hex6(s: &str) -> [u8; 6] {
    let mut out = [0u8; 6];
    faster_hex::hex_decode(s.as_bytes(), &mut out).unwrap();
    out
}
fn hex2(s: &str) -> [u8; 2] {
    let mut out = [0u8; 2];
    faster_hex::hex_decode(s.as_bytes(), &mut out).unwrap();
    out
}

fn usim_config() -> UsimConfig {
    UsimConfig {
        k: nas_auth_core::usim::SecretBytes16(hex16("465b5ce8b199b49faa5f0a2ee238a6bc")),
        op_type: OpType::Opc,
        op_or_opc: nas_auth_core::usim::SecretBytes16(hex16("cd63cb71954a9f4e48a5994e37a02baf")),
        amf: hex2("b9b9"),
        supi: non_empty_string::NonEmptyString::new("imsi-001010000000001".to_string()).unwrap(),
        #[cfg(feature = "eap-tls")]
        eap_tls: None,
    }
}

fn request(
    rand: [u8; 16],
    autn: [u8; 16],
    ksi: u8,
) -> AuthenticationRequest {
    AuthenticationRequest {
        ng_ksi: NgKsiIe { tsc: SecurityContextType::Native, ksi: NgKsi::new(ksi) },
        abba: vec![0x00, 0x00],
        rand: Some(rand),
        autn: Some(autn),
        eap_message: None,
    }
}

fn build_autn(
    k: &[u8; 16],
    opc: &[u8; 16],
    rand: &[u8; 16],
    sqn: &[u8; 6],
    amf: &[u8; 2],
) -> [u8; 16] {
    let out = nas_auth_core::milenage::compute(opc, k, rand, sqn, amf);
    let mut autn = [0u8; 16];
    for i in 0..6 {
        autn[i] = sqn[i] ^ out.ak[i];
    }
    autn[6..8].copy_from_slice(amf);
    autn[8..16].copy_from_slice(&out.mac_a);
    autn
}

fn scenario_1_plmn() -> Plmn {
    Plmn::new([0, 0, 1], Mnc::two([0, 1]))
}

#[test]
fn scenario_1_valid_5g_aka_accepts_and_stages_context() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let autn = build_autn(&k, &opc, &rand, &sqn, &amf);

    let config = usim_config();
    let mut state = UsimAuthState::new();
    let mut sqn_mgr = FixedSqn { current: sqn, accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    ctl.receive_authentication_request(&request(rand, autn, 0));

    assert_eq!(host.responses.len(), 1);
    assert!(matches!(host.responses[0], AuthenticationResponse::ResStar(_)));
    assert!(state.non_current_ns_ctx.is_some());
    assert_eq!(state.nw_consecutive_auth_failure, 0);
    assert!(!host.t3520_running);
}

#[test]
fn scenario_2_synch_failure_carries_auts() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let autn = build_autn(&k, &opc, &rand, &sqn, &amf);

    let config = usim_config();
    let mut state = UsimAuthState::new();
    let mut sqn_mgr = FixedSqn { current: sqn, accept: false };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    ctl.receive_authentication_request(&request(rand, autn, 0));

    assert_eq!(host.failures.len(), 1);
    assert_eq!(host.failures[0].cause, nas_auth_core::AuthFailureCause::SynchFailure);
    assert_eq!(host.failures[0].auts.unwrap().len(), 14);
    assert!(state.rand.is_none());
    assert!(state.res_star.is_none());
    assert!(!host.t3516_running);
}

#[test]
fn scenario_3_mac_failure_increments_counter() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let mut autn = build_autn(&k, &opc, &rand, &sqn, &amf);
    autn[15] ^= 0xff;

    let config = usim_config();
    let mut state = UsimAuthState::new();
    let mut sqn_mgr = FixedSqn { current: sqn, accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    ctl.receive_authentication_request(&request(rand, autn, 0));

    assert_eq!(host.failures.len(), 1);
    assert_eq!(host.failures[0].cause, nas_auth_core::AuthFailureCause::MacFailure);
    assert_eq!(state.nw_consecutive_auth_failure, 1);
}

#[test]
fn scenario_4_ngksi_collision_is_rejected() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let autn = build_autn(&k, &opc, &rand, &sqn, &amf);

    let config = usim_config();
    let mut state = UsimAuthState::new();
    state.current_ns_ctx = Some(nas_auth_core::NasSecurityContext {
        tsc: SecurityContextType::Native,
        ng_ksi: NgKsi::new(3),
        keys: nas_auth_core::usim::SecurityKeys {
            k_ausf: [0; 32],
            k_seaf: [0; 32],
            k_amf: [0; 32],
            abba: vec![],
        },
    });
    let mut sqn_mgr = FixedSqn { current: sqn, accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    ctl.receive_authentication_request(&request(rand, autn, 3));

    assert_eq!(host.failures.len(), 1);
    assert_eq!(host.failures[0].cause, nas_auth_core::AuthFailureCause::NgksiAlreadyInUse);
}

#[test]
fn scenario_5_three_failures_then_trip_suppresses_emission() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let mut autn = build_autn(&k, &opc, &rand, &sqn, &amf);
    autn[15] ^= 0xff;

    let config = usim_config();
    let mut state = UsimAuthState::new();
    let mut sqn_mgr = FixedSqn { current: sqn, accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), cm_connected: true, ..Default::default() };

    for i in 0..4 {
        let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
        ctl.receive_authentication_request(&request(rand, autn, (i % 7) as u8));
    }

    assert_eq!(host.failures.len(), 3);
    assert_eq!(state.nw_consecutive_auth_failure, 3);
    assert!(host.local_release_requested);
    assert!(!host.t3520_running);
}

const AT_RAND: u8 = 1;
const AT_AUTN: u8 = 2;
const AT_MAC: u8 = 11;
const AT_KDF_INPUT: u8 = 23;
const AT_KDF: u8 = 24;

fn push_attr(
    out: &mut Vec<u8>,
    typ: u8,
    value: &[u8],
) {
    let len_words = (2 + 2 + value.len()) / 4;
    out.push(typ);
    out.push(len_words as u8);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(value);
}

/// Builds a well-formed EAP-AKA' `AKA_CHALLENGE` request with a correctly
/// computed `AT_MAC`, mirroring the attribute layout `eap::AkaChallenge`
/// parses.
fn build_aka_prime_challenge_request(
    identifier: u8,
    rand: &[u8; 16],
    autn: &[u8; 16],
    kdf_input: &str,
    k_aut: &[u8; 32],
) -> Vec<u8> {
    let mut body = vec![1u8, 0, 0]; // SUBTYPE_AKA_CHALLENGE + reserved
    push_attr(&mut body, AT_RAND, rand);
    push_attr(&mut body, AT_AUTN, autn);

    // AT_KDF_INPUT: type+len(2) ‖ actual-length(2) ‖ content padded to a
    // 4-byte boundary; the length word covers the whole attribute, header
    // included, so it is `(4 + padded_len) / 4`, not `(2 + padded_len) / 4`.
    body.push(AT_KDF_INPUT);
    let padded_len = kdf_input.len().div_ceil(4) * 4;
    body.push(((4 + padded_len) / 4) as u8);
    body.extend_from_slice(&(kdf_input.len() as u16).to_be_bytes());
    body.extend_from_slice(kdf_input.as_bytes());
    for _ in 0..(padded_len - kdf_input.len()) {
        body.push(0);
    }

    body.push(AT_KDF);
    body.push(1);
    body.extend_from_slice(&1u16.to_be_bytes());

    let mac_attr_start = body.len();
    push_attr(&mut body, AT_MAC, &[0u8; 16]);
    // `body` still carries its 3-byte subtype+reserved prefix here, which
    // `AkaChallenge::parse` strips before indexing attributes, so the value
    // lands 9 bytes past the attribute's start within the full packet
    // (5-byte EAP header + type/len/reserved bytes preceding the value).
    let mac_value_offset = mac_attr_start + 9;

    let mut packet = vec![1u8, identifier, 0, 0, nas_auth_core::eap::EAP_TYPE_AKA_PRIME];
    packet.append(&mut body);
    let len = packet.len() as u16;
    packet[2..4].copy_from_slice(&len.to_be_bytes());

    let mac = nas_auth_core::kdf::calculate_mac_eap_aka_prime(k_aut, &packet);
    packet[mac_value_offset..mac_value_offset + 16].copy_from_slice(&mac);
    packet
}

#[test]
fn scenario_6_eap_aka_prime_success_derives_k_ausf_from_mk() {
    let k = hex16("465b5ce8b199b49faa5f0a2ee238a6bc");
    let opc = hex16("cd63cb71954a9f4e48a5994e37a02baf");
    let rand = hex16("23553cbe9637a89d218ae64dae47bf35");
    let sqn = hex6("ff9bb4d0b607");
    let amf = hex2("b9b9");
    let autn = build_autn(&k, &opc, &rand, &sqn, &amf);
    let snn = "5G:mnc001.mcc001.3gppnetwork.org";

    let milenage = nas_auth_core::milenage::compute(&opc, &k, &rand, &sqn, &amf);
    let sqn_xor_ak = nas_auth_core::octet::xor_arrays(&sqn, &milenage.ak);
    let (ck_prime, ik_prime) =
        nas_auth_core::kdf::calculate_ck_prime_ik_prime(&milenage.ck, &milenage.ik, snn, &sqn_xor_ak);
    let supi = "imsi-001010000000001";
    let mk = nas_auth_core::kdf::calculate_mk(&ck_prime, &ik_prime, supi);
    let k_aut = nas_auth_core::kdf::k_aut(&mk);
    let expected_k_ausf = nas_auth_core::kdf::calculate_k_ausf_eap_aka_prime(&mk);

    let eap_request = build_aka_prime_challenge_request(11, &rand, &autn, snn, &k_aut);

    let config = usim_config();
    let mut state = UsimAuthState::new();
    let mut sqn_mgr = FixedSqn { current: sqn, accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    let msg = AuthenticationRequest {
        ng_ksi: NgKsiIe { tsc: SecurityContextType::Native, ksi: NgKsi::new(0) },
        abba: vec![0x00, 0x00],
        rand: None,
        autn: None,
        eap_message: Some(eap_request),
    };
    ctl.receive_authentication_request(&msg);

    assert_eq!(host.responses.len(), 1);
    let response = match &host.responses[0] {
        AuthenticationResponse::Eap(bytes) => bytes,
        other => panic!("expected an EAP response, got {other:?}"),
    };
    // EAP-Response / AKA-Challenge carrying AT_RES/AT_KDF/AT_MAC.
    assert_eq!(response[0], nas_auth_core::eap::EAP_CODE_RESPONSE);
    assert_eq!(response[4], nas_auth_core::eap::EAP_TYPE_AKA_PRIME);
    assert_eq!(response[5], nas_auth_core::eap::SUBTYPE_AKA_CHALLENGE);

    let staged = state.non_current_ns_ctx.as_ref().expect("security context staged");
    assert_eq!(staged.keys.k_ausf, expected_k_ausf);
    assert_eq!(expected_k_ausf.as_slice(), &mk[144..176]);
    assert!(host.failures.is_empty());
}

#[test]
fn scenario_7_authentication_reject_tears_down_state() {
    let config = usim_config();
    let mut state = UsimAuthState::new();
    state.rand = Some([1; 16]);
    state.res_star = Some([2; 16]);
    let mut sqn_mgr = FixedSqn { current: [0; 6], accept: true };
    let mut host = FakeHost { plmn: Some(scenario_1_plmn()), ..Default::default() };

    let mut ctl = Controller::new(&mut host, &mut sqn_mgr, &config, &mut state);
    ctl.receive_authentication_reject(&nas_auth_core::messages::AuthenticationReject {
        eap_message: None,
    });

    assert!(state.rand.is_none());
    assert!(state.res_star.is_none());
    assert!(!state.valid);
    assert!(host.roaming_not_allowed);
    assert!(host.guti_cleared);
    assert!(host.deregistered_ps);
}
