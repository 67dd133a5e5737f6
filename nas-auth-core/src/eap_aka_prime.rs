//! C5 — EAP-AKA' handler (spec §4.5).

use tracing::instrument;

use crate::autn::{self, AutnOutcome, SqnManager};
use crate::controller::{Controller, HandlerOutcome, NasHost};
use crate::eap::{self, AkaChallenge};
use crate::error::AuthFailureCause;
use crate::kdf;
use crate::messages::{AuthenticationRequest, AuthenticationResponse, MmStatus};
use crate::milenage;

#[instrument(skip_all)]
pub(crate) fn handle<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    msg: &AuthenticationRequest,
    eap_packet: &[u8],
) -> HandlerOutcome {
    let challenge = match AkaChallenge::parse(eap_packet) {
        Ok(c) => c,
        Err(_) => {
            ctl.host.send_mm_status(MmStatus {
                cause: AuthFailureCause::SemanticallyIncorrectMessage,
            });
            return HandlerOutcome::Handled;
        }
    };

    let snn = ctl
        .plmn()
        .map(|plmn| plmn.serving_network_name())
        .unwrap_or_default();

    if challenge.kdf != 1 {
        if ctl.network_failing_the_auth_check(true) {
            return HandlerOutcome::Handled;
        }
        ctl.host.start_t3520();
        send_eap(ctl, eap::build_authentication_reject(challenge.identifier));
        return HandlerOutcome::Handled;
    }
    if challenge.kdf_input != snn.as_bytes() {
        ctl.host.start_t3520();
        send_eap(ctl, eap::build_authentication_reject(challenge.identifier));
        return HandlerOutcome::Handled;
    }

    if ctl.check_ngksi_preconditions(msg.ng_ksi).is_err() {
        return HandlerOutcome::Handled;
    }

    let opc = ctl.config.opc();
    let k = ctl.config.k.0;

    // Unlike 5G-AKA, T3516 starts unconditionally on this path (spec §4.5).
    ctl.host.start_t3516();
    let validated = match autn::validate(ctl.sqn, &opc, &k, &challenge.rand, &challenge.autn) {
        Ok(v) => v,
        Err(AutnOutcome::MacFailure) => {
            return reject(ctl, &challenge, AutnOutcome::MacFailure);
        }
        Err(AutnOutcome::SynchronisationFailure) => {
            return synch_failure(ctl, &challenge, &opc, &k);
        }
        Err(AutnOutcome::AmfSeparationBitFailure) => {
            return reject(ctl, &challenge, AutnOutcome::AmfSeparationBitFailure);
        }
        Err(AutnOutcome::Ok) => unreachable!("Ok is never returned as an Err"),
    };

    let (ck_prime, ik_prime) = {
        let sqn_xor_ak = crate::octet::xor_arrays(&validated.received_sqn, &validated.milenage.ak);
        kdf::calculate_ck_prime_ik_prime(&validated.milenage.ck, &validated.milenage.ik, &snn, &sqn_xor_ak)
    };
    let mk = kdf::calculate_mk(&ck_prime, &ik_prime, ctl.config.supi.as_str());
    let k_aut = kdf::k_aut(&mk);

    let zeroed = challenge.bytes_with_zeroed_mac();
    let expected_mac = kdf::calculate_mac_eap_aka_prime(&k_aut, &zeroed);

    if expected_mac != challenge.mac {
        if ctl.network_failing_the_auth_check(true) {
            ctl.state.clear_challenge();
            ctl.host.stop_t3516();
            return HandlerOutcome::Handled;
        }
        ctl.host.start_t3520();
        send_eap(ctl, eap::build_client_error(challenge.identifier));
        ctl.state.clear_challenge();
        ctl.host.stop_t3516();
        return HandlerOutcome::Handled;
    }

    let k_ausf = kdf::calculate_k_ausf_eap_aka_prime(&mk);
    ctl.state.rand = Some(challenge.rand);
    ctl.state.res_star = None;
    ctl.stage_security_context(msg.ng_ksi.ksi, k_ausf, msg.abba.clone());

    let mut response = eap::build_challenge_response(challenge.identifier, &validated.milenage.res);
    let mac = kdf::calculate_mac_eap_aka_prime(&k_aut, &response);
    eap::patch_mac(&mut response, &mac);
    send_eap(ctl, response);

    HandlerOutcome::Handled
}

fn reject<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    challenge: &AkaChallenge,
    outcome: AutnOutcome,
) -> HandlerOutcome {
    if ctl.network_failing_the_auth_check(true) {
        return HandlerOutcome::Handled;
    }
    ctl.host.start_t3520();
    let packet = match outcome {
        AutnOutcome::MacFailure => eap::build_authentication_reject(challenge.identifier),
        AutnOutcome::AmfSeparationBitFailure => eap::build_client_error(challenge.identifier),
        _ => unreachable!("reject() only called for MacFailure/AmfSeparationBitFailure"),
    };
    send_eap(ctl, packet);
    HandlerOutcome::Handled
}

fn synch_failure<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    challenge: &AkaChallenge,
    opc: &[u8; 16],
    k: &[u8; 16],
) -> HandlerOutcome {
    if ctl.network_failing_the_auth_check(true) {
        return HandlerOutcome::Handled;
    }
    ctl.host.start_t3520();
    let current_sqn = ctl.sqn.get_sqn();
    let resync = milenage::compute(opc, k, &challenge.rand, &current_sqn, &milenage::DUMMY_AMF);
    let auts = kdf::calculate_auts(&current_sqn, &resync.ak_r, &resync.mac_s);
    send_eap(ctl, eap::build_synchronization_failure(challenge.identifier, &auts));
    HandlerOutcome::Handled
}

fn send_eap<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    packet: Vec<u8>,
) {
    ctl.host
        .send_authentication_response(AuthenticationResponse::Eap(packet));
}
