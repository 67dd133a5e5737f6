//! C4 — 5G-AKA handler (spec §4.4).

use tracing::instrument;

use crate::autn::{self, AutnOutcome, SqnManager};
use crate::controller::{Controller, HandlerOutcome, NasHost};
use crate::error::AuthFailureCause;
use crate::kdf;
use crate::messages::{AuthenticationFailure, AuthenticationRequest, AuthenticationResponse};
use crate::milenage;

#[instrument(skip_all)]
pub(crate) fn handle<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    msg: &AuthenticationRequest,
) -> HandlerOutcome {
    let (rand, autn) = match (msg.rand, msg.autn) {
        (Some(r), Some(a)) => (r, a),
        _ => {
            ctl.host.send_authentication_failure(AuthenticationFailure {
                cause: AuthFailureCause::SemanticallyIncorrectMessage,
                auts: None,
            });
            ctl.clear_challenge_and_stop_t3516();
            return HandlerOutcome::Handled;
        }
    };

    if ctl.check_ngksi_preconditions(msg.ng_ksi).is_err() {
        return HandlerOutcome::Handled;
    }

    let snn = ctl
        .plmn()
        .map(|plmn| plmn.serving_network_name())
        .unwrap_or_default();
    let opc = ctl.config.opc();
    let k = ctl.config.k.0;

    // Open Question (spec §9): preserved, but toggleable.
    let replay = ctl.rand_replay_optimisation && ctl.state.rand == Some(rand);

    let outcome = if replay {
        // The network is retransmitting; RES* is still recomputed against
        // the SQN already on file rather than re-running AUTN validation.
        let sqn = ctl.sqn.get_sqn();
        Ok(milenage::compute(&opc, &k, &rand, &sqn, &ctl.config.amf))
    } else {
        ctl.host.start_t3516();
        match autn::validate(ctl.sqn, &opc, &k, &rand, &autn) {
            Ok(validated) => Ok(validated.milenage),
            Err(e) => Err(e),
        }
    };

    match outcome {
        Ok(milenage) => {
            // SQN⊕AK is the wire value itself (AUTN's first 6 bytes), not
            // whatever the SQN manager now holds — `check_sqn` may already
            // have advanced the stored SQN past the one this challenge used.
            let sqn_xor_ak: [u8; 6] = autn[0..6].try_into().expect("AUTN is 16 bytes");
            accept(ctl, msg, rand, &snn, &milenage, &sqn_xor_ak);
        }
        Err(AutnOutcome::MacFailure) => {
            if ctl.network_failing_the_auth_check(true) {
                ctl.clear_challenge_and_stop_t3516();
                return HandlerOutcome::Handled;
            }
            ctl.host.start_t3520();
            ctl.host.send_authentication_failure(AuthenticationFailure {
                cause: AuthFailureCause::MacFailure,
                auts: None,
            });
            ctl.clear_challenge_and_stop_t3516();
        }
        Err(AutnOutcome::SynchronisationFailure) => {
            if ctl.network_failing_the_auth_check(true) {
                ctl.clear_challenge_and_stop_t3516();
                return HandlerOutcome::Handled;
            }
            ctl.host.start_t3520();
            let current_sqn = ctl.sqn.get_sqn();
            let resync = milenage::compute(&opc, &k, &rand, &current_sqn, &milenage::DUMMY_AMF);
            let auts = kdf::calculate_auts(&current_sqn, &resync.ak_r, &resync.mac_s);
            ctl.host.send_authentication_failure(AuthenticationFailure {
                cause: AuthFailureCause::SynchFailure,
                auts: Some(auts),
            });
            ctl.clear_challenge_and_stop_t3516();
        }
        Err(AutnOutcome::AmfSeparationBitFailure) => {
            if ctl.network_failing_the_auth_check(true) {
                ctl.clear_challenge_and_stop_t3516();
                return HandlerOutcome::Handled;
            }
            ctl.host.start_t3520();
            ctl.host.send_authentication_failure(AuthenticationFailure {
                cause: AuthFailureCause::Non5gAuthenticationUnacceptable,
                auts: None,
            });
            ctl.clear_challenge_and_stop_t3516();
        }
        Err(AutnOutcome::Ok) => unreachable!("Ok is carried as the Result's Ok variant"),
    }

    HandlerOutcome::Handled
}

fn accept<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    msg: &AuthenticationRequest,
    rand: [u8; 16],
    snn: &str,
    milenage: &milenage::MilenageOutput,
    sqn_xor_ak: &[u8; 6],
) {
    let k_ausf = kdf::calculate_k_ausf_5g_aka(&milenage.ck, &milenage.ik, snn, sqn_xor_ak);
    let res_star = kdf::calculate_res_star(&milenage.ck, &milenage.ik, snn, &rand, &milenage.res);

    ctl.state.rand = Some(rand);
    ctl.state.res_star = Some(res_star);

    ctl.stage_security_context(msg.ng_ksi.ksi, k_ausf, msg.abba.clone());
    ctl.host
        .send_authentication_response(AuthenticationResponse::ResStar(res_star));
}
