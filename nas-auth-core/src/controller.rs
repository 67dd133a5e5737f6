//! C7 — procedure controller (spec §4.7): entry dispatch, ngKSI collision
//! checks, consecutive-failure accounting, timer control, security-context
//! staging and the Authentication-Reject teardown.

use tracing::warn;

use crate::aka5g;
use crate::autn::SqnManager;
use crate::eap_aka_prime;
use crate::error::AuthFailureCause;
use crate::kdf;
use crate::messages::{
    AuthenticationReject, AuthenticationRequest, AuthenticationResult,
};
use crate::plmn::Plmn;
use crate::usim::{NasSecurityContext, NgKsiIe, UsimAuthState, UsimConfig};

/// Everything the controller needs from the host NAS task: message
/// emission, timer control, registration/connection state, and the current
/// PLMN (spec §1 "out of scope (external collaborators)").
pub trait NasHost {
    fn send_authentication_response(
        &mut self,
        resp: crate::messages::AuthenticationResponse,
    );
    fn send_authentication_failure(
        &mut self,
        fail: crate::messages::AuthenticationFailure,
    );
    fn send_mm_status(
        &mut self,
        status: crate::messages::MmStatus,
    );

    fn start_t3516(&mut self);
    fn stop_t3516(&mut self);
    fn start_t3520(&mut self);
    fn stop_t3520(&mut self);
    fn stop_t3510(&mut self);
    fn stop_t3517(&mut self);
    fn stop_t3519(&mut self);
    fn stop_t3521(&mut self);

    fn current_plmn(&self) -> Option<Plmn>;
    fn is_cm_connected(&self) -> bool;
    fn request_local_connection_release(
        &mut self,
        reason: &str,
    );

    fn clear_guti_and_tai_list(&mut self);
    fn set_update_status_roaming_not_allowed(&mut self);
    fn transition_mm_deregistered_ps(&mut self);
}

/// Result a method handler (C4/C5/C6) hands back to the controller once it
/// has sent (or suppressed) its NAS response.
pub(crate) enum HandlerOutcome {
    Handled,
}

/// Owns one procedure's view of USIM state and its host collaborators.
/// Constructed fresh per inbound message by the embedding NAS task.
pub struct Controller<'a, H: NasHost, Q: SqnManager> {
    pub(crate) host: &'a mut H,
    pub(crate) sqn: &'a mut Q,
    pub(crate) config: &'a UsimConfig,
    pub(crate) state: &'a mut UsimAuthState,
    /// Open Question (spec §9): "received RAND equals stored RAND ⇒ skip
    /// AUTN" is preserved but exposed as a toggle rather than hard-wired.
    pub rand_replay_optimisation: bool,
}

impl<'a, H: NasHost, Q: SqnManager> Controller<'a, H, Q> {
    pub fn new(
        host: &'a mut H,
        sqn: &'a mut Q,
        config: &'a UsimConfig,
        state: &'a mut UsimAuthState,
    ) -> Self {
        Controller { host, sqn, config, state, rand_replay_optimisation: true }
    }

    /// `networkFailingTheAuthCheck` (spec §4.7). Returns `true` when the
    /// caller must suppress its own failure emission because the trip
    /// limit was reached.
    pub(crate) fn network_failing_the_auth_check(
        &mut self,
        has_chance: bool,
    ) -> bool {
        if has_chance && self.state.nw_consecutive_auth_failure < 3 {
            self.state.nw_consecutive_auth_failure += 1;
            false
        } else {
            warn!(
                count = self.state.nw_consecutive_auth_failure,
                "network failed the authentication check too many times"
            );
            if self.host.is_cm_connected() {
                self.host.request_local_connection_release("auth-failed");
            }
            self.host.stop_t3520();
            true
        }
    }

    /// ngKSI preconditions shared by C4 and C5 (spec §4.4/§4.5). `Ok(())`
    /// means the caller should proceed; `Err(())` means a response (or
    /// nothing, if tripped) has already been sent and the caller must
    /// return.
    pub(crate) fn check_ngksi_preconditions(
        &mut self,
        ng_ksi: NgKsiIe,
    ) -> Result<(), ()> {
        use crate::usim::SecurityContextType;

        if ng_ksi.tsc != SecurityContextType::Native {
            self.host.send_authentication_failure(crate::messages::AuthenticationFailure {
                cause: AuthFailureCause::UnspecifiedProtocolError,
                auts: None,
            });
            return Err(());
        }
        if !ng_ksi.ksi.is_available() {
            self.host.send_authentication_failure(crate::messages::AuthenticationFailure {
                cause: AuthFailureCause::UnspecifiedProtocolError,
                auts: None,
            });
            return Err(());
        }

        let collides = self
            .state
            .current_ns_ctx
            .as_ref()
            .is_some_and(|ctx| ctx.ng_ksi == ng_ksi.ksi)
            || self
                .state
                .non_current_ns_ctx
                .as_ref()
                .is_some_and(|ctx| ctx.ng_ksi == ng_ksi.ksi);
        if collides {
            self.host.start_t3520();
            if self.network_failing_the_auth_check(true) {
                return Err(());
            }
            self.host.send_authentication_failure(crate::messages::AuthenticationFailure {
                cause: AuthFailureCause::NgksiAlreadyInUse,
                auts: None,
            });
            return Err(());
        }

        Ok(())
    }

    /// Stages a fresh `nonCurrentNsCtx` and runs `DeriveKeysSeafAmf`,
    /// shared by the 5G-AKA and EAP-AKA' success paths (spec §4.4/§4.5).
    pub(crate) fn stage_security_context(
        &mut self,
        ng_ksi: crate::usim::NgKsi,
        k_ausf: [u8; 32],
        abba: Vec<u8>,
    ) {
        let k_seaf = kdf::calculate_k_seaf(&k_ausf, &self.serving_network_name());
        let k_amf = kdf::calculate_k_amf(&k_seaf, self.config.supi.as_str(), &abba);
        self.state.non_current_ns_ctx = Some(NasSecurityContext {
            tsc: crate::usim::SecurityContextType::Native,
            ng_ksi,
            keys: crate::usim::SecurityKeys { k_ausf, k_seaf, k_amf, abba },
        });
        self.state.nw_consecutive_auth_failure = 0;
        self.host.stop_t3520();
    }

    fn serving_network_name(&self) -> String {
        self.host
            .current_plmn()
            .map(|plmn| plmn.serving_network_name())
            .unwrap_or_default()
    }

    pub(crate) fn plmn(&self) -> Option<Plmn> {
        self.host.current_plmn()
    }

    /// Every failure path in C4/C5 clears `rand`/`resStar` and stops T3516
    /// (spec §4.4 "every failure path...", invariant 1 in §3).
    pub(crate) fn clear_challenge_and_stop_t3516(&mut self) {
        self.state.clear_challenge();
        self.host.stop_t3516();
    }

    /// Entry point for `AuthenticationRequest` (spec §4.7).
    pub fn receive_authentication_request(
        &mut self,
        msg: &AuthenticationRequest,
    ) {
        if !self.state.valid {
            warn!("ignoring AuthenticationRequest: USIM is invalid");
            return;
        }
        self.host.start_t3520();
        if self.plmn().is_none() {
            return;
        }

        match &msg.eap_message {
            Some(eap) => {
                // EAP type byte is the 5th octet of the EAP header.
                let eap_type = eap.get(4).copied();
                match eap_type {
                    Some(crate::eap::EAP_TYPE_AKA_PRIME) => {
                        let _: HandlerOutcome = eap_aka_prime::handle(self, msg, eap);
                    }
                    #[cfg(feature = "eap-tls")]
                    Some(crate::eap::EAP_TYPE_TLS) => {
                        let _: HandlerOutcome = crate::eap_tls::handle(self, msg, eap);
                    }
                    _ => {
                        self.host.send_mm_status(crate::messages::MmStatus {
                            cause: AuthFailureCause::SemanticallyIncorrectMessage,
                        });
                    }
                }
            }
            None => {
                let _: HandlerOutcome = aka5g::handle(self, msg);
            }
        }
    }

    /// Entry point for `AuthenticationResult` (spec §4.7).
    pub fn receive_authentication_result(
        &mut self,
        msg: &AuthenticationResult,
    ) {
        if let Some(abba) = &msg.abba {
            if let Some(ctx) = self.state.non_current_ns_ctx.as_mut() {
                ctx.keys.abba = abba.clone();
            }
        }

        let code = msg.eap_message.first().copied();
        match code {
            Some(crate::eap::EAP_CODE_SUCCESS) => {}
            Some(crate::eap::EAP_CODE_FAILURE) => self.receive_eap_failure_message(),
            other => warn!(?other, "ignoring AuthenticationResult with unexpected EAP code"),
        }
    }

    fn receive_eap_failure_message(&mut self) {
        self.state.non_current_ns_ctx = None;
    }

    /// Entry point for `AuthenticationReject` (spec §4.7).
    pub fn receive_authentication_reject(
        &mut self,
        msg: &AuthenticationReject,
    ) {
        self.state.clear_challenge();
        self.host.stop_t3516();

        if let Some(eap) = &msg.eap_message {
            if eap.first().copied() == Some(crate::eap::EAP_CODE_FAILURE) {
                self.receive_eap_failure_message();
            }
        }

        self.host.set_update_status_roaming_not_allowed();
        self.host.clear_guti_and_tai_list();
        self.state.current_ns_ctx = None;
        self.state.non_current_ns_ctx = None;
        self.state.valid = false;

        self.host.stop_t3510();
        self.host.stop_t3516();
        self.host.stop_t3517();
        self.host.stop_t3519();
        self.host.stop_t3521();

        self.host.transition_mm_deregistered_ps();
    }
}
