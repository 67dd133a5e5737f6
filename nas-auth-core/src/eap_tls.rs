//! C6 — EAP-TLS handler (spec §4.6). Experimental: an implementer MAY omit
//! this component while still satisfying 5G-AKA/EAP-AKA' conformance (spec
//! §4.6, §9).
//!
//! A `statig` state machine (`#[state_machine]` over `#[state]` methods
//! taking `(&mut self, context: &mut C, event: &E) -> Response<State>`,
//! driven via `handle_with_context`) drives a synchronous
//! `TLS_START -> TLS_HANDSHAKE -> TLS_DONE` cycle, one inbound fragment at a
//! time.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use openssl::pkey::PKey;
use openssl::ssl::{
    HandshakeError, MidHandshakeSslStream, SslConnector, SslMethod, SslStream, SslVerifyMode,
    SslVersion,
};
use openssl::x509::X509;
use serde::Deserialize;
use statig::prelude::*;
use zeroize::Zeroize;

use crate::autn::SqnManager;
use crate::controller::{Controller, HandlerOutcome, NasHost};
use crate::error::{AuthFailureCause, EapTlsError};
use crate::messages::{AuthenticationRequest, AuthenticationResponse, MmStatus};

/// The EAP-TLS client material (spec §3/§6 configuration).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EapTlsConfig {
    pub ca_certificate: PathBuf,
    pub client_certificate: PathBuf,
    pub client_private_key: PathBuf,
    pub client_password: String,
}

impl Drop for EapTlsConfig {
    fn drop(&mut self) {
        self.client_password.zeroize();
    }
}

const EAP_START_FLAG: u8 = 0x20;
/// The `keyMaterial` export length and the `[64..96)` KAUSF slice are
/// implementation choices, not normative 3GPP behaviour (spec §9 Open
/// Questions).
const KEY_MATERIAL_LEN: usize = 128;
const KAUSF_RANGE: std::ops::Range<usize> = 64..96;
const EXPORT_LABEL: &str = "client EAP encryption";

/// A duplex in-memory byte pipe standing in for the TCP socket a normal TLS
/// client would own: inbound NAS fragments are pushed in, and bytes OpenSSL
/// writes are collected for the next outbound NAS fragment. Reads return
/// `WouldBlock` once drained, which is what drives OpenSSL's non-blocking
/// handshake stepping one fragment at a time.
struct MemoryDuplex {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

impl MemoryDuplex {
    fn new() -> Self {
        MemoryDuplex { inbound: VecDeque::new(), outbound: Vec::new() }
    }

    fn take_outbound(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbound)
    }
}

impl Read for MemoryDuplex {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        if self.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no fragment queued"));
        }
        let n = buf.len().min(self.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbound.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }
}

impl Write for MemoryDuplex {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn build_connector(config: &EapTlsConfig) -> Result<SslConnector, EapTlsError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_verify(SslVerifyMode::PEER);

    let ca_pem = std::fs::read(&config.ca_certificate).map_err(|source| EapTlsError::CertFile {
        path: config.ca_certificate.clone(),
        source,
    })?;
    builder.cert_store_mut().add_cert(X509::from_pem(&ca_pem)?)?;

    let cert_pem = std::fs::read(&config.client_certificate).map_err(|source| EapTlsError::CertFile {
        path: config.client_certificate.clone(),
        source,
    })?;
    builder.set_certificate(&X509::from_pem(&cert_pem)?)?;

    let key_pem = std::fs::read(&config.client_private_key).map_err(|source| EapTlsError::CertFile {
        path: config.client_private_key.clone(),
        source,
    })?;
    // The password is supplied only when the key actually requests one
    // (spec §4.6: "provided only when the key requests the default
    // password").
    let key = PKey::private_key_from_pem(&key_pem)
        .or_else(|_| PKey::private_key_from_pem_passphrase(&key_pem, config.client_password.as_bytes()))
        .map_err(|_| EapTlsError::PrivateKey)?;
    builder.set_private_key(&key)?;

    Ok(builder.build())
}

enum Handshake {
    InProgress(MidHandshakeSslStream<MemoryDuplex>),
    Established(SslStream<MemoryDuplex>),
}

/// One inbound EAP-TLS fragment, carried as a `statig` event.
struct Fragment {
    start_flag: bool,
    data: Vec<u8>,
}

/// The mutable context `statig` threads through each state handler,
/// alongside `&mut self`. Carries the read-only client config in and the
/// per-call result out.
struct TlsContext<'a> {
    config: &'a EapTlsConfig,
    outbound: Vec<u8>,
    k_ausf: Option<[u8; 32]>,
    failed: bool,
}

/// The per-USIM EAP-TLS session (spec §3 "EAP-TLS session state"). Held
/// across successive `AuthenticationRequest` messages in
/// [`crate::usim::UsimAuthState`]; a fresh connector is built entering
/// `TLS_START` and the whole TLS/BIO resource set is dropped entering
/// `TLS_DONE`.
#[derive(Default)]
pub struct EapTlsSession {
    handshake: Option<Handshake>,
}

#[state_machine(initial = "State::tls_start()", state(derive(Debug)))]
impl EapTlsSession {
    #[state]
    fn tls_start(
        &mut self,
        context: &mut TlsContext,
        event: &Fragment,
    ) -> Response<State> {
        if !event.start_flag {
            context.failed = true;
            return Handled;
        }
        let connector = match build_connector(context.config) {
            Ok(c) => c,
            Err(_) => {
                context.failed = true;
                return Handled;
            }
        };
        match connector.connect("", MemoryDuplex::new()) {
            Ok(_) => unreachable!("handshake cannot complete before any bytes are exchanged"),
            Err(HandshakeError::WouldBlock(mut mid)) => {
                context.outbound = mid.get_mut().take_outbound();
                self.handshake = Some(Handshake::InProgress(mid));
                Transition(State::tls_handshake())
            }
            Err(_) => {
                context.failed = true;
                Handled
            }
        }
    }

    #[state]
    fn tls_handshake(
        &mut self,
        context: &mut TlsContext,
        event: &Fragment,
    ) -> Response<State> {
        let mut mid = match self.handshake.take() {
            Some(Handshake::InProgress(mid)) => mid,
            _ => {
                context.failed = true;
                return Handled;
            }
        };
        mid.get_mut().inbound.extend(event.data.iter().copied());

        match mid.handshake() {
            Ok(mut established) => {
                let mut keying = vec![0u8; KEY_MATERIAL_LEN];
                let exported = established
                    .ssl()
                    .export_keying_material(&mut keying, EXPORT_LABEL, None)
                    .is_ok();
                if !exported {
                    context.failed = true;
                    self.handshake = Some(Handshake::Established(established));
                    return Handled;
                }
                let mut k_ausf = [0u8; 32];
                k_ausf.copy_from_slice(&keying[KAUSF_RANGE]);
                context.k_ausf = Some(k_ausf);
                context.outbound = Vec::new();
                self.handshake = Some(Handshake::Established(established));
                Transition(State::tls_done())
            }
            Err(HandshakeError::WouldBlock(mut mid)) => {
                context.outbound = mid.get_mut().take_outbound();
                self.handshake = Some(Handshake::InProgress(mid));
                Handled
            }
            Err(_) => {
                context.failed = true;
                Handled
            }
        }
    }

    #[state]
    fn tls_done(
        &mut self,
        context: &mut TlsContext,
        _event: &Fragment,
    ) -> Response<State> {
        // Releasing `self.handshake` drops the SSL object, private key and
        // both memory buffers; a new procedure re-enters at `TLS_START`.
        self.handshake = None;
        context.outbound = Vec::new();
        Transition(State::tls_start())
    }
}

/// Entry point invoked by the controller for EAP type `EAP-TLS` (spec
/// §4.6/§4.7).
pub(crate) fn handle<H: NasHost, Q: SqnManager>(
    ctl: &mut Controller<'_, H, Q>,
    msg: &AuthenticationRequest,
    eap_packet: &[u8],
) -> HandlerOutcome {
    if ctl.check_ngksi_preconditions(msg.ng_ksi).is_err() {
        return HandlerOutcome::Handled;
    }

    let config = match &ctl.config.eap_tls {
        Some(c) => c.clone(),
        None => {
            ctl.host.send_mm_status(MmStatus { cause: AuthFailureCause::SemanticallyIncorrectMessage });
            return HandlerOutcome::Handled;
        }
    };

    if eap_packet.len() < 6 {
        ctl.host.send_mm_status(MmStatus { cause: AuthFailureCause::SemanticallyIncorrectMessage });
        return HandlerOutcome::Handled;
    }
    let flags = eap_packet[5];
    let fragment = Fragment {
        start_flag: flags & EAP_START_FLAG != 0,
        data: eap_packet[6..].to_vec(),
    };

    let session =
        ctl.state.eap_tls_session.get_or_insert_with(|| EapTlsSession::default().state_machine());
    let mut tls_context = TlsContext { config: &config, outbound: Vec::new(), k_ausf: None, failed: false };
    session.handle_with_context(&fragment, &mut tls_context);

    if tls_context.failed {
        ctl.host.send_mm_status(MmStatus { cause: AuthFailureCause::SemanticallyIncorrectMessage });
        return HandlerOutcome::Handled;
    }

    if let Some(k_ausf) = tls_context.k_ausf {
        ctl.stage_security_context(msg.ng_ksi.ksi, k_ausf, msg.abba.clone());
    }

    ctl.host
        .send_authentication_response(AuthenticationResponse::Eap(tls_context.outbound));
    HandlerOutcome::Handled
}
