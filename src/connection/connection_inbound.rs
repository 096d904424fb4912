use std::net::SocketAddr;

use stun::attributes::{ATTR_ICE_CONTROLLED, ATTR_ICE_CONTROLLING, ATTR_USERNAME};
use stun::error_code::{ErrorCode, ErrorCodeAttribute, CODE_ROLE_CONFLICT, CODE_UNAUTHORIZED};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{
    Getter, Message, Setter, BINDING_ERROR, BINDING_SUCCESS, CLASS_ERROR_RESPONSE,
    CLASS_INDICATION, CLASS_REQUEST, CLASS_SUCCESS_RESPONSE, METHOD_BINDING,
};
use stun::textattrs::TextAttribute;
use stun::xoraddr::XorMappedAddress;
use tokio::time::Instant;

use super::Connection;
use crate::attr::*;
use crate::candidate::{CandidatePairState, CandidateType};
use crate::error::{Error, Result};

enum RoleDecision {
    Keep,
    Switched,
    Conflict,
}

impl Connection {
    pub(crate) async fn handle_stun(&self, m: &mut Message, now: Instant) -> Result<()> {
        if m.typ.class == CLASS_REQUEST {
            if m.typ.method == METHOD_BINDING || is_goog_ping_request(m.typ) {
                return self.handle_binding_or_goog_ping_request(m, now).await;
            }
        } else if m.typ.class == CLASS_SUCCESS_RESPONSE || m.typ.class == CLASS_ERROR_RESPONSE {
            return self.handle_response(m, now).await;
        } else if m.typ.class == CLASS_INDICATION && m.typ.method == METHOD_BINDING {
            return self.handle_indication(now).await;
        }

        log::trace!(
            "[{}]: {} unhandled STUN class({}) method({})",
            self.name(),
            self.id(),
            m.typ.class,
            m.typ.method
        );
        Err(Error::ErrUnhandledStunMessage)
    }

    /// Answers a Binding Request or its GOOG_PING equivalent, after
    /// credentials and role agreement are established.
    pub(crate) async fn handle_binding_or_goog_ping_request(
        &self,
        m: &mut Message,
        now: Instant,
    ) -> Result<()> {
        let is_goog = is_goog_ping_request(m.typ);
        let (dst, local_pwd, local_ufrag, remote_ufrag) = {
            let inner = self.inner.lock();
            (
                inner.remote_candidate.addr,
                inner.local_candidate.pwd.clone(),
                inner.local_candidate.ufrag.clone(),
                inner.remote_candidate.ufrag.clone(),
            )
        };

        if let Err(err) = self.authenticate_request(m, is_goog, &local_pwd, &local_ufrag, &remote_ufrag)
        {
            log::warn!(
                "[{}]: {} discarding request from {}: {}",
                self.name(),
                self.id(),
                dst,
                err
            );
            // A 401 cannot be integrity-protected; the peer has proven no key.
            let raw = error_response(m, is_goog, CODE_UNAUTHORIZED, None)?;
            self.send_response(&raw, dst).await;
            return Err(err);
        }

        if !is_goog {
            match self.resolve_role_conflict(m) {
                RoleDecision::Keep | RoleDecision::Switched => {}
                RoleDecision::Conflict => {
                    let raw =
                        error_response(m, false, CODE_ROLE_CONFLICT, Some(&local_pwd))?;
                    self.send_response(&raw, dst).await;
                    return Err(Error::ErrRoleConflict);
                }
            }
        }

        let (raw, receiving_changed, nominated) = {
            let mut inner = self.inner.lock();
            inner.last_ping_received = Some(now);
            inner.last_ping_id_received = Some(m.transaction_id);
            let receiving_changed = self.apply_receiving(&mut inner, now);

            let mut nominated = None;
            if !is_goog && !self.is_controlling() && UseCandidateAttr::is_set(m) {
                let mut nom_attr = NominationAttr::default();
                let nom = if nom_attr.get_from(m).is_ok() && nom_attr.0 > 0 {
                    nom_attr.0
                } else {
                    1
                };
                if nom > self.remote_nomination() {
                    self.remote_nomination
                        .store(nom, std::sync::atomic::Ordering::SeqCst);
                    log::debug!(
                        "[{}]: {} remote nomination -> {}",
                        self.name(),
                        self.id(),
                        nom
                    );
                    nominated = Some(nom);
                }
            }

            if !is_goog
                && inner.remote_candidate.candidate_type == CandidateType::PeerReflexive
            {
                // The peer keeps advertising the priority of the candidate we
                // only know reflexively; adopt it.
                let mut prio = PriorityAttr::default();
                if prio.get_from(m).is_ok() {
                    inner.remote_candidate.priority = prio.0;
                }
            }

            if !is_goog {
                let mut network_info = GoogNetworkInfo::default();
                if network_info.get_from(m).is_ok() {
                    inner.remote_candidate.network_id = network_info.network_id;
                    inner.remote_candidate.network_cost = network_info.network_cost;
                }
            }

            let mut delta_ack: Option<u64> = None;
            if !is_goog {
                let mut delta = GoogDelta::default();
                if delta.get_from(m).is_ok() {
                    if let Some(consumer) = &inner.goog_delta_consumer {
                        delta_ack = consumer(&delta.0);
                    }
                }
            }
            let mut dtls = GoogDtlsInStun::default();
            if dtls.get_from(m).is_ok() {
                if let Some(callbacks) = &inner.dtls_piggyback {
                    (callbacks.consume)(m.typ, &dtls.0);
                }
            }

            let raw = if is_goog {
                let mut out = Message::new();
                out.build(&[
                    Box::new(m.clone()) as Box<dyn Setter>,
                    Box::new(goog_ping_response()),
                    Box::new(MessageIntegrity32::new_short_term_integrity(
                        local_pwd.clone(),
                    )),
                ])?;
                out.raw.clone()
            } else {
                let mut setters: Vec<Box<dyn Setter>> = vec![
                    Box::new(m.clone()),
                    Box::new(BINDING_SUCCESS),
                    Box::new(XorMappedAddress {
                        ip: dst.ip(),
                        port: dst.port(),
                    }),
                ];
                if let Some(ack) = delta_ack {
                    setters.push(Box::new(GoogDeltaAck(ack)));
                }
                if let Some(callbacks) = &inner.dtls_piggyback {
                    if let Some(bytes) = (callbacks.fill)(BINDING_SUCCESS) {
                        setters.push(Box::new(GoogDtlsInStun(bytes)));
                    }
                }
                setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
                    local_pwd.clone(),
                )));
                setters.push(Box::new(FINGERPRINT));

                let mut out = Message::new();
                out.build(&setters)?;
                out.raw.clone()
            };

            (raw, receiving_changed, nominated)
        };

        self.send_response(&raw, dst).await;

        if receiving_changed {
            self.events.emit_state_change().await;
        }
        if let Some(nom) = nominated {
            self.events.emit_nominated(nom).await;
        }

        Ok(())
    }

    /// Processes a response matched against the in-flight transactions.
    pub(crate) async fn handle_response(&self, m: &mut Message, now: Instant) -> Result<()> {
        let is_error = m.typ.class == CLASS_ERROR_RESPONSE;

        let mut emit_role_conflict = false;
        let mut nominated = None;
        let mut local_upgraded = false;
        let mut write_changed = false;
        let mut receiving_changed = false;
        let mut state_changed = false;

        {
            let mut inner = self.inner.lock();
            let (is_goog, sent_time, req_nomination) =
                match inner.requests.get(m.transaction_id) {
                    Some(r) => (r.is_goog_ping, r.sent_time, r.nomination),
                    None => {
                        log::trace!(
                            "[{}]: {} discarding response with unknown transaction {:?}",
                            self.name(),
                            self.id(),
                            m.transaction_id
                        );
                        return Ok(());
                    }
                };

            if is_error {
                inner.requests.handle_response(m.transaction_id);

                let mut ec = ErrorCodeAttribute::default();
                let code = if ec.get_from(m).is_ok() { Some(ec.code) } else { None };
                if code == Some(CODE_ROLE_CONFLICT) {
                    log::warn!(
                        "[{}]: {} role conflict response from {}",
                        self.name(),
                        self.id(),
                        inner.remote_candidate.addr
                    );
                    emit_role_conflict = true;
                } else {
                    log::debug!(
                        "[{}]: {} error response {:?}, counting the check as lost",
                        self.name(),
                        self.id(),
                        code.map(|c| c.0)
                    );
                }
                write_changed = self.apply_write_state(&inner, now);
            } else {
                let remote_pwd = inner.remote_candidate.pwd.clone();
                let check = if is_goog {
                    MessageIntegrity32::new_short_term_integrity(remote_pwd).check(m)
                } else {
                    MessageIntegrity::new_short_term_integrity(remote_pwd).check(m)
                };
                if check.is_err() {
                    // A forged response must not consume the transaction.
                    log::warn!(
                        "[{}]: {} discarding response with bad integrity",
                        self.name(),
                        self.id()
                    );
                    return Err(Error::ErrIntegrityMismatch);
                }
                inner.requests.handle_response(m.transaction_id);

                let sample = now.checked_duration_since(sent_time).unwrap_or_default();
                inner.rtt.add_sample(now, sample);
                inner.last_ping_response_received = Some(now);
                inner.pings_since_last_response.clear();
                receiving_changed = self.apply_receiving(&mut inner, now);

                if !is_goog {
                    if inner.field_trials.enable_goog_ping {
                        let mut info = GoogMiscInfo::default();
                        let support = info.get_from(m).is_ok()
                            && info
                                .ping_version()
                                .is_some_and(|v| v >= SUPPORT_GOOG_PING_VERSION);
                        inner.remote_support_goog_ping = Some(support);
                    }

                    let mut mapped = XorMappedAddress::default();
                    if mapped.get_from(m).is_ok() {
                        let mapped_addr = SocketAddr::new(mapped.ip, mapped.port);
                        if mapped_addr != inner.local_candidate.addr
                            && inner.local_candidate.candidate_type != CandidateType::Relay
                        {
                            log::debug!(
                                "[{}]: {} learned prflx local candidate {}",
                                self.name(),
                                self.id(),
                                mapped_addr
                            );
                            inner.local_candidate =
                                inner.local_candidate.to_peer_reflexive(mapped_addr);
                            local_upgraded = true;
                        }
                    }
                }

                let mut ack = GoogDeltaAck::default();
                if ack.get_from(m).is_ok() {
                    if let Some(consumer) = &inner.goog_delta_ack_consumer {
                        consumer(ack.0);
                    }
                }
                let mut dtls = GoogDtlsInStun::default();
                if dtls.get_from(m).is_ok() {
                    if let Some(callbacks) = &inner.dtls_piggyback {
                        (callbacks.consume)(m.typ, &dtls.0);
                    }
                }

                if req_nomination > 0 && req_nomination > self.acked_nomination() {
                    self.acked_nomination
                        .store(req_nomination, std::sync::atomic::Ordering::SeqCst);
                    nominated = Some(req_nomination);
                }

                state_changed = self.set_state(CandidatePairState::Succeeded);
                write_changed = self.apply_write_state(&inner, now);
            }
        }

        if emit_role_conflict {
            self.events.emit_role_conflict().await;
        }
        if state_changed {
            self.events.emit_state_change().await;
        }
        if write_changed {
            self.events.emit_state_change().await;
            if self.writable() {
                self.events.emit_ready_to_send().await;
            }
        }
        if receiving_changed {
            self.events.emit_state_change().await;
        }
        if local_upgraded {
            self.events.emit_state_change().await;
        }
        if let Some(nom) = nominated {
            self.events.emit_nominated(nom).await;
        }

        Ok(())
    }

    /// Binding Indications refresh consent but are never answered.
    pub(crate) async fn handle_indication(&self, now: Instant) -> Result<()> {
        let receiving_changed = {
            let mut inner = self.inner.lock();
            inner.last_ping_received = Some(now);
            self.apply_receiving(&mut inner, now)
        };
        if receiving_changed {
            self.events.emit_state_change().await;
        }
        Ok(())
    }

    fn authenticate_request(
        &self,
        m: &mut Message,
        is_goog: bool,
        local_pwd: &str,
        local_ufrag: &str,
        remote_ufrag: &str,
    ) -> Result<()> {
        if is_goog {
            return MessageIntegrity32::new_short_term_integrity(local_pwd.to_owned())
                .check(m)
                .map_err(|_| Error::ErrIntegrityMismatch);
        }

        MessageIntegrity::new_short_term_integrity(local_pwd.to_owned())
            .check(m)
            .map_err(|_| Error::ErrIntegrityMismatch)?;

        let expected = format!("{local_ufrag}:{remote_ufrag}");
        let username = TextAttribute::get_from_as(m, ATTR_USERNAME)
            .map_err(|_| Error::ErrMismatchUsername)?;
        if username.to_string() != expected {
            return Err(Error::ErrMismatchUsername);
        }
        Ok(())
    }

    /// RFC 8445 §7.3.1.1: on an apparent role conflict, the agent with the
    /// larger tie-breaker keeps its role and the peer is told 487; the
    /// smaller one silently adopts the other role.
    fn resolve_role_conflict(&self, m: &Message) -> RoleDecision {
        if self.is_controlling() && m.contains(ATTR_ICE_CONTROLLING) {
            let mut peer = AttrControlling::default();
            if peer.get_from(m).is_err() {
                return RoleDecision::Conflict;
            }
            if self.tie_breaker() >= peer.0 {
                RoleDecision::Conflict
            } else {
                log::debug!("[{}]: {} switching to controlled", self.name(), self.id());
                self.set_controlling(false);
                RoleDecision::Switched
            }
        } else if !self.is_controlling() && m.contains(ATTR_ICE_CONTROLLED) {
            let mut peer = AttrControlled::default();
            if peer.get_from(m).is_err() {
                return RoleDecision::Conflict;
            }
            if self.tie_breaker() >= peer.0 {
                log::debug!("[{}]: {} switching to controlling", self.name(), self.id());
                self.set_controlling(true);
                RoleDecision::Switched
            } else {
                RoleDecision::Conflict
            }
        } else {
            RoleDecision::Keep
        }
    }

    async fn send_response(&self, raw: &[u8], dst: SocketAddr) {
        let Some(port) = self.upgrade_port() else {
            return;
        };
        if let Err(err) = port.send_binding_response(raw, dst).await {
            log::warn!(
                "[{}]: {} failed to send response to {}: {}",
                self.name(),
                self.id(),
                dst,
                err
            );
        }
    }
}

fn error_response(
    m: &Message,
    is_goog: bool,
    code: ErrorCode,
    integrity_pwd: Option<&str>,
) -> Result<Vec<u8>> {
    let mut setters: Vec<Box<dyn Setter>> = vec![Box::new(m.clone())];
    if is_goog {
        setters.push(Box::new(goog_ping_error_response()));
    } else {
        setters.push(Box::new(BINDING_ERROR));
    }
    // The bare code setter fills in the default reason phrase.
    setters.push(Box::new(code));
    if let Some(pwd) = integrity_pwd {
        setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
            pwd.to_owned(),
        )));
    }
    setters.push(Box::new(FINGERPRINT));

    let mut out = Message::new();
    out.build(&setters)?;
    Ok(out.raw.clone())
}
