use stun::agent::TransactionId;
use stun::attributes::{RawAttribute, ATTR_FINGERPRINT, ATTR_MESSAGE_INTEGRITY, ATTR_USERNAME};
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::{Message, Setter, BINDING_REQUEST};
use stun::textattrs::Username;

use super::{Connection, ConnectionInner};
use crate::attr::*;
use crate::error::Result;

pub(crate) struct BuiltPing {
    pub(crate) raw: Vec<u8>,
    pub(crate) id: TransactionId,
    pub(crate) nomination: u32,
    pub(crate) is_goog_ping: bool,
}

/// Assembles the next connectivity check for the pair.
///
/// The full Binding Request is always constructed first; when the peer has
/// confirmed GOOG_PING support and the new request carries exactly the
/// attributes of the cached one, the compact form is sent in its place.
pub(crate) fn build_ping(
    conn: &Connection,
    inner: &mut ConnectionInner,
    delta: Option<Vec<u8>>,
) -> Result<BuiltPing> {
    let controlling = conn.is_controlling();
    let nomination = conn.nomination();
    let remote_pwd = inner.remote_candidate.pwd.clone();

    let username = format!(
        "{}:{}",
        inner.remote_candidate.ufrag, inner.local_candidate.ufrag
    );

    let mut setters: Vec<Box<dyn Setter>> = vec![
        Box::new(BINDING_REQUEST),
        Box::new(TransactionId::new()),
        Box::new(Username::new(ATTR_USERNAME, username)),
    ];

    if controlling {
        setters.push(Box::new(AttrControlling(conn.tie_breaker())));
        if conn.use_candidate_attr() && nomination > 0 {
            setters.push(Box::new(UseCandidateAttr::new()));
        }
        if inner.field_trials.enable_renomination && nomination > 0 {
            setters.push(Box::new(NominationAttr(nomination)));
        }
    } else {
        setters.push(Box::new(AttrControlled(conn.tie_breaker())));
    }

    setters.push(Box::new(PriorityAttr(inner.local_candidate.prflx_priority())));

    if inner.local_candidate.network_id != 0 || inner.local_candidate.network_cost != 0 {
        setters.push(Box::new(GoogNetworkInfo {
            network_id: inner.local_candidate.network_id,
            network_cost: inner.local_candidate.network_cost,
        }));
    }

    if inner.field_trials.enable_goog_ping {
        setters.push(Box::new(GoogMiscInfo(vec![SUPPORT_GOOG_PING_VERSION])));
    }
    if let Some(delta) = delta {
        setters.push(Box::new(GoogDelta(delta)));
    }
    if let Some(callbacks) = &inner.dtls_piggyback {
        if let Some(bytes) = (callbacks.fill)(BINDING_REQUEST) {
            setters.push(Box::new(GoogDtlsInStun(bytes)));
        }
    }

    setters.push(Box::new(MessageIntegrity::new_short_term_integrity(
        remote_pwd.clone(),
    )));
    setters.push(Box::new(FINGERPRINT));

    let mut request = Message::new();
    request.build(&setters)?;

    if inner.remote_support_goog_ping == Some(true) {
        if let Some(cached) = &inner.cached_stun_binding {
            if equal_attributes_ignoring_trailers(cached, &request) {
                let mut ping = Message::new();
                ping.build(&[
                    Box::new(goog_ping_request()),
                    Box::new(TransactionId::new()),
                    Box::new(MessageIntegrity32::new_short_term_integrity(remote_pwd)),
                ])?;
                return Ok(BuiltPing {
                    raw: ping.raw.clone(),
                    id: ping.transaction_id,
                    nomination,
                    is_goog_ping: true,
                });
            }
        }
    }

    if inner.field_trials.enable_goog_ping {
        inner.cached_stun_binding = Some(request.clone());
    }

    Ok(BuiltPing {
        raw: request.raw.clone(),
        id: request.transaction_id,
        nomination,
        is_goog_ping: false,
    })
}

/// Two checks carry the same intent when their attributes match once the
/// per-transaction trailers are ignored.
pub(crate) fn equal_attributes_ignoring_trailers(a: &Message, b: &Message) -> bool {
    fn pick(m: &Message) -> impl Iterator<Item = &RawAttribute> {
        m.attributes
            .0
            .iter()
            .filter(|x| x.typ != ATTR_MESSAGE_INTEGRITY && x.typ != ATTR_FINGERPRINT)
    }
    pick(a).eq(pick(b))
}
