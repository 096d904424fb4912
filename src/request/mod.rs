#[cfg(test)]
mod request_test;

use std::collections::HashMap;

use stun::agent::TransactionId;
use tokio::time::{Duration, Instant};

/// RTO floor for the first retransmit, RFC 5389 §7.2.1.
pub(crate) const DEFAULT_RTO: Duration = Duration::from_millis(500);

/// Upper bound on a single retransmit interval.
pub(crate) const MAX_RTO: Duration = Duration::from_millis(8000);

/// Transmissions per transaction before it times out (Rc).
pub(crate) const MAX_REQUEST_ATTEMPTS: u32 = 7;

/// Initial retransmission timeout: the configured floor, or twice the
/// currently measured RTT when that is larger.
pub(crate) fn initial_rto(rtt: Duration, floor: Duration) -> Duration {
    std::cmp::min(std::cmp::max(floor, rtt * 2), MAX_RTO)
}

/// One in-flight STUN transaction on a pair: a Binding Request or its
/// GOOG_PING equivalent.
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub id: TransactionId,
    pub raw: Vec<u8>,
    /// When the first copy went out.
    pub sent_time: Instant,
    /// Nomination value the ping carried, 0 when none.
    pub nomination: u32,
    pub is_goog_ping: bool,

    attempt: u32,
    rto: Duration,
    next_timeout: Instant,
}

impl ConnectionRequest {
    pub fn new(
        id: TransactionId,
        raw: Vec<u8>,
        sent_time: Instant,
        nomination: u32,
        is_goog_ping: bool,
        rto: Duration,
    ) -> Self {
        Self {
            id,
            raw,
            sent_time,
            nomination,
            is_goog_ping,
            attempt: 0,
            rto,
            next_timeout: sent_time + rto,
        }
    }

    /// Interval before the transmission after `attempt` retransmits:
    /// 1x, 2x, 4x, ... RTO, capped.
    fn backoff(&self) -> Duration {
        let exp = self.attempt.min(MAX_REQUEST_ATTEMPTS);
        let delay = self
            .rto
            .checked_mul(1u32 << exp)
            .unwrap_or(MAX_RTO);
        std::cmp::min(delay, MAX_RTO)
    }
}

/// What a timer sweep decided: payloads to put back on the wire, and
/// transactions whose retransmissions are exhausted.
#[derive(Default)]
pub struct Collect {
    pub retransmits: Vec<Vec<u8>>,
    pub timeouts: Vec<ConnectionRequest>,
}

/// Tracks the outgoing STUN transactions of one connection. The owning
/// connection transmits the payloads itself and drives the timer by calling
/// `collect` from its tick; responses are matched strictly by the 96-bit
/// transaction id.
#[derive(Default)]
pub struct StunRequestManager {
    transactions: HashMap<TransactionId, ConnectionRequest>,
}

impl StunRequestManager {
    /// Registers a request whose first copy was just transmitted.
    pub fn send(&mut self, request: ConnectionRequest) {
        self.transactions.insert(request.id, request);
    }

    /// Matches a response to an in-flight transaction. Out-of-transaction
    /// responses return `None` and are ignored by the caller.
    pub fn handle_response(&mut self, id: TransactionId) -> Option<ConnectionRequest> {
        self.transactions.remove(&id)
    }

    pub fn has(&self, id: TransactionId) -> bool {
        self.transactions.contains_key(&id)
    }

    pub fn get(&self, id: TransactionId) -> Option<&ConnectionRequest> {
        self.transactions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Advances every transaction past its deadline: due ones are scheduled
    /// for retransmission until their attempts are exhausted, after which
    /// they are surfaced as timeouts and forgotten.
    pub fn collect(&mut self, now: Instant) -> Collect {
        let mut out = Collect::default();

        let due: Vec<TransactionId> = self
            .transactions
            .values()
            .filter(|t| t.next_timeout <= now)
            .map(|t| t.id)
            .collect();

        for id in due {
            let Some(mut t) = self.transactions.remove(&id) else {
                continue;
            };
            t.attempt += 1;
            if t.attempt >= MAX_REQUEST_ATTEMPTS {
                out.timeouts.push(t);
                continue;
            }
            out.retransmits.push(t.raw.clone());
            t.next_timeout = now + t.backoff();
            self.transactions.insert(id, t);
        }

        out
    }

    /// Drops all transactions silently; no timeout is surfaced for them.
    pub fn cancel_all(&mut self) {
        self.transactions.clear();
    }
}
