
pub mod connection_config;
pub(crate) mod connection_inbound;
pub(crate) mod connection_ping;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use stun::agent::TransactionId;
use stun::message::MessageType;
use tokio::time::{Duration, Instant};
use util::sync::Mutex as SyncMutex;

pub use connection_config::{ConnectionConfig, IceFieldTrials};
use connection_config::*;

use crate::candidate::{
    candidate_pair_priority, Candidate, CandidatePairState, IceParameters, Protocol,
};
use crate::error::{Error, Result};
use crate::events::EventEmitter;
use crate::port::Port;
use crate::rate::RateTracker;
use crate::request::{initial_rto, ConnectionRequest, StunRequestManager, DEFAULT_RTO};
use crate::rtt::RttEstimator;

/// Write state of a connection, derived from recent ping outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WriteState {
    /// A matched response arrived recently enough to trust the pair.
    #[serde(rename = "writable")]
    Writable = 0,

    /// Checks keep going unanswered, but not long enough to give up.
    #[serde(rename = "write-unreliable")]
    Unreliable = 1,

    /// No response has ever been received on this pair.
    #[serde(rename = "write-init")]
    Init = 2,

    /// The pair failed past the write timeout.
    #[serde(rename = "write-timeout")]
    Timeout = 3,
}

impl From<u8> for WriteState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Writable,
            1 => Self::Unreliable,
            3 => Self::Timeout,
            _ => Self::Init,
        }
    }
}

impl Default for WriteState {
    fn default() -> Self {
        Self::Init
    }
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Writable => "writable",
            Self::Unreliable => "write-unreliable",
            Self::Init => "write-init",
            Self::Timeout => "write-timeout",
        };
        write!(f, "{s}")
    }
}

/// Consumes an inbound GOOG-DELTA payload and returns the value to echo
/// back as GOOG-DELTA-ACK, when any.
pub type GoogDeltaConsumerFn = Box<dyn Fn(&[u8]) -> Option<u64> + Send + Sync>;

/// Consumes a GOOG-DELTA-ACK observed on a matched response.
pub type GoogDeltaAckConsumerFn = Box<dyn Fn(u64) + Send + Sync>;

/// Hooks that let a DTLS transport ride its handshake on STUN messages.
/// Absence is a no-op; peers that ignore unknown attributes are unaffected.
pub struct DtlsPiggybackCallbacks {
    /// Returns bytes to attach to an outbound message of the given type.
    pub fill: Box<dyn Fn(MessageType) -> Option<Vec<u8>> + Send + Sync>,
    /// Consumes bytes found on an inbound message of the given type.
    pub consume: Box<dyn Fn(MessageType, &[u8]) + Send + Sync>,
}

/// One entry of the unanswered-ping history.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SentPing {
    pub(crate) id: TransactionId,
    pub(crate) sent_time: Instant,
    pub(crate) nomination: u32,
}

pub(crate) struct ConnectionInner {
    pub(crate) local_candidate: Candidate,
    pub(crate) remote_candidate: Candidate,

    pub(crate) requests: StunRequestManager,
    pub(crate) pings_since_last_response: Vec<SentPing>,

    pub(crate) created_at: Instant,
    pub(crate) last_ping_sent: Option<Instant>,
    pub(crate) last_ping_received: Option<Instant>,
    pub(crate) last_data_received: Option<Instant>,
    pub(crate) last_ping_response_received: Option<Instant>,
    pub(crate) last_send_data: Option<Instant>,
    pub(crate) receiving_unchanged_since: Option<Instant>,

    pub(crate) rtt: RttEstimator,
    pub(crate) send_rate: RateTracker,
    pub(crate) recv_rate: RateTracker,

    pub(crate) last_ping_id_received: Option<TransactionId>,
    pub(crate) cached_stun_binding: Option<stun::message::Message>,
    pub(crate) remote_support_goog_ping: Option<bool>,

    pub(crate) receiving_timeout: Duration,
    pub(crate) unwritable_timeout: Duration,
    pub(crate) unwritable_min_checks: u32,
    pub(crate) inactive_timeout: Duration,
    pub(crate) rto_floor: Duration,
    pub(crate) field_trials: IceFieldTrials,

    pub(crate) goog_delta_consumer: Option<GoogDeltaConsumerFn>,
    pub(crate) goog_delta_ack_consumer: Option<GoogDeltaAckConsumerFn>,
    pub(crate) dtls_piggyback: Option<DtlsPiggybackCallbacks>,

    pub(crate) send_error: Option<Error>,
}

static NEXT_CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

fn next_connection_id() -> u32 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst)
}

/// One directed candidate pair and the checks running on it.
///
/// All mutating entry points must be serialised onto the owning channel's
/// network sequence; timers are the channel's tick calling `update_state`.
pub struct Connection {
    id: u32,
    port: SyncMutex<Option<Weak<dyn Port + Send + Sync>>>,
    events: EventEmitter,

    is_controlling: AtomicBool,
    tie_breaker: AtomicU64,

    write_state: AtomicU8,
    receiving: AtomicBool,
    connected: AtomicBool,
    pruned: AtomicBool,
    selected: AtomicBool,
    pending_delete: AtomicBool,
    state: AtomicU8,
    use_candidate_attr: AtomicBool,

    nomination: AtomicU32,
    acked_nomination: AtomicU32,
    remote_nomination: AtomicU32,

    num_pings_sent: AtomicU32,

    pub(crate) inner: SyncMutex<ConnectionInner>,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (local, remote) = {
            let inner = self.inner.lock();
            (inner.local_candidate.clone(), inner.remote_candidate.clone())
        };
        write!(f, "Conn[{}] {} <-> {}", self.id, local, remote)
    }
}

impl Connection {
    pub fn new(config: ConnectionConfig, now: Instant) -> Self {
        let tie_breaker = if config.tie_breaker != 0 {
            config.tie_breaker
        } else {
            rand::random::<u64>()
        };
        let connected = config.local_candidate.protocol == Protocol::Udp;

        let inner = ConnectionInner {
            local_candidate: config.local_candidate,
            remote_candidate: config.remote_candidate,
            requests: StunRequestManager::default(),
            pings_since_last_response: vec![],
            created_at: now,
            last_ping_sent: None,
            last_ping_received: None,
            last_data_received: None,
            last_ping_response_received: None,
            last_send_data: None,
            receiving_unchanged_since: None,
            rtt: RttEstimator::default(),
            send_rate: RateTracker::default(),
            recv_rate: RateTracker::default(),
            last_ping_id_received: None,
            cached_stun_binding: None,
            remote_support_goog_ping: None,
            receiving_timeout: config.receiving_timeout.unwrap_or(DEFAULT_RECEIVING_TIMEOUT),
            unwritable_timeout: config.unwritable_timeout.unwrap_or(DEFAULT_UNWRITABLE_TIMEOUT),
            unwritable_min_checks: config
                .unwritable_min_checks
                .unwrap_or(DEFAULT_UNWRITABLE_MIN_CHECKS),
            inactive_timeout: config.inactive_timeout.unwrap_or(DEFAULT_INACTIVE_TIMEOUT),
            rto_floor: config.rto_floor.unwrap_or(DEFAULT_RTO),
            field_trials: config.field_trials,
            goog_delta_consumer: None,
            goog_delta_ack_consumer: None,
            dtls_piggyback: None,
            send_error: None,
        };

        Self {
            id: next_connection_id(),
            port: SyncMutex::new(Some(config.port)),
            events: EventEmitter::default(),
            is_controlling: AtomicBool::new(config.is_controlling),
            tie_breaker: AtomicU64::new(tie_breaker),
            write_state: AtomicU8::new(WriteState::Init as u8),
            receiving: AtomicBool::new(false),
            connected: AtomicBool::new(connected),
            pruned: AtomicBool::new(false),
            selected: AtomicBool::new(false),
            pending_delete: AtomicBool::new(false),
            state: AtomicU8::new(CandidatePairState::Waiting as u8),
            use_candidate_attr: AtomicBool::new(true),
            nomination: AtomicU32::new(0),
            acked_nomination: AtomicU32::new(0),
            remote_nomination: AtomicU32::new(0),
            num_pings_sent: AtomicU32::new(0),
            inner: SyncMutex::new(inner),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn local_candidate(&self) -> Candidate {
        self.inner.lock().local_candidate.clone()
    }

    pub fn remote_candidate(&self) -> Candidate {
        self.inner.lock().remote_candidate.clone()
    }

    /// Generation of the remote candidate this pair was formed against.
    pub fn generation(&self) -> u32 {
        self.inner.lock().remote_candidate.generation
    }

    pub fn network_id(&self) -> u16 {
        self.inner.lock().local_candidate.network_id
    }

    /// RFC 5245 pair priority under the current role.
    pub fn priority(&self) -> u64 {
        let inner = self.inner.lock();
        candidate_pair_priority(
            self.is_controlling.load(Ordering::SeqCst),
            inner.local_candidate.priority(),
            inner.remote_candidate.priority(),
        )
    }

    pub fn write_state(&self) -> WriteState {
        WriteState::from(self.write_state.load(Ordering::SeqCst))
    }

    pub fn writable(&self) -> bool {
        self.write_state() == WriteState::Writable
    }

    pub fn receiving(&self) -> bool {
        self.receiving.load(Ordering::SeqCst)
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// A connection is weak when either direction lost its recent proof
    /// of life.
    pub fn weak(&self) -> bool {
        !(self.writable() && self.receiving())
    }

    /// Still worth pinging: not yet written off by the write timers.
    pub fn active(&self) -> bool {
        self.write_state() != WriteState::Timeout
    }

    pub fn pruned(&self) -> bool {
        self.pruned.load(Ordering::SeqCst)
    }

    pub fn selected(&self) -> bool {
        self.selected.load(Ordering::SeqCst)
    }

    /// Label applied by the owning channel; carries no logic here.
    pub fn set_selected(&self, selected: bool) {
        self.selected.store(selected, Ordering::SeqCst);
    }

    pub fn state(&self) -> CandidatePairState {
        CandidatePairState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_controlling(&self) -> bool {
        self.is_controlling.load(Ordering::SeqCst)
    }

    pub fn tie_breaker(&self) -> u64 {
        self.tie_breaker.load(Ordering::SeqCst)
    }

    pub fn rtt(&self) -> Duration {
        self.inner.lock().rtt.rtt()
    }

    pub fn rtt_samples(&self) -> u32 {
        self.inner.lock().rtt.samples()
    }

    pub fn rtt_converged(&self) -> bool {
        self.inner.lock().rtt.converged()
    }

    pub fn total_round_trip_time(&self) -> Duration {
        self.inner.lock().rtt.total_round_trip_time()
    }

    pub fn current_round_trip_time(&self) -> Option<Duration> {
        self.inner.lock().rtt.current_round_trip_time()
    }

    pub fn num_pings_sent(&self) -> u32 {
        self.num_pings_sent.load(Ordering::SeqCst)
    }

    pub fn num_pings_outstanding(&self) -> usize {
        self.inner.lock().pings_since_last_response.len()
    }

    pub fn last_ping_sent(&self) -> Option<Instant> {
        self.inner.lock().last_ping_sent
    }

    pub fn last_ping_received(&self) -> Option<Instant> {
        self.inner.lock().last_ping_received
    }

    pub fn last_data_received(&self) -> Option<Instant> {
        self.inner.lock().last_data_received
    }

    pub fn last_ping_response_received(&self) -> Option<Instant> {
        self.inner.lock().last_ping_response_received
    }

    /// Most recent inbound activity of any kind.
    pub fn last_received(&self) -> Option<Instant> {
        last_received(&self.inner.lock())
    }

    pub fn last_ping_id_received(&self) -> Option<TransactionId> {
        self.inner.lock().last_ping_id_received
    }

    pub fn receiving_unchanged_since(&self) -> Option<Instant> {
        self.inner.lock().receiving_unchanged_since
    }

    pub fn send_rate(&self, now: Instant) -> f64 {
        self.inner.lock().send_rate.rate(now)
    }

    pub fn recv_rate(&self, now: Instant) -> f64 {
        self.inner.lock().recv_rate.rate(now)
    }

    pub fn remote_support_goog_ping(&self) -> Option<bool> {
        self.inner.lock().remote_support_goog_ping
    }

    pub fn nominated(&self) -> bool {
        self.acked_nomination.load(Ordering::SeqCst) > 0
            || self.remote_nomination.load(Ordering::SeqCst) > 0
    }

    pub fn nomination(&self) -> u32 {
        self.nomination.load(Ordering::SeqCst)
    }

    pub fn acked_nomination(&self) -> u32 {
        self.acked_nomination.load(Ordering::SeqCst)
    }

    pub fn remote_nomination(&self) -> u32 {
        self.remote_nomination.load(Ordering::SeqCst)
    }

    pub fn use_candidate_attr(&self) -> bool {
        self.use_candidate_attr.load(Ordering::SeqCst)
    }

    pub fn set_use_candidate_attr(&self, enable: bool) {
        self.use_candidate_attr.store(enable, Ordering::SeqCst);
    }

    /// Sets the controlling side's intent to nominate this pair; the value
    /// rides on the next ping.
    pub fn set_nomination(&self, value: u32) {
        self.nomination.store(value, Ordering::SeqCst);
    }

    pub fn set_ice_field_trials(&self, trials: IceFieldTrials) {
        self.inner.lock().field_trials = trials;
    }

    pub fn set_receiving_timeout(&self, timeout: Duration) {
        self.inner.lock().receiving_timeout = timeout;
    }

    pub fn set_unwritable_timeout(&self, timeout: Duration) {
        self.inner.lock().unwritable_timeout = timeout;
    }

    pub fn set_unwritable_min_checks(&self, checks: u32) {
        self.inner.lock().unwritable_min_checks = checks;
    }

    pub fn set_inactive_timeout(&self, timeout: Duration) {
        self.inner.lock().inactive_timeout = timeout;
    }

    pub fn set_goog_delta_consumer(&self, f: Option<GoogDeltaConsumerFn>) {
        self.inner.lock().goog_delta_consumer = f;
    }

    pub fn set_goog_delta_ack_consumer(&self, f: Option<GoogDeltaAckConsumerFn>) {
        self.inner.lock().goog_delta_ack_consumer = f;
    }

    pub fn set_dtls_piggyback_callbacks(&self, callbacks: Option<DtlsPiggybackCallbacks>) {
        self.inner.lock().dtls_piggyback = callbacks;
    }

    /// TCP handshake gate; UDP connections are born connected.
    pub async fn set_connected(&self, connected: bool) {
        let changed = self.connected.swap(connected, Ordering::SeqCst) != connected;
        if changed {
            log::debug!("[{}]: {} connected -> {}", self.name(), self.id, connected);
            self.events.emit_state_change().await;
        }
    }

    /// Replaces the local credentials after an ICE restart on our side.
    pub fn update_local_ice_parameters(&self, params: IceParameters) {
        let mut inner = self.inner.lock();
        inner.local_candidate.ufrag = params.ufrag;
        inner.local_candidate.pwd = params.pwd;
    }

    /// Adopts the remote credentials and generation when the ufrag matches
    /// the candidate this pair was formed against. Returns whether they
    /// were applied.
    pub fn maybe_set_remote_ice_parameters_and_generation(
        &self,
        params: &IceParameters,
        generation: u32,
    ) -> Result<bool> {
        if params.ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        }
        if params.pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        let mut inner = self.inner.lock();
        if inner.remote_candidate.ufrag != params.ufrag {
            return Ok(false);
        }
        inner.remote_candidate.pwd = params.pwd.clone();
        inner.remote_candidate.generation = generation;
        Ok(true)
    }

    /// Sends one connectivity check. Returns the transaction id the check
    /// went out with.
    pub async fn ping(&self, now: Instant, delta: Option<Vec<u8>>) -> Result<TransactionId> {
        if self.pending_delete.load(Ordering::SeqCst) {
            return Err(Error::ErrClosed);
        }
        if self.pruned.load(Ordering::SeqCst) {
            return Err(Error::ErrPruned);
        }

        let (raw, id, dst) = {
            let mut inner = self.inner.lock();
            let ping = connection_ping::build_ping(self, &mut inner, delta)?;

            inner.pings_since_last_response.push(SentPing {
                id: ping.id,
                sent_time: now,
                nomination: ping.nomination,
            });
            let excess = inner
                .pings_since_last_response
                .len()
                .saturating_sub(MAX_PINGS_SINCE_LAST_RESPONSE);
            if excess > 0 {
                inner.pings_since_last_response.drain(..excess);
            }

            let rto = initial_rto(inner.rtt.rtt(), inner.rto_floor);
            inner.requests.send(ConnectionRequest::new(
                ping.id,
                ping.raw.clone(),
                now,
                ping.nomination,
                ping.is_goog_ping,
                rto,
            ));
            inner.last_ping_sent = Some(now);

            (ping.raw, ping.id, inner.remote_candidate.addr)
        };
        self.num_pings_sent.fetch_add(1, Ordering::SeqCst);

        let state_changed = self.state() == CandidatePairState::Waiting
            && self.set_state(CandidatePairState::InProgress);

        let Some(port) = self.upgrade_port() else {
            return Err(Error::ErrPortGone);
        };
        if let Err(err) = port.send_to(&raw, dst).await {
            log::warn!("[{}]: {} failed to send ping: {}", self.name(), self.id, err);
            self.inner.lock().send_error = Some(err);
        }

        if state_changed {
            self.events.emit_state_change().await;
        }

        Ok(id)
    }

    /// Periodic tick from the owning channel: sweeps retransmission timers
    /// and reclassifies the write and receive dimensions.
    pub async fn update_state(&self, now: Instant) {
        if self.pending_delete.load(Ordering::SeqCst) {
            return;
        }

        let (retransmits, dst, write_changed, receiving_changed) = {
            let mut inner = self.inner.lock();
            let collected = inner.requests.collect(now);
            for t in &collected.timeouts {
                log::debug!(
                    "[{}]: {} ping {:?} timed out after {} unanswered checks",
                    self.name(),
                    self.id,
                    t.id,
                    inner.pings_since_last_response.len(),
                );
            }
            let write_changed = self.apply_write_state(&inner, now);
            let receiving_changed = self.apply_receiving(&mut inner, now);
            let retransmits = if self.pruned.load(Ordering::SeqCst) {
                vec![]
            } else {
                collected.retransmits
            };
            (retransmits, inner.remote_candidate.addr, write_changed, receiving_changed)
        };

        if write_changed {
            self.events.emit_state_change().await;
            if self.writable() {
                self.events.emit_ready_to_send().await;
            }
        }
        if receiving_changed {
            self.events.emit_state_change().await;
        }

        if !retransmits.is_empty() {
            if let Some(port) = self.upgrade_port() {
                for raw in retransmits {
                    if let Err(err) = port.send_to(&raw, dst).await {
                        log::trace!(
                            "[{}]: {} failed to retransmit: {}",
                            self.name(),
                            self.id,
                            err
                        );
                    }
                }
            }
        }
    }

    /// Demultiplexes one inbound packet from the port.
    pub async fn on_read_packet(&self, buf: &[u8], now: Instant) -> Result<()> {
        if self.pending_delete.load(Ordering::SeqCst) {
            return Ok(());
        }

        if stun::message::is_message(buf) {
            let mut m = stun::message::Message {
                raw: vec![],
                ..Default::default()
            };
            m.raw.extend_from_slice(buf);
            if let Err(err) = m.decode() {
                log::warn!(
                    "[{}]: {} failed to decode inbound STUN: {}",
                    self.name(),
                    self.id,
                    err
                );
                return Err(err.into());
            }
            return self.handle_stun(&mut m, now).await;
        }

        let receiving_changed = {
            let mut inner = self.inner.lock();
            inner.recv_rate.update(now, buf.len() as u64);
            inner.last_data_received = Some(now);
            self.apply_receiving(&mut inner, now)
        };
        if receiving_changed {
            self.events.emit_state_change().await;
        }
        self.events.emit_received_packet(buf.to_vec()).await;

        Ok(())
    }

    /// The port became writable again; forwarded upward when this pair can
    /// actually be written to.
    pub async fn on_ready_to_send(&self) {
        if self.writable() {
            self.events.emit_ready_to_send().await;
        }
    }

    /// Sends a data packet on the pair.
    pub async fn send(&self, data: &[u8], now: Instant) -> Result<usize> {
        if self.pending_delete.load(Ordering::SeqCst) {
            return Err(Error::ErrClosed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            self.inner.lock().send_error = Some(Error::ErrNotConnected);
            return Err(Error::ErrNotConnected);
        }

        let dst = {
            let mut inner = self.inner.lock();
            inner.send_rate.update(now, data.len() as u64);
            inner.last_send_data = Some(now);
            inner.remote_candidate.addr
        };

        let Some(port) = self.upgrade_port() else {
            return Err(Error::ErrPortGone);
        };
        match port.send_to(data, dst).await {
            Ok(n) => Ok(n),
            Err(err) => {
                self.inner.lock().send_error = Some(Error::Other(err.to_string()));
                Err(err)
            }
        }
    }

    /// Takes the last transport error recorded by `send` or `ping`.
    pub fn get_error(&self) -> Option<Error> {
        self.inner.lock().send_error.take()
    }

    /// Stops this pair from initiating pings without closing it; inbound
    /// packets are still accepted.
    pub fn prune(&self) {
        if !self.pruned.swap(true, Ordering::SeqCst) {
            log::debug!("[{}]: {} pruned", self.name(), self.id);
        }
    }

    /// Gives up on the pair: marks it failed and prunes it.
    pub async fn fail_and_prune(&self) {
        let changed = self.set_state(CandidatePairState::Failed);
        self.prune();
        if changed {
            self.events.emit_state_change().await;
        }
    }

    /// Drops everything learned from the peer so the pair proves itself
    /// again: write and receive states, in-flight checks, RTT, goog-ping
    /// support and remotely driven nominations. Deliberately silent, and
    /// `connected`, candidates and stats survive.
    pub fn forget_learned_state(&self) {
        log::debug!("[{}]: {} forgetting learned state", self.name(), self.id);
        let mut inner = self.inner.lock();
        inner.requests.cancel_all();
        inner.pings_since_last_response.clear();
        inner.last_ping_response_received = None;
        inner.rtt.reset();
        inner.cached_stun_binding = None;
        inner.remote_support_goog_ping = None;
        self.write_state.store(WriteState::Init as u8, Ordering::SeqCst);
        self.receiving.store(false, Ordering::SeqCst);
        self.acked_nomination.store(0, Ordering::SeqCst);
        self.remote_nomination.store(0, Ordering::SeqCst);
    }

    /// Idempotent teardown worker. The first call cancels the in-flight
    /// transactions, releases the port handle and publishes `destroyed`;
    /// later calls return false and emit nothing.
    pub async fn shutdown(&self) -> bool {
        if self.pending_delete.swap(true, Ordering::SeqCst) {
            return false;
        }
        log::debug!("[{}]: {} shutting down", self.name(), self.id);
        {
            let mut inner = self.inner.lock();
            inner.requests.cancel_all();
        }
        {
            let mut port = self.port.lock();
            port.take();
        }
        self.events.emit_destroyed(self.id).await;
        true
    }

    /// Tears the pair down and asks the owning port to deallocate it.
    pub async fn destroy(&self) -> bool {
        let port = {
            let guard = self.port.lock();
            guard.as_ref().and_then(|w| w.upgrade())
        };
        let first = self.shutdown().await;
        if first {
            if let Some(port) = port {
                port.destroy_connection(self.id);
            }
        }
        first
    }

    /// Whether the channel should give up on this pair entirely.
    pub fn dead(&self, now: Instant) -> bool {
        // Nothing will revive a pruned pair whose writes already timed out;
        // recent inbound traffic does not earn it a grace period.
        if self.pruned() && self.write_state() == WriteState::Timeout {
            return true;
        }

        let (last_received, created_at) = {
            let inner = self.inner.lock();
            (last_received(&inner), inner.created_at)
        };

        if let Some(last) = last_received {
            return now.checked_duration_since(last).unwrap_or_default()
                > DEAD_CONNECTION_RECEIVE_TIMEOUT;
        }
        if self.active() {
            return now.checked_duration_since(created_at).unwrap_or_default()
                > MIN_CONNECTION_LIFETIME;
        }
        true
    }

    pub(crate) fn name(&self) -> &'static str {
        if self.is_controlling.load(Ordering::SeqCst) {
            "controlling"
        } else {
            "controlled"
        }
    }

    pub(crate) fn upgrade_port(&self) -> Option<Arc<dyn Port + Send + Sync>> {
        let guard = self.port.lock();
        let port = guard.as_ref().and_then(|w| w.upgrade());
        if port.is_none() {
            self.pending_delete.store(true, Ordering::SeqCst);
        }
        port
    }

    pub(crate) fn pending_delete(&self) -> bool {
        self.pending_delete.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: CandidatePairState) -> bool {
        let prev = CandidatePairState::from(
            self.state.swap(state as u8, Ordering::SeqCst),
        );
        if prev != state {
            log::debug!(
                "[{}]: {} pair state {} -> {}",
                self.name(),
                self.id,
                prev,
                state
            );
            true
        } else {
            false
        }
    }

    pub(crate) fn set_write_state(&self, state: WriteState) -> bool {
        let prev = WriteState::from(
            self.write_state.swap(state as u8, Ordering::SeqCst),
        );
        if prev != state {
            log::debug!(
                "[{}]: {} write state {} -> {}",
                self.name(),
                self.id,
                prev,
                state
            );
            true
        } else {
            false
        }
    }

    pub(crate) fn set_controlling(&self, controlling: bool) {
        self.is_controlling.store(controlling, Ordering::SeqCst);
    }

    /// Reclassifies the write dimension from the unanswered-ping history
    /// and the configured timeouts; returns whether the state moved.
    pub(crate) fn apply_write_state(&self, inner: &ConnectionInner, now: Instant) -> bool {
        let outstanding = inner.pings_since_last_response.len() as u32;

        let next = match inner.last_ping_response_received {
            None => {
                let age = now
                    .checked_duration_since(inner.created_at)
                    .unwrap_or_default();
                if outstanding >= CONNECTION_WRITE_CONNECT_FAILURES
                    && age >= CONNECTION_WRITE_CONNECT_TIMEOUT
                {
                    WriteState::Timeout
                } else {
                    WriteState::Init
                }
            }
            Some(last) => {
                let since_response =
                    now.checked_duration_since(last).unwrap_or_default();
                // Timeout dominates unreliable when both hold.
                if since_response >= inner.inactive_timeout
                    && outstanding >= CONNECTION_WRITE_TIMEOUT_FAILURES
                {
                    WriteState::Timeout
                } else if since_response >= inner.unwritable_timeout
                    || outstanding >= inner.unwritable_min_checks
                {
                    WriteState::Unreliable
                } else {
                    WriteState::Writable
                }
            }
        };

        self.set_write_state(next)
    }

    /// Reclassifies `receiving` from the time since the last inbound
    /// packet; returns whether it flipped.
    pub(crate) fn apply_receiving(&self, inner: &mut ConnectionInner, now: Instant) -> bool {
        let receiving = match last_received(inner) {
            Some(last) => {
                now.checked_duration_since(last).unwrap_or_default() < inner.receiving_timeout
            }
            None => false,
        };

        let prev = self.receiving.swap(receiving, Ordering::SeqCst);
        if prev != receiving {
            inner.receiving_unchanged_since = Some(now);
            log::debug!(
                "[{}]: {} receiving -> {}",
                self.name(),
                self.id,
                receiving
            );
            true
        } else {
            false
        }
    }
}

pub(crate) fn last_received(inner: &ConnectionInner) -> Option<Instant> {
    [
        inner.last_ping_received,
        inner.last_data_received,
        inner.last_ping_response_received,
    ]
    .into_iter()
    .flatten()
    .max()
}
