use std::sync::Weak;

use tokio::time::Duration;

use crate::candidate::Candidate;
use crate::port::Port;

/// Unanswered pings needed before a never-written connection may give up.
pub(crate) const CONNECTION_WRITE_CONNECT_FAILURES: u32 = 5;

/// Time a never-written connection keeps trying before `WriteTimeout`.
pub(crate) const CONNECTION_WRITE_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Unanswered pings needed before a once-writable connection may give up.
pub(crate) const CONNECTION_WRITE_TIMEOUT_FAILURES: u32 = 20;

/// Default time without responses before a once-writable connection is
/// `WriteTimeout`.
pub(crate) const DEFAULT_INACTIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time without responses before a connection is `WriteUnreliable`.
pub(crate) const DEFAULT_UNWRITABLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default unanswered pings before a connection is `WriteUnreliable`.
pub(crate) const DEFAULT_UNWRITABLE_MIN_CHECKS: u32 = 6;

/// Default time without any inbound packet before `receiving` drops.
pub(crate) const DEFAULT_RECEIVING_TIMEOUT: Duration = Duration::from_millis(2500);

/// Grace period before a connection that never received anything is dead.
pub(crate) const MIN_CONNECTION_LIFETIME: Duration = Duration::from_secs(10);

/// Time after the last inbound packet before a connection is dead.
pub(crate) const DEAD_CONNECTION_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the unanswered-ping history kept for diagnostics.
pub(crate) const MAX_PINGS_SINCE_LAST_RESPONSE: usize = 25;

/// Optional protocol behaviours negotiated out of band.
#[derive(Default, Clone, Copy, Debug)]
pub struct IceFieldTrials {
    /// Advertise and use the compact GOOG_PING refresh once the peer
    /// confirmed support.
    pub enable_goog_ping: bool,
    /// Attach the NOMINATION attribute to nominating checks.
    pub enable_renomination: bool,
}

/// Collects the arguments to `Connection` construction into a single
/// structure, for future-proofness of the interface.
pub struct ConnectionConfig {
    pub local_candidate: Candidate,
    pub remote_candidate: Candidate,

    /// The owning port, held weakly; a connection may outlive its port
    /// only in misordered teardown.
    pub port: Weak<dyn Port + Send + Sync>,

    pub is_controlling: bool,

    /// Role tie-breaker; 0 picks a random one.
    pub tie_breaker: u64,

    /// Defaults to 2500 ms when none.
    pub receiving_timeout: Option<Duration>,
    /// Defaults to 10 seconds when none.
    pub unwritable_timeout: Option<Duration>,
    /// Defaults to 6 checks when none.
    pub unwritable_min_checks: Option<u32>,
    /// Defaults to 30 seconds when none.
    pub inactive_timeout: Option<Duration>,
    /// Floor of the retransmission timeout, defaults to 500 ms.
    pub rto_floor: Option<Duration>,

    pub field_trials: IceFieldTrials,
}
