
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

pub type OnStateChangeHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnReadyToSendHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnNominatedHdlrFn =
    Box<dyn (FnMut(u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnRoleConflictHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnDestroyedHdlrFn =
    Box<dyn (FnMut(u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;
pub type OnReceivedPacketHdlrFn = Box<
    dyn (FnMut(Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync,
>;

/// Lifecycle notifications of a connection. One slot per signal; emitting
/// snapshots the handler before invoking it, so a handler may re-subscribe
/// or unsubscribe while being dispatched.
#[derive(Default)]
pub struct EventEmitter {
    on_state_change_hdlr: ArcSwapOption<Mutex<OnStateChangeHdlrFn>>,
    on_ready_to_send_hdlr: ArcSwapOption<Mutex<OnReadyToSendHdlrFn>>,
    on_nominated_hdlr: ArcSwapOption<Mutex<OnNominatedHdlrFn>>,
    on_role_conflict_hdlr: ArcSwapOption<Mutex<OnRoleConflictHdlrFn>>,
    on_destroyed_hdlr: ArcSwapOption<Mutex<OnDestroyedHdlrFn>>,
    on_received_packet_hdlr: ArcSwapOption<Mutex<OnReceivedPacketHdlrFn>>,
}

impl EventEmitter {
    /// Fired after any observable state field changed.
    pub fn on_state_change(&self, f: OnStateChangeHdlrFn) {
        self.on_state_change_hdlr.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired when the connection became usable for writes again.
    pub fn on_ready_to_send(&self, f: OnReadyToSendHdlrFn) {
        self.on_ready_to_send_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired when a nomination was acknowledged or observed; the payload is
    /// the nomination value.
    pub fn on_nominated(&self, f: OnNominatedHdlrFn) {
        self.on_nominated_hdlr.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired when the peer answered a check with 487.
    pub fn on_role_conflict(&self, f: OnRoleConflictHdlrFn) {
        self.on_role_conflict_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Fired exactly once, after which no further event is delivered.
    /// The payload is the connection id.
    pub fn on_destroyed(&self, f: OnDestroyedHdlrFn) {
        self.on_destroyed_hdlr.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Single slot for non-STUN payloads, replacing any previous handler.
    pub fn on_received_packet(&self, f: OnReceivedPacketHdlrFn) {
        self.on_received_packet_hdlr
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub(crate) async fn emit_state_change(&self) {
        if let Some(hdlr) = &*self.on_state_change_hdlr.load() {
            let mut f = hdlr.lock().await;
            f().await;
        }
    }

    pub(crate) async fn emit_ready_to_send(&self) {
        if let Some(hdlr) = &*self.on_ready_to_send_hdlr.load() {
            let mut f = hdlr.lock().await;
            f().await;
        }
    }

    pub(crate) async fn emit_nominated(&self, nomination: u32) {
        if let Some(hdlr) = &*self.on_nominated_hdlr.load() {
            let mut f = hdlr.lock().await;
            f(nomination).await;
        }
    }

    pub(crate) async fn emit_role_conflict(&self) {
        if let Some(hdlr) = &*self.on_role_conflict_hdlr.load() {
            let mut f = hdlr.lock().await;
            f().await;
        }
    }

    pub(crate) async fn emit_destroyed(&self, id: u32) {
        if let Some(hdlr) = &*self.on_destroyed_hdlr.load() {
            let mut f = hdlr.lock().await;
            f(id).await;
        }
    }

    pub(crate) async fn emit_received_packet(&self, packet: Vec<u8>) {
        if let Some(hdlr) = &*self.on_received_packet_hdlr.load() {
            let mut f = hdlr.lock().await;
            f(packet).await;
        }
    }
}
