use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Downward interface a connection consumes from the port that owns it.
///
/// A connection holds the port through a `Weak` handle; a failed upgrade
/// means the port was torn down first and every operation that needed it
/// becomes a no-op with `pending_delete` set.
#[async_trait]
pub trait Port {
    /// Sends a raw packet from this port's socket.
    async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> Result<usize>;

    /// Sends a serialised STUN response. Defaults to the generic send;
    /// ports with a dedicated response path override it.
    async fn send_binding_response(&self, buf: &[u8], dst: SocketAddr) -> Result<usize> {
        self.send_to(buf, dst).await
    }

    /// Id of the network this port is bound on.
    fn network_id(&self) -> u16 {
        0
    }

    /// Invoked once by `Connection::destroy`, after the connection released
    /// its handle, so the port can drop its registry entry and deallocate.
    fn destroy_connection(&self, id: u32);
}
