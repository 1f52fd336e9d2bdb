use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use util::{Buffer, Conn, Error as UtilError};

use crate::mux::mux_func::MatchFunc;

/// One protocol's view over the shared socket. Reads drain the packets
/// the mux routed here; writes go straight to the underlying conn.
pub struct Endpoint {
    pub(crate) id: usize,
    pub(crate) buffer: Buffer,
    pub(crate) match_fn: MatchFunc,
    pub(crate) next_conn: Arc<dyn Conn + Send + Sync>,
    pub(crate) endpoints: Arc<Mutex<HashMap<usize, Arc<Endpoint>>>>,
}

impl Endpoint {
    /// Unregisters the endpoint from the mux. Pending reads unblock
    /// with an error.
    pub async fn close(&self) {
        self.buffer.close().await;

        let mut endpoints = self.endpoints.lock().await;
        endpoints.remove(&self.id);
    }
}

type UtilResult<T> = std::result::Result<T, UtilError>;

#[async_trait]
impl Conn for Endpoint {
    async fn connect(&self, _addr: SocketAddr) -> UtilResult<()> {
        Err(UtilError::Other("not applicable".to_owned()))
    }

    async fn recv(&self, buf: &mut [u8]) -> UtilResult<usize> {
        self.buffer.read(buf, None).await
    }

    async fn recv_from(&self, _buf: &mut [u8]) -> UtilResult<(usize, SocketAddr)> {
        Err(UtilError::Other("not applicable".to_owned()))
    }

    async fn send(&self, buf: &[u8]) -> UtilResult<usize> {
        self.next_conn.send(buf).await
    }

    async fn send_to(&self, _buf: &[u8], _target: SocketAddr) -> UtilResult<usize> {
        Err(UtilError::Other("not applicable".to_owned()))
    }

    fn local_addr(&self) -> UtilResult<SocketAddr> {
        self.next_conn.local_addr()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.next_conn.remote_addr()
    }

    async fn close(&self) -> UtilResult<()> {
        Endpoint::close(self).await;
        Ok(())
    }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}
