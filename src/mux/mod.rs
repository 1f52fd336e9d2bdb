#[cfg(test)]
mod mux_test;

pub mod endpoint;
pub mod mux_func;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use util::{Buffer, Conn};

use crate::error::Result;
use crate::mux::endpoint::Endpoint;
use crate::mux::mux_func::MatchFunc;

/// Cap on the bytes each endpoint buffers while its consumer is slower
/// than the socket. Once full the newest packet is dropped.
const MAX_BUFFER_SIZE: usize = 1000 * 1000;

pub struct Config {
    pub conn: Arc<dyn Conn + Send + Sync>,
    pub buffer_size: usize,
}

/// Mux multiplexes one packet-oriented connection between N endpoints.
/// A single reader task pulls datagrams off the underlying connection
/// and routes each one to the first endpoint whose match function
/// accepts it.
pub struct Mux {
    next_id: Arc<AtomicUsize>,
    next_conn: Arc<dyn Conn + Send + Sync>,
    endpoints: Arc<Mutex<HashMap<usize, Arc<Endpoint>>>>,
    buffer_size: usize,
    closed_ch_tx: Option<mpsc::Sender<()>>,
}

impl Mux {
    pub fn new(config: Config) -> Self {
        let mut m = Mux {
            next_id: Arc::new(AtomicUsize::new(0)),
            next_conn: Arc::clone(&config.conn),
            endpoints: Arc::new(Mutex::new(HashMap::new())),
            buffer_size: config.buffer_size,
            closed_ch_tx: None,
        };

        let (closed_ch_tx, closed_ch_rx) = mpsc::channel(1);
        m.closed_ch_tx = Some(closed_ch_tx);

        let buffer_size = m.buffer_size;
        let next_conn = Arc::clone(&m.next_conn);
        let endpoints = Arc::clone(&m.endpoints);
        tokio::spawn(async move {
            Mux::read_loop(buffer_size, next_conn, closed_ch_rx, endpoints).await;
        });

        m
    }

    /// Creates a new endpoint fed by every packet the match function
    /// accepts. Safe to call at any time, including while the read loop
    /// is dispatching.
    pub async fn new_endpoint(&self, f: MatchFunc) -> Arc<Endpoint> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // A size-limited buffer keeps a slow endpoint from ever
        // blocking the shared read loop.
        let buffer = Buffer::new(0, MAX_BUFFER_SIZE);

        let e = Arc::new(Endpoint {
            id,
            buffer,
            match_fn: f,
            next_conn: Arc::clone(&self.next_conn),
            endpoints: Arc::clone(&self.endpoints),
        });

        let mut endpoints = self.endpoints.lock().await;
        endpoints.insert(e.id, Arc::clone(&e));

        e
    }

    /// Unregisters an endpoint; packets matching it are dropped again.
    pub async fn remove_endpoint(&mut self, e: &Endpoint) {
        let mut endpoints = self.endpoints.lock().await;
        endpoints.remove(&e.id);
    }

    /// Closes every endpoint and stops the read loop. Idempotent.
    pub async fn close(&mut self) {
        self.closed_ch_tx.take();

        let mut endpoints = self.endpoints.lock().await;
        for (_, endpoint) in endpoints.iter() {
            endpoint.buffer.close().await;
        }
        endpoints.clear();
    }

    async fn read_loop(
        buffer_size: usize,
        next_conn: Arc<dyn Conn + Send + Sync>,
        mut closed_ch_rx: mpsc::Receiver<()>,
        endpoints: Arc<Mutex<HashMap<usize, Arc<Endpoint>>>>,
    ) {
        let mut buf = vec![0u8; buffer_size];
        loop {
            tokio::select! {
                _ = closed_ch_rx.recv() => break,
                result = next_conn.recv(&mut buf) => match result {
                    Ok(n) => {
                        if let Err(err) = Mux::dispatch(&buf[..n], &endpoints).await {
                            log::error!("mux: stopping read loop, dispatch failed: {err}");
                            break;
                        }
                    }
                    Err(err) => {
                        log::info!("mux: stopping read loop: {err}");
                        break;
                    }
                }
            }
        }
    }

    pub(crate) async fn dispatch(
        buf: &[u8],
        endpoints: &Arc<Mutex<HashMap<usize, Arc<Endpoint>>>>,
    ) -> Result<()> {
        let mut endpoint = None;

        {
            let eps = endpoints.lock().await;
            for ep in eps.values() {
                if (ep.match_fn)(buf) {
                    endpoint = Some(Arc::clone(ep));
                    break;
                }
            }
        }

        if let Some(ep) = endpoint {
            match ep.buffer.write(buf).await {
                // A full ring drops the newest packet, nothing else.
                Err(util::Error::ErrBufferFull) => {
                    log::debug!("mux: endpoint buffer full, dropping packet");
                }
                Err(err) => return Err(crate::Error::Util(err)),
                _ => {}
            }
        } else if !buf.is_empty() {
            log::debug!(
                "mux: no endpoint for packet starting with {}, dropped",
                buf[0]
            );
        } else {
            log::debug!("mux: zero-length packet, dropped");
        }

        Ok(())
    }
}
