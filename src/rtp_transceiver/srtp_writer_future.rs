use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use interceptor::{Attributes, RTCPReader, RTPWriter};
use srtp::session::Session;
use srtp::stream::Stream;
use tokio::sync::{Mutex, Notify};

use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, Result};
use crate::rtp_transceiver::SSRC;

/// Write/read endpoint for one outbound SSRC that only comes alive
/// once the SRTP sessions exist; calls made earlier park on the
/// transport's srtp-ready gate.
pub(crate) struct SrtpWriterFuture {
    pub(crate) closed: AtomicBool,
    pub(crate) ssrc: SSRC,
    pub(crate) rtp_transport: Arc<DtlsTransport>,
    pub(crate) stop_called_signal: Arc<AtomicBool>,
    pub(crate) stop_called: Arc<Notify>,
    pub(crate) rtcp_read_stream: Mutex<Option<Arc<Stream>>>,
    pub(crate) rtp_write_session: Mutex<Option<Arc<Session>>>,
}

impl SrtpWriterFuture {
    pub(crate) fn new(
        ssrc: SSRC,
        rtp_transport: Arc<DtlsTransport>,
        stop_called_signal: Arc<AtomicBool>,
        stop_called: Arc<Notify>,
    ) -> Self {
        SrtpWriterFuture {
            closed: AtomicBool::new(false),
            ssrc,
            rtp_transport,
            stop_called_signal,
            stop_called,
            rtcp_read_stream: Mutex::new(None),
            rtp_write_session: Mutex::new(None),
        }
    }

    async fn init(&self, return_when_no_srtp: bool) -> Result<()> {
        if return_when_no_srtp {
            if self.stop_called_signal.load(Ordering::SeqCst) {
                return Err(Error::ErrConnectionClosed);
            }
            if !self.rtp_transport.srtp_ready_signal.load(Ordering::SeqCst) {
                return Ok(());
            }
        } else {
            let mut rx = self.rtp_transport.srtp_ready_rx.lock().await;
            if let Some(srtp_ready_rx) = &mut *rx {
                tokio::select! {
                    _ = self.stop_called.notified() => return Err(Error::ErrConnectionClosed),
                    _ = srtp_ready_rx.recv() => {}
                }
            }
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ErrConnectionClosed);
        }

        if let Some(srtcp_session) = self.rtp_transport.get_srtcp_session().await {
            let rtcp_read_stream = srtcp_session.open(self.ssrc).await;
            let mut stream = self.rtcp_read_stream.lock().await;
            *stream = Some(rtcp_read_stream);
        }

        {
            let srtp_session = self.rtp_transport.get_srtp_session().await;
            let mut session = self.rtp_write_session.lock().await;
            *session = srtp_session;
        }

        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let stream = {
            let mut stream = self.rtcp_read_stream.lock().await;
            stream.take()
        };
        if let Some(rtcp_read_stream) = stream {
            Ok(rtcp_read_stream.close().await?)
        } else {
            Ok(())
        }
    }

    pub async fn read(&self, b: &mut [u8]) -> Result<usize> {
        {
            let stream = {
                let stream = self.rtcp_read_stream.lock().await;
                stream.clone()
            };
            if let Some(rtcp_read_stream) = stream {
                return Ok(rtcp_read_stream.read(b).await?);
            }
        }

        self.init(false).await?;

        let stream = {
            let stream = self.rtcp_read_stream.lock().await;
            stream.clone()
        };
        if let Some(rtcp_read_stream) = stream {
            return Ok(rtcp_read_stream.read(b).await?);
        }

        Ok(0)
    }

    pub async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        {
            let session = {
                let session = self.rtp_write_session.lock().await;
                session.clone()
            };
            if let Some(rtp_write_session) = session {
                return Ok(rtp_write_session.write_rtp(pkt).await?);
            }
        }

        self.init(true).await?;

        let session = {
            let session = self.rtp_write_session.lock().await;
            session.clone()
        };
        if let Some(rtp_write_session) = session {
            return Ok(rtp_write_session.write_rtp(pkt).await?);
        }

        Ok(0)
    }
}

type InterceptorResult<T> = std::result::Result<T, interceptor::Error>;

#[async_trait]
impl RTPWriter for SrtpWriterFuture {
    async fn write(&self, pkt: &rtp::packet::Packet, _a: &Attributes) -> InterceptorResult<usize> {
        Ok(self.write_rtp(pkt).await?)
    }
}

#[async_trait]
impl RTCPReader for SrtpWriterFuture {
    async fn read(
        &self,
        buf: &mut [u8],
        a: &Attributes,
    ) -> InterceptorResult<(Vec<Box<dyn rtcp::packet::Packet + Send + Sync>>, Attributes)> {
        let n = self.read(buf).await?;
        let mut b = &buf[..n];
        let pkts = rtcp::packet::unmarshal(&mut b)?;

        Ok((pkts, a.clone()))
    }
}
