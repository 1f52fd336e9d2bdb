use std::sync::Arc;

use util::conn::conn_pipe::pipe;
use util::Conn;

use super::mux_func::*;
use super::*;
use crate::error::Result;

const PIPE_BUFFER_SIZE: usize = 8192;

#[test]
fn test_match_funcs() {
    // RFC 7983 first-byte ranges.
    assert!(match_dtls(&[20]));
    assert!(match_dtls(&[63]));
    assert!(!match_dtls(&[19]));
    assert!(!match_dtls(&[64]));
    assert!(!match_dtls(&[]));

    // RTCP packet types 200..=206 on the second octet decide SRTCP.
    assert!(match_srtcp(&[128, 200]));
    assert!(match_srtcp(&[191, 206]));
    assert!(match_srtp(&[128, 96]));
    assert!(match_srtp(&[128, 207]));
    assert!(!match_srtp(&[128, 201]));
    assert!(!match_srtp(&[127, 96]));
}

#[tokio::test]
async fn test_dispatch_no_endpoints() -> Result<()> {
    let (ca, _cb) = pipe();

    let mut m = Mux::new(Config {
        conn: Arc::new(ca),
        buffer_size: PIPE_BUFFER_SIZE,
    });

    // Nothing is registered; the packet is silently dropped.
    Mux::dispatch(&[0], &m.endpoints).await?;
    m.close().await;

    Ok(())
}

#[tokio::test]
async fn test_dispatch_by_first_byte() -> Result<()> {
    let (ca, cb) = pipe();

    let mut m = Mux::new(Config {
        conn: Arc::new(ca),
        buffer_size: PIPE_BUFFER_SIZE,
    });

    let dtls_endpoint = m.new_endpoint(Box::new(match_dtls)).await;
    let rtp_endpoint = m.new_endpoint(Box::new(match_srtp)).await;

    cb.send(&[22, 1, 2, 3]).await?;
    cb.send(&[128, 96, 7, 8]).await?;

    let mut buf = vec![0u8; PIPE_BUFFER_SIZE];
    let n = dtls_endpoint.recv(&mut buf).await?;
    assert_eq!(&buf[..n], &[22, 1, 2, 3]);

    let n = rtp_endpoint.recv(&mut buf).await?;
    assert_eq!(&buf[..n], &[128, 96, 7, 8]);

    m.close().await;

    Ok(())
}

#[tokio::test]
async fn test_endpoint_write_passes_through() -> Result<()> {
    let (ca, cb) = pipe();

    let mut m = Mux::new(Config {
        conn: Arc::new(ca),
        buffer_size: PIPE_BUFFER_SIZE,
    });

    let e = m.new_endpoint(Box::new(match_all)).await;
    e.send(b"ping").await?;

    let mut buf = vec![0u8; PIPE_BUFFER_SIZE];
    let n = cb.recv(&mut buf).await?;
    assert_eq!(&buf[..n], b"ping");

    m.close().await;

    Ok(())
}

#[tokio::test]
async fn test_remove_endpoint() -> Result<()> {
    let (ca, _cb) = pipe();

    let mut m = Mux::new(Config {
        conn: Arc::new(ca),
        buffer_size: PIPE_BUFFER_SIZE,
    });

    let e = m.new_endpoint(Box::new(match_all)).await;
    m.remove_endpoint(&e).await;
    assert!(m.endpoints.lock().await.is_empty());

    let e = m.new_endpoint(Box::new(match_all)).await;
    Mux::dispatch(&[42], &m.endpoints).await?;

    let mut buf = vec![0u8; PIPE_BUFFER_SIZE];
    let n = e.recv(&mut buf).await?;
    assert_eq!(&buf[..n], &[42]);

    m.close().await;

    Ok(())
}
