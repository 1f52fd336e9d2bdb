use tokio::sync::Mutex;

use super::*;
use crate::rtp_transceiver::rtp_codec::{
    codec_parameters_fuzzy_search, CodecMatch, RtpCodecCapability,
};

/// A local track with a fixed codec that forwards caller-provided RTP
/// packets verbatim (ssrc and payload type rewritten per binding).
#[derive(Debug)]
pub struct TrackLocalStaticRTP {
    pub(crate) bindings: Mutex<Vec<TrackBinding>>,
    codec: RtpCodecCapability,
    id: String,
    stream_id: String,
}

impl TrackLocalStaticRTP {
    pub fn new(codec: RtpCodecCapability, id: String, stream_id: String) -> Self {
        TrackLocalStaticRTP {
            codec,
            bindings: Mutex::new(vec![]),
            id,
            stream_id,
        }
    }

    pub fn codec(&self) -> RtpCodecCapability {
        self.codec.clone()
    }
}

#[async_trait]
impl TrackLocal for TrackLocalStaticRTP {
    /// Asserts the remote supports our codec and records the binding.
    async fn bind(&self, t: &TrackLocalContext) -> Result<RtpCodecParameters> {
        let parameters = RtpCodecParameters {
            capability: self.codec.clone(),
            ..Default::default()
        };

        let (codec, match_type) = codec_parameters_fuzzy_search(&parameters, t.codec_parameters());
        if match_type == CodecMatch::None {
            return Err(Error::ErrUnsupportedCodec);
        }

        {
            let mut bindings = self.bindings.lock().await;
            bindings.push(TrackBinding {
                id: t.id(),
                ssrc: t.ssrc(),
                payload_type: codec.payload_type,
                write_stream: t.write_stream(),
            });
        }

        Ok(codec)
    }

    async fn unbind(&self, t: &TrackLocalContext) -> Result<()> {
        let mut bindings = self.bindings.lock().await;
        match find_binding(&bindings, t) {
            Some(index) => {
                bindings.remove(index);
                Ok(())
            }
            None => Err(Error::ErrUnbindFailed),
        }
    }

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn stream_id(&self) -> &str {
        self.stream_id.as_str()
    }

    fn kind(&self) -> RtpCodecKind {
        if self.codec.mime_type.starts_with("audio/") {
            RtpCodecKind::Audio
        } else if self.codec.mime_type.starts_with("video/") {
            RtpCodecKind::Video
        } else {
            RtpCodecKind::Unspecified
        }
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

#[async_trait]
impl TrackLocalWriter for TrackLocalStaticRTP {
    /// Writes the packet to every bound PeerConnection; one failing
    /// binding does not stop the others.
    async fn write_rtp(&self, pkt: &rtp::packet::Packet) -> Result<usize> {
        let mut n = 0;
        let mut write_err = None;

        let bindings = {
            let bindings = self.bindings.lock().await;
            bindings.clone()
        };
        for b in bindings {
            if let Some(write_stream) = &b.write_stream {
                let mut out = pkt.clone();
                out.header.ssrc = b.ssrc;
                out.header.payload_type = b.payload_type;
                match write_stream.write_rtp(&out).await {
                    Ok(m) => n += m,
                    Err(err) => write_err = Some(err),
                }
            }
        }

        match write_err {
            Some(err) => Err(err),
            None => Ok(n),
        }
    }

    async fn write(&self, b: &[u8]) -> Result<usize> {
        let mut buf = Bytes::copy_from_slice(b);
        let pkt = rtp::packet::Packet::unmarshal(&mut buf)?;
        self.write_rtp(&pkt).await?;
        Ok(b.len())
    }
}
