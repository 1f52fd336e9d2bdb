use media::Sample;
use tokio::sync::Mutex;

use super::track_local_static_rtp::TrackLocalStaticRTP;
use super::*;
use crate::rtp_transceiver::rtp_codec::RtpCodecCapability;
use crate::track::RTP_OUTBOUND_MTU;

#[derive(Default)]
struct SampleWriter {
    packetizer: Option<Box<dyn rtp::packetizer::Packetizer + Send + Sync>>,
    sequencer: Option<Box<dyn rtp::sequence::Sequencer + Send + Sync>>,
    clock_rate: f64,
}

/// A local track with a fixed codec fed whole encoded samples; the
/// track packetizes them itself.
pub struct TrackLocalStaticSample {
    rtp_track: TrackLocalStaticRTP,
    sample_writer: Mutex<SampleWriter>,
}

impl TrackLocalStaticSample {
    pub fn new(codec: RtpCodecCapability, id: String, stream_id: String) -> Self {
        TrackLocalStaticSample {
            rtp_track: TrackLocalStaticRTP::new(codec, id, stream_id),
            sample_writer: Mutex::new(SampleWriter::default()),
        }
    }

    pub fn codec(&self) -> RtpCodecCapability {
        self.rtp_track.codec()
    }

    /// Packetizes and writes one sample to every bound connection.
    /// A no-op until the track is bound.
    pub async fn write_sample(&self, sample: &Sample) -> Result<()> {
        let packets = {
            let mut writer = self.sample_writer.lock().await;
            if writer.packetizer.is_none() || writer.sequencer.is_none() {
                return Ok(());
            }

            // Account for packets the application dropped upstream so
            // sequence numbers and timestamps stay plausible.
            let clock_rate = writer.clock_rate;
            if let Some(sequencer) = &writer.sequencer {
                for _ in 0..sample.prev_dropped_packets {
                    sequencer.next_sequence_number();
                }
            }

            if let Some(packetizer) = &mut writer.packetizer {
                let samples = (sample.duration.as_secs_f64() * clock_rate) as u32;
                if sample.prev_dropped_packets > 0 {
                    packetizer.skip_samples(samples * sample.prev_dropped_packets as u32);
                }
                packetizer.packetize(&sample.data, samples)?
            } else {
                vec![]
            }
        };

        let mut write_err = None;
        for p in packets {
            if let Err(err) = self.rtp_track.write_rtp(&p).await {
                write_err = Some(err);
            }
        }

        match write_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TrackLocal for TrackLocalStaticSample {
    async fn bind(&self, t: &TrackLocalContext) -> Result<RtpCodecParameters> {
        let codec = self.rtp_track.bind(t).await?;

        let mut writer = self.sample_writer.lock().await;

        // One packetizer serves every binding.
        if writer.packetizer.is_some() {
            return Ok(codec);
        }

        let payloader = codec.capability.payloader_for_codec()?;
        let sequencer: Box<dyn rtp::sequence::Sequencer + Send + Sync> =
            Box::new(rtp::sequence::new_random_sequencer());

        writer.packetizer = Some(Box::new(rtp::packetizer::new_packetizer(
            RTP_OUTBOUND_MTU,
            0, // payload type is stamped per binding on write
            0, // ssrc is stamped per binding on write
            payloader,
            sequencer.clone(),
            codec.capability.clock_rate,
        )));
        writer.sequencer = Some(sequencer);
        writer.clock_rate = codec.capability.clock_rate as f64;

        Ok(codec)
    }

    async fn unbind(&self, t: &TrackLocalContext) -> Result<()> {
        self.rtp_track.unbind(t).await
    }

    fn id(&self) -> &str {
        self.rtp_track.id()
    }

    fn stream_id(&self) -> &str {
        self.rtp_track.stream_id()
    }

    fn kind(&self) -> RtpCodecKind {
        self.rtp_track.kind()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}
