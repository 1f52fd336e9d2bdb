use std::io::Cursor;

use super::*;

fn parse(raw: &str) -> SessionDescription {
    let mut cursor = Cursor::new(raw.as_bytes());
    SessionDescription::unmarshal(&mut cursor).expect("valid sdp")
}

fn must_default_engine() -> MediaEngine {
    let mut m = MediaEngine::default();
    m.register_default_codecs().expect("default codecs");
    m
}

#[tokio::test]
async fn test_opus_case_insensitive_negotiation() -> crate::error::Result<()> {
    const OPUS_UPCASE_OFFER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
a=rtpmap:111 OPUS/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n";

    let m = must_default_engine();
    m.update_from_remote_description(&parse(OPUS_UPCASE_OFFER))
        .await?;

    let codecs = m.get_codecs_by_kind(RtpCodecKind::Audio).await;
    assert_eq!(codecs.len(), 1);
    assert!(codecs[0]
        .capability
        .mime_type
        .eq_ignore_ascii_case(MIME_TYPE_OPUS));
    assert_eq!(codecs[0].payload_type, 111);

    Ok(())
}

#[tokio::test]
async fn test_remote_payload_types_win() -> crate::error::Result<()> {
    // The remote numbers VP8 differently; after negotiation we must
    // speak their numbering.
    const VP8_REMAPPED_OFFER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 100\r\n\
a=mid:0\r\n\
a=rtpmap:100 VP8/90000\r\n";

    let m = must_default_engine();
    m.update_from_remote_description(&parse(VP8_REMAPPED_OFFER))
        .await?;

    let codecs = m.get_codecs_by_kind(RtpCodecKind::Video).await;
    assert_eq!(codecs.len(), 1);
    assert_eq!(codecs[0].payload_type, 100);

    Ok(())
}

#[tokio::test]
async fn test_no_common_codec_leaves_engine_unnegotiated() -> crate::error::Result<()> {
    const UNKNOWN_CODEC_OFFER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 127\r\n\
a=mid:0\r\n\
a=rtpmap:127 secret-codec/8000\r\n";

    let m = must_default_engine();
    m.update_from_remote_description(&parse(UNKNOWN_CODEC_OFFER))
        .await?;

    assert!(!m.negotiated_audio.load(Ordering::SeqCst));
    // Unnegotiated kind falls back to the full registry.
    assert!(!m.get_codecs_by_kind(RtpCodecKind::Audio).await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_rtx_matched_through_apt() -> crate::error::Result<()> {
    const VP8_WITH_RTX_OFFER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 94 95\r\n\
a=mid:0\r\n\
a=rtpmap:94 VP8/90000\r\n\
a=rtpmap:95 rtx/90000\r\n\
a=fmtp:95 apt=94\r\n";

    let m = must_default_engine();
    m.update_from_remote_description(&parse(VP8_WITH_RTX_OFFER))
        .await?;

    let codecs = m.get_codecs_by_kind(RtpCodecKind::Video).await;
    let mime_types: Vec<String> = codecs
        .iter()
        .map(|c| c.capability.mime_type.to_lowercase())
        .collect();
    assert!(mime_types.contains(&"video/vp8".to_owned()));
    assert!(mime_types.contains(&"video/rtx".to_owned()));

    Ok(())
}

#[test]
fn test_register_codec_deduplicates() {
    let mut m = MediaEngine::default();
    let codec = RtpCodecParameters {
        capability: RtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        payload_type: 96,
    };
    m.register_codec(codec.clone(), RtpCodecKind::Video)
        .expect("register");
    m.register_codec(codec, RtpCodecKind::Video).expect("register twice");
    assert_eq!(m.video_codecs.len(), 1);
}

#[test]
fn test_register_header_extension_direction_validation() {
    let mut m = MediaEngine::default();
    let err = m
        .register_header_extension(
            RtpHeaderExtensionCapability {
                uri: "urn:ietf:params:rtp-hdrext:sdes:mid".to_owned(),
            },
            RtpCodecKind::Video,
            vec![RtpTransceiverDirection::Sendrecv],
        )
        .expect_err("sendrecv is not a valid registration direction");
    assert_eq!(err, Error::ErrRegisterHeaderExtensionInvalidDirection);
}
