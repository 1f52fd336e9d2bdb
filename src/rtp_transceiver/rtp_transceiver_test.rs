use super::rtp_codec::RtcpFeedback;
use super::*;
use crate::api::media_engine::MIME_TYPE_VP8;

fn video_codec(pt: PayloadType) -> RtpCodecParameters {
    RtpCodecParameters {
        capability: RtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        payload_type: pt,
    }
}

fn rtx_codec(pt: PayloadType, apt: PayloadType) -> RtpCodecParameters {
    RtpCodecParameters {
        capability: RtpCodecCapability {
            mime_type: MIME_TYPE_RTX.to_owned(),
            clock_rate: 90000,
            sdp_fmtp_line: format!("apt={apt}"),
            ..Default::default()
        },
        payload_type: pt,
    }
}

async fn new_video_transceiver() -> Arc<RtpTransceiver> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .expect("default codecs");

    RtpTransceiver::new(
        None,
        None,
        RtpTransceiverDirection::Recvonly,
        RtpCodecKind::Video,
        vec![],
        Arc::new(media_engine),
        None,
    )
    .await
}

#[tokio::test]
async fn test_set_codec_preferences_rejects_unknown() {
    let t = new_video_transceiver().await;

    // VP8 is registered, so preferring it is fine.
    t.set_codec_preferences(vec![video_codec(96)])
        .await
        .expect("known codec accepted");

    let unknown = RtpCodecParameters {
        capability: RtpCodecCapability {
            mime_type: "video/secret".to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        payload_type: 109,
    };
    let err = t
        .set_codec_preferences(vec![unknown])
        .await
        .expect_err("unknown codec rejected");
    assert_eq!(err, Error::ErrRTPTransceiverCodecUnsupported);

    // Clearing the preferences restores the engine's set.
    t.set_codec_preferences(vec![]).await.expect("reset");
    assert!(!t.get_codecs().await.is_empty());
}

#[tokio::test]
async fn test_get_codecs_strips_orphaned_rtx() {
    let t = new_video_transceiver().await;

    t.set_codec_preferences(vec![
        video_codec(96),
        rtx_codec(97, 96),
        // Points at a payload type that is not in the list.
        rtx_codec(99, 98),
    ])
    .await
    .expect("preferences");

    let codecs = t.get_codecs().await;
    let payload_types: Vec<PayloadType> = codecs.iter().map(|c| c.payload_type).collect();
    assert!(payload_types.contains(&96));
    assert!(payload_types.contains(&97));
    assert!(!payload_types.contains(&99));
}

#[tokio::test]
async fn test_mid_is_write_once() {
    let t = new_video_transceiver().await;

    assert!(t.mid().await.is_empty());
    t.set_mid("1".to_owned()).await.expect("first set");
    assert_eq!(t.mid().await, "1");

    let err = t.set_mid("2".to_owned()).await.expect_err("mid is pinned");
    assert_eq!(err, Error::ErrRTPTransceiverCannotChangeMid);
    assert_eq!(t.mid().await, "1");
}

#[tokio::test]
async fn test_stop_makes_transceiver_inactive() {
    let t = new_video_transceiver().await;

    t.stop().await.expect("stop");
    assert!(t.stopped.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(t.direction(), RtpTransceiverDirection::Inactive);

    t.stop().await.expect("stop twice");
}

#[test]
fn test_rtcp_feedback_default() {
    let fb = RtcpFeedback::default();
    assert!(fb.typ.is_empty() && fb.parameter.is_empty());
}
