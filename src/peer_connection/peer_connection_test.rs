use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::api::interceptor_registry::register_default_interceptors;
use crate::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use crate::api::setting_engine::SettingEngine;
use crate::api::{Api, ApiBuilder};
use crate::data_channel::data_channel_message::DataChannelMessage;
use crate::rtp_transceiver::rtp_codec::RtpCodecCapability;
use crate::track::track_local::track_local_static_sample::TrackLocalStaticSample;

pub(crate) fn new_api() -> Api {
    ApiBuilder::new().build()
}

pub(crate) fn new_media_api() -> Api {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .expect("default codecs");
    let registry = register_default_interceptors(
        interceptor::registry::Registry::new(),
        &mut media_engine,
    )
    .expect("default interceptors");

    ApiBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build()
}

pub(crate) async fn new_pair(api: &Api) -> Result<(PeerConnection, PeerConnection)> {
    let pc_offer = api.new_peer_connection(Configuration::default()).await?;
    let pc_answer = api.new_peer_connection(Configuration::default()).await?;
    Ok((pc_offer, pc_answer))
}

/// Runs a complete non-trickle offer/answer round between two local
/// peers; candidates ride inside the descriptions.
pub(crate) async fn signal_pair(
    pc_offer: &PeerConnection,
    pc_answer: &PeerConnection,
) -> Result<()> {
    let offer = pc_offer.create_offer(None).await?;
    let mut offer_gathering_complete = pc_offer.gathering_complete_promise().await;
    pc_offer.set_local_description(offer).await?;
    let _ = offer_gathering_complete.recv().await;

    let offer = pc_offer
        .local_description()
        .await
        .ok_or(Error::ErrNoRemoteDescription)?;
    pc_answer.set_remote_description(offer).await?;

    let answer = pc_answer.create_answer(None).await?;
    let mut answer_gathering_complete = pc_answer.gathering_complete_promise().await;
    pc_answer.set_local_description(answer).await?;
    let _ = answer_gathering_complete.recv().await;

    let answer = pc_answer
        .local_description()
        .await
        .ok_or(Error::ErrNoRemoteDescription)?;
    pc_offer.set_remote_description(answer).await
}

pub(crate) async fn close_pair_now(pc1: &PeerConnection, pc2: &PeerConnection) {
    if let Err(err) = pc1.close().await {
        log::warn!("close_pair_now: {err}");
    }
    if let Err(err) = pc2.close().await {
        log::warn!("close_pair_now: {err}");
    }
}

#[tokio::test]
async fn test_signaling_state_walk() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let _dc = pc_offer.create_data_channel("walk", None).await?;

    assert_eq!(pc_offer.signaling_state(), SignalingState::Stable);

    let offer = pc_offer.create_offer(None).await?;
    pc_offer.set_local_description(offer.clone()).await?;
    assert_eq!(pc_offer.signaling_state(), SignalingState::HaveLocalOffer);
    assert!(pc_offer.pending_local_description().await.is_some());

    pc_answer.set_remote_description(offer).await?;
    assert_eq!(pc_answer.signaling_state(), SignalingState::HaveRemoteOffer);

    let answer = pc_answer.create_answer(None).await?;
    pc_answer.set_local_description(answer.clone()).await?;
    assert_eq!(pc_answer.signaling_state(), SignalingState::Stable);
    assert!(pc_answer.current_local_description().await.is_some());

    pc_offer.set_remote_description(answer).await?;
    assert_eq!(pc_offer.signaling_state(), SignalingState::Stable);
    assert!(pc_offer.pending_local_description().await.is_none());

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_set_local_description_must_match_generated() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let _offer = pc_offer.create_offer(None).await?;
    let foreign = SessionDescription::offer(
        "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_owned(),
    )?;
    let err = pc_offer
        .set_local_description(foreign)
        .await
        .expect_err("foreign SDP must not apply as local");
    assert_eq!(err, Error::ErrSDPDoesNotMatchOffer);

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

#[tokio::test]
async fn test_create_answer_requires_remote_offer() -> Result<()> {
    let api = new_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;

    let err = pc.create_answer(None).await.expect_err("no remote offer");
    assert_eq!(err, Error::ErrNoRemoteDescription);

    pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_create_data_channel_validation() -> Result<()> {
    let api = new_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;

    let err = pc
        .create_data_channel(
            "bad",
            Some(DataChannelInit {
                max_packet_life_time: Some(100),
                max_retransmits: Some(3),
                ..Default::default()
            }),
        )
        .await
        .expect_err("mutually exclusive reliability knobs");
    assert_eq!(err, Error::ErrRetransmitsOrPacketLifeTime);

    let err = pc
        .create_data_channel(
            "bad",
            Some(DataChannelInit {
                negotiated: Some(true),
                ..Default::default()
            }),
        )
        .await
        .expect_err("negotiated without id");
    assert_eq!(err, Error::ErrNegotiatedWithoutID);

    let dc = pc
        .create_data_channel(
            "good",
            Some(DataChannelInit {
                ordered: Some(false),
                max_retransmits: Some(3),
                ..Default::default()
            }),
        )
        .await?;
    assert_eq!(dc.label(), "good");
    assert!(!dc.ordered());
    assert_eq!(dc.max_retransmits(), Some(3));
    assert_eq!(dc.id(), None, "in-band ids are assigned at SCTP time");

    pc.close().await?;
    Ok(())
}

#[tokio::test]
async fn test_on_negotiation_needed_fires_once_per_change() -> Result<()> {
    let api = new_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;

    let fired = Arc::new(AtomicU32::new(0));
    let (tx, mut rx) = mpsc::channel::<()>(8);
    {
        let fired = Arc::clone(&fired);
        pc.on_negotiation_needed(Box::new(move || {
            let fired = Arc::clone(&fired);
            let tx = tx.clone();
            Box::pin(async move {
                fired.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(()).await;
            })
        }));
    }

    let _dc = pc.create_data_channel("trigger", None).await?;

    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("negotiation needed fired")
        .expect("channel open");
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    pc.close().await?;
    Ok(())
}

// End-to-end data-channel echo: A sends Ping on open, B answers every
// message with Pong.
#[tokio::test]
async fn test_data_channel_echo() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let (pong_tx, mut pong_rx) = mpsc::channel::<String>(1);

    pc_answer.on_data_channel(Box::new(move |dc: Arc<DataChannel>| {
        Box::pin(async move {
            if dc.label() != "data" {
                return;
            }
            let dc2 = Arc::clone(&dc);
            dc.on_message(Box::new(move |_msg: DataChannelMessage| {
                let dc3 = Arc::clone(&dc2);
                Box::pin(async move {
                    let _ = dc3.send_text("Pong").await;
                })
            }));
        })
    }));

    let dc = pc_offer.create_data_channel("data", None).await?;
    {
        let dc2 = Arc::clone(&dc);
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                let _ = dc2.send_text("Ping").await;
            })
        }));
    }
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let pong_tx = pong_tx.clone();
        Box::pin(async move {
            let text = String::from_utf8_lossy(&msg.data).to_string();
            let _ = pong_tx.send(text).await;
        })
    }));

    signal_pair(&pc_offer, &pc_answer).await?;

    let pong = timeout(Duration::from_secs(10), pong_rx.recv())
        .await
        .expect("echo within deadline")
        .expect("channel open");
    assert_eq!(pong, "Pong");

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

// Ordered channels deliver in send order.
#[tokio::test]
async fn test_data_channel_ordered_delivery() -> Result<()> {
    const COUNT: u32 = 32;

    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let (done_tx, mut done_rx) = mpsc::channel::<Vec<u32>>(1);
    let received = Arc::new(tokio::sync::Mutex::new(Vec::<u32>::new()));

    pc_answer.on_data_channel(Box::new(move |dc: Arc<DataChannel>| {
        let received = Arc::clone(&received);
        let done_tx = done_tx.clone();
        Box::pin(async move {
            dc.on_message(Box::new(move |msg: DataChannelMessage| {
                let received = Arc::clone(&received);
                let done_tx = done_tx.clone();
                Box::pin(async move {
                    let n: u32 = String::from_utf8_lossy(&msg.data).parse().unwrap_or(0);
                    let mut r = received.lock().await;
                    r.push(n);
                    if r.len() == COUNT as usize {
                        let _ = done_tx.send(r.clone()).await;
                    }
                })
            }));
        })
    }));

    let dc = pc_offer.create_data_channel("ordered", None).await?;
    {
        let dc2 = Arc::clone(&dc);
        dc.on_open(Box::new(move || {
            Box::pin(async move {
                for i in 1..=COUNT {
                    let _ = dc2.send_text(format!("{i}")).await;
                }
            })
        }));
    }

    signal_pair(&pc_offer, &pc_answer).await?;

    let received = timeout(Duration::from_secs(10), done_rx.recv())
        .await
        .expect("all messages within deadline")
        .expect("channel open");
    assert_eq!(received, (1..=COUNT).collect::<Vec<u32>>());

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

// Mutating the advertised fingerprint must take the connection to
// failed, not to connected.
#[tokio::test]
async fn test_fingerprint_mismatch_fails_connection() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let (failed_tx, mut failed_rx) = mpsc::channel::<()>(1);
    pc_answer.on_peer_connection_state_change(Box::new(move |state| {
        let failed_tx = failed_tx.clone();
        Box::pin(async move {
            if state == PeerConnectionState::Failed {
                let _ = failed_tx.send(()).await;
            }
        })
    }));

    let _dc = pc_offer.create_data_channel("data", None).await?;

    let offer = pc_offer.create_offer(None).await?;
    let mut gathering_complete = pc_offer.gathering_complete_promise().await;
    pc_offer.set_local_description(offer).await?;
    let _ = gathering_complete.recv().await;
    let offer = pc_offer.local_description().await.expect("local offer");

    // Rewrite the fingerprint digest to a value the certificate can
    // never hash to.
    let re = regex::Regex::new(r"(?m)^a=fingerprint:sha-256 .*$").expect("regex");
    let bogus = format!("a=fingerprint:sha-256 {}", "AA:".repeat(31) + "AA");
    let munged = re.replace_all(&offer.sdp, bogus.as_str()).to_string();
    assert_ne!(munged, offer.sdp, "offer must carry a fingerprint");

    pc_answer
        .set_remote_description(SessionDescription::offer(munged)?)
        .await?;
    let answer = pc_answer.create_answer(None).await?;
    let mut gathering_complete = pc_answer.gathering_complete_promise().await;
    pc_answer.set_local_description(answer).await?;
    let _ = gathering_complete.recv().await;
    let answer = pc_answer.local_description().await.expect("local answer");
    pc_offer.set_remote_description(answer).await?;

    timeout(Duration::from_secs(30), failed_rx.recv())
        .await
        .expect("fingerprint mismatch must fail the connection")
        .expect("channel open");

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

// Legacy `m=application ... DTLS/SCTP 5000` + a=sctpmap offers must
// still negotiate a data channel.
#[tokio::test]
async fn test_legacy_sctp_sdp_accepted() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let (open_tx, mut open_rx) = mpsc::channel::<()>(1);
    pc_answer.on_data_channel(Box::new(move |dc: Arc<DataChannel>| {
        let open_tx = open_tx.clone();
        Box::pin(async move {
            if dc.label() == "legacy" {
                let _ = open_tx.send(()).await;
            }
        })
    }));

    let dc = pc_offer.create_data_channel("legacy", None).await?;
    let _ = dc;

    let offer = pc_offer.create_offer(None).await?;
    let mut gathering_complete = pc_offer.gathering_complete_promise().await;
    pc_offer.set_local_description(offer).await?;
    let _ = gathering_complete.recv().await;
    let offer = pc_offer.local_description().await.expect("local offer");

    // Downgrade the application section to the legacy draft form.
    let munged = offer
        .sdp
        .replace(
            "UDP/DTLS/SCTP webrtc-datachannel",
            "DTLS/SCTP 5000",
        )
        .lines()
        .filter(|l| !l.starts_with("a=sctp-port:") && !l.starts_with("a=max-message-size:"))
        .collect::<Vec<&str>>()
        .join("\r\n")
        + "\r\na=sctpmap:5000 webrtc-datachannel 256\r\n";

    pc_answer
        .set_remote_description(SessionDescription::offer(munged)?)
        .await?;
    let answer = pc_answer.create_answer(None).await?;
    let mut gathering_complete = pc_answer.gathering_complete_promise().await;
    pc_answer.set_local_description(answer).await?;
    let _ = gathering_complete.recv().await;
    let answer = pc_answer.local_description().await.expect("local answer");
    pc_offer.set_remote_description(answer).await?;

    timeout(Duration::from_secs(10), open_rx.recv())
        .await
        .expect("legacy offer must still open the channel")
        .expect("channel open");

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

// Renegotiation: after a data-channel-only session, the answerer asks
// for video and the offerer adds a VP8 track.
#[tokio::test]
async fn test_renegotiation_add_track_fires_on_track() -> Result<()> {
    let api = new_media_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let _dc = pc_offer.create_data_channel("bootstrap", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    let (track_tx, mut track_rx) = mpsc::channel::<u32>(1);
    pc_answer.on_track(Box::new(move |track, _receiver| {
        let track_tx = track_tx.clone();
        Box::pin(async move {
            let _ = track_tx.send(track.ssrc()).await;
        })
    }));

    pc_answer
        .add_transceiver_from_kind(
            RtpCodecKind::Video,
            &[crate::rtp_transceiver::RtpTransceiverInit {
                direction: RtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }],
        )
        .await?;

    let track = Arc::new(TrackLocalStaticSample::new(
        RtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_owned(),
        "camera".to_owned(),
    ));
    let sender = pc_offer
        .add_track(Arc::clone(&track) as Arc<dyn crate::track::track_local::TrackLocal + Send + Sync>)
        .await?;

    signal_pair(&pc_offer, &pc_answer).await?;

    // Push media until the receiver has seen a packet.
    let writer = tokio::spawn({
        let track = Arc::clone(&track);
        async move {
            loop {
                let _ = track
                    .write_sample(&media::Sample {
                        data: bytes::Bytes::from_static(&[0x10, 0x00, 0x01, 0x02]),
                        duration: Duration::from_millis(33),
                        ..Default::default()
                    })
                    .await;
                tokio::time::sleep(Duration::from_millis(33)).await;
            }
        }
    });

    let got_ssrc = timeout(Duration::from_secs(30), track_rx.recv())
        .await
        .expect("on_track within deadline")
        .expect("channel open");
    writer.abort();

    assert_eq!(got_ssrc, sender.ssrc);
    assert!(track_rx.try_recv().is_err(), "on_track fires exactly once");

    close_pair_now(&pc_offer, &pc_answer).await;
    Ok(())
}

// Close while ICE is still connecting; everything must wind down.
#[tokio::test]
async fn test_close_during_ice() -> Result<()> {
    let api = new_api();
    let (pc_offer, pc_answer) = new_pair(&api).await?;

    let _dc = pc_offer.create_data_channel("data", None).await?;
    signal_pair(&pc_offer, &pc_answer).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    close_pair_now(&pc_offer, &pc_answer).await;

    assert_eq!(pc_offer.connection_state(), PeerConnectionState::Closed);
    assert_eq!(pc_answer.connection_state(), PeerConnectionState::Closed);
    assert_eq!(pc_offer.signaling_state(), SignalingState::Closed);

    Ok(())
}

// Close is idempotent: the second call is a quiet no-op.
#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let api = new_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;

    let state_changes = Arc::new(AtomicU32::new(0));
    {
        let state_changes = Arc::clone(&state_changes);
        pc.on_peer_connection_state_change(Box::new(move |_| {
            let state_changes = Arc::clone(&state_changes);
            Box::pin(async move {
                state_changes.fetch_add(1, Ordering::SeqCst);
            })
        }));
    }

    pc.close().await?;
    let after_first = state_changes.load(Ordering::SeqCst);
    pc.close().await?;
    assert_eq!(state_changes.load(Ordering::SeqCst), after_first);
    assert_eq!(pc.connection_state(), PeerConnectionState::Closed);

    Ok(())
}

// The advertised SCTP max-message-size follows the SettingEngine, and
// a silent remote leaves the sentinel in place.
#[tokio::test]
async fn test_max_message_size_signaling() -> Result<()> {
    // Explicit setting.
    let mut setting_engine = SettingEngine::default();
    setting_engine.set_sctp_max_message_size(4321);
    let api = ApiBuilder::new().with_setting_engine(setting_engine).build();
    let pc = api.new_peer_connection(Configuration::default()).await?;
    let _dc = pc.create_data_channel("data", None).await?;
    let offer = pc.create_offer(None).await?;
    assert!(offer.sdp.contains("a=max-message-size:4321\r\n"));
    pc.close().await?;

    // Default: the implementation-wide cap.
    let api = new_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;
    let _dc = pc.create_data_channel("data", None).await?;
    let offer = pc.create_offer(None).await?;
    assert!(offer.sdp.contains("a=max-message-size:1073741823\r\n"));

    // Nothing announced by the remote: the transport assumes the
    // 64 KiB default.
    assert_eq!(pc.sctp().max_message_size(), 65536);
    pc.close().await?;

    Ok(())
}

// Serializing and re-parsing a local description preserves section
// order and mids.
#[tokio::test]
async fn test_local_description_roundtrip() -> Result<()> {
    let api = new_media_api();
    let pc = api.new_peer_connection(Configuration::default()).await?;

    pc.add_transceiver_from_kind(RtpCodecKind::Video, &[]).await?;
    let _dc = pc.create_data_channel("data", None).await?;

    let offer = pc.create_offer(None).await?;
    let reparsed = SessionDescription::offer(offer.sdp.clone())?;
    let a = offer.parsed.as_ref().expect("parsed offer");
    let b = reparsed.parsed.as_ref().expect("reparsed offer");

    assert_eq!(a.media_descriptions.len(), b.media_descriptions.len());
    for (ma, mb) in a.media_descriptions.iter().zip(&b.media_descriptions) {
        assert_eq!(ma.media_name.media, mb.media_name.media);
        assert_eq!(get_mid_value(ma), get_mid_value(mb));
        assert_eq!(get_peer_direction(ma), get_peer_direction(mb));
    }

    pc.close().await?;
    Ok(())
}
