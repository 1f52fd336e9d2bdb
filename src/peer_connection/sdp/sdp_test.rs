use std::io::Cursor;

use super::*;

fn parse(raw: &str) -> ::sdp::description::session::SessionDescription {
    let mut cursor = Cursor::new(raw.as_bytes());
    ::sdp::description::session::SessionDescription::unmarshal(&mut cursor).expect("valid sdp")
}

const SDP_HEADER: &str = "v=0\r\n\
o=- 4596489990601351948 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n";

#[test]
fn test_track_details_from_sdp() {
    let raw = format!(
        "{SDP_HEADER}\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:0\r\n\
a=sendrecv\r\n\
a=msid:stream-id track-id\r\n\
a=ssrc:3000 msid:stream-id track-id\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
a=mid:1\r\n\
a=recvonly\r\n\
a=ssrc:4000\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:2\r\n\
a=sendrecv\r\n\
a=ssrc-group:FID 5000 5001\r\n\
a=ssrc:5000\r\n\
a=ssrc:5001\r\n"
    );

    let tracks = track_details_from_sdp(&parse(&raw));

    // The recvonly section contributes nothing; the FID group's rtx
    // ssrc is a repair flow, not a track.
    assert_eq!(tracks.len(), 2);

    let video = track_details_for_ssrc(&tracks, 3000).expect("video track");
    assert_eq!(video.mid, "0");
    assert_eq!(video.kind, RtpCodecKind::Video);
    assert_eq!(video.stream_id, "stream-id");
    assert_eq!(video.id, "track-id");

    let audio = track_details_for_ssrc(&tracks, 5000).expect("audio track");
    assert_eq!(audio.mid, "2");
    assert_eq!(audio.kind, RtpCodecKind::Audio);
    assert!(track_details_for_ssrc(&tracks, 5001).is_none());
    assert!(track_details_for_ssrc(&tracks, 4000).is_none());
}

#[test]
fn test_extract_fingerprint() {
    // Session level.
    let desc = parse(&format!("{SDP_HEADER}a=fingerprint:sha-256 ab:cd\r\n"));
    assert_eq!(
        extract_fingerprint(&desc).expect("fingerprint"),
        ("ab:cd".to_owned(), "sha-256".to_owned())
    );

    // Missing entirely.
    let desc = parse(SDP_HEADER);
    assert_eq!(
        extract_fingerprint(&desc),
        Err(Error::ErrSessionDescriptionNoFingerprint)
    );

    // Conflicting values.
    let desc = parse(&format!(
        "{SDP_HEADER}a=fingerprint:sha-256 ab:cd\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=fingerprint:sha-256 ff:ff\r\n"
    ));
    assert_eq!(
        extract_fingerprint(&desc),
        Err(Error::ErrSessionDescriptionConflictingFingerprints)
    );

    // Malformed.
    let desc = parse(&format!("{SDP_HEADER}a=fingerprint:garbage\r\n"));
    assert!(extract_fingerprint(&desc).is_err());
}

#[test]
fn test_extract_ice_details() {
    let desc = parse(&format!(
        "{SDP_HEADER}\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=mid:0\r\n\
a=ice-ufrag:ufrag\r\n\
a=ice-pwd:pwd\r\n"
    ));
    let (ufrag, pwd, candidates) = extract_ice_details(&desc).expect("ice details");
    assert_eq!(ufrag, "ufrag");
    assert_eq!(pwd, "pwd");
    assert!(candidates.is_empty());

    // Conflicting ufrag between sections.
    let desc = parse(&format!(
        "{SDP_HEADER}\
a=ice-ufrag:one\r\n\
a=ice-pwd:pwd\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=ice-ufrag:two\r\n\
a=ice-pwd:pwd\r\n"
    ));
    assert_eq!(
        extract_ice_details(&desc),
        Err(Error::ErrSessionDescriptionConflictingIceUfrag)
    );

    // Missing pwd.
    let desc = parse(&format!("{SDP_HEADER}a=ice-ufrag:ufrag\r\n"));
    assert_eq!(
        extract_ice_details(&desc),
        Err(Error::ErrSessionDescriptionMissingIcePwd)
    );
}

#[test]
fn test_extract_sctp_max_message_size() {
    let desc = parse(&format!(
        "{SDP_HEADER}\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=sctp-port:5000\r\n\
a=max-message-size:4321\r\n"
    ));
    assert_eq!(extract_sctp_max_message_size(&desc), 4321);

    // Absent attribute leaves the sentinel.
    let desc = parse(&format!(
        "{SDP_HEADER}\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=sctp-port:5000\r\n"
    ));
    assert_eq!(extract_sctp_max_message_size(&desc), 0);

    // The legacy description form also counts as an application
    // section.
    let desc = parse(&format!(
        "{SDP_HEADER}\
m=application 9 DTLS/SCTP 5000\r\n\
a=sctpmap:5000 webrtc-datachannel 256\r\n"
    ));
    assert!(have_application_media_section(&desc));
    assert_eq!(extract_sctp_max_message_size(&desc), 0);
}

#[test]
fn test_get_peer_direction() {
    for (attr, want) in [
        ("a=sendrecv\r\n", RtpTransceiverDirection::Sendrecv),
        ("a=sendonly\r\n", RtpTransceiverDirection::Sendonly),
        ("a=recvonly\r\n", RtpTransceiverDirection::Recvonly),
        ("a=inactive\r\n", RtpTransceiverDirection::Inactive),
        ("", RtpTransceiverDirection::Unspecified),
    ] {
        let desc = parse(&format!(
            "{SDP_HEADER}m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:0\r\n{attr}"
        ));
        assert_eq!(get_peer_direction(&desc.media_descriptions[0]), want);
    }
}

#[test]
fn test_description_is_plan_b() {
    let make = |mid: &str| {
        let parsed = parse(&format!(
            "{SDP_HEADER}m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:{mid}\r\n"
        ));
        SessionDescription {
            sdp_type: super::sdp_type::SdpType::Offer,
            sdp: String::new(),
            parsed: Some(parsed),
        }
    };

    assert!(description_is_plan_b(Some(&make("video"))).expect("detect"));
    assert!(!description_is_plan_b(Some(&make("0"))).expect("detect"));
    assert!(!description_is_plan_b(None).expect("detect"));
}

#[test]
fn test_codecs_from_media_description() {
    let desc = parse(&format!(
        "{SDP_HEADER}\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10\r\n\
a=rtcp-fb:111 transport-cc \r\n"
    ));

    let codecs =
        codecs_from_media_description(&desc.media_descriptions[0]).expect("codecs parse");
    assert_eq!(codecs.len(), 1);
    assert_eq!(codecs[0].payload_type, 111);
    assert_eq!(codecs[0].capability.mime_type, "audio/opus");
    assert_eq!(codecs[0].capability.clock_rate, 48000);
    assert_eq!(codecs[0].capability.channels, 2);
    assert_eq!(codecs[0].capability.sdp_fmtp_line, "minptime=10");
}

#[test]
fn test_update_sdp_origin() {
    let mut origin = ::sdp::description::session::Origin::default();
    let mut d1 = ::sdp::description::session::SessionDescription::new_jsep_session_description(
        false,
    );
    let first_id = d1.origin.session_id;
    let first_version = d1.origin.session_version;

    update_sdp_origin(&mut origin, &mut d1);
    assert_eq!(origin.session_id, first_id);
    assert_eq!(origin.session_version, first_version);

    // The second description keeps the session id and bumps the
    // version.
    let mut d2 = ::sdp::description::session::SessionDescription::new_jsep_session_description(
        false,
    );
    update_sdp_origin(&mut origin, &mut d2);
    assert_eq!(d2.origin.session_id, first_id);
    assert_eq!(d2.origin.session_version, first_version + 1);
}
