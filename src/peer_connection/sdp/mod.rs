pub mod sdp_type;
pub mod session_description;

#[cfg(test)]
mod sdp_test;

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use ice::candidate::candidate_base::unmarshal_candidate;
use ice::candidate::Candidate;
use regex::Regex;
use sdp::description::common::{Address, ConnectionInformation};
use sdp::description::media::{MediaDescription, MediaName, RangedPort};
use sdp::description::session::*;
use sdp::extmap::ExtMap;
use sdp::util::ConnectionRole;
use url::Url;

use crate::api::media_engine::MediaEngine;
use crate::dtls_transport::dtls_fingerprint::DtlsFingerprint;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::IceCandidate;
use crate::ice_transport::ice_gatherer::IceGatherer;
use crate::ice_transport::ice_gathering_state::IceGatheringState;
use crate::ice_transport::ice_parameters::IceParameters;
use crate::peer_connection::sdp::session_description::SessionDescription;
use crate::peer_connection::MEDIA_SECTION_APPLICATION;
use crate::rtp_transceiver::rtp_codec::{
    RtcpFeedback, RtpCodecCapability, RtpCodecKind, RtpCodecParameters,
};
use crate::rtp_transceiver::rtp_transceiver_direction::RtpTransceiverDirection;
use crate::rtp_transceiver::{PayloadType, RtpTransceiver, SSRC};

/// A media source described by the remote SDP.
#[derive(Default, Debug, Clone)]
pub(crate) struct TrackDetails {
    pub(crate) mid: String,
    pub(crate) kind: RtpCodecKind,
    pub(crate) stream_id: String,
    pub(crate) id: String,
    pub(crate) ssrc: SSRC,
}

pub(crate) fn track_details_for_ssrc(
    track_details: &[TrackDetails],
    ssrc: SSRC,
) -> Option<&TrackDetails> {
    track_details.iter().find(|x| x.ssrc == ssrc)
}

pub(crate) fn filter_track_with_ssrc(incoming_tracks: &mut Vec<TrackDetails>, ssrc: SSRC) {
    incoming_tracks.retain(|x| x.ssrc != ssrc);
}

/// Extracts every media source the remote description declares.
pub(crate) fn track_details_from_sdp(
    s: &sdp::description::session::SessionDescription,
) -> Vec<TrackDetails> {
    let mut incoming_tracks = vec![];
    let mut rtx_repair_flows: HashMap<u32, bool> = HashMap::new();

    for media in &s.media_descriptions {
        let mut stream_id = "";
        let mut track_id = "";

        // Sections the remote does not send on carry no sources for
        // us.
        if media.attribute(ATTR_KEY_RECV_ONLY).is_some()
            || media.attribute(ATTR_KEY_INACTIVE).is_some()
        {
            continue;
        }

        let mid_value = match get_mid_value(media) {
            Some(mid_value) => mid_value,
            None => continue,
        };

        let codec_type = RtpCodecKind::from(media.media_name.media.as_str());
        if codec_type == RtpCodecKind::Unspecified {
            continue;
        }

        for attr in &media.attributes {
            match attr.key.as_str() {
                ATTR_KEY_SSRCGROUP => {
                    if let Some(value) = &attr.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        if split[0] == SEMANTIC_TOKEN_FLOW_IDENTIFICATION && split.len() == 3 {
                            // a=ssrc-group:FID <primary> <rtx> declares
                            // the second SSRC as a repair flow, not a
                            // track of its own.
                            match split[2].parse::<u32>() {
                                Ok(rtx_repair_flow) => {
                                    rtx_repair_flows.insert(rtx_repair_flow, true);
                                    filter_track_with_ssrc(
                                        &mut incoming_tracks,
                                        rtx_repair_flow as SSRC,
                                    );
                                }
                                Err(err) => {
                                    log::warn!("failed to parse SSRC: {err}");
                                }
                            }
                        }
                    }
                }

                ATTR_KEY_MSID => {
                    if let Some(value) = &attr.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        if split.len() == 2 {
                            stream_id = split[0];
                            track_id = split[1];
                        }
                    }
                }

                ATTR_KEY_SSRC => {
                    if let Some(value) = &attr.value {
                        let split: Vec<&str> = value.split(' ').collect();
                        let ssrc = match split[0].parse::<u32>() {
                            Ok(ssrc) => ssrc,
                            Err(err) => {
                                log::warn!("failed to parse SSRC: {err}");
                                continue;
                            }
                        };

                        if rtx_repair_flows.contains_key(&ssrc) {
                            continue;
                        }

                        if split.len() == 3 && split[1].starts_with("msid:") {
                            stream_id = &split[1]["msid:".len()..];
                            track_id = split[2];
                        }

                        if let Some(existing) =
                            incoming_tracks.iter_mut().find(|t| t.ssrc == ssrc)
                        {
                            existing.mid = mid_value.to_owned();
                            existing.kind = codec_type;
                            existing.stream_id = stream_id.to_owned();
                            existing.id = track_id.to_owned();
                        } else {
                            incoming_tracks.push(TrackDetails {
                                mid: mid_value.to_owned(),
                                kind: codec_type,
                                stream_id: stream_id.to_owned(),
                                id: track_id.to_owned(),
                                ssrc,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }

    incoming_tracks
}

/// One to-be-emitted m-section.
#[derive(Default)]
pub(crate) struct MediaSection {
    pub(crate) id: String,
    pub(crate) transceivers: Vec<Arc<RtpTransceiver>>,
    pub(crate) data: bool,
    /// When answering, the direction the remote offered for this
    /// section.
    pub(crate) offered_direction: Option<RtpTransceiverDirection>,
}

pub(crate) struct PopulateSdpParams {
    pub(crate) is_plan_b: bool,
    pub(crate) media_description_fingerprint: bool,
    pub(crate) is_icelite: bool,
    pub(crate) connection_role: ConnectionRole,
    pub(crate) ice_gathering_state: IceGatheringState,
    pub(crate) max_message_size: u32,
}

/// Serializes the negotiated state into an SDP document: one m-section
/// per MediaSection, bundle group over all mids, fingerprints at the
/// session or media level.
pub(crate) async fn populate_sdp(
    mut d: sdp::description::session::SessionDescription,
    dtls_fingerprints: &[DtlsFingerprint],
    media_engine: &Arc<MediaEngine>,
    candidates: &[IceCandidate],
    ice_params: &IceParameters,
    media_sections: &[MediaSection],
    params: PopulateSdpParams,
) -> Result<sdp::description::session::SessionDescription> {
    let media_dtls_fingerprints = if params.media_description_fingerprint {
        dtls_fingerprints.to_vec()
    } else {
        vec![]
    };

    let mut bundle_value = "BUNDLE".to_owned();

    for (i, m) in media_sections.iter().enumerate() {
        if m.data && !m.transceivers.is_empty() {
            return Err(Error::ErrSDPMediaSectionMediaDataChanInvalid);
        } else if !params.is_plan_b && m.transceivers.len() > 1 {
            return Err(Error::ErrSDPMediaSectionMultipleTrackInvalid);
        }

        let should_add_candidates = i == 0;

        let should_add_id = if m.data {
            d = add_data_media_section(
                d,
                should_add_candidates,
                &media_dtls_fingerprints,
                &m.id,
                ice_params,
                candidates,
                params.connection_role,
                params.ice_gathering_state,
                params.max_message_size,
            )?;
            true
        } else {
            let (d2, should_add_id) = add_transceiver_sdp(
                d,
                should_add_candidates,
                &media_dtls_fingerprints,
                media_engine,
                ice_params,
                candidates,
                params.connection_role,
                params.ice_gathering_state,
                params.is_plan_b,
                m,
            )
            .await?;
            d = d2;
            should_add_id
        };

        if should_add_id {
            bundle_value += " ";
            bundle_value += &m.id;
        }
    }

    if !params.media_description_fingerprint {
        for fingerprint in dtls_fingerprints {
            d = d.with_fingerprint(
                fingerprint.algorithm.clone(),
                fingerprint.value.to_uppercase(),
            );
        }
    }

    if params.is_icelite {
        // RFC 5245 S15.3
        d = d.with_value_attribute(ATTR_KEY_ICELITE.to_owned(), ATTR_KEY_ICELITE.to_owned());
    }

    Ok(d.with_value_attribute(ATTR_KEY_GROUP.to_owned(), bundle_value))
}

fn add_candidates_to_media_descriptions(
    candidates: &[IceCandidate],
    mut m: MediaDescription,
    ice_gathering_state: IceGatheringState,
) -> Result<MediaDescription> {
    let append_candidate_if_new = |m: MediaDescription, marshaled: &str| -> MediaDescription {
        for attr in &m.attributes {
            if attr.key == ATTR_KEY_CANDIDATE && attr.value.as_deref() == Some(marshaled) {
                return m;
            }
        }
        m.with_value_attribute(ATTR_KEY_CANDIDATE.to_owned(), marshaled.to_owned())
    };

    for c in candidates {
        let candidate = c.to_ice()?;

        candidate.set_component(1);
        let marshaled = candidate.marshal();
        m = append_candidate_if_new(m, &marshaled);

        candidate.set_component(2);
        let marshaled = candidate.marshal();
        m = append_candidate_if_new(m, &marshaled);
    }

    if ice_gathering_state != IceGatheringState::Complete {
        return Ok(m);
    }
    for attr in &m.attributes {
        if attr.key == ATTR_KEY_END_OF_CANDIDATES {
            return Ok(m);
        }
    }

    Ok(m.with_property_attribute(ATTR_KEY_END_OF_CANDIDATES.to_owned()))
}

#[allow(clippy::too_many_arguments)]
fn add_data_media_section(
    d: sdp::description::session::SessionDescription,
    should_add_candidates: bool,
    dtls_fingerprints: &[DtlsFingerprint],
    mid_value: &str,
    ice_params: &IceParameters,
    candidates: &[IceCandidate],
    dtls_role: ConnectionRole,
    ice_gathering_state: IceGatheringState,
    max_message_size: u32,
) -> Result<sdp::description::session::SessionDescription> {
    let mut media = MediaDescription {
        media_name: MediaName {
            media: MEDIA_SECTION_APPLICATION.to_owned(),
            port: RangedPort {
                value: 9,
                range: None,
            },
            protos: vec!["UDP".to_owned(), "DTLS".to_owned(), "SCTP".to_owned()],
            formats: vec!["webrtc-datachannel".to_owned()],
        },
        media_title: None,
        connection_information: Some(ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: Some(Address {
                address: "0.0.0.0".to_owned(),
                ttl: None,
                range: None,
            }),
        }),
        bandwidth: vec![],
        encryption_key: None,
        attributes: vec![],
    }
    .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), dtls_role.to_string())
    .with_value_attribute(ATTR_KEY_MID.to_owned(), mid_value.to_owned())
    .with_property_attribute(RtpTransceiverDirection::Sendrecv.to_string())
    .with_value_attribute("sctp-port".to_owned(), "5000".to_owned())
    .with_value_attribute("max-message-size".to_owned(), max_message_size.to_string())
    .with_ice_credentials(
        ice_params.username_fragment.clone(),
        ice_params.password.clone(),
    );

    for f in dtls_fingerprints {
        media = media.with_fingerprint(f.algorithm.clone(), f.value.to_uppercase());
    }

    if should_add_candidates {
        media = add_candidates_to_media_descriptions(candidates, media, ice_gathering_state)?;
    }

    Ok(d.with_media(media))
}

#[allow(clippy::too_many_arguments)]
async fn add_transceiver_sdp(
    d: sdp::description::session::SessionDescription,
    should_add_candidates: bool,
    dtls_fingerprints: &[DtlsFingerprint],
    media_engine: &Arc<MediaEngine>,
    ice_params: &IceParameters,
    candidates: &[IceCandidate],
    dtls_role: ConnectionRole,
    ice_gathering_state: IceGatheringState,
    is_plan_b: bool,
    media_section: &MediaSection,
) -> Result<(sdp::description::session::SessionDescription, bool)> {
    if media_section.transceivers.is_empty() {
        return Err(Error::ErrSDPZeroTransceivers);
    }
    let (mid_value, transceivers) = (&media_section.id, &media_section.transceivers);

    // The first transceiver shapes the section.
    let t = &transceivers[0];
    let mut media = MediaDescription::new_jsep_media_description(t.kind().to_string(), vec![])
        .with_value_attribute(ATTR_KEY_CONNECTION_SETUP.to_owned(), dtls_role.to_string())
        .with_value_attribute(ATTR_KEY_MID.to_owned(), mid_value.to_owned())
        .with_ice_credentials(
            ice_params.username_fragment.clone(),
            ice_params.password.clone(),
        )
        .with_property_attribute(ATTR_KEY_RTCPMUX.to_owned())
        .with_property_attribute(ATTR_KEY_RTCPRSIZE.to_owned());

    let codecs = t.get_codecs().await;
    for codec in &codecs {
        let name = codec
            .capability
            .mime_type
            .trim_start_matches("audio/")
            .trim_start_matches("video/")
            .to_owned();
        media = media.with_codec(
            codec.payload_type,
            name,
            codec.capability.clock_rate,
            codec.capability.channels,
            codec.capability.sdp_fmtp_line.clone(),
        );

        for feedback in &codec.capability.rtcp_feedback {
            media = media.with_value_attribute(
                "rtcp-fb".to_owned(),
                format!(
                    "{} {} {}",
                    codec.payload_type, feedback.typ, feedback.parameter
                )
                .trim()
                .to_owned(),
            );
        }
    }
    if codecs.is_empty() {
        // The remote offered a kind we have no codecs for: emit a
        // rejected section (port zero).
        let media = MediaDescription {
            media_name: MediaName {
                media: t.kind().to_string(),
                port: RangedPort {
                    value: 0,
                    range: None,
                },
                protos: vec![
                    "UDP".to_owned(),
                    "TLS".to_owned(),
                    "RTP".to_owned(),
                    "SAVPF".to_owned(),
                ],
                formats: vec!["0".to_owned()],
            },
            media_title: None,
            connection_information: None,
            bandwidth: vec![],
            encryption_key: None,
            attributes: vec![],
        };
        return Ok((d.with_media(media), false));
    }

    let parameters = media_engine
        .get_rtp_parameters_by_kind(t.kind(), t.direction())
        .await;
    for rtp_extension in &parameters.header_extensions {
        let ext_url = Url::parse(rtp_extension.uri.as_str())?;
        media = media.with_extmap(ExtMap {
            value: rtp_extension.id,
            uri: Some(ext_url),
            ..Default::default()
        });
    }

    for mt in transceivers {
        if let Some(sender) = mt.sender().await {
            if let Some(track) = sender.track().await {
                media = media.with_media_source(
                    sender.ssrc,
                    track.stream_id().to_owned(), /* cname */
                    track.stream_id().to_owned(), /* streamLabel */
                    track.id().to_owned(),
                );
                if !is_plan_b {
                    media = media.with_property_attribute(format!(
                        "{}:{} {}",
                        ATTR_KEY_MSID,
                        track.stream_id(),
                        track.id()
                    ));
                    break;
                }
            }
        }
    }

    let direction = match media_section.offered_direction {
        Some(offered_direction) => {
            // Answering: take our direction, clipped to what the
            // remote can accept (JSEP 5.3.1).
            let our = t.direction();
            match offered_direction {
                RtpTransceiverDirection::Sendonly => {
                    if our == RtpTransceiverDirection::Sendrecv
                        || our == RtpTransceiverDirection::Recvonly
                    {
                        RtpTransceiverDirection::Recvonly
                    } else {
                        RtpTransceiverDirection::Inactive
                    }
                }
                RtpTransceiverDirection::Recvonly => {
                    if our == RtpTransceiverDirection::Sendrecv
                        || our == RtpTransceiverDirection::Sendonly
                    {
                        RtpTransceiverDirection::Sendonly
                    } else {
                        RtpTransceiverDirection::Inactive
                    }
                }
                _ => our,
            }
        }
        None => t.direction(),
    };
    media = media.with_property_attribute(direction.to_string());

    for fingerprint in dtls_fingerprints {
        media = media.with_fingerprint(fingerprint.algorithm.clone(), fingerprint.value.to_uppercase());
    }

    if should_add_candidates {
        media = add_candidates_to_media_descriptions(candidates, media, ice_gathering_state)?;
    }

    Ok((d.with_media(media), true))
}

/// Appends the candidates gathered since the description was created;
/// what trickle looks like to a non-trickle consumer.
pub(crate) async fn populate_local_candidates(
    session_description: Option<&SessionDescription>,
    ice_gatherer: Option<&Arc<IceGatherer>>,
    ice_gathering_state: IceGatheringState,
) -> Option<SessionDescription> {
    let (sd, ice_gatherer) = match (session_description, ice_gatherer) {
        (Some(sd), Some(ice_gatherer)) => (sd, ice_gatherer),
        _ => return session_description.cloned(),
    };

    let candidates = match ice_gatherer.get_local_candidates().await {
        Ok(candidates) => candidates,
        Err(_) => return Some(sd.clone()),
    };

    let mut parsed = match sd.unmarshal() {
        Ok(parsed) => parsed,
        Err(_) => return Some(sd.clone()),
    };
    if parsed.media_descriptions.is_empty() {
        return Some(sd.clone());
    }

    let m = parsed.media_descriptions.remove(0);
    let m = match add_candidates_to_media_descriptions(&candidates, m, ice_gathering_state) {
        Ok(m) => m,
        Err(_) => return Some(sd.clone()),
    };
    parsed.media_descriptions.insert(0, m);

    Some(SessionDescription {
        sdp_type: sd.sdp_type,
        sdp: parsed.marshal(),
        parsed: Some(parsed),
    })
}

/// True when the description uses plan-b style kind-named mids.
pub(crate) fn description_is_plan_b(desc: Option<&SessionDescription>) -> Result<bool> {
    let desc = match desc {
        Some(desc) => desc,
        None => return Ok(false),
    };
    let parsed = match &desc.parsed {
        Some(parsed) => parsed,
        None => return Ok(false),
    };

    let detection_regex =
        Regex::new(r"(?i)^(audio|video|data)$").map_err(|e| Error::new(e.to_string()))?;
    for media in &parsed.media_descriptions {
        if let Some(mid) = get_mid_value(media) {
            if detection_regex.is_match(mid) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// The direction attribute of an m-section.
pub(crate) fn get_peer_direction(media: &MediaDescription) -> RtpTransceiverDirection {
    for a in &media.attributes {
        let direction = RtpTransceiverDirection::from(a.key.as_str());
        if direction != RtpTransceiverDirection::Unspecified {
            return direction;
        }
    }
    RtpTransceiverDirection::Unspecified
}

pub(crate) fn get_mid_value(media: &MediaDescription) -> Option<&String> {
    for attr in &media.attributes {
        if attr.key == ATTR_KEY_MID {
            return attr.value.as_ref();
        }
    }
    None
}

pub(crate) fn get_by_mid<'a>(
    search_mid: &str,
    desc: &'a SessionDescription,
) -> Option<&'a MediaDescription> {
    let parsed = desc.parsed.as_ref()?;
    parsed
        .media_descriptions
        .iter()
        .find(|m| get_mid_value(m).map(String::as_str) == Some(search_mid))
}

/// The application m-section, when one was negotiated.
pub(crate) fn have_data_channel(desc: &SessionDescription) -> Option<&MediaDescription> {
    let parsed = desc.parsed.as_ref()?;
    parsed
        .media_descriptions
        .iter()
        .find(|m| m.media_name.media == MEDIA_SECTION_APPLICATION)
}

pub(crate) fn have_application_media_section(
    desc: &sdp::description::session::SessionDescription,
) -> bool {
    desc.media_descriptions
        .iter()
        .any(|m| m.media_name.media == MEDIA_SECTION_APPLICATION)
}

/// Returns (fingerprint, hash algorithm). All emitted fingerprints
/// must agree; both the modern and the legacy description put them at
/// the session or the media level.
pub(crate) fn extract_fingerprint(
    desc: &sdp::description::session::SessionDescription,
) -> Result<(String, String)> {
    let mut fingerprints = vec![];

    if let Some(fingerprint) = desc.attribute("fingerprint") {
        fingerprints.push(fingerprint.clone());
    }

    for m in &desc.media_descriptions {
        if let Some(Some(fingerprint)) = m.attribute("fingerprint") {
            fingerprints.push(fingerprint.to_owned());
        }
    }

    if fingerprints.is_empty() {
        return Err(Error::ErrSessionDescriptionNoFingerprint);
    }

    for m in &fingerprints {
        if m != &fingerprints[0] {
            return Err(Error::ErrSessionDescriptionConflictingFingerprints);
        }
    }

    let parts: Vec<&str> = fingerprints[0].split(' ').collect();
    if parts.len() != 2 {
        return Err(Error::ErrSessionDescriptionInvalidFingerprint);
    }

    Ok((parts[1].to_owned(), parts[0].to_owned()))
}

/// Returns (ufrag, pwd, candidates) from a remote description; the
/// credentials must be consistent across every place they appear.
pub(crate) fn extract_ice_details(
    desc: &sdp::description::session::SessionDescription,
) -> Result<(String, String, Vec<IceCandidate>)> {
    let mut candidates = vec![];
    let mut remote_pwds = vec![];
    let mut remote_ufrags = vec![];

    if let Some(ufrag) = desc.attribute("ice-ufrag") {
        remote_ufrags.push(ufrag.clone());
    }
    if let Some(pwd) = desc.attribute("ice-pwd") {
        remote_pwds.push(pwd.clone());
    }

    for m in &desc.media_descriptions {
        if let Some(Some(ufrag)) = m.attribute("ice-ufrag") {
            remote_ufrags.push(ufrag.to_owned());
        }
        if let Some(Some(pwd)) = m.attribute("ice-pwd") {
            remote_pwds.push(pwd.to_owned());
        }

        for a in &m.attributes {
            if a.is_ice_candidate() {
                if let Some(value) = &a.value {
                    let c: Arc<dyn Candidate + Send + Sync> =
                        Arc::new(unmarshal_candidate(value)?);
                    candidates.push(IceCandidate::from(&c));
                }
            }
        }
    }

    if remote_ufrags.is_empty() {
        return Err(Error::ErrSessionDescriptionMissingIceUfrag);
    }
    if remote_pwds.is_empty() {
        return Err(Error::ErrSessionDescriptionMissingIcePwd);
    }

    for m in &remote_ufrags {
        if m != &remote_ufrags[0] {
            return Err(Error::ErrSessionDescriptionConflictingIceUfrag);
        }
    }
    for m in &remote_pwds {
        if m != &remote_pwds[0] {
            return Err(Error::ErrSessionDescriptionConflictingIcePwd);
        }
    }

    Ok((remote_ufrags[0].clone(), remote_pwds[0].clone(), candidates))
}

/// The remote's announced SCTP message-size cap; 0 when the attribute
/// is absent ("unknown").
pub(crate) fn extract_sctp_max_message_size(
    desc: &sdp::description::session::SessionDescription,
) -> u32 {
    for m in &desc.media_descriptions {
        if m.media_name.media != MEDIA_SECTION_APPLICATION {
            continue;
        }
        if let Some(Some(value)) = m.attribute("max-message-size") {
            if let Ok(size) = value.trim().parse::<u32>() {
                return size;
            }
        }
    }
    0
}

/// The codecs one remote m-section describes through rtpmap/fmtp.
pub(crate) fn codecs_from_media_description(
    m: &MediaDescription,
) -> Result<Vec<RtpCodecParameters>> {
    let s = sdp::description::session::SessionDescription {
        media_descriptions: vec![m.clone()],
        ..Default::default()
    };

    let mut out = vec![];
    for payload_str in &m.media_name.formats {
        let payload_type: PayloadType = match payload_str.parse() {
            Ok(pt) => pt,
            Err(_) => continue,
        };

        let codec = match s.get_codec_for_payload_type(payload_type) {
            Ok(codec) => codec,
            Err(err) => {
                if payload_type == 0 {
                    continue;
                }
                return Err(err.into());
            }
        };

        let channels: u16 = codec.encoding_parameters.parse().unwrap_or(0);

        let feedback: Vec<RtcpFeedback> = codec
            .rtcp_feedback
            .iter()
            .map(|raw| {
                let split: Vec<&str> = raw.split(' ').collect();
                RtcpFeedback {
                    typ: split[0].to_owned(),
                    parameter: split.get(1).map(|s| (*s).to_owned()).unwrap_or_default(),
                }
            })
            .collect();

        out.push(RtpCodecParameters {
            capability: RtpCodecCapability {
                mime_type: format!("{}/{}", m.media_name.media, codec.name),
                clock_rate: codec.clock_rate,
                channels,
                sdp_fmtp_line: codec.fmtp.clone(),
                rtcp_feedback: feedback,
            },
            payload_type,
        });
    }

    Ok(out)
}

/// The negotiated header extensions (uri -> id) of one m-section.
pub(crate) fn rtp_extensions_from_media_description(
    m: &MediaDescription,
) -> Result<HashMap<String, isize>> {
    let mut out = HashMap::new();

    for a in &m.attributes {
        if a.key == ATTR_KEY_EXT_MAP {
            let value = a.value.as_deref().unwrap_or_default();
            let line = format!("{}:{}", ATTR_KEY_EXT_MAP, value);
            let mut reader = Cursor::new(line.as_bytes());
            let e = ExtMap::unmarshal(&mut reader)?;

            if let Some(uri) = &e.uri {
                out.insert(uri.to_string(), e.value);
            }
        }
    }

    Ok(out)
}

/// Keeps the o= line stable across renegotiations while bumping the
/// version (JSEP 5.2.2 / 5.3.2).
pub(crate) fn update_sdp_origin(
    origin: &mut sdp::description::session::Origin,
    d: &mut sdp::description::session::SessionDescription,
) {
    if origin.session_version == 0 {
        origin.session_version = d.origin.session_version;
        origin.session_id = d.origin.session_id;
    } else {
        origin.session_version += 1;
        d.origin.session_id = origin.session_id;
        d.origin.session_version = origin.session_version;
    }
}
