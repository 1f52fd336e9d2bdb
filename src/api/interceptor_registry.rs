use interceptor::nack::generator::Generator;
use interceptor::nack::responder::Responder;
use interceptor::registry::Registry;
use interceptor::report::receiver::ReceiverReport;
use interceptor::report::sender::SenderReport;

use crate::api::media_engine::MediaEngine;
use crate::error::Result;
use crate::rtp_transceiver::rtp_codec::{RtcpFeedback, RtpCodecKind};

/// Installs the interceptors every sane connection wants: RTCP
/// sender/receiver reports and NACK-based loss recovery.
pub fn register_default_interceptors(
    registry: Registry,
    media_engine: &mut MediaEngine,
) -> Result<Registry> {
    let registry = configure_nack(registry, media_engine);
    let registry = configure_rtcp_reports(registry);

    Ok(registry)
}

/// Schedules periodic sender and receiver reports.
pub fn configure_rtcp_reports(mut registry: Registry) -> Registry {
    registry.add(Box::new(ReceiverReport::builder()));
    registry.add(Box::new(SenderReport::builder()));
    registry
}

/// Generates NACKs for missing inbound packets and answers the
/// remote's NACKs from a replay buffer. Advertises the matching
/// feedback on every video codec.
pub fn configure_nack(mut registry: Registry, media_engine: &mut MediaEngine) -> Registry {
    media_engine.register_feedback(
        RtcpFeedback {
            typ: "nack".to_owned(),
            parameter: "".to_owned(),
        },
        RtpCodecKind::Video,
    );
    media_engine.register_feedback(
        RtcpFeedback {
            typ: "nack".to_owned(),
            parameter: "pli".to_owned(),
        },
        RtpCodecKind::Video,
    );

    registry.add(Box::new(Responder::builder()));
    registry.add(Box::new(Generator::builder()));
    registry
}
