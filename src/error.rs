use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub type OnErrorHdlrFn = Box<
    dyn (FnMut(Error) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown type")]
    ErrUnknownType,

    /// An operation was attempted on a PeerConnection that has already
    /// been closed.
    #[error("connection closed")]
    ErrConnectionClosed,

    /// Send or detach was attempted while the data channel was not open.
    #[error("data channel not open")]
    ErrDataChannelNotOpen,

    /// A pre-created certificate handed in through the Configuration has
    /// passed its NotAfter date.
    #[error("x509 certificate expired")]
    ErrCertificateExpired,

    /// The private key type is not one we can hand to the DTLS stack.
    #[error("private key type not supported")]
    ErrPrivateKeyType,

    /// Data channel label or protocol exceeds the 65535 byte cap.
    #[error("data channel label exceeds size limit")]
    ErrStringSizeLimit,
    #[error("data channel protocol exceeds size limit")]
    ErrProtocolTooLarge,

    /// Every even (or odd) stream id is taken.
    #[error("no available SCTP stream id, too many data channels")]
    ErrMaxDataChannels,

    /// `negotiated: true` requires the application to pick the id.
    #[error("negotiated data channel requires an id")]
    ErrNegotiatedWithoutID,

    /// maxPacketLifeTime and maxRetransmits are mutually exclusive.
    #[error("both maxPacketLifeTime and maxRetransmits were set")]
    ErrRetransmitsOrPacketLifeTime,

    #[error("remote description is not set")]
    ErrNoRemoteDescription,
    #[error("operation cannot be run in current signaling state")]
    ErrIncorrectSignalingState,
    #[error("offer SDP semantics does not match configuration")]
    ErrIncorrectSDPSemantics,
    #[error("new sdp does not match previous offer")]
    ErrSDPDoesNotMatchOffer,
    #[error("new sdp does not match previous answer")]
    ErrSDPDoesNotMatchAnswer,
    #[error("provided value is not a valid enum value of type SdpType")]
    ErrSessionDescriptionInvalidType,
    #[error("invalid state change operation")]
    ErrSignalingStateProposedTransitionInvalid,
    #[error("cannot rollback from stable state")]
    ErrSignalingStateCannotRollback,
    #[error("remote description contained a media section without a mid value")]
    ErrRemoteDescriptionWithoutMidValue,
    #[error("cannot find transceiver with mid")]
    ErrTransceiverMidUnmatched,
    #[error("media section built with zero transceivers")]
    ErrSDPZeroTransceivers,
    #[error("media section has both media and data enabled")]
    ErrSDPMediaSectionMediaDataChanInvalid,
    #[error("unified-plan media section carries multiple transceivers")]
    ErrSDPMediaSectionMultipleTrackInvalid,
    #[error("local media kept changing while the offer was generated")]
    ErrExcessiveRetries,

    #[error("session description has no fingerprint")]
    ErrSessionDescriptionNoFingerprint,
    #[error("session description has an invalid fingerprint")]
    ErrSessionDescriptionInvalidFingerprint,
    #[error("session description has conflicting fingerprints")]
    ErrSessionDescriptionConflictingFingerprints,
    #[error("session description is missing ice-ufrag")]
    ErrSessionDescriptionMissingIceUfrag,
    #[error("session description is missing ice-pwd")]
    ErrSessionDescriptionMissingIcePwd,
    #[error("session description has conflicting ice-ufrag values")]
    ErrSessionDescriptionConflictingIceUfrag,
    #[error("session description has conflicting ice-pwd values")]
    ErrSessionDescriptionConflictingIcePwd,

    /// DTLS finished but the peer certificate matches none of the
    /// fingerprints the remote description advertised.
    #[error("remote certificate does not match any fingerprint")]
    ErrNoMatchingCertificateFingerprint,
    #[error("fingerprint hash algorithm is not supported")]
    ErrFingerprintAlgorithmUnsupported,
    #[error("peer did not provide a certificate via DTLS")]
    ErrNoRemoteCertificate,
    #[error("no certificate configured")]
    ErrNoCertificate,
    #[error("DTLS transport already started")]
    ErrInvalidDTLSStart,
    #[error("DTLS transport has not started yet")]
    ErrDtlsTransportNotStarted,
    #[error("DTLS handshake finished without an SRTP protection profile")]
    ErrNoSRTPProtectionProfile,

    #[error("ICE connection not started")]
    ErrICEConnectionNotStarted,
    #[error("ICE transport can only be started once")]
    ErrICETransportNotInNew,
    #[error("ICE agent does not exist")]
    ErrICEAgentNotExist,
    #[error("unknown ICE role")]
    ErrICERoleUnknown,
    #[error("unknown ICE candidate type")]
    ErrICECandidateTypeUnknown,
    #[error("unknown ICE protocol")]
    ErrICEProtocolUnknown,
    #[error("turn server credentials required")]
    ErrNoTurnCredentials,
    #[error("invalid turn server credentials")]
    ErrTurnCredentials,

    #[error("SCTP transport is not established")]
    ErrSCTPNotEstablished,
    #[error("DTLS not established")]
    ErrSCTPTransportDTLS,

    #[error("operation failed, no codecs are available")]
    ErrNoCodecsAvailable,
    #[error("codec is not registered with the media engine")]
    ErrCodecNotFound,
    #[error("a header extension must be registered as 'recvonly', 'sendonly' or both")]
    ErrRegisterHeaderExtensionInvalidDirection,
    #[error("unable to start track, codec is not supported by remote")]
    ErrUnsupportedCodec,
    #[error("the requested codec does not have a payloader")]
    ErrNoPayloaderForCodec,
    #[error("failed to unbind TrackLocal from PeerConnection")]
    ErrUnbindFailed,

    #[error("addTransceiverFromKind only accepts one TransceiverInit")]
    ErrAddTransceiverFromKindOnlyAcceptsOne,
    #[error("addTransceiverFromTrack only accepts one TransceiverInit")]
    ErrAddTransceiverFromTrackOnlyAcceptsOne,
    #[error("addTransceiverFromKind only supports recvonly without a track")]
    ErrAddTransceiverFromKindSupport,
    #[error("addTransceiverFromTrack only supports sendonly and sendrecv")]
    ErrAddTransceiverFromTrackSupport,
    #[error("RtpSender was not created by this PeerConnection")]
    ErrSenderNotCreatedByConnection,
    #[error("sender has no transceiver")]
    ErrRTPSenderNil,
    #[error("Track must not be nil")]
    ErrRTPSenderTrackNil,
    #[error("send has already been called")]
    ErrRTPSenderSendAlreadyCalled,
    #[error("receive has already been called")]
    ErrRTPReceiverReceiveAlreadyCalled,
    #[error("no stream found for the track SSRC")]
    ErrRTPReceiverForSSRCTrackStreamNotFound,
    #[error("a transceiver mid cannot be changed once set")]
    ErrRTPTransceiverCannotChangeMid,
    #[error("interceptor is not bound")]
    ErrInterceptorNotBind,
    #[error("codec preference refers to a codec the media engine does not know")]
    ErrRTPTransceiverCodecUnsupported,
    #[error("single media section has an explicit SSRC")]
    ErrSingleMediaSectionHasExplicitSSRC,

    #[error("answering DTLS role must be client or server")]
    ErrSettingEngineSetAnsweringDTLSRole,
    #[error("enable detaching by calling setting_engine.detach_data_channels()")]
    ErrDetachNotEnabled,
    #[error("data channel is not open yet, call detach from on_open")]
    ErrDetachBeforeOpened,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("util: {0}")]
    Util(#[from] util::Error),
    #[error("ice: {0}")]
    Ice(#[from] ice::Error),
    #[error("dtls: {0}")]
    Dtls(#[from] dtls::Error),
    #[error("sctp: {0}")]
    Sctp(#[from] sctp::Error),
    #[error("data: {0}")]
    Data(#[from] data::Error),
    #[error("srtp: {0}")]
    Srtp(#[from] srtp::Error),
    #[error("sdp: {0}")]
    Sdp(#[from] sdp::Error),
    #[error("interceptor: {0}")]
    Interceptor(#[from] interceptor::Error),
    #[error("rtcp: {0}")]
    Rtcp(#[from] rtcp::Error),
    #[error("rtp: {0}")]
    Rtp(#[from] rtp::Error),
    #[error("rcgen: {0}")]
    Rcgen(#[from] rcgen::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn new(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<Error> for interceptor::Error {
    fn from(e: Error) -> Self {
        interceptor::Error::Other(e.to_string())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Collapses the errors collected on a close path into a single result.
pub(crate) fn flatten_errs(errs: Vec<Error>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let joined: Vec<String> = errs.into_iter().map(|e| e.to_string()).collect();
        Err(Error::Other(joined.join("\n")))
    }
}
