use std::fmt;

use crate::error::{Error, Result};
use crate::peer_connection::sdp::sdp_type::SdpType;

/// Whether a description lands locally or remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateChangeOp {
    SetLocal,
    SetRemote,
}

impl fmt::Display for StateChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateChangeOp::SetLocal => write!(f, "SetLocal"),
            StateChangeOp::SetRemote => write!(f, "SetRemote"),
        }
    }
}

/// JSEP signaling states
/// (<https://w3c.github.io/webrtc-pc/#state-definitions>).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    #[default]
    Unspecified = 0,

    /// No offer/answer exchange in flight.
    Stable = 1,

    /// A local offer was applied.
    HaveLocalOffer = 2,

    /// A remote offer was applied.
    HaveRemoteOffer = 3,

    /// A local provisional answer was applied on top of a remote
    /// offer.
    HaveLocalPranswer = 4,

    /// A remote provisional answer was applied on top of a local
    /// offer.
    HaveRemotePranswer = 5,

    /// The connection is closed.
    Closed = 6,
}

impl From<u8> for SignalingState {
    fn from(v: u8) -> Self {
        match v {
            1 => SignalingState::Stable,
            2 => SignalingState::HaveLocalOffer,
            3 => SignalingState::HaveRemoteOffer,
            4 => SignalingState::HaveLocalPranswer,
            5 => SignalingState::HaveRemotePranswer,
            6 => SignalingState::Closed,
            _ => SignalingState::Unspecified,
        }
    }
}

impl From<&str> for SignalingState {
    fn from(raw: &str) -> Self {
        match raw {
            "stable" => SignalingState::Stable,
            "have-local-offer" => SignalingState::HaveLocalOffer,
            "have-remote-offer" => SignalingState::HaveRemoteOffer,
            "have-local-pranswer" => SignalingState::HaveLocalPranswer,
            "have-remote-pranswer" => SignalingState::HaveRemotePranswer,
            "closed" => SignalingState::Closed,
            _ => SignalingState::Unspecified,
        }
    }
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
            SignalingState::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

/// Validates one JSEP transition and returns the state it lands in.
pub(crate) fn check_next_signaling_state(
    cur: SignalingState,
    next: SignalingState,
    op: StateChangeOp,
    sdp_type: SdpType,
) -> Result<SignalingState> {
    // A rollback anywhere but stable returns to stable.
    if sdp_type == SdpType::Rollback {
        if cur == SignalingState::Stable {
            return Err(Error::ErrSignalingStateCannotRollback);
        }
        if next == SignalingState::Stable {
            return Ok(next);
        }
    }

    match (cur, op, sdp_type, next) {
        // stable -> setLocal(offer) -> have-local-offer
        (
            SignalingState::Stable,
            StateChangeOp::SetLocal,
            SdpType::Offer,
            SignalingState::HaveLocalOffer,
        ) => Ok(next),
        // stable -> setRemote(offer) -> have-remote-offer
        (
            SignalingState::Stable,
            StateChangeOp::SetRemote,
            SdpType::Offer,
            SignalingState::HaveRemoteOffer,
        ) => Ok(next),
        // have-local-offer -> setRemote(answer) -> stable
        (
            SignalingState::HaveLocalOffer,
            StateChangeOp::SetRemote,
            SdpType::Answer,
            SignalingState::Stable,
        ) => Ok(next),
        // have-local-offer -> setRemote(pranswer) -> have-remote-pranswer
        (
            SignalingState::HaveLocalOffer,
            StateChangeOp::SetRemote,
            SdpType::Pranswer,
            SignalingState::HaveRemotePranswer,
        ) => Ok(next),
        // have-remote-pranswer -> setRemote(answer) -> stable
        (
            SignalingState::HaveRemotePranswer,
            StateChangeOp::SetRemote,
            SdpType::Answer,
            SignalingState::Stable,
        ) => Ok(next),
        // have-remote-offer -> setLocal(answer) -> stable
        (
            SignalingState::HaveRemoteOffer,
            StateChangeOp::SetLocal,
            SdpType::Answer,
            SignalingState::Stable,
        ) => Ok(next),
        // have-remote-offer -> setLocal(pranswer) -> have-local-pranswer
        (
            SignalingState::HaveRemoteOffer,
            StateChangeOp::SetLocal,
            SdpType::Pranswer,
            SignalingState::HaveLocalPranswer,
        ) => Ok(next),
        // have-local-pranswer -> setLocal(answer) -> stable
        (
            SignalingState::HaveLocalPranswer,
            StateChangeOp::SetLocal,
            SdpType::Answer,
            SignalingState::Stable,
        ) => Ok(next),
        _ => Err(Error::ErrSignalingStateProposedTransitionInvalid),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        let cases = [
            (
                SignalingState::Stable,
                SignalingState::HaveLocalOffer,
                StateChangeOp::SetLocal,
                SdpType::Offer,
            ),
            (
                SignalingState::Stable,
                SignalingState::HaveRemoteOffer,
                StateChangeOp::SetRemote,
                SdpType::Offer,
            ),
            (
                SignalingState::HaveLocalOffer,
                SignalingState::Stable,
                StateChangeOp::SetRemote,
                SdpType::Answer,
            ),
            (
                SignalingState::HaveRemoteOffer,
                SignalingState::Stable,
                StateChangeOp::SetLocal,
                SdpType::Answer,
            ),
            (
                SignalingState::HaveLocalOffer,
                SignalingState::HaveRemotePranswer,
                StateChangeOp::SetRemote,
                SdpType::Pranswer,
            ),
            (
                SignalingState::HaveRemotePranswer,
                SignalingState::Stable,
                StateChangeOp::SetRemote,
                SdpType::Answer,
            ),
        ];

        for (cur, next, op, sdp_type) in cases {
            let got = check_next_signaling_state(cur, next, op, sdp_type)
                .unwrap_or_else(|_| panic!("{cur} -> {next} via {op} must be legal"));
            assert_eq!(got, next);
        }
    }

    #[test]
    fn test_illegal_transitions() {
        // stable -> setRemote(answer) is meaningless.
        assert!(check_next_signaling_state(
            SignalingState::Stable,
            SignalingState::Stable,
            StateChangeOp::SetRemote,
            SdpType::Answer,
        )
        .is_err());

        // Cannot roll back out of stable.
        assert_eq!(
            check_next_signaling_state(
                SignalingState::Stable,
                SignalingState::Stable,
                StateChangeOp::SetLocal,
                SdpType::Rollback,
            ),
            Err(Error::ErrSignalingStateCannotRollback)
        );

        // Rollback from a pending local offer is allowed.
        assert!(check_next_signaling_state(
            SignalingState::HaveLocalOffer,
            SignalingState::Stable,
            StateChangeOp::SetLocal,
            SdpType::Rollback,
        )
        .is_ok());
    }
}
