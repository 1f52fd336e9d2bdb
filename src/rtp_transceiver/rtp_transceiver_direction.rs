use std::fmt;

/// Direction of a transceiver
/// (<https://w3c.github.io/webrtc-pc/#dom-rtcrtptransceiverdirection>).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RtpTransceiverDirection {
    #[default]
    Unspecified = 0,
    Sendrecv = 1,
    Sendonly = 2,
    Recvonly = 3,
    Inactive = 4,
}

impl From<&str> for RtpTransceiverDirection {
    fn from(raw: &str) -> Self {
        match raw {
            "sendrecv" => RtpTransceiverDirection::Sendrecv,
            "sendonly" => RtpTransceiverDirection::Sendonly,
            "recvonly" => RtpTransceiverDirection::Recvonly,
            "inactive" => RtpTransceiverDirection::Inactive,
            _ => RtpTransceiverDirection::Unspecified,
        }
    }
}

impl From<u8> for RtpTransceiverDirection {
    fn from(v: u8) -> Self {
        match v {
            1 => RtpTransceiverDirection::Sendrecv,
            2 => RtpTransceiverDirection::Sendonly,
            3 => RtpTransceiverDirection::Recvonly,
            4 => RtpTransceiverDirection::Inactive,
            _ => RtpTransceiverDirection::Unspecified,
        }
    }
}

impl fmt::Display for RtpTransceiverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RtpTransceiverDirection::Sendrecv => "sendrecv",
            RtpTransceiverDirection::Sendonly => "sendonly",
            RtpTransceiverDirection::Recvonly => "recvonly",
            RtpTransceiverDirection::Inactive => "inactive",
            RtpTransceiverDirection::Unspecified => crate::UNSPECIFIED_STR,
        };
        write!(f, "{s}")
    }
}

impl RtpTransceiverDirection {
    /// What the remote sees: send and recv swap.
    pub fn reverse(&self) -> RtpTransceiverDirection {
        match self {
            RtpTransceiverDirection::Sendonly => RtpTransceiverDirection::Recvonly,
            RtpTransceiverDirection::Recvonly => RtpTransceiverDirection::Sendonly,
            other => *other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_direction_string_roundtrip() {
        for d in [
            RtpTransceiverDirection::Sendrecv,
            RtpTransceiverDirection::Sendonly,
            RtpTransceiverDirection::Recvonly,
            RtpTransceiverDirection::Inactive,
        ] {
            assert_eq!(RtpTransceiverDirection::from(d.to_string().as_str()), d);
        }
    }

    #[test]
    fn test_direction_reverse() {
        assert_eq!(
            RtpTransceiverDirection::Sendonly.reverse(),
            RtpTransceiverDirection::Recvonly
        );
        assert_eq!(
            RtpTransceiverDirection::Recvonly.reverse(),
            RtpTransceiverDirection::Sendonly
        );
        assert_eq!(
            RtpTransceiverDirection::Sendrecv.reverse(),
            RtpTransceiverDirection::Sendrecv
        );
        assert_eq!(
            RtpTransceiverDirection::Inactive.reverse(),
            RtpTransceiverDirection::Inactive
        );
    }
}
