use std::fmt;

use sdp::description::session::SessionDescription;
use sdp::util::ConnectionRole;
use serde::{Deserialize, Serialize};

/// The DTLS role an endpoint takes during the handshake.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DtlsRole {
    #[default]
    Unspecified = 0,

    /// The endpoint decides its role from the ICE role once signaling
    /// settles (`a=setup:actpass` offers land here).
    Auto = 1,

    /// Active endpoint, sends the ClientHello.
    Client = 2,

    /// Passive endpoint, waits for the ClientHello.
    Server = 3,
}

/// Offers are always actpass per JSEP; the answerer picks.
pub(crate) const DEFAULT_DTLS_ROLE_OFFER: DtlsRole = DtlsRole::Auto;

/// An answering endpoint defaults to active (RFC 5763 §5).
pub(crate) const DEFAULT_DTLS_ROLE_ANSWER: DtlsRole = DtlsRole::Client;

impl fmt::Display for DtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DtlsRole::Auto => write!(f, "auto"),
            DtlsRole::Client => write!(f, "client"),
            DtlsRole::Server => write!(f, "server"),
            DtlsRole::Unspecified => write!(f, "{}", crate::UNSPECIFIED_STR),
        }
    }
}

impl From<&SessionDescription> for DtlsRole {
    /// Derives the remote's role from its `a=setup` attributes.
    /// A missing attribute means the remote does not care, which JSEP
    /// treats like actpass.
    fn from(sd: &SessionDescription) -> Self {
        for media_section in &sd.media_descriptions {
            for attribute in &media_section.attributes {
                if attribute.key == "setup" {
                    return match attribute.value.as_deref() {
                        Some("active") => DtlsRole::Client,
                        Some("passive") => DtlsRole::Server,
                        _ => DtlsRole::Auto,
                    };
                }
            }
        }

        DtlsRole::Auto
    }
}

impl DtlsRole {
    pub(crate) fn to_connection_role(self) -> ConnectionRole {
        match self {
            DtlsRole::Client => ConnectionRole::Active,
            DtlsRole::Server => ConnectionRole::Passive,
            DtlsRole::Auto => ConnectionRole::Actpass,
            DtlsRole::Unspecified => ConnectionRole::Unspecified,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &str) -> SessionDescription {
        let mut cursor = Cursor::new(raw.as_bytes());
        SessionDescription::unmarshal(&mut cursor).expect("valid sdp")
    }

    const SDP_HEADER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";

    #[test]
    fn test_role_from_remote_description() {
        for (setup, want) in [
            ("a=setup:active\r\n", DtlsRole::Client),
            ("a=setup:passive\r\n", DtlsRole::Server),
            ("a=setup:actpass\r\n", DtlsRole::Auto),
            ("", DtlsRole::Auto),
        ] {
            let sd = parse(&format!("{SDP_HEADER}{setup}"));
            assert_eq!(DtlsRole::from(&sd), want, "setup {setup:?}");
        }
    }
}
