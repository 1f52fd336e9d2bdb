#![warn(rust_2018_idioms)]
#![allow(clippy::type_complexity)]

pub mod api;
pub mod certificate;
pub mod data_channel;
pub mod dtls_transport;
pub mod error;
pub mod ice_transport;
pub(crate) mod mux;
pub mod peer_connection;
pub mod rtp_transceiver;
pub mod sctp_transport;
pub mod track;

pub use error::Error;

use dtls::extension::extension_use_srtp::SrtpProtectionProfile;
use rand::Rng;

/// Size of the buffer handed to every packet read on the shared socket.
pub(crate) const RECEIVE_MTU: usize = 1460;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

const RUNES_ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random alphabetic identifier of the requested length.
pub(crate) fn math_rand_alpha(n: usize) -> String {
    let mut rng = rand::rng();

    (0..n)
        .map(|_| RUNES_ALPHA[rng.random_range(0..RUNES_ALPHA.len())] as char)
        .collect()
}

/// SRTP protection profiles offered in the DTLS handshake when the
/// SettingEngine does not override them.
pub(crate) fn default_srtp_protection_profiles() -> Vec<SrtpProtectionProfile> {
    vec![
        SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm,
        SrtpProtectionProfile::Srtp_Aes128_Cm_Hmac_Sha1_80,
    ]
}
