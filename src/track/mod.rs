pub mod track_local;
pub mod track_remote;

/// Outbound packetization MTU; header overhead is left to the payloader.
pub(crate) const RTP_OUTBOUND_MTU: usize = 1200;
