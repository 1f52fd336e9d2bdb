/// Predicate deciding whether a datagram belongs to an endpoint.
pub type MatchFunc = Box<dyn (Fn(&[u8]) -> bool) + Send + Sync>;

/// Matches any packet.
pub fn match_all(_b: &[u8]) -> bool {
    true
}

/// Matches packets whose first byte falls in [lower..=upper].
pub fn match_range(lower: u8, upper: u8, buf: &[u8]) -> bool {
    match buf.first() {
        Some(&b) => b >= lower && b <= upper,
        None => false,
    }
}

/// DTLS per RFC 7983: first byte in [20..=63].
pub fn match_dtls(b: &[u8]) -> bool {
    match_range(20, 63, b)
}

/// RTP or RTCP per RFC 7983: first byte in [128..=191].
pub fn match_srtp_or_srtcp(b: &[u8]) -> bool {
    match_range(128, 191, b)
}

/// The second octet of an RTCP compound packet carries the packet type,
/// assigned in [200..=206] (SR..PSFB).
pub(crate) fn is_rtcp(buf: &[u8]) -> bool {
    buf.len() >= 2 && (200..=206).contains(&buf[1])
}

/// SRTP: RTP/RTCP range, minus the RTCP packet types.
pub fn match_srtp(buf: &[u8]) -> bool {
    match_srtp_or_srtcp(buf) && !is_rtcp(buf)
}

/// SRTCP: RTP/RTCP range with an RTCP packet type.
pub fn match_srtcp(buf: &[u8]) -> bool {
    match_srtp_or_srtcp(buf) && is_rtcp(buf)
}
