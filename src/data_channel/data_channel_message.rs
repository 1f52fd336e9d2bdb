use bytes::Bytes;

/// One message delivered to `on_message`. `is_string` distinguishes
/// the UTF-8 string PPIDs from the binary ones.
#[derive(Default, Debug, Clone)]
pub struct DataChannelMessage {
    pub is_string: bool,
    pub data: Bytes,
}
