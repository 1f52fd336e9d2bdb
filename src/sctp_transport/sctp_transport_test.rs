use std::sync::Arc;

use rcgen::KeyPair;

use super::*;
use crate::certificate::Certificate;
use crate::ice_transport::ice_gatherer::IceGatherer;
use crate::ice_transport::IceTransport;
use crate::peer_connection::policy::ice_transport_policy::IceTransportPolicy;

fn new_transport(setting_engine: SettingEngine) -> Arc<SctpTransport> {
    let setting_engine = Arc::new(setting_engine);
    let gatherer = Arc::new(IceGatherer::new(
        vec![],
        IceTransportPolicy::All,
        Arc::clone(&setting_engine),
    ));
    let ice_transport = Arc::new(IceTransport::new(gatherer));
    let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("keypair");
    let cert = Certificate::from_key_pair(kp).expect("certificate");
    let dtls_transport = Arc::new(DtlsTransport::new(
        ice_transport,
        vec![cert],
        Arc::clone(&setting_engine),
    ));

    Arc::new(SctpTransport::new(dtls_transport, setting_engine))
}

#[tokio::test]
async fn test_generate_data_channel_id_parity() -> crate::error::Result<()> {
    // (role, ids already in use, expected next id)
    let cases = [
        (DtlsRole::Client, vec![], 0u16),
        (DtlsRole::Client, vec![1u16], 0),
        (DtlsRole::Client, vec![0], 2),
        (DtlsRole::Client, vec![0, 2], 4),
        (DtlsRole::Client, vec![0, 4], 2),
        (DtlsRole::Server, vec![], 1),
        (DtlsRole::Server, vec![0], 1),
        (DtlsRole::Server, vec![1], 3),
        (DtlsRole::Server, vec![1, 3], 5),
        (DtlsRole::Server, vec![1, 5], 3),
    ];

    for (role, used, expected) in cases {
        let t = new_transport(SettingEngine::default());
        for id in &used {
            t.reserve_data_channel_id(*id).await;
        }

        let id = t.generate_and_set_data_channel_id(role).await?;
        assert_eq!(id, expected, "role {role} used {used:?}");

        // The id is reserved from now on.
        let next = t.generate_and_set_data_channel_id(role).await?;
        assert_ne!(next, id);
    }

    Ok(())
}

#[tokio::test]
async fn test_generate_data_channel_id_exhaustion() {
    let t = new_transport(SettingEngine::default());
    {
        let mut ids = t.data_channel_ids.lock().await;
        for id in (1..=u16::MAX).step_by(2) {
            ids.insert(id);
        }
    }

    let err = t
        .generate_and_set_data_channel_id(DtlsRole::Server)
        .await
        .expect_err("odd id space is full");
    assert_eq!(err, Error::ErrMaxDataChannels);
}

#[tokio::test]
async fn test_capabilities_defaults_and_cap() {
    let t = new_transport(SettingEngine::default());
    assert_eq!(t.get_capabilities().max_message_size, 65536);
    assert_eq!(t.advertised_max_message_size(), SCTP_MAX_MESSAGE_SIZE_CAP);
    // Remote did not announce a size.
    assert_eq!(t.max_message_size(), 65536);

    let mut s = SettingEngine::default();
    s.set_sctp_max_message_size(4321);
    let t = new_transport(s);
    assert_eq!(t.get_capabilities().max_message_size, 4321);
    assert_eq!(t.advertised_max_message_size(), 4321);

    t.max_message_size_remote.store(70000, Ordering::SeqCst);
    assert_eq!(t.max_message_size(), 70000);
}

#[test]
fn test_reliability_mapping_roundtrip() {
    let cases = [
        (ChannelType::Reliable, 0u32, (true, None, None)),
        (ChannelType::ReliableUnordered, 0, (false, None, None)),
        (ChannelType::PartialReliableRexmit, 3, (true, Some(3u16), None)),
        (
            ChannelType::PartialReliableRexmitUnordered,
            5,
            (false, Some(5), None),
        ),
        (
            ChannelType::PartialReliableTimed,
            120,
            (true, None, Some(120u16)),
        ),
        (
            ChannelType::PartialReliableTimedUnordered,
            250,
            (false, None, Some(250)),
        ),
    ];

    for (channel_type, param, expected) in cases {
        assert_eq!(
            reliability_from_channel_type(channel_type, param),
            expected,
            "{channel_type:?}"
        );
    }
}

#[tokio::test]
async fn test_stop_fires_on_close_once() {
    let t = new_transport(SettingEngine::default());

    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(2);
    t.on_close(Box::new(move || {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(()).await;
        })
    }));

    t.stop().await.expect("stop");
    t.stop().await.expect("stop twice");

    assert_eq!(t.state(), SctpTransportState::Closed);
    rx.recv().await.expect("on_close fired");
    assert!(rx.try_recv().is_err(), "on_close must fire exactly once");
}
