use std::sync::Arc;

use data::message::message_channel_open::ChannelType;

use super::*;

fn new_channel(params: DataChannelParameters) -> DataChannel {
    DataChannel::new(params, Arc::new(SettingEngine::default()))
}

#[test]
fn test_channel_type_mapping() {
    let cases: Vec<(DataChannelParameters, ChannelType, u32)> = vec![
        (
            DataChannelParameters {
                ordered: true,
                ..Default::default()
            },
            ChannelType::Reliable,
            0,
        ),
        (
            DataChannelParameters {
                ordered: false,
                ..Default::default()
            },
            ChannelType::ReliableUnordered,
            0,
        ),
        (
            DataChannelParameters {
                ordered: true,
                max_retransmits: Some(3),
                ..Default::default()
            },
            ChannelType::PartialReliableRexmit,
            3,
        ),
        (
            DataChannelParameters {
                ordered: false,
                max_retransmits: Some(5),
                ..Default::default()
            },
            ChannelType::PartialReliableRexmitUnordered,
            5,
        ),
        (
            DataChannelParameters {
                ordered: true,
                max_packet_life_time: Some(100),
                ..Default::default()
            },
            ChannelType::PartialReliableTimed,
            100,
        ),
        (
            DataChannelParameters {
                ordered: false,
                max_packet_life_time: Some(250),
                ..Default::default()
            },
            ChannelType::PartialReliableTimedUnordered,
            250,
        ),
    ];

    for (params, expected_type, expected_param) in cases {
        let dc = new_channel(params);
        let (channel_type, reliability_parameter) = dc.channel_type();
        assert_eq!(channel_type, expected_type);
        assert_eq!(reliability_parameter, expected_param);
    }
}

#[test]
fn test_id_unassigned_until_set() {
    let dc = new_channel(DataChannelParameters {
        label: "data".to_owned(),
        ordered: true,
        ..Default::default()
    });

    assert_eq!(dc.id(), None);
    dc.set_id(0);
    assert_eq!(dc.id(), Some(0));
}

#[test]
fn test_id_carried_from_parameters() {
    let dc = new_channel(DataChannelParameters {
        label: "negotiated".to_owned(),
        ordered: true,
        negotiated: true,
        id: Some(42),
        ..Default::default()
    });

    assert_eq!(dc.id(), Some(42));
    assert!(dc.negotiated());
}

#[tokio::test]
async fn test_send_before_open_fails() {
    let dc = new_channel(DataChannelParameters {
        label: "early".to_owned(),
        ordered: true,
        ..Default::default()
    });

    assert_eq!(dc.ready_state(), DataChannelState::Connecting);
    let err = dc
        .send(&bytes::Bytes::from_static(b"too soon"))
        .await
        .expect_err("send before open");
    assert_eq!(err, Error::ErrDataChannelNotOpen);

    let err = dc.send_text("too soon").await.expect_err("send before open");
    assert_eq!(err, Error::ErrDataChannelNotOpen);
}

#[tokio::test]
async fn test_close_without_transport() {
    let dc = new_channel(DataChannelParameters {
        label: "never-opened".to_owned(),
        ordered: true,
        ..Default::default()
    });

    dc.close().await.expect("close");
    assert_eq!(dc.ready_state(), DataChannelState::Closed);
    dc.close().await.expect("close twice");
}

#[tokio::test]
async fn test_detach_requires_setting() {
    let dc = new_channel(DataChannelParameters {
        label: "detach".to_owned(),
        ordered: true,
        ..Default::default()
    });

    let err = dc.detach().await.expect_err("detach without setting");
    assert_eq!(err, Error::ErrDetachNotEnabled);

    let mut s = SettingEngine::default();
    s.detach_data_channels();
    let dc = DataChannel::new(
        DataChannelParameters {
            label: "detach".to_owned(),
            ordered: true,
            ..Default::default()
        },
        Arc::new(s),
    );
    let err = dc.detach().await.expect_err("detach before open");
    assert_eq!(err, Error::ErrDetachBeforeOpened);
}
