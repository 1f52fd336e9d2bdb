use std::sync::Arc;

use super::*;
use crate::api::setting_engine::SettingEngine;
use crate::mux::mux_func::match_dtls;
use crate::peer_connection::policy::ice_transport_policy::IceTransportPolicy;

fn new_transport() -> IceTransport {
    let gatherer = Arc::new(IceGatherer::new(
        vec![],
        IceTransportPolicy::All,
        Arc::new(SettingEngine::default()),
    ));
    IceTransport::new(gatherer)
}

#[tokio::test]
async fn test_new_transport_defaults() {
    let t = new_transport();

    assert_eq!(t.state(), IceTransportState::New);
    assert_eq!(t.role().await, IceRole::Unspecified);
    // No mux before start, so no endpoints either.
    assert!(t.new_endpoint(Box::new(match_dtls)).await.is_none());
}

#[tokio::test]
async fn test_stop_before_start_is_clean() {
    let t = new_transport();

    t.stop().await.expect("stop is idempotent");
    assert_eq!(t.state(), IceTransportState::Closed);

    // A second stop must not error either.
    t.stop().await.expect("stop twice");
}

#[tokio::test]
async fn test_start_twice_fails() {
    let t = new_transport();
    t.set_state(IceTransportState::Checking);

    let err = t
        .start(&IceParameters::default(), Some(IceRole::Controlling))
        .await
        .expect_err("second start must fail");
    assert_eq!(err, Error::ErrICETransportNotInNew);
}
