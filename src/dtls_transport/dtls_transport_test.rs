use std::sync::Arc;

use rcgen::KeyPair;

use super::dtls_fingerprint::DtlsFingerprint;
use super::*;
use crate::ice_transport::ice_gatherer::IceGatherer;
use crate::peer_connection::policy::ice_transport_policy::IceTransportPolicy;

fn new_transport() -> DtlsTransport {
    let setting_engine = Arc::new(SettingEngine::default());
    let gatherer = Arc::new(IceGatherer::new(
        vec![],
        IceTransportPolicy::All,
        Arc::clone(&setting_engine),
    ));
    let ice_transport = Arc::new(IceTransport::new(gatherer));

    let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("keypair");
    let cert = Certificate::from_key_pair(kp).expect("certificate");

    DtlsTransport::new(ice_transport, vec![cert], setting_engine)
}

#[tokio::test]
async fn test_role_derivation_inverts_remote() {
    let t = new_transport();

    {
        let mut rp = t.remote_parameters.lock().await;
        rp.role = DtlsRole::Client;
    }
    assert_eq!(t.role().await, DtlsRole::Server);

    {
        let mut rp = t.remote_parameters.lock().await;
        rp.role = DtlsRole::Server;
    }
    assert_eq!(t.role().await, DtlsRole::Client);
}

#[tokio::test]
async fn test_role_defaults_to_client_when_controlled() {
    let t = new_transport();
    // Remote auto, no SettingEngine pin, ICE not controlling.
    assert_eq!(t.role().await, DtlsRole::Client);
}

#[tokio::test]
async fn test_role_setting_engine_pin() {
    let setting_engine = {
        let mut s = SettingEngine::default();
        s.set_answering_dtls_role(DtlsRole::Server).expect("role");
        Arc::new(s)
    };
    let gatherer = Arc::new(IceGatherer::new(
        vec![],
        IceTransportPolicy::All,
        Arc::clone(&setting_engine),
    ));
    let ice_transport = Arc::new(IceTransport::new(gatherer));
    let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).expect("keypair");
    let cert = Certificate::from_key_pair(kp).expect("certificate");
    let t = DtlsTransport::new(ice_transport, vec![cert], setting_engine);

    assert_eq!(t.role().await, DtlsRole::Server);
}

#[tokio::test]
async fn test_validate_fingerprint() {
    let t = new_transport();

    // Use our own certificate as the "remote" one.
    let der = t.certificates[0].dtls_certificate.certificate[0]
        .as_ref()
        .to_vec();
    let good = t.certificates[0].get_fingerprints().remove(0);

    {
        let mut rp = t.remote_parameters.lock().await;
        rp.fingerprints = vec![DtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            // Matching must be case-insensitive.
            value: good.value.to_uppercase(),
        }];
    }
    assert!(t.validate_fingerprint(&der).await.is_ok());

    {
        let mut rp = t.remote_parameters.lock().await;
        rp.fingerprints = vec![DtlsFingerprint {
            algorithm: "sha-256".to_owned(),
            value: "aa:".repeat(31) + "aa",
        }];
    }
    assert_eq!(
        t.validate_fingerprint(&der).await,
        Err(Error::ErrNoMatchingCertificateFingerprint)
    );

    {
        let mut rp = t.remote_parameters.lock().await;
        rp.fingerprints = vec![DtlsFingerprint {
            algorithm: "md5".to_owned(),
            value: good.value.clone(),
        }];
    }
    assert_eq!(
        t.validate_fingerprint(&der).await,
        Err(Error::ErrFingerprintAlgorithmUnsupported)
    );
}

#[tokio::test]
async fn test_start_requires_ice() {
    let t = new_transport();
    let err = t
        .start(DtlsParameters::default())
        .await
        .expect_err("start before ICE must fail");
    assert_eq!(err, Error::ErrICEConnectionNotStarted);
}
