pub mod interceptor_registry;
pub mod media_engine;
pub mod setting_engine;

use std::sync::Arc;
use std::time::SystemTime;

use interceptor::registry::Registry;

use crate::certificate::Certificate;
use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::DataChannel;
use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, Result};
use crate::ice_transport::ice_gatherer::{IceGatherOptions, IceGatherer};
use crate::ice_transport::IceTransport;
use crate::peer_connection::configuration::Configuration;
use crate::peer_connection::PeerConnection;
use crate::sctp_transport::SctpTransport;
use self::media_engine::MediaEngine;
use self::setting_engine::SettingEngine;
use rcgen::KeyPair;

/// Api owns the engines shared by the PeerConnections it creates.
/// There is no global instance; construct one through ApiBuilder and
/// pass it where it is needed.
pub struct Api {
    pub(crate) setting_engine: Arc<SettingEngine>,
    pub(crate) media_engine: Arc<MediaEngine>,
    pub(crate) interceptor_registry: Registry,
}

impl Api {
    /// Creates a PeerConnection with this Api's engine configuration.
    pub async fn new_peer_connection(
        &self,
        configuration: Configuration,
    ) -> Result<PeerConnection> {
        PeerConnection::new(self, configuration).await
    }

    /// ORTC-style constructor for a bare candidate gatherer.
    pub fn new_ice_gatherer(&self, opts: IceGatherOptions) -> Result<IceGatherer> {
        let mut validated_servers = vec![];
        for server in &opts.ice_servers {
            let urls = server.urls()?;
            validated_servers.extend(urls);
        }

        Ok(IceGatherer::new(
            validated_servers,
            opts.ice_gather_policy,
            Arc::clone(&self.setting_engine),
        ))
    }

    /// ORTC-style constructor for a bare ICE transport.
    pub fn new_ice_transport(&self, gatherer: Arc<IceGatherer>) -> IceTransport {
        IceTransport::new(gatherer)
    }

    /// ORTC-style constructor for a bare DTLS transport.
    pub fn new_dtls_transport(
        &self,
        ice_transport: Arc<IceTransport>,
        mut certificates: Vec<Certificate>,
    ) -> Result<DtlsTransport> {
        if certificates.is_empty() {
            let kp = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;
            certificates = vec![Certificate::from_key_pair(kp)?];
        } else {
            let now = SystemTime::now();
            for cert in &certificates {
                if cert.expires().duration_since(now).is_err() {
                    return Err(Error::ErrCertificateExpired);
                }
            }
        }

        Ok(DtlsTransport::new(
            ice_transport,
            certificates,
            Arc::clone(&self.setting_engine),
        ))
    }

    /// ORTC-style constructor for a bare SCTP transport.
    pub fn new_sctp_transport(
        &self,
        dtls_transport: Arc<DtlsTransport>,
    ) -> Result<SctpTransport> {
        Ok(SctpTransport::new(
            dtls_transport,
            Arc::clone(&self.setting_engine),
        ))
    }

    /// ORTC-style constructor: builds a data channel and dials it over
    /// an already-started SCTP transport.
    pub async fn new_data_channel(
        &self,
        sctp_transport: Arc<SctpTransport>,
        params: DataChannelParameters,
    ) -> Result<DataChannel> {
        if params.label.len() > 65535 {
            return Err(Error::ErrStringSizeLimit);
        }

        let d = DataChannel::new(params, Arc::clone(&self.setting_engine));
        d.open(sctp_transport).await?;

        Ok(d)
    }
}

/// Assembles an Api from optional engine overrides.
#[derive(Default)]
pub struct ApiBuilder {
    setting_engine: Option<Arc<SettingEngine>>,
    media_engine: Option<Arc<MediaEngine>>,
    interceptor_registry: Option<Registry>,
}

impl ApiBuilder {
    pub fn new() -> Self {
        ApiBuilder::default()
    }

    pub fn build(mut self) -> Api {
        Api {
            setting_engine: self
                .setting_engine
                .take()
                .unwrap_or_else(|| Arc::new(SettingEngine::default())),
            media_engine: self
                .media_engine
                .take()
                .unwrap_or_else(|| Arc::new(MediaEngine::default())),
            interceptor_registry: self.interceptor_registry.take().unwrap_or_default(),
        }
    }

    /// Settings must not change once the engine is handed over.
    pub fn with_setting_engine(mut self, setting_engine: SettingEngine) -> Self {
        self.setting_engine = Some(Arc::new(setting_engine));
        self
    }

    pub fn with_media_engine(mut self, media_engine: MediaEngine) -> Self {
        self.media_engine = Some(Arc::new(media_engine));
        self
    }

    pub fn with_interceptor_registry(mut self, interceptor_registry: Registry) -> Self {
        self.interceptor_registry = Some(interceptor_registry);
        self
    }
}

#[cfg(test)]
mod api_test {
    use super::*;

    #[tokio::test]
    async fn test_api_builder_defaults() -> Result<()> {
        let api = ApiBuilder::new().build();
        // No codecs registered: data-channel-only connections work.
        let pc = api.new_peer_connection(Configuration::default()).await?;
        pc.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_api_builder_with_engines() -> Result<()> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut setting_engine = SettingEngine::default();
        setting_engine.detach_data_channels();

        let api = ApiBuilder::new()
            .with_media_engine(media_engine)
            .with_setting_engine(setting_engine)
            .build();

        assert!(api.setting_engine.detach.data_channels);
        assert!(!api.media_engine.video_codecs.is_empty());
        Ok(())
    }
}
