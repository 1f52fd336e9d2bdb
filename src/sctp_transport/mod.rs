pub mod sctp_transport_capabilities;
pub mod sctp_transport_state;

#[cfg(test)]
mod sctp_transport_test;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use data::message::message_channel_open::ChannelType;
use sctp::association::Association;
use tokio::sync::{Mutex, Notify};
use util::Conn;

use crate::api::setting_engine::SettingEngine;
use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::data_channel_state::DataChannelState;
use crate::data_channel::{DataChannel, OnCloseHdlrFn};
use crate::dtls_transport::dtls_role::DtlsRole;
use crate::dtls_transport::DtlsTransport;
use crate::error::{Error, OnErrorHdlrFn, Result};
use crate::sctp_transport::sctp_transport_capabilities::SctpTransportCapabilities;
use crate::sctp_transport::sctp_transport_state::SctpTransportState;

use arc_swap::ArcSwapOption;

/// Default maximum message size, used when the remote never announced
/// one (the `0` sentinel).
const SCTP_MAX_MESSAGE_SIZE_UNSET_VALUE: u32 = 65536;

/// Largest value we ever advertise or accept.
pub(crate) const SCTP_MAX_MESSAGE_SIZE_CAP: u32 = 1_073_741_823;

pub type OnDataChannelHdlrFn = Box<
    dyn (FnMut(Arc<DataChannel>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

/// SctpTransport runs one client-role association over the DTLS inner
/// transport (both peers dial; SCTP handles the simultaneous open) and
/// accepts inbound data-channel streams.
pub struct SctpTransport {
    pub(crate) dtls_transport: Arc<DtlsTransport>,
    pub(crate) setting_engine: Arc<SettingEngine>,

    pub(crate) state: AtomicU8,
    pub(crate) is_started: AtomicBool,
    on_close_fired: AtomicBool,

    /// Remote's announced max-message-size; 0 means unknown.
    pub(crate) max_message_size_remote: AtomicU32,

    association: Mutex<Option<Arc<Association>>>,

    on_data_channel_handler: Arc<ArcSwapOption<Mutex<OnDataChannelHdlrFn>>>,
    on_error_handler: Arc<ArcSwapOption<Mutex<OnErrorHdlrFn>>>,
    on_close_handler: Arc<ArcSwapOption<Mutex<OnCloseHdlrFn>>>,

    /// Channels created through the PeerConnection, open or waiting
    /// for the transport.
    pub(crate) data_channels: Arc<Mutex<Vec<Arc<DataChannel>>>>,
    pub(crate) data_channels_requested: Arc<AtomicU32>,
    pub(crate) data_channels_opened: Arc<AtomicU32>,
    pub(crate) data_channels_accepted: Arc<AtomicU32>,

    /// Stream ids in use or reserved, locally and remotely assigned.
    pub(crate) data_channel_ids: Arc<Mutex<HashSet<u16>>>,

    notify_tx: Arc<Notify>,
}

impl SctpTransport {
    pub(crate) fn new(
        dtls_transport: Arc<DtlsTransport>,
        setting_engine: Arc<SettingEngine>,
    ) -> Self {
        SctpTransport {
            dtls_transport,
            setting_engine,
            state: AtomicU8::new(SctpTransportState::Connecting as u8),
            is_started: AtomicBool::new(false),
            on_close_fired: AtomicBool::new(false),
            max_message_size_remote: AtomicU32::new(0),
            association: Mutex::new(None),
            on_data_channel_handler: Arc::new(ArcSwapOption::empty()),
            on_error_handler: Arc::new(ArcSwapOption::empty()),
            on_close_handler: Arc::new(ArcSwapOption::empty()),
            data_channels: Arc::new(Mutex::new(vec![])),
            data_channels_requested: Arc::new(AtomicU32::new(0)),
            data_channels_opened: Arc::new(AtomicU32::new(0)),
            data_channels_accepted: Arc::new(AtomicU32::new(0)),
            data_channel_ids: Arc::new(Mutex::new(HashSet::new())),
            notify_tx: Arc::new(Notify::new()),
        }
    }

    /// The DTLS transport the association runs over.
    pub fn transport(&self) -> &Arc<DtlsTransport> {
        &self.dtls_transport
    }

    /// What we can accept: the configured limit capped, or the default.
    pub fn get_capabilities(&self) -> SctpTransportCapabilities {
        let configured = self.setting_engine.sctp.max_message_size;
        let max_message_size = if configured != 0 {
            configured.min(SCTP_MAX_MESSAGE_SIZE_CAP)
        } else {
            SCTP_MAX_MESSAGE_SIZE_UNSET_VALUE
        };

        SctpTransportCapabilities { max_message_size }
    }

    /// The value emitted into `a=max-message-size`; without an explicit
    /// setting we advertise the implementation-wide cap.
    pub(crate) fn advertised_max_message_size(&self) -> u32 {
        let configured = self.setting_engine.sctp.max_message_size;
        if configured != 0 {
            configured.min(SCTP_MAX_MESSAGE_SIZE_CAP)
        } else {
            SCTP_MAX_MESSAGE_SIZE_CAP
        }
    }

    /// The remote's cap; the 0 sentinel is mapped to the default.
    pub fn max_message_size(&self) -> u32 {
        match self.max_message_size_remote.load(Ordering::SeqCst) {
            0 => SCTP_MAX_MESSAGE_SIZE_UNSET_VALUE,
            size => size,
        }
    }

    /// Opens the association over DTLS and begins accepting inbound
    /// streams. Subsequent calls are no-ops.
    pub async fn start(self: &Arc<Self>, remote_caps: SctpTransportCapabilities) -> Result<()> {
        if self.is_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.max_message_size_remote
            .store(remote_caps.max_message_size, Ordering::SeqCst);

        let dtls_conn = self
            .dtls_transport
            .conn()
            .await
            .ok_or(Error::ErrSCTPTransportDTLS)?;

        let config = sctp::association::Config {
            net_conn: dtls_conn as Arc<dyn Conn + Send + Sync>,
            max_receive_buffer_size: self.setting_engine.sctp.max_receive_buffer_size,
            max_message_size: 0,
            name: String::new(),
        };
        let association = Arc::new(Association::client(config).await?);

        {
            let mut a = self.association.lock().await;
            *a = Some(Arc::clone(&association));
        }

        self.state
            .store(SctpTransportState::Connected as u8, Ordering::SeqCst);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.accept_data_channels(association).await;
        });

        Ok(())
    }

    async fn accept_data_channels(self: Arc<Self>, association: Arc<Association>) {
        loop {
            // Checked before blocking so a stop between streams is
            // observed promptly.
            if self.state() == SctpTransportState::Closed {
                break;
            }

            let existing_data_channels: Vec<Arc<data::data_channel::DataChannel>> = {
                let mut inner = vec![];
                let data_channels = self.data_channels.lock().await;
                for dc in data_channels.iter() {
                    if let Some(inner_dc) = dc.inner_data_channel().await {
                        inner.push(inner_dc);
                    }
                }
                inner
            };
            let existing_refs: Vec<&data::data_channel::DataChannel> =
                existing_data_channels.iter().map(|dc| dc.as_ref()).collect();

            let dc = tokio::select! {
                _ = self.notify_tx.notified() => break,
                result = data::data_channel::DataChannel::accept(
                    &association,
                    data::data_channel::Config::default(),
                    &existing_refs,
                ) => {
                    match result {
                        Ok(dc) => dc,
                        Err(data::Error::ErrStreamClosed) => break,
                        Err(err) => {
                            log::error!("sctp_transport: accept failed: {err}");
                            break;
                        }
                    }
                }
            };

            let (ordered, max_retransmits, max_packet_life_time) =
                reliability_from_channel_type(
                    dc.config.channel_type,
                    dc.config.reliability_parameter,
                );

            let stream_id = dc.stream_identifier();
            let params = DataChannelParameters {
                label: dc.config.label.clone(),
                protocol: dc.config.protocol.clone(),
                ordered,
                max_packet_life_time,
                max_retransmits,
                negotiated: dc.config.negotiated,
                id: Some(stream_id),
            };

            let channel = Arc::new(DataChannel::new(
                params,
                Arc::clone(&self.setting_engine),
            ));

            {
                let mut data_channels = self.data_channels.lock().await;
                data_channels.push(Arc::clone(&channel));
            }
            {
                let mut ids = self.data_channel_ids.lock().await;
                ids.insert(stream_id);
            }
            self.data_channels_accepted.fetch_add(1, Ordering::SeqCst);

            // The application's on_data_channel returns before the
            // read loop starts, so handlers installed there never miss
            // a message.
            if let Some(handler) = &*self.on_data_channel_handler.load() {
                let mut f = handler.lock().await;
                f(Arc::clone(&channel)).await;
            }

            channel.handle_open(Arc::new(dc)).await;
            self.data_channels_opened.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Closes the association and fires on_close once. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        self.state
            .store(SctpTransportState::Closed as u8, Ordering::SeqCst);
        self.notify_tx.notify_waiters();

        let association = {
            let mut a = self.association.lock().await;
            a.take()
        };
        if let Some(a) = association {
            // The DTLS conn below us may already be gone; that race is
            // expected and not an error worth surfacing.
            if let Err(err) = a.close().await {
                log::warn!("sctp_transport: association close: {err}");
            }
        }

        if !self.on_close_fired.swap(true, Ordering::SeqCst) {
            if let Some(handler) = &*self.on_close_handler.load() {
                let mut f = handler.lock().await;
                f().await;
            }
        }

        Ok(())
    }

    /// Sets the handler invoked, synchronously with the accept loop,
    /// for every remotely opened channel.
    pub fn on_data_channel(&self, f: OnDataChannelHdlrFn) {
        self.on_data_channel_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_error(&self, f: OnErrorHdlrFn) {
        self.on_error_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_close(&self, f: OnCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn state(&self) -> SctpTransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub(crate) async fn association(&self) -> Option<Arc<Association>> {
        let association = self.association.lock().await;
        association.clone()
    }

    /// Reserves the next free stream id for our DTLS role: even ids
    /// for the client, odd for the server (RFC 8832 §6).
    pub(crate) async fn generate_and_set_data_channel_id(
        &self,
        dtls_role: DtlsRole,
    ) -> Result<u16> {
        let mut id: u16 = if dtls_role == DtlsRole::Client { 0 } else { 1 };

        let mut ids = self.data_channel_ids.lock().await;
        while ids.contains(&id) {
            id = match id.checked_add(2) {
                Some(next) => next,
                None => return Err(Error::ErrMaxDataChannels),
            };
        }
        ids.insert(id);

        Ok(id)
    }

    /// Marks an application-chosen id (negotiated channels) as in use.
    pub(crate) async fn reserve_data_channel_id(&self, id: u16) {
        let mut ids = self.data_channel_ids.lock().await;
        ids.insert(id);
    }

    /// Channels that still need their streams dialed once SCTP is up.
    pub(crate) async fn connecting_data_channels(&self) -> Vec<Arc<DataChannel>> {
        let data_channels = self.data_channels.lock().await;
        data_channels
            .iter()
            .filter(|d| d.ready_state() == DataChannelState::Connecting)
            .cloned()
            .collect()
    }
}

/// Inverse of the channel-type mapping: recovers the reliability knobs
/// a remote described through DCEP.
pub(crate) fn reliability_from_channel_type(
    channel_type: ChannelType,
    reliability_parameter: u32,
) -> (bool, Option<u16>, Option<u16>) {
    let param = Some(reliability_parameter as u16);
    match channel_type {
        ChannelType::Reliable => (true, None, None),
        ChannelType::ReliableUnordered => (false, None, None),
        ChannelType::PartialReliableRexmit => (true, param, None),
        ChannelType::PartialReliableRexmitUnordered => (false, param, None),
        ChannelType::PartialReliableTimed => (true, None, param),
        ChannelType::PartialReliableTimedUnordered => (false, None, param),
        #[allow(unreachable_patterns)]
        _ => (true, None, None),
    }
}
