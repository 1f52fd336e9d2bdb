pub mod data_channel_init;
pub mod data_channel_message;
pub mod data_channel_parameters;
pub mod data_channel_state;

#[cfg(test)]
mod data_channel_test;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use data::message::message_channel_open::{ChannelType, CHANNEL_PRIORITY_NORMAL};
use sctp::stream::OnBufferedAmountLowFn;
use tokio::sync::{Mutex, Notify};

use crate::api::setting_engine::SettingEngine;
use crate::data_channel::data_channel_message::DataChannelMessage;
use crate::data_channel::data_channel_parameters::DataChannelParameters;
use crate::data_channel::data_channel_state::DataChannelState;
use crate::error::{Error, OnErrorHdlrFn, Result};
use crate::sctp_transport::SctpTransport;

/// Messages above this size are truncated by the built-in read loop;
/// applications needing more detach the channel.
const DATA_CHANNEL_BUFFER_SIZE: usize = 16384;

/// High-water mark a blocking send waits under.
const MAX_BUFFERED_AMOUNT: usize = 1_000_000;

pub type OnMessageHdlrFn = Box<
    dyn (FnMut(DataChannelMessage) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnOpenHdlrFn =
    Box<dyn (FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnCloseHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

pub type OnDialHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// A WebRTC data channel: one SCTP stream with a reliability contract,
/// buffered-amount accounting and event dispatch.
pub struct DataChannel {
    label: String,
    protocol: String,
    ordered: bool,
    max_packet_life_time: Option<u16>,
    max_retransmits: Option<u16>,
    negotiated: bool,

    id: AtomicU16,
    id_populated: AtomicBool,

    ready_state: Arc<AtomicU8>,
    detach_called: Arc<AtomicBool>,
    dialed: AtomicBool,

    buffered_amount_low_threshold: AtomicUsize,

    on_message_handler: Arc<ArcSwapOption<Mutex<OnMessageHdlrFn>>>,
    on_open_handler: ArcSwapOption<Mutex<OnOpenHdlrFn>>,
    on_dial_handler: ArcSwapOption<Mutex<OnDialHdlrFn>>,
    on_close_handler: Arc<ArcSwapOption<Mutex<OnCloseHdlrFn>>>,
    on_error_handler: Arc<ArcSwapOption<Mutex<OnErrorHdlrFn>>>,
    on_buffered_amount_low_handler: Arc<ArcSwapOption<Mutex<OnBufferedAmountLowFn>>>,

    data_channel: Mutex<Option<Arc<data::data_channel::DataChannel>>>,
    write_notify: Arc<Notify>,

    setting_engine: Arc<SettingEngine>,
}

impl DataChannel {
    /// Builds the channel object; networking attaches later through
    /// [`DataChannel::open`] or the SCTP accept loop.
    pub(crate) fn new(params: DataChannelParameters, setting_engine: Arc<SettingEngine>) -> Self {
        let (id, id_populated) = match params.id {
            Some(id) => (id, true),
            None => (0, false),
        };

        DataChannel {
            label: params.label,
            protocol: params.protocol,
            ordered: params.ordered,
            max_packet_life_time: params.max_packet_life_time,
            max_retransmits: params.max_retransmits,
            negotiated: params.negotiated,
            id: AtomicU16::new(id),
            id_populated: AtomicBool::new(id_populated),
            ready_state: Arc::new(AtomicU8::new(DataChannelState::Connecting as u8)),
            detach_called: Arc::new(AtomicBool::new(false)),
            dialed: AtomicBool::new(false),
            buffered_amount_low_threshold: AtomicUsize::new(0),
            on_message_handler: Arc::new(ArcSwapOption::empty()),
            on_open_handler: ArcSwapOption::empty(),
            on_dial_handler: ArcSwapOption::empty(),
            on_close_handler: Arc::new(ArcSwapOption::empty()),
            on_error_handler: Arc::new(ArcSwapOption::empty()),
            on_buffered_amount_low_handler: Arc::new(ArcSwapOption::empty()),
            data_channel: Mutex::new(None),
            write_notify: Arc::new(Notify::new()),
            setting_engine,
        }
    }

    /// Maps the reliability knobs onto a DCEP channel type.
    pub(crate) fn channel_type(&self) -> (ChannelType, u32) {
        match (self.max_retransmits, self.max_packet_life_time) {
            (None, None) => {
                if self.ordered {
                    (ChannelType::Reliable, 0)
                } else {
                    (ChannelType::ReliableUnordered, 0)
                }
            }
            (Some(retransmits), _) => {
                if self.ordered {
                    (ChannelType::PartialReliableRexmit, u32::from(retransmits))
                } else {
                    (
                        ChannelType::PartialReliableRexmitUnordered,
                        u32::from(retransmits),
                    )
                }
            }
            (None, Some(lifetime)) => {
                if self.ordered {
                    (ChannelType::PartialReliableTimed, u32::from(lifetime))
                } else {
                    (
                        ChannelType::PartialReliableTimedUnordered,
                        u32::from(lifetime),
                    )
                }
            }
        }
    }

    /// Dials the SCTP stream for a locally created channel. Assigns the
    /// stream id first when the channel is not pre-negotiated.
    pub(crate) async fn open(&self, sctp_transport: Arc<SctpTransport>) -> Result<()> {
        {
            let data_channel = self.data_channel.lock().await;
            if data_channel.is_some() {
                return Ok(());
            }
        }

        let association = sctp_transport
            .association()
            .await
            .ok_or(Error::ErrSCTPNotEstablished)?;

        if !self.id_populated.load(Ordering::SeqCst) {
            let dtls_role = sctp_transport.transport().role().await;
            let id = sctp_transport.generate_and_set_data_channel_id(dtls_role).await?;
            self.set_id(id);
        }

        let (channel_type, reliability_parameter) = self.channel_type();
        let cfg = data::data_channel::Config {
            channel_type,
            priority: CHANNEL_PRIORITY_NORMAL,
            reliability_parameter,
            label: self.label.clone(),
            protocol: self.protocol.clone(),
            negotiated: self.negotiated,
            max_message_size: 0,
        };

        let dc = data::data_channel::DataChannel::dial(
            &association,
            self.id.load(Ordering::SeqCst),
            cfg,
        )
        .await?;

        // The DCEP OPEN (if any) is on the wire now.
        self.dialed.store(true, Ordering::SeqCst);
        self.do_dial().await;

        self.handle_open(Arc::new(dc)).await;

        Ok(())
    }

    async fn do_dial(&self) {
        if let Some(handler) = &*self.on_dial_handler.load() {
            let mut f = handler.lock().await;
            f().await;
        }
    }

    /// Attaches the underlying stream, transitions to open, fires
    /// on_open and starts the read loop (unless detached).
    pub(crate) async fn handle_open(&self, dc: Arc<data::data_channel::DataChannel>) {
        {
            let mut data_channel = self.data_channel.lock().await;
            *data_channel = Some(Arc::clone(&dc));
        }

        // Route drain notifications through us so that blocked writers
        // wake up alongside the application callback.
        let mut threshold = self.buffered_amount_low_threshold.load(Ordering::SeqCst);
        if self.setting_engine.enable_data_channel_block_write && threshold == 0 {
            threshold = MAX_BUFFERED_AMOUNT / 2;
        }
        dc.set_buffered_amount_low_threshold(threshold);
        {
            let user_handler = Arc::clone(&self.on_buffered_amount_low_handler);
            let write_notify = Arc::clone(&self.write_notify);
            dc.on_buffered_amount_low(Box::new(move || {
                let user_handler = Arc::clone(&user_handler);
                let write_notify = Arc::clone(&write_notify);
                Box::pin(async move {
                    write_notify.notify_waiters();
                    if let Some(handler) = &*user_handler.load() {
                        let mut f = handler.lock().await;
                        f().await;
                    }
                })
            }));
        }

        self.set_ready_state(DataChannelState::Open);

        {
            let on_open_handler = self.on_open_handler.swap(None);
            if let Some(handler) = on_open_handler {
                if let Ok(mutex) = Arc::try_unwrap(handler) {
                    let f = mutex.into_inner();
                    f().await;
                    self.check_detach_after_open();
                }
            }
        }

        if !self.setting_engine.detach.data_channels {
            let ready_state = Arc::clone(&self.ready_state);
            let on_message_handler = Arc::clone(&self.on_message_handler);
            let on_close_handler = Arc::clone(&self.on_close_handler);
            let on_error_handler = Arc::clone(&self.on_error_handler);
            tokio::spawn(async move {
                DataChannel::read_loop(
                    dc,
                    ready_state,
                    on_message_handler,
                    on_close_handler,
                    on_error_handler,
                )
                .await;
            });
        }
    }

    fn check_detach_after_open(&self) {
        if self.setting_engine.detach.data_channels
            && !self.detach_called.load(Ordering::SeqCst)
        {
            log::warn!(
                "data channel detaching is enabled but detach was not called from on_open"
            );
        }
    }

    async fn read_loop(
        data_channel: Arc<data::data_channel::DataChannel>,
        ready_state: Arc<AtomicU8>,
        on_message_handler: Arc<ArcSwapOption<Mutex<OnMessageHdlrFn>>>,
        on_close_handler: Arc<ArcSwapOption<Mutex<OnCloseHdlrFn>>>,
        on_error_handler: Arc<ArcSwapOption<Mutex<OnErrorHdlrFn>>>,
    ) {
        let mut buffer = vec![0u8; DATA_CHANNEL_BUFFER_SIZE];
        loop {
            let (n, is_string) = match data_channel.read_data_channel(&mut buffer).await {
                // Stream reset by the peer.
                Ok((0, false)) => {
                    ready_state.store(DataChannelState::Closed as u8, Ordering::SeqCst);
                    if let Some(handler) = &*on_close_handler.load() {
                        let mut f = handler.lock().await;
                        f().await;
                    }
                    break;
                }
                Ok((n, is_string)) => (n, is_string),
                Err(err) => {
                    ready_state.store(DataChannelState::Closed as u8, Ordering::SeqCst);

                    if data::Error::Sctp(sctp::Error::ErrStreamClosed) != err {
                        if let Some(handler) = &*on_error_handler.load() {
                            let mut f = handler.lock().await;
                            f(err.into()).await;
                        }
                    }

                    if let Some(handler) = &*on_close_handler.load() {
                        let mut f = handler.lock().await;
                        f().await;
                    }
                    break;
                }
            };

            if let Some(handler) = &*on_message_handler.load() {
                let mut f = handler.lock().await;
                f(DataChannelMessage {
                    is_string,
                    data: Bytes::from(buffer[..n].to_vec()),
                })
                .await;
            }
        }
    }

    /// Sets the handler invoked once the transport is established. A
    /// handler installed after the channel opened is not replayed.
    pub fn on_open(&self, f: OnOpenHdlrFn) {
        self.on_open_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler invoked when the DCEP OPEN for this channel has
    /// been written; invoked immediately if that already happened.
    pub async fn on_dial(&self, f: OnDialHdlrFn) {
        self.on_dial_handler.store(Some(Arc::new(Mutex::new(f))));
        if self.dialed.load(Ordering::SeqCst) {
            self.do_dial().await;
        }
    }

    /// Sets the handler invoked when the transport goes away.
    pub fn on_close(&self, f: OnCloseHdlrFn) {
        self.on_close_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler invoked per received message, in receive
    /// order. Messages larger than the internal buffer are truncated;
    /// detach the channel for bigger transfers.
    pub fn on_message(&self, f: OnMessageHdlrFn) {
        self.on_message_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler invoked when the read side fails.
    pub fn on_error(&self, f: OnErrorHdlrFn) {
        self.on_error_handler.store(Some(Arc::new(Mutex::new(f))));
    }

    /// Sets the handler invoked when `buffered_amount` drains below the
    /// configured threshold.
    pub async fn on_buffered_amount_low(&self, f: OnBufferedAmountLowFn) {
        self.on_buffered_amount_low_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// Waits until a blocking send may proceed.
    async fn ready_to_send(&self) -> Result<()> {
        if !self.setting_engine.enable_data_channel_block_write {
            return Ok(());
        }

        while self.buffered_amount().await > MAX_BUFFERED_AMOUNT {
            let notified = self.write_notify.notified();
            if self.buffered_amount().await <= MAX_BUFFERED_AMOUNT {
                break;
            }
            notified.await;
            if self.ready_state() != DataChannelState::Open {
                return Err(Error::ErrDataChannelNotOpen);
            }
        }

        Ok(())
    }

    /// Sends a binary message. Empty payloads survive the trip as
    /// empty payloads (the wire carries a placeholder octet with an
    /// "empty" PPID).
    pub async fn send(&self, data: &Bytes) -> Result<usize> {
        self.ensure_open()?;
        self.ready_to_send().await?;

        let data_channel = self.data_channel.lock().await;
        match &*data_channel {
            Some(dc) => Ok(dc.write_data_channel(data, false).await?),
            None => Err(Error::ErrDataChannelNotOpen),
        }
    }

    /// Sends a UTF-8 string message.
    pub async fn send_text(&self, s: impl Into<String>) -> Result<usize> {
        self.ensure_open()?;
        self.ready_to_send().await?;

        let data_channel = self.data_channel.lock().await;
        match &*data_channel {
            Some(dc) => Ok(dc.write_data_channel(&Bytes::from(s.into()), true).await?),
            None => Err(Error::ErrDataChannelNotOpen),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.ready_state() != DataChannelState::Open {
            Err(Error::ErrDataChannelNotOpen)
        } else {
            Ok(())
        }
    }

    /// Hands out the raw stream and silences the built-in dispatch.
    /// Requires `SettingEngine::detach_data_channels` and must be
    /// called from within on_open.
    pub async fn detach(&self) -> Result<Arc<data::data_channel::DataChannel>> {
        if !self.setting_engine.detach.data_channels {
            return Err(Error::ErrDetachNotEnabled);
        }

        let data_channel = self.data_channel.lock().await;
        match &*data_channel {
            Some(dc) => {
                self.detach_called.store(true, Ordering::SeqCst);
                Ok(Arc::clone(dc))
            }
            None => Err(Error::ErrDetachBeforeOpened),
        }
    }

    /// Closes the channel from either side. Safe to call repeatedly.
    pub async fn close(&self) -> Result<()> {
        if self.ready_state() == DataChannelState::Closed {
            return Ok(());
        }

        self.set_ready_state(DataChannelState::Closing);
        self.write_notify.notify_waiters();

        let data_channel = {
            let data_channel = self.data_channel.lock().await;
            data_channel.clone()
        };
        match data_channel {
            // The read loop observes the reset and fires on_close.
            Some(dc) => Ok(dc.close().await?),
            None => {
                self.set_ready_state(DataChannelState::Closed);
                Ok(())
            }
        }
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    /// Retransmission time bound (ms) in unreliable mode, if any.
    pub fn max_packet_lifetime(&self) -> Option<u16> {
        self.max_packet_life_time
    }

    /// Retransmission count bound in unreliable mode, if any.
    pub fn max_retransmits(&self) -> Option<u16> {
        self.max_retransmits
    }

    pub fn protocol(&self) -> &str {
        self.protocol.as_str()
    }

    pub fn negotiated(&self) -> bool {
        self.negotiated
    }

    /// The stream id, `None` until assignment. Once set it never
    /// changes.
    pub fn id(&self) -> Option<u16> {
        if self.id_populated.load(Ordering::SeqCst) {
            Some(self.id.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    pub(crate) async fn inner_data_channel(&self) -> Option<Arc<data::data_channel::DataChannel>> {
        let data_channel = self.data_channel.lock().await;
        data_channel.clone()
    }

    pub(crate) fn set_id(&self, id: u16) {
        self.id.store(id, Ordering::SeqCst);
        self.id_populated.store(true, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> DataChannelState {
        self.ready_state.load(Ordering::SeqCst).into()
    }

    pub(crate) fn set_ready_state(&self, s: DataChannelState) {
        self.ready_state.store(s as u8, Ordering::SeqCst);
    }

    /// Bytes queued by `send` and not yet handed to the transport.
    /// Grows on send, shrinks only as SCTP reports drain.
    pub async fn buffered_amount(&self) -> usize {
        let data_channel = self.data_channel.lock().await;
        match &*data_channel {
            Some(dc) => dc.buffered_amount(),
            None => 0,
        }
    }

    pub async fn buffered_amount_low_threshold(&self) -> usize {
        let data_channel = self.data_channel.lock().await;
        match &*data_channel {
            Some(dc) => dc.buffered_amount_low_threshold(),
            None => self.buffered_amount_low_threshold.load(Ordering::SeqCst),
        }
    }

    /// Updates the threshold below which `on_buffered_amount_low`
    /// fires; applies immediately when the transport exists.
    pub async fn set_buffered_amount_low_threshold(&self, threshold: usize) {
        self.buffered_amount_low_threshold
            .store(threshold, Ordering::SeqCst);
        let data_channel = self.data_channel.lock().await;
        if let Some(dc) = &*data_channel {
            dc.set_buffered_amount_low_threshold(threshold);
        }
    }
}
