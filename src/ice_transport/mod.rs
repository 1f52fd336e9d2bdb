pub mod ice_candidate;
pub mod ice_candidate_pair;
pub mod ice_candidate_type;
pub mod ice_connection_state;
pub mod ice_credential_type;
pub mod ice_gatherer;
pub mod ice_gatherer_state;
pub mod ice_gathering_state;
pub mod ice_parameters;
pub mod ice_protocol;
pub mod ice_role;
pub mod ice_server;
pub mod ice_transport_state;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ice::candidate::Candidate;
use ice::state::ConnectionState;
use tokio::sync::{mpsc, Mutex};
use util::Conn;

use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::IceCandidate;
use crate::ice_transport::ice_candidate_pair::IceCandidatePair;
use crate::ice_transport::ice_gatherer::IceGatherer;
use crate::ice_transport::ice_parameters::IceParameters;
use crate::ice_transport::ice_role::IceRole;
use crate::ice_transport::ice_transport_state::IceTransportState;
use crate::mux::endpoint::Endpoint;
use crate::mux::mux_func::MatchFunc;
use crate::mux::{Config, Mux};
use crate::RECEIVE_MTU;

#[cfg(test)]
mod ice_transport_test;

pub type OnConnectionStateChangeHdlrFn = Box<
    dyn (FnMut(IceTransportState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnSelectedCandidatePairChangeHdlrFn = Box<
    dyn (FnMut(IceCandidatePair) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

#[derive(Default)]
struct IceTransportInternal {
    role: IceRole,
    conn: Option<Arc<dyn Conn + Send + Sync>>,
    mux: Option<Mux>,
    cancel_tx: Option<mpsc::Sender<()>>,
}

/// IceTransport drives connectivity checks over the gatherer's agent
/// and, once a pair is nominated, owns the packet connection everything
/// above it is muxed onto.
pub struct IceTransport {
    gatherer: Arc<IceGatherer>,
    on_connection_state_change_handler: Arc<ArcSwapOption<Mutex<OnConnectionStateChangeHdlrFn>>>,
    on_selected_candidate_pair_change_handler:
        Arc<ArcSwapOption<Mutex<OnSelectedCandidatePairChangeHdlrFn>>>,
    state: Arc<AtomicU8>,
    internal: Mutex<IceTransportInternal>,
}

impl IceTransport {
    pub(crate) fn new(gatherer: Arc<IceGatherer>) -> Self {
        IceTransport {
            state: Arc::new(AtomicU8::new(IceTransportState::New as u8)),
            gatherer,
            on_connection_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_selected_candidate_pair_change_handler: Arc::new(ArcSwapOption::empty()),
            internal: Mutex::new(IceTransportInternal::default()),
        }
    }

    /// The nominated pair, if checks have succeeded.
    pub async fn get_selected_candidate_pair(&self) -> Option<IceCandidatePair> {
        let agent = self.gatherer.get_agent().await?;
        let ice_pair = agent.get_selected_candidate_pair()?;

        let local: Arc<dyn Candidate + Send + Sync> = Arc::clone(&ice_pair.local);
        let remote: Arc<dyn Candidate + Send + Sync> = Arc::clone(&ice_pair.remote);
        Some(IceCandidatePair::new(
            IceCandidate::from(&local),
            IceCandidate::from(&remote),
        ))
    }

    /// Starts connectivity checks against the remote credentials. The
    /// role defaults to controlled. One-shot.
    pub async fn start(&self, params: &IceParameters, role: Option<IceRole>) -> Result<()> {
        if self.state() != IceTransportState::New {
            return Err(Error::ErrICETransportNotInNew);
        }

        self.ensure_gatherer().await?;

        let agent = match self.gatherer.get_agent().await {
            Some(agent) => agent,
            None => return Err(Error::ErrICEAgentNotExist),
        };

        {
            let state = Arc::clone(&self.state);
            let handler = Arc::clone(&self.on_connection_state_change_handler);
            agent.on_connection_state_change(Box::new(move |ice_state: ConnectionState| {
                let s = IceTransportState::from(ice_state);
                state.store(s as u8, Ordering::SeqCst);

                let handler_clone = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(handler) = &*handler_clone.load() {
                        let mut f = handler.lock().await;
                        f(s).await;
                    }
                })
            }));
        }

        {
            let handler = Arc::clone(&self.on_selected_candidate_pair_change_handler);
            agent.on_selected_candidate_pair_change(Box::new(
                move |local: &Arc<dyn Candidate + Send + Sync>,
                      remote: &Arc<dyn Candidate + Send + Sync>| {
                    let pair = IceCandidatePair::new(local.into(), remote.into());
                    let handler_clone = Arc::clone(&handler);
                    Box::pin(async move {
                        if let Some(handler) = &*handler_clone.load() {
                            let mut f = handler.lock().await;
                            f(pair).await;
                        }
                    })
                },
            ));
        }

        let role = role.unwrap_or(IceRole::Controlled);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);

        let conn: Arc<dyn Conn + Send + Sync> = match role {
            IceRole::Controlling => {
                agent
                    .dial(
                        cancel_rx,
                        params.username_fragment.clone(),
                        params.password.clone(),
                    )
                    .await?
            }
            IceRole::Controlled => {
                agent
                    .accept(
                        cancel_rx,
                        params.username_fragment.clone(),
                        params.password.clone(),
                    )
                    .await?
            }
            IceRole::Unspecified => return Err(Error::ErrICERoleUnknown),
        };

        let config = Config {
            conn: Arc::clone(&conn),
            buffer_size: RECEIVE_MTU,
        };

        {
            let mut internal = self.internal.lock().await;
            internal.role = role;
            internal.cancel_tx = Some(cancel_tx);
            internal.conn = Some(conn);
            internal.mux = Some(Mux::new(config));
        }

        Ok(())
    }

    /// Restarts ICE with fresh local credentials; happens under a
    /// renegotiation, never exposed directly.
    pub(crate) async fn restart(&self) -> Result<()> {
        if let Some(agent) = self.gatherer.get_agent().await {
            agent
                .restart(
                    self.gatherer
                        .setting_engine
                        .candidates
                        .username_fragment
                        .clone(),
                    self.gatherer.setting_engine.candidates.password.clone(),
                )
                .await?;
        } else {
            return Err(Error::ErrICEAgentNotExist);
        }
        self.gatherer.gather().await
    }

    /// Irreversibly stops the transport: tears down the mux, cancels
    /// any in-flight dial/accept and closes the gatherer. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        self.set_state(IceTransportState::Closed);

        {
            let mut internal = self.internal.lock().await;
            internal.cancel_tx.take();
            if let Some(mut mux) = internal.mux.take() {
                mux.close().await;
            }
        }

        self.gatherer.close().await
    }

    pub fn on_selected_candidate_pair_change(&self, f: OnSelectedCandidatePairChangeHdlrFn) {
        self.on_selected_candidate_pair_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_connection_state_change(&self, f: OnConnectionStateChangeHdlrFn) {
        self.on_connection_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    /// The role the transport took when it started.
    pub async fn role(&self) -> IceRole {
        let internal = self.internal.lock().await;
        internal.role
    }

    /// Batch variant of `add_remote_candidate`.
    pub async fn set_remote_candidates(&self, remote_candidates: &[IceCandidate]) -> Result<()> {
        self.ensure_gatherer().await?;

        if let Some(agent) = self.gatherer.get_agent().await {
            for rc in remote_candidates {
                let c: Arc<dyn Candidate + Send + Sync> = Arc::new(rc.to_ice()?);
                agent.add_remote_candidate(&c)?;
            }
            Ok(())
        } else {
            Err(Error::ErrICEAgentNotExist)
        }
    }

    /// Adds one trickled candidate; callable before or after start.
    pub async fn add_remote_candidate(&self, remote_candidate: Option<IceCandidate>) -> Result<()> {
        self.ensure_gatherer().await?;

        if let Some(agent) = self.gatherer.get_agent().await {
            if let Some(r) = remote_candidate {
                let c: Arc<dyn Candidate + Send + Sync> = Arc::new(r.to_ice()?);
                agent.add_remote_candidate(&c)?;
            }
            Ok(())
        } else {
            Err(Error::ErrICEAgentNotExist)
        }
    }

    pub fn state(&self) -> IceTransportState {
        IceTransportState::from(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, s: IceTransportState) {
        self.state.store(s as u8, Ordering::SeqCst)
    }

    /// Mounts a new endpoint on the mux; only possible after start.
    pub(crate) async fn new_endpoint(&self, f: MatchFunc) -> Option<Arc<Endpoint>> {
        let internal = self.internal.lock().await;
        if let Some(mux) = &internal.mux {
            Some(mux.new_endpoint(f).await)
        } else {
            None
        }
    }

    pub(crate) async fn ensure_gatherer(&self) -> Result<()> {
        if self.gatherer.get_agent().await.is_none() {
            self.gatherer.create_agent().await
        } else {
            Ok(())
        }
    }

    pub(crate) async fn have_remote_credentials_change(
        &self,
        new_ufrag: &str,
        new_pwd: &str,
    ) -> bool {
        if let Some(agent) = self.gatherer.get_agent().await {
            let (ufrag, pwd) = agent.get_remote_user_credentials().await;
            ufrag != new_ufrag || pwd != new_pwd
        } else {
            false
        }
    }

    pub(crate) async fn set_remote_credentials(
        &self,
        new_ufrag: String,
        new_pwd: String,
    ) -> Result<()> {
        if let Some(agent) = self.gatherer.get_agent().await {
            Ok(agent.set_remote_credentials(new_ufrag, new_pwd).await?)
        } else {
            Err(Error::ErrICEAgentNotExist)
        }
    }
}
