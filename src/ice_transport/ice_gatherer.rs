use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ice::agent::agent_config::AgentConfig;
use ice::agent::Agent;
use ice::candidate::{Candidate, CandidateType};
use ice::url::Url;
use tokio::sync::Mutex;

use crate::api::setting_engine::SettingEngine;
use crate::error::{Error, Result};
use crate::ice_transport::ice_candidate::{ice_candidates_from_agent, IceCandidate};
use crate::ice_transport::ice_candidate_type::IceCandidateType;
use crate::ice_transport::ice_gatherer_state::IceGathererState;
use crate::ice_transport::ice_parameters::IceParameters;
use crate::ice_transport::ice_server::IceServer;
use crate::peer_connection::policy::ice_transport_policy::IceTransportPolicy;

pub type OnLocalCandidateHdlrFn = Box<
    dyn (FnMut(Option<IceCandidate>) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnIceGathererStateChangeHdlrFn = Box<
    dyn (FnMut(IceGathererState) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>)
        + Send
        + Sync,
>;

pub type OnGatheringCompleteHdlrFn =
    Box<dyn (FnMut() -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>) + Send + Sync>;

/// Options consumed when an Api builds a gatherer.
#[derive(Default, Debug, Clone)]
pub struct IceGatherOptions {
    pub ice_servers: Vec<IceServer>,
    pub ice_gather_policy: IceTransportPolicy,
}

/// IceGatherer wraps the agent's candidate-harvesting half: it owns the
/// agent, reports candidates through callbacks as they trickle in, and
/// hands the agent to the IceTransport when connectivity checks start.
pub struct IceGatherer {
    pub(crate) validated_servers: Vec<Url>,
    pub(crate) gather_policy: IceTransportPolicy,
    pub(crate) setting_engine: Arc<SettingEngine>,

    pub(crate) state: Arc<AtomicU8>,
    pub(crate) agent: Mutex<Option<Arc<Agent>>>,

    pub(crate) on_local_candidate_handler: Arc<ArcSwapOption<Mutex<OnLocalCandidateHdlrFn>>>,
    pub(crate) on_state_change_handler: Arc<ArcSwapOption<Mutex<OnIceGathererStateChangeHdlrFn>>>,
    pub(crate) on_gathering_complete_handler: Arc<ArcSwapOption<Mutex<OnGatheringCompleteHdlrFn>>>,
}

impl Default for IceGatherer {
    fn default() -> Self {
        IceGatherer {
            validated_servers: vec![],
            gather_policy: IceTransportPolicy::All,
            setting_engine: Arc::new(SettingEngine::default()),
            state: Arc::new(AtomicU8::new(IceGathererState::New as u8)),
            agent: Mutex::new(None),
            on_local_candidate_handler: Arc::new(ArcSwapOption::empty()),
            on_state_change_handler: Arc::new(ArcSwapOption::empty()),
            on_gathering_complete_handler: Arc::new(ArcSwapOption::empty()),
        }
    }
}

impl IceGatherer {
    pub(crate) fn new(
        validated_servers: Vec<Url>,
        gather_policy: IceTransportPolicy,
        setting_engine: Arc<SettingEngine>,
    ) -> Self {
        IceGatherer {
            validated_servers,
            gather_policy,
            setting_engine,
            ..Default::default()
        }
    }

    /// Builds the agent lazily; a no-op once one exists or after close.
    pub(crate) async fn create_agent(&self) -> Result<()> {
        {
            let agent = self.agent.lock().await;
            if agent.is_some() || self.state() != IceGathererState::New {
                return Ok(());
            }
        }

        let mut candidate_types = vec![];
        if self.setting_engine.candidates.ice_lite {
            candidate_types.push(CandidateType::Host);
        } else if self.gather_policy == IceTransportPolicy::Relay {
            candidate_types.push(CandidateType::Relay);
        }

        let nat_1to1_candidate_type = match self.setting_engine.candidates.nat_1to1_ip_candidate_type
        {
            IceCandidateType::Host => CandidateType::Host,
            IceCandidateType::Srflx => CandidateType::ServerReflexive,
            _ => CandidateType::Unspecified,
        };

        let config = AgentConfig {
            udp_network: self.setting_engine.udp_network.clone(),
            lite: self.setting_engine.candidates.ice_lite,
            urls: self.validated_servers.clone(),
            disconnected_timeout: self.setting_engine.timeout.ice_disconnected_timeout,
            failed_timeout: self.setting_engine.timeout.ice_failed_timeout,
            keepalive_interval: self.setting_engine.timeout.ice_keepalive_interval,
            host_acceptance_min_wait: self.setting_engine.timeout.ice_host_acceptance_min_wait,
            srflx_acceptance_min_wait: self.setting_engine.timeout.ice_srflx_acceptance_min_wait,
            prflx_acceptance_min_wait: self.setting_engine.timeout.ice_prflx_acceptance_min_wait,
            relay_acceptance_min_wait: self.setting_engine.timeout.ice_relay_acceptance_min_wait,
            interface_filter: self.setting_engine.candidates.interface_filter.clone(),
            candidate_types,
            nat_1to1_ips: self.setting_engine.candidates.nat_1to1_ips.clone(),
            nat_1to1_ip_candidate_type: nat_1to1_candidate_type,
            network_types: self.setting_engine.candidates.ice_network_types.clone(),
            multicast_dns_mode: self.setting_engine.candidates.multicast_dns_mode,
            multicast_dns_host_name: self
                .setting_engine
                .candidates
                .multicast_dns_host_name
                .clone(),
            local_ufrag: self.setting_engine.candidates.username_fragment.clone(),
            local_pwd: self.setting_engine.candidates.password.clone(),
            net: self.setting_engine.vnet.clone(),
            ..Default::default()
        };

        let agent = Agent::new(config).await?;

        {
            let mut self_agent = self.agent.lock().await;
            *self_agent = Some(Arc::new(agent));
        }

        Ok(())
    }

    /// Starts harvesting candidates; they surface through
    /// `on_local_candidate` and `None` marks the end of the trickle.
    pub async fn gather(&self) -> Result<()> {
        self.create_agent().await?;
        self.set_state(IceGathererState::Gathering).await;

        if let Some(agent) = self.get_agent().await {
            let state = Arc::clone(&self.state);
            let on_local_candidate_handler = Arc::clone(&self.on_local_candidate_handler);
            let on_state_change_handler = Arc::clone(&self.on_state_change_handler);
            let on_gathering_complete_handler = Arc::clone(&self.on_gathering_complete_handler);

            agent.on_candidate(Box::new(
                move |candidate: Option<Arc<dyn Candidate + Send + Sync>>| {
                    let state_clone = Arc::clone(&state);
                    let on_local_candidate_handler_clone = Arc::clone(&on_local_candidate_handler);
                    let on_state_change_handler_clone = Arc::clone(&on_state_change_handler);
                    let on_gathering_complete_handler_clone =
                        Arc::clone(&on_gathering_complete_handler);

                    Box::pin(async move {
                        if let Some(candidate) = candidate {
                            let c = IceCandidate::from(&candidate);
                            if let Some(handler) = &*on_local_candidate_handler_clone.load() {
                                let mut f = handler.lock().await;
                                f(Some(c)).await;
                            }
                            return;
                        }

                        // A nil candidate ends gathering.
                        state_clone.store(IceGathererState::Complete as u8, Ordering::SeqCst);

                        if let Some(handler) = &*on_state_change_handler_clone.load() {
                            let mut f = handler.lock().await;
                            f(IceGathererState::Complete).await;
                        }
                        if let Some(handler) = &*on_gathering_complete_handler_clone.load() {
                            let mut f = handler.lock().await;
                            f().await;
                        }
                        if let Some(handler) = &*on_local_candidate_handler_clone.load() {
                            let mut f = handler.lock().await;
                            f(None).await;
                        }
                    })
                },
            ));

            agent.gather_candidates()?;
        }

        Ok(())
    }

    /// Shuts the agent down. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.set_state(IceGathererState::Closed).await;

        let agent = {
            let mut agent_opt = self.agent.lock().await;
            agent_opt.take()
        };

        if let Some(agent) = agent {
            agent.close().await?;
        }

        Ok(())
    }

    /// The local ufrag/pwd the agent will answer connectivity checks
    /// with.
    pub async fn get_local_parameters(&self) -> Result<IceParameters> {
        self.create_agent().await?;

        let (ufrag, pwd) = if let Some(agent) = self.get_agent().await {
            agent.get_local_user_credentials().await
        } else {
            return Err(Error::ErrICEAgentNotExist);
        };

        Ok(IceParameters {
            username_fragment: ufrag,
            password: pwd,
            ice_lite: self.setting_engine.candidates.ice_lite,
        })
    }

    /// Snapshot of the candidates gathered so far.
    pub async fn get_local_candidates(&self) -> Result<Vec<IceCandidate>> {
        self.create_agent().await?;

        if let Some(agent) = self.get_agent().await {
            let candidates = agent.get_local_candidates().await?;
            Ok(ice_candidates_from_agent(&candidates))
        } else {
            Err(Error::ErrICEAgentNotExist)
        }
    }

    pub fn on_local_candidate(&self, f: OnLocalCandidateHdlrFn) {
        self.on_local_candidate_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_state_change(&self, f: OnIceGathererStateChangeHdlrFn) {
        self.on_state_change_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn on_gathering_complete(&self, f: OnGatheringCompleteHdlrFn) {
        self.on_gathering_complete_handler
            .store(Some(Arc::new(Mutex::new(f))));
    }

    pub fn state(&self) -> IceGathererState {
        self.state.load(Ordering::SeqCst).into()
    }

    async fn set_state(&self, s: IceGathererState) {
        self.state.store(s as u8, Ordering::SeqCst);

        if let Some(handler) = &*self.on_state_change_handler.load() {
            let mut f = handler.lock().await;
            f(s).await;
        }
    }

    pub(crate) async fn get_agent(&self) -> Option<Arc<Agent>> {
        let agent = self.agent.lock().await;
        agent.clone()
    }
}
