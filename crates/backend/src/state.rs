use std::sync::Arc;

use crate::{
    auth::JwtService,
    config::BackendConfig,
    gateway::Gateway,
    notifier::AssignmentNotifier,
    realtime::RealtimeHub,
    services::{
        BusinessService, ConversationService, CustomerService, MessageService, TeamService,
        UserService,
    },
};

#[derive(Clone)]
pub struct AppState {
    gateway: Gateway,
    config: Arc<BackendConfig>,
    jwt: Arc<JwtService>,
    hub: Arc<RealtimeHub>,
    notifier: AssignmentNotifier,
}

impl AppState {
    pub fn new(gateway: Gateway, config: BackendConfig, jwt: Arc<JwtService>) -> Self {
        let notifier = AssignmentNotifier::new(gateway.clone());
        Self {
            gateway,
            config: Arc::new(config),
            jwt,
            hub: Arc::new(RealtimeHub::new()),
            notifier,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn jwt(&self) -> Arc<JwtService> {
        Arc::clone(&self.jwt)
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub fn notifier(&self) -> &AssignmentNotifier {
        &self.notifier
    }

    pub fn users(&self) -> UserService<'_> {
        UserService::new(&self.gateway)
    }

    pub fn businesses(&self) -> BusinessService<'_> {
        BusinessService::new(&self.gateway)
    }

    pub fn team(&self) -> TeamService<'_> {
        TeamService::new(&self.gateway)
    }

    pub fn customers(&self) -> CustomerService<'_> {
        CustomerService::new(&self.gateway)
    }

    pub fn conversations(&self) -> ConversationService<'_> {
        ConversationService::new(&self.gateway, self.hub.as_ref(), &self.notifier)
    }

    pub fn messages(&self) -> MessageService<'_> {
        MessageService::new(&self.gateway, self.hub.as_ref())
    }
}
