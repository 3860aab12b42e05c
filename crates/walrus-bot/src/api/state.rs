//! Shared handler state.

use std::sync::Arc;

use election::ElectionController;

use crate::commands::CommandDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ElectionController>,
    pub commands: Arc<CommandDispatcher>,
    /// Bearer token expected on authenticated routes.
    pub api_token: Arc<str>,
}

impl AppState {
    pub fn new(
        controller: Arc<ElectionController>,
        commands: Arc<CommandDispatcher>,
        api_token: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            controller,
            commands,
            api_token: api_token.into(),
        }
    }
}
