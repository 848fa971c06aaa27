use plotline::agent::AgentConfig;
use plotline::providers::configs::ProviderConfig;

use crate::configuration::Settings;

/// Shared application state. Providers and tool-server connections are
/// created fresh per turn from these settings, never shared across turns.
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
    pub tool_server_url: String,
    pub agent_config: AgentConfig,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            tool_server_url: settings.tools.url.clone(),
            agent_config: settings.agent.into_config(),
            provider_config: settings.provider.into_config(),
        }
    }
}
