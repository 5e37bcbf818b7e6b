//! Command implementations

pub mod job;
pub mod restart;
pub mod service;

use std::sync::Arc;

use appctl_core::Timeouts;
use tracing::debug;

use crate::client::ControlPlaneClient;
use crate::error::{AppCtlError, Result};

/// Settings shared by every command invocation
#[derive(Debug, Clone)]
pub struct CommandContext {
    api_url: Option<String>,
    token: Option<String>,
    pub timeouts: Timeouts,
}

impl CommandContext {
    pub fn new(api_url: Option<String>, token: Option<String>, timeouts: Timeouts) -> Self {
        Self {
            api_url,
            token,
            timeouts,
        }
    }

    /// Build an API client; fails when no endpoint is configured
    pub fn client(&self) -> Result<Arc<ControlPlaneClient>> {
        let api_url = self
            .api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(AppCtlError::MissingEndpoint)?;
        debug!("Connecting to {}", api_url);

        let client = ControlPlaneClient::new(api_url, self.token.clone())?
            .with_polling_interval(self.timeouts.polling_interval);
        Ok(Arc::new(client))
    }
}
