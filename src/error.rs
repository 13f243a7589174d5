// ABOUTME: Application-wide error type for strata.
// ABOUTME: Wraps every component error so the CLI can report and classify them in one place.

use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::plugin::PluginError;
use crate::provision::{ProvisionError, ProvisionErrorKind};
use crate::render::RenderError;
use crate::rollout::RolloutError;
use crate::types::{StackNameError, TargetsError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Targets(#[from] TargetsError),

    #[error(transparent)]
    StackName(#[from] StackNameError),
}

impl Error {
    /// True for mistakes in user input rather than failures of the tool or remote services.
    pub fn is_user_error(&self) -> bool {
        match self {
            Error::Config(_) | Error::Plugin(_) | Error::Rollout(_) | Error::Targets(_) => true,
            Error::StackName(_) => true,
            Error::Provision(e) => e.kind() == ProvisionErrorKind::Config,
            Error::Render(_) | Error::Asset(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
