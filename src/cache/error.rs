use thiserror::Error;

use super::keys::ResourceType;
use crate::application::repos::RepoError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalidation secret rejected")]
    Unauthorized,
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("upstream fetch failed")]
    UpstreamFetchFailure(#[from] RepoError),
}

impl CacheError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn unknown_type(value: Option<&str>) -> Self {
        match value {
            Some(value) => Self::invalid_argument(format!(
                "type `{value}` is not one of {}",
                accepted_types()
            )),
            None => Self::invalid_argument(format!(
                "type is required; expected one of {}",
                accepted_types()
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("regeneration request failed: {0}")]
    Transport(String),
    #[error("regeneration endpoint answered {status}")]
    Status { status: u16 },
}

fn accepted_types() -> String {
    ResourceType::ALL
        .iter()
        .map(ResourceType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
