use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("candidate profile not found at {0}")]
    Missing(String),

    #[error("candidate profile at {path} could not be read: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("candidate profile at {path} is not valid JSON: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The candidate's background and goals, handed to the expensive reviewer
/// as context. Unknown fields are kept and forwarded verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub desired_role: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CandidateProfile {
    /// Loads the profile from a JSON file. Absence is a configuration error.
    pub async fn load(path: &Path) -> Result<Self, ProfileError> {
        let display = path.display().to_string();
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProfileError::Missing(display));
            }
            Err(source) => {
                return Err(ProfileError::Io {
                    path: display,
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ProfileError::Invalid {
            path: display,
            source,
        })
    }
}
