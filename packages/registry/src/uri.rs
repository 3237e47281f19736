//! `models:/` and `runs:/` URIs.

use std::fmt;
use std::str::FromStr;

use crate::{ModelStage, RegistryError};

/// Which version of a registered model a URI points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelReference {
    /// Newest version in a stage.
    Stage(ModelStage),
    /// A fixed version number.
    Version(u64),
    /// Newest version regardless of stage.
    Latest,
}

/// A parsed model URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    /// `models:/<name>/<stage|version|latest>`
    Registered {
        /// Registered model name.
        name: String,
        /// Version selector.
        reference: ModelReference,
    },
    /// `runs:/<run_id>/<artifact path>`
    Run {
        /// Run id.
        run_id: String,
        /// Artifact path inside the run.
        path: String,
    },
}

impl FromStr for ModelUri {
    type Err = RegistryError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RegistryError::InvalidModelUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = uri.strip_prefix("models:/") {
            let (name, selector) = rest
                .trim_end_matches('/')
                .split_once('/')
                .ok_or_else(|| invalid("expected models:/<name>/<stage or version>"))?;
            if name.is_empty() || selector.is_empty() || selector.contains('/') {
                return Err(invalid("expected models:/<name>/<stage or version>"));
            }

            let reference = if selector.eq_ignore_ascii_case("latest") {
                ModelReference::Latest
            } else if let Ok(version) = selector.parse::<u64>() {
                ModelReference::Version(version)
            } else {
                ModelReference::Stage(
                    selector
                        .parse()
                        .map_err(|_| invalid("unknown stage"))?,
                )
            };

            return Ok(Self::Registered {
                name: name.to_string(),
                reference,
            });
        }

        if let Some(rest) = uri.strip_prefix("runs:/") {
            let (run_id, path) = rest
                .split_once('/')
                .ok_or_else(|| invalid("expected runs:/<run_id>/<path>"))?;
            let path = path.trim_matches('/');
            if run_id.is_empty() || path.is_empty() {
                return Err(invalid("expected runs:/<run_id>/<path>"));
            }
            return Ok(Self::Run {
                run_id: run_id.to_string(),
                path: path.to_string(),
            });
        }

        Err(invalid("unsupported scheme"))
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered { name, reference } => match reference {
                ModelReference::Stage(stage) => write!(f, "models:/{name}/{stage}"),
                ModelReference::Version(v) => write!(f, "models:/{name}/{v}"),
                ModelReference::Latest => write!(f, "models:/{name}/latest"),
            },
            Self::Run { run_id, path } => write!(f, "runs:/{run_id}/{path}"),
        }
    }
}
