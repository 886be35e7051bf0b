//! Submission encoding
//!
//! Pure translation of an internal job description into a backend-ready
//! payload: sanitized job name, merged environment, rounded resources, and,
//! when a bundled user payload has to travel with the job, the command
//! wrapped in the contained-executor launcher with a base64 job document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use weft_core::JobDescription;

use crate::admission::RoundedResources;
use crate::backend::{SubmissionPayload, TemplateHandle};
use crate::config::AdapterConfig;
use crate::error::{BatchError, Result};

/// Backends cap job names at this length.
pub const MAX_NAME_LEN: usize = 128;

/// First argv token of a job that carries a bundled payload; the remote
/// worker recognizes it and reconstitutes the job document.
pub const LAUNCHER_TOKEN: &str = "_weft_contained_executor";

/// Job document shipped to the contained executor.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContainedJob {
    pub command: Vec<String>,
    /// Serialized user code the worker must install before running.
    pub user_script: String,
}

/// Makes a free-form label safe as a backend job name.
///
/// The first character must be alphanumeric; the rest may add hyphens and
/// underscores, up to [`MAX_NAME_LEN`] characters. Spaces become hyphens for
/// readability, everything else unacceptable is dropped, and a `j` is
/// prepended when stripping leaves nothing usable in front.
pub fn sanitize_name(input: &str) -> String {
    let replaced = input.replace(' ', "-");
    let mut kept: Vec<char> = replaced
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if kept.first().is_none_or(|c| !c.is_ascii_alphanumeric()) {
        kept.insert(0, 'j');
    }
    kept.truncate(MAX_NAME_LEN);
    kept.into_iter().collect()
}

/// Encodes one admitted job into a submission payload.
///
/// Pure except for a debug log when the name needed sanitizing.
pub fn encode(
    desc: &JobDescription,
    resources: RoundedResources,
    template: TemplateHandle,
    user_script: Option<&str>,
    config: &AdapterConfig,
) -> Result<SubmissionPayload> {
    let name = sanitize_name(&desc.name);
    if name != desc.name {
        debug!("sanitized job name {:?} to {:?}", desc.name, name);
    }

    let command = match user_script {
        Some(script) => {
            let document = ContainedJob {
                command: desc.command.clone(),
                user_script: script.to_string(),
            };
            let encoded = serde_json::to_vec(&document)
                .map_err(|e| BatchError::Parse(format!("encoding job document: {e}")))?;
            vec![LAUNCHER_TOKEN.to_string(), BASE64.encode(encoded)]
        }
        None => desc.command.clone(),
    };

    let mut environment = config.default_env.clone();
    environment.extend(
        desc.environment
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );

    let mut tags = HashMap::new();
    if let Some(owner) = &config.owner_tag {
        tags.insert("Owner".to_string(), owner.clone());
    }
    if let Some(region) = &config.region {
        tags.insert("Region".to_string(), region.clone());
    }

    Ok(SubmissionPayload {
        name,
        queue: config.queue.clone(),
        template,
        command,
        environment,
        resources: resources.into(),
        tags,
    })
}
