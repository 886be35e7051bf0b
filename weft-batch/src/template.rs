//! Shared template lifecycle
//!
//! One backend-side execution template (image, mounts, placeholder
//! resources) is shared by every job in a workflow run. It is created
//! lazily on first use and torn down at shutdown. Creation is serialized so
//! concurrent first submissions cannot race two templates into existence.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admission::{admit, RoundedResources};
use crate::backend::{BatchBackend, TemplateHandle, TemplateSpec};
use crate::config::AdapterConfig;
use crate::error::{BatchError, Result};
use crate::retry::RetryPolicy;

enum State {
    Absent,
    Present(TemplateHandle),
    Destroyed,
}

/// Lazily created, exactly-once template for the current workflow run.
pub struct TemplateCache {
    spec: TemplateSpec,
    state: Mutex<State>,
}

impl TemplateCache {
    /// Prepares the cache. Nothing is created remotely until the first
    /// [`TemplateCache::get_or_create`].
    pub fn new(config: &AdapterConfig) -> Result<Self> {
        // Placeholder resources must be admissible too; per-job values
        // always override them at submission time.
        let defaults: RoundedResources = admit(&config.default_resources, &config.limits)?;

        let mut tags = HashMap::new();
        if let Some(owner) = &config.owner_tag {
            tags.insert("Owner".to_string(), owner.clone());
        }

        Ok(Self {
            spec: TemplateSpec {
                name: format!("weft-{}", Uuid::new_v4()),
                image: config.worker_image.clone(),
                work_dir: config.worker_work_dir.clone(),
                resources: defaults.into(),
                job_role: config.job_role.clone(),
                tags,
            },
            state: Mutex::new(State::Absent),
        })
    }

    /// Returns the template handle, registering the remote object first if
    /// this is the first use. Idempotent; concurrent callers serialize on
    /// the creation and all observe the same handle.
    pub async fn get_or_create(
        &self,
        backend: &dyn BatchBackend,
        retry: &RetryPolicy,
    ) -> Result<TemplateHandle> {
        let mut state = self.state.lock().await;
        match &*state {
            State::Present(handle) => Ok(handle.clone()),
            State::Destroyed => Err(BatchError::Configuration(
                "template already destroyed; adapter is shut down".into(),
            )),
            State::Absent => {
                debug!("registering execution template {}", self.spec.name);
                let handle = retry
                    .run("register_template", || {
                        backend.register_template(&self.spec)
                    })
                    .await?;
                info!("registered execution template {}", handle);
                *state = State::Present(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Deletes the remote template if one was created. No-op when nothing
    /// was ever registered or it is already gone.
    pub async fn destroy(&self, backend: &dyn BatchBackend, retry: &RetryPolicy) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Destroyed) {
            State::Present(handle) => {
                debug!("deregistering execution template {}", handle);
                retry
                    .run("deregister_template", || {
                        backend.deregister_template(&handle)
                    })
                    .await
            }
            State::Absent | State::Destroyed => Ok(()),
        }
    }
}
