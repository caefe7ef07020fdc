//! Job type registry.
//!
//! Maps job type names to their descriptors and, for the worker, to the
//! executable that performs them. Loaded from a TOML file:
//!
//! ```toml
//! [jobs.SampleJob]
//! debounced = true
//! throttled = "daily"
//! command = "bin/sample-job"
//! key_args = [0]
//! ```

use crate::error::{Error, Result};
use crate::key;
use crate::model::{JobDescriptor, PolicyOptions, Throttle};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct JobsFile {
    #[serde(default)]
    jobs: HashMap<String, JobConfig>,
}

/// One job type's entry in the jobs file.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub debounced: Option<bool>,
    #[serde(default)]
    pub throttled: Option<Throttle>,
    /// Executable the worker runs for this job type.
    pub command: Option<PathBuf>,
    /// Derive the key from these argument positions only.
    #[serde(default)]
    pub key_args: Option<Vec<usize>>,
}

/// Registry of job types, indexed by name.
#[derive(Debug, Default)]
pub struct JobRegistry {
    descriptors: HashMap<String, Arc<JobDescriptor>>,
    commands: HashMap<String, PathBuf>,
}

impl JobRegistry {
    /// Create an empty registry with no job types.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load job types from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read jobs file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad jobs file {}: {e}", path.display())))
    }

    /// Parse job types from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: JobsFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;

        let mut registry = Self::empty();
        for (job_type, config) in file.jobs {
            let command = config.command.clone();
            let descriptor = descriptor_from_config(&job_type, config);
            registry.register(descriptor);
            if let Some(command) = command {
                registry.commands.insert(job_type, command);
            }
        }
        Ok(registry)
    }

    /// Add or replace a job type.
    pub fn register(&mut self, descriptor: JobDescriptor) -> Arc<JobDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .insert(descriptor.job_type().to_string(), Arc::clone(&descriptor));
        descriptor
    }

    /// Look up a job type by name.
    pub fn get(&self, job_type: &str) -> Option<&Arc<JobDescriptor>> {
        self.descriptors.get(job_type)
    }

    /// Look up a job type, failing on unknown names.
    pub fn require(&self, job_type: &str) -> Result<&Arc<JobDescriptor>> {
        self.get(job_type)
            .ok_or_else(|| Error::UnknownJobType(job_type.to_string()))
    }

    /// The executable configured for a job type.
    pub fn command_for(&self, job_type: &str) -> Option<&Path> {
        self.commands.get(job_type).map(PathBuf::as_path)
    }

    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }
}

fn descriptor_from_config(job_type: &str, config: JobConfig) -> JobDescriptor {
    let descriptor = JobDescriptor::new(job_type).track(PolicyOptions {
        debounced: config.debounced,
        throttled: config.throttled,
    });

    match config.key_args {
        Some(positions) => {
            let name = job_type.to_string();
            descriptor.key_with(move |args: &[Value]| {
                let picked: Vec<Value> = positions
                    .iter()
                    .map(|&i| args.get(i).cloned().unwrap_or(Value::Null))
                    .collect();
                key::derive(&name, &picked)
            })
        }
        None => descriptor,
    }
}
