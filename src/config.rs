//! Runner configuration loaded from `proofrun.toml`.
//!
//! Every field has a default, so the file is optional. The `ARISTOTLE_API_KEY`
//! environment variable takes precedence over the key in the file, and the
//! command line overrides the polling and pacing knobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::RunArgs;
use crate::error::RunnerError;
use crate::prover::ApiKey;
use crate::prover::client::DEFAULT_BASE_URL;
use crate::state_machine::{JobDescriptor, PollPolicy, ensure_unique_modules};

pub const CONFIG_FILE: &str = "proofrun.toml";
pub const API_KEY_ENV: &str = "ARISTOTLE_API_KEY";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Proving service credential.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory all relative paths below are resolved against.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Reference sources shared by every job.
    #[serde(default = "default_context_files")]
    pub context_files: Vec<PathBuf>,

    /// One job per file, submitted in this order.
    #[serde(default = "default_input_files")]
    pub input_files: Vec<PathBuf>,

    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_max_polling_failures")]
    pub max_polling_failures: u32,

    /// Pause between two submissions.
    #[serde(default = "default_submission_delay_secs")]
    pub submission_delay_secs: u64,

    #[serde(default = "default_validate_before_submit")]
    pub validate_before_submit: bool,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_context_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from("evm_model/Basic.lean"),
        PathBuf::from("evm_model/ERC20.lean"),
    ]
}

fn default_input_files() -> Vec<PathBuf> {
    vec![
        PathBuf::from("properties/Transfer.lean"),
        PathBuf::from("properties/Approve.lean"),
        PathBuf::from("properties/TransferFrom.lean"),
    ]
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_polling_failures() -> u32 {
    5
}

fn default_submission_delay_secs() -> u64 {
    5
}

fn default_validate_before_submit() -> bool {
    true
}

fn default_max_concurrency() -> usize {
    1
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            project_root: default_project_root(),
            context_files: default_context_files(),
            input_files: default_input_files(),
            results_dir: default_results_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            max_polling_failures: default_max_polling_failures(),
            submission_delay_secs: default_submission_delay_secs(),
            validate_before_submit: default_validate_before_submit(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Everything a run needs once configuration has been checked.
#[derive(Debug)]
pub struct Preflight {
    pub api_key: ApiKey,
    pub context_files: Vec<PathBuf>,
    pub input_files: Vec<PathBuf>,
    pub descriptors: Vec<JobDescriptor>,
}

impl RunnerConfig {
    /// Load from `path`, or `proofrun.toml` in the working directory.
    /// Uses defaults if the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(CONFIG_FILE));
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<RunnerConfig>(&contents)
                .map_err(RunnerError::from)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        Ok(config.with_env_key(std::env::var(API_KEY_ENV).ok()))
    }

    /// A non-empty key from the environment wins over the file.
    pub fn with_env_key(mut self, key: Option<String>) -> Self {
        if let Some(key) = key
            && !key.trim().is_empty()
        {
            self.api_key = key;
        }
        self
    }

    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(secs) = args.poll_interval {
            self.poll_interval_secs = secs;
        }
        if let Some(max) = args.max_polling_failures {
            self.max_polling_failures = max;
        }
        if let Some(secs) = args.submission_delay {
            self.submission_delay_secs = secs;
        }
        if let Some(limit) = args.concurrency {
            self.max_concurrency = limit;
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn results_dir(&self) -> PathBuf {
        self.resolve(&self.results_dir)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_consecutive_failures: self.max_polling_failures,
        }
    }

    pub fn submission_delay(&self) -> Duration {
        Duration::from_secs(self.submission_delay_secs)
    }

    /// Check the credential and every source file, then build the job descriptors.
    ///
    /// Errors are reported in that order and nothing is sent anywhere.
    pub fn preflight(&self) -> Result<Preflight, RunnerError> {
        let api_key = ApiKey::new(self.api_key.clone()).ok_or(RunnerError::MissingApiKey)?;

        let context_files: Vec<PathBuf> = self.context_files.iter().map(|p| self.resolve(p)).collect();
        if let Some(missing) = context_files.iter().find(|p| !p.is_file()) {
            return Err(RunnerError::MissingContextFile(missing.clone()));
        }

        let input_files: Vec<PathBuf> = self.input_files.iter().map(|p| self.resolve(p)).collect();
        if let Some(missing) = input_files.iter().find(|p| !p.is_file()) {
            return Err(RunnerError::MissingInputFile(missing.clone()));
        }

        let shared: Arc<[PathBuf]> = context_files.clone().into();
        let results_dir = self.results_dir();
        let descriptors = input_files
            .iter()
            .map(|input| JobDescriptor::new(input.clone(), Arc::clone(&shared), &results_dir))
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_modules(&descriptors)?;

        Ok(Preflight {
            api_key,
            context_files,
            input_files,
            descriptors,
        })
    }
}
