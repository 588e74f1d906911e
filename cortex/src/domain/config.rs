// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Memory Engine Configuration
//
// Defines the configuration schema for tiermem deployments:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Tier thresholds and management cadence
// - Task worker retry budget and timeouts
// - Storage, vector store, inference and enhancement backends
// - Logging and metrics settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const API_VERSION: &str = "tiermem/v1";
pub const KIND: &str = "MemoryConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierMemConfig {
    /// API version (must be "tiermem/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "MemoryConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: TierMemSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierMemSpec {
    #[serde(default)]
    pub memory: MemoryManagementConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    /// Message rewriting through a completion model. Disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<EnhancementConfig>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Thresholds driving deduplication and tier transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryManagementConfig {
    /// Cosine similarity above which a new message is a duplicate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Short-term memories older than this are eviction candidates
    #[serde(default = "default_age_limit_hours")]
    pub age_limit_hours: u32,

    #[serde(default = "default_minimal_relevancy_for_promotion")]
    pub minimal_relevancy_for_promotion: u32,

    #[serde(default = "default_minimal_relevancy_for_discard")]
    pub minimal_relevancy_for_discard: u32,

    /// Worker pool size of one management cycle
    #[serde(default = "default_max_simultaneous_tasks")]
    pub max_simultaneous_tasks: usize,

    #[serde(default = "default_management_period", with = "humantime_serde")]
    pub management_period: Duration,
}

impl MemoryManagementConfig {
    pub fn age_limit(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.age_limit_hours))
    }
}

impl Default for MemoryManagementConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            age_limit_hours: default_age_limit_hours(),
            minimal_relevancy_for_promotion: default_minimal_relevancy_for_promotion(),
            minimal_relevancy_for_discard: default_minimal_relevancy_for_discard(),
            max_simultaneous_tasks: default_max_simultaneous_tasks(),
            management_period: default_management_period(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Attempts after the first before a task is dead-lettered
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Deadline of a single task attempt
    #[serde(default = "default_task_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Concurrent task consumers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Base delay between attempts, doubled per retry
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_retry: default_max_retry(),
            timeout: default_task_timeout(),
            concurrency: default_concurrency(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    InMemory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Connection string, required for postgres
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    #[default]
    InMemory,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Qdrant gRPC URL, required for qdrant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_vector_size")]
    pub vector_size: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            url: None,
            collection: default_collection(),
            vector_size: default_vector_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the classification / embedding service
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_inference_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            timeout: default_inference_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementConfig {
    /// Ollama base URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_inference_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout: default_inference_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus exporter port, disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

// Default value functions
fn default_similarity_threshold() -> f32 {
    0.9
}

fn default_age_limit_hours() -> u32 {
    24 * 7
}

fn default_minimal_relevancy_for_promotion() -> u32 {
    10
}

fn default_minimal_relevancy_for_discard() -> u32 {
    5
}

fn default_max_simultaneous_tasks() -> usize {
    10
}

fn default_management_period() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retry() -> u32 {
    5
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_concurrency() -> usize {
    5
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_connections() -> u32 {
    10
}

fn default_collection() -> String {
    "tiermem-default".to_string()
}

fn default_vector_size() -> u64 {
    384
}

fn default_inference_endpoint() -> String {
    "http://localhost:50051".to_string()
}

fn default_inference_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_llm_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TierMemConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "tiermem".to_string(),
                labels: None,
            },
            spec: TierMemSpec::default(),
        }
    }
}

impl TierMemConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. TIERMEM_CONFIG_PATH environment variable
    /// 2. ./tiermem-config.yaml (working directory)
    /// 3. ~/.tiermem/config.yaml (user home)
    /// 4. /etc/tiermem/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("TIERMEM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./tiermem-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".tiermem").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/tiermem/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides so container deployments can
    /// tune a stock manifest.
    pub fn apply_env_overrides(&mut self) {
        let spec = &mut self.spec;

        env_override("MEMORY_MANAGEMENT_MEMORY_SIMILARITY_THRESHOLD", &mut spec.memory.similarity_threshold);
        env_override("MEMORY_MANAGEMENT_MAX_SIMULTANEOUS_TASKS", &mut spec.memory.max_simultaneous_tasks);
        env_override("MEMORY_MANAGEMENT_SHORT_TERM_MEMORY_AGE_LIMIT", &mut spec.memory.age_limit_hours);
        env_override(
            "MEMORY_MANAGEMENT_SHORT_TERM_MEMORY_MINIMAL_RELEVANCY_FOR_PROMOTION",
            &mut spec.memory.minimal_relevancy_for_promotion,
        );
        env_override(
            "MEMORY_MANAGEMENT_SHORT_TERM_MEMORY_MINIMAL_RELEVANCY_FOR_DISCARD",
            &mut spec.memory.minimal_relevancy_for_discard,
        );
        if let Ok(val) = std::env::var("MEMORY_MANAGEMENT_MANAGE_SHORT_TERM_MEMORY_TASK_PERIOD") {
            match humantime_serde::re::humantime::parse_duration(val.trim_start_matches("@every").trim()) {
                Ok(period) => spec.memory.management_period = period,
                Err(e) => tracing::warn!(
                    "Invalid value for MEMORY_MANAGEMENT_MANAGE_SHORT_TERM_MEMORY_TASK_PERIOD: '{}' ({}). Ignoring.",
                    val,
                    e
                ),
            }
        }

        env_override("WORKER_MAX_RETRY", &mut spec.worker.max_retry);
        env_override("WORKER_CONCURRENCY", &mut spec.worker.concurrency);
        let mut timeout_secs = spec.worker.timeout.as_secs();
        env_override("WORKER_TIMEOUT", &mut timeout_secs);
        spec.worker.timeout = Duration::from_secs(timeout_secs);

        if let Ok(url) = std::env::var("DATABASE_URL") {
            tracing::info!("Environment override: DATABASE_URL");
            spec.storage.backend = StorageBackend::Postgres;
            spec.storage.url = Some(url);
        }

        if let Ok(host) = std::env::var("QDRANT_HOST") {
            let port = std::env::var("QDRANT_PORT").unwrap_or_else(|_| "6334".to_string());
            tracing::info!("Environment override: QDRANT_HOST={}", host);
            spec.vector_store.backend = VectorBackend::Qdrant;
            spec.vector_store.url = Some(format!("http://{}:{}", host, port));
        }
        env_override("QDRANT_DEFAULT_VECTOR_SIZE", &mut spec.vector_store.vector_size);
        env_override("QDRANT_DEFAULT_COLLECTION_NAME", &mut spec.vector_store.collection);

        if let Ok(address) = std::env::var("INFERENCE_ADDRESS") {
            tracing::info!("Environment override: INFERENCE_ADDRESS={}", address);
            spec.inference.endpoint = if address.contains("://") {
                address
            } else {
                format!("http://{}", address)
            };
        }

        let llm_url = std::env::var("LLM_BASE_URL").ok();
        let llm_model = std::env::var("LLM_MODEL").ok();
        if llm_url.is_some() || llm_model.is_some() {
            let enhancement = spec.enhancement.get_or_insert_with(EnhancementConfig::default);
            if let Some(url) = llm_url {
                enhancement.endpoint = url;
            }
            if let Some(model) = llm_model {
                enhancement.model = model;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let memory = &self.spec.memory;
        if !(0.0..=1.0).contains(&memory.similarity_threshold) {
            anyhow::bail!(
                "spec.memory.similarity_threshold must be within [0, 1], got {}",
                memory.similarity_threshold
            );
        }
        if memory.age_limit_hours == 0 {
            anyhow::bail!("spec.memory.age_limit_hours must be positive");
        }
        if memory.max_simultaneous_tasks == 0 {
            anyhow::bail!("spec.memory.max_simultaneous_tasks must be positive");
        }
        if memory.management_period.is_zero() {
            anyhow::bail!("spec.memory.management_period must be positive");
        }

        let worker = &self.spec.worker;
        if worker.concurrency == 0 {
            anyhow::bail!("spec.worker.concurrency must be positive");
        }
        if worker.timeout.is_zero() {
            anyhow::bail!("spec.worker.timeout must be positive");
        }

        if self.spec.storage.backend == StorageBackend::Postgres && self.spec.storage.url.is_none() {
            anyhow::bail!("spec.storage.url is required for the postgres backend");
        }

        let vectors = &self.spec.vector_store;
        if vectors.backend == VectorBackend::Qdrant && vectors.url.is_none() {
            anyhow::bail!("spec.vector_store.url is required for the qdrant backend");
        }
        if vectors.vector_size == 0 {
            anyhow::bail!("spec.vector_store.vector_size must be positive");
        }
        if vectors.collection.is_empty() {
            anyhow::bail!("spec.vector_store.collection cannot be empty");
        }

        if self.spec.inference.endpoint.is_empty() {
            anyhow::bail!("spec.inference.endpoint cannot be empty");
        }

        if let Some(enhancement) = &self.spec.enhancement {
            if enhancement.endpoint.is_empty() || enhancement.model.is_empty() {
                anyhow::bail!("spec.enhancement requires both endpoint and model");
            }
        }

        Ok(())
    }
}

fn env_override<T>(name: &str, target: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    let Ok(val) = std::env::var(name) else {
        return;
    };
    match val.parse::<T>() {
        Ok(parsed) => {
            tracing::info!("Environment override: {}={}", name, val);
            *target = parsed;
        }
        Err(e) => {
            tracing::warn!("Invalid value for {}: '{}' ({}). Ignoring.", name, val, e);
        }
    }
}
