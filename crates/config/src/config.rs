//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// CPU-related configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuConfig {
    /// Number of logical cores (auto-detected if None)
    pub logical_cores: Option<u32>,
}

/// Job queue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Maximum engine processes running at once (0 = derive from cores)
    #[serde(default)]
    pub max_concurrent_jobs: u32,
}

/// Retry behaviour for failed engine runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first failure (default 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Pause between attempts in milliseconds (default 0, immediate retry)
    #[serde(default)]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: 0,
        }
    }
}

/// External transcoding engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Program to spawn for each task (default "ffmpeg")
    #[serde(default = "default_engine_program")]
    pub program: String,
    /// Arguments appended before the output path of every invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Extension used for generated output files (default "mp4")
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

fn default_engine_program() -> String {
    "ffmpeg".to_string()
}

fn default_output_extension() -> String {
    "mp4".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: default_engine_program(),
            extra_args: Vec::new(),
            output_extension: default_output_extension(),
        }
    }
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventsConfig {
    /// Capacity of the bounded batch event channel (default 256)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub cpu: CpuConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - MEDIABATCH_LOGICAL_CORES -> cpu.logical_cores
    /// - MEDIABATCH_MAX_CONCURRENT_JOBS -> queue.max_concurrent_jobs
    /// - MEDIABATCH_MAX_RETRIES -> retry.max_retries
    /// - MEDIABATCH_RETRY_DELAY_MS -> retry.retry_delay_ms
    /// - MEDIABATCH_ENGINE_PROGRAM -> engine.program
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIABATCH_LOGICAL_CORES") {
            if let Ok(cores) = val.parse::<u32>() {
                self.cpu.logical_cores = Some(cores);
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.queue.max_concurrent_jobs = jobs;
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_MAX_RETRIES") {
            if let Ok(retries) = val.parse::<u32>() {
                self.retry.max_retries = retries;
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_RETRY_DELAY_MS") {
            if let Ok(delay) = val.parse::<u64>() {
                self.retry.retry_delay_ms = delay;
            }
        }

        if let Ok(val) = env::var("MEDIABATCH_ENGINE_PROGRAM") {
            if !val.trim().is_empty() {
                self.engine.program = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise start from defaults
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests share process state
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("MEDIABATCH_LOGICAL_CORES");
        env::remove_var("MEDIABATCH_MAX_CONCURRENT_JOBS");
        env::remove_var("MEDIABATCH_MAX_RETRIES");
        env::remove_var("MEDIABATCH_RETRY_DELAY_MS");
        env::remove_var("MEDIABATCH_ENGINE_PROGRAM");
    }

    // Property: every section of a well-formed TOML file is parsed as written.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            logical_cores in proptest::option::of(1u32..256),
            max_jobs in 0u32..64,
            max_retries in 0u32..8,
            delay_ms in 0u64..10_000,
            program in "[a-z][a-z0-9_-]{0,15}",
            capacity in 1usize..4096,
        ) {
            let toml_str = format!(
                r#"
[cpu]
{}

[queue]
max_concurrent_jobs = {}

[retry]
max_retries = {}
retry_delay_ms = {}

[engine]
program = "{}"
extra_args = ["-movflags", "+faststart"]
output_extension = "mkv"

[events]
channel_capacity = {}
"#,
                logical_cores.map(|c| format!("logical_cores = {}", c)).unwrap_or_default(),
                max_jobs,
                max_retries,
                delay_ms,
                program,
                capacity,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.cpu.logical_cores, logical_cores);
            prop_assert_eq!(config.queue.max_concurrent_jobs, max_jobs);
            prop_assert_eq!(config.retry.max_retries, max_retries);
            prop_assert_eq!(config.retry.retry_delay_ms, delay_ms);
            prop_assert_eq!(config.engine.program, program);
            prop_assert_eq!(config.engine.extra_args.len(), 2);
            prop_assert_eq!(config.engine.output_extension, "mkv");
            prop_assert_eq!(config.events.channel_capacity, capacity);
        }

        #[test]
        fn prop_env_overrides_max_concurrent_jobs(
            initial_jobs in 0u32..8,
            override_jobs in 0u32..16,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[queue]
max_concurrent_jobs = {}
"#,
                initial_jobs
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("MEDIABATCH_MAX_CONCURRENT_JOBS", override_jobs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.queue.max_concurrent_jobs, override_jobs);
        }

        #[test]
        fn prop_env_overrides_retry(
            override_retries in 0u32..8,
            override_delay in 0u64..5_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let mut config = Config::default();

            env::set_var("MEDIABATCH_MAX_RETRIES", override_retries.to_string());
            env::set_var("MEDIABATCH_RETRY_DELAY_MS", override_delay.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.retry.max_retries, override_retries);
            prop_assert_eq!(config.retry.retry_delay_ms, override_delay);
        }
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("MEDIABATCH_LOGICAL_CORES", "lots");
        env::set_var("MEDIABATCH_ENGINE_PROGRAM", "   ");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.cpu.logical_cores, None);
        assert_eq!(config.engine.program, "ffmpeg");
    }

    #[test]
    fn test_env_override_engine_program() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("MEDIABATCH_ENGINE_PROGRAM", "/opt/ffmpeg/bin/ffmpeg");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.engine.program, "/opt/ffmpeg/bin/ffmpeg");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.cpu.logical_cores, None);
        assert_eq!(config.queue.max_concurrent_jobs, 0);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.retry_delay_ms, 0);
        assert_eq!(config.engine.program, "ffmpeg");
        assert!(config.engine.extra_args.is_empty());
        assert_eq!(config.engine.output_extension, "mp4");
        assert_eq!(config.events.channel_capacity, 256);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[retry]
retry_delay_ms = 250
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.retry.retry_delay_ms, 250);
        assert_eq!(config.retry.max_retries, 1); // default
        assert_eq!(config.queue.max_concurrent_jobs, 0); // default
        assert_eq!(config.engine.program, "ffmpeg"); // default
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let err = Config::parse_toml("[queue\nmax_concurrent_jobs = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default("/nonexistent/mediabatch.toml")
            .expect("missing file falls back to defaults");
        assert_eq!(config, Config::default());
    }
}
