//! TOML manifest parsing for `parfold.toml`.

use std::path::Path;

use parfold_device::QueueConfig;
use serde::Deserialize;

/// Sample indices printed after a normalize run.
pub const DEFAULT_SAMPLES: [usize; 5] = [1, 20, 300, 4000, 50000];

pub const DEFAULT_LENGTH: usize = 262_144;

/// Parsed `parfold.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// `[device]` section.
    pub device: QueueConfig,
    /// `[run]` section.
    pub run: RunConfig,
}

/// `[run]` section: defaults for the driver commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RunConfig {
    /// Generated input length
    pub length: usize,
    /// Generator seed
    pub seed: u64,
    pub samples: Vec<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            length: DEFAULT_LENGTH,
            seed: 0x5eed,
            samples: DEFAULT_SAMPLES.to_vec(),
        }
    }
}

/// Parse a `parfold.toml` string.
pub fn parse_manifest(content: &str) -> Result<Manifest, String> {
    toml::from_str(content).map_err(|e| format!("Failed to parse parfold.toml: {}", e))
}

/// Load `path`, or defaults when `path` is absent and `required` is false.
pub fn load_manifest(path: &Path, required: bool) -> Result<Manifest, String> {
    if !path.exists() {
        if required {
            return Err(format!("Manifest not found: {}", path.display()));
        }
        return Ok(Manifest::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse_manifest(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parfold_device::{Backend, PlaceholderMode, DEFAULT_MAX_WORK_GROUP_SIZE};

    #[test]
    fn test_parse_full() {
        let toml = r#"
[device]
backend = "host"
device-name = "bench box"
max-work-group-size = 128
memory-limit = 1048576
placeholder-mode = "implicit"

[run]
length = 4096
seed = 7
samples = [0, 1, 2]
"#;
        let manifest = parse_manifest(toml).unwrap();
        assert_eq!(manifest.device.backend, Backend::Host);
        assert_eq!(manifest.device.device_name.as_deref(), Some("bench box"));
        assert_eq!(manifest.device.max_work_group_size, 128);
        assert_eq!(manifest.device.memory_limit, Some(1_048_576));
        assert_eq!(manifest.device.placeholder_mode, PlaceholderMode::Implicit);
        assert_eq!(manifest.run.length, 4096);
        assert_eq!(manifest.run.seed, 7);
        assert_eq!(manifest.run.samples, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let manifest = parse_manifest("[device]\nbackend = \"webgpu\"\n").unwrap();
        assert_eq!(manifest.device.backend, Backend::Webgpu);
        assert_eq!(
            manifest.device.max_work_group_size,
            DEFAULT_MAX_WORK_GROUP_SIZE
        );
        assert_eq!(manifest.run, RunConfig::default());
        assert_eq!(parse_manifest("").unwrap(), Manifest::default());
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let err = parse_manifest("[device]\nbackend = \"cuda\"\n").unwrap_err();
        assert!(err.starts_with("Failed to parse parfold.toml"));
    }

    #[test]
    fn test_absent_optional_manifest() {
        let manifest = load_manifest(Path::new("does-not-exist/parfold.toml"), false).unwrap();
        assert_eq!(manifest, Manifest::default());
        assert!(load_manifest(Path::new("does-not-exist/parfold.toml"), true).is_err());
    }
}
