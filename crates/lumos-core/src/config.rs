use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from lumos.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LumosConfig {
    pub registry: RegistryConfig,
    pub publish: PublishConfig,
    pub verify: VerifyConfig,
    pub generate: GenerateConfig,
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry JSON file (default: redemption_codes_SECRET.json)
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Generated TypeScript artifact with the key-index table
    pub path: PathBuf,
    /// Also embed the raw key strings in the artifact (default: false)
    pub include_raw_keys: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Highest identifier the verifier searches (default: 99999)
    pub bound: u64,
    /// Abort a verification scan after this many seconds
    pub timeout_secs: Option<u64>,
    /// Scan the key × identifier space on the rayon pool
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Batch size used when the prompt is left blank or is not a number
    pub default_count: u64,
    /// Number of new codes echoed after a batch
    pub sample_size: usize,
    /// What to do when a new code text already exists
    pub collision_policy: CollisionPolicy,
}

/// Handling of code texts that repeat across the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Log and keep the code; verification resolves it by scan order
    #[default]
    Warn,
    /// Abort the batch before anything is written
    Fail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// JSON array of key strings; the built-in ring is used when unset
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("redemption_codes_SECRET.json"),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("src/constants/redemptionHashes.ts"),
            include_raw_keys: false,
        }
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            bound: 99_999,
            timeout_secs: None,
            parallel: true,
        }
    }
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            default_count: 100,
            sample_size: 5,
            collision_policy: CollisionPolicy::Warn,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[registry]
path = "/var/lib/lumos/codes.json"

[publish]
path = "web/src/constants/redemptionHashes.ts"
include_raw_keys = true

[verify]
bound = 5000
timeout_secs = 10
parallel = false

[generate]
default_count = 25
sample_size = 3
collision_policy = "fail"

[keys]
file = "/etc/lumos/keys.json"

[logging]
level = "debug"
format = "json"
"#;
        let config: LumosConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.registry.path, PathBuf::from("/var/lib/lumos/codes.json"));
        assert!(config.publish.include_raw_keys);
        assert_eq!(config.verify.bound, 5000);
        assert_eq!(config.verify.timeout_secs, Some(10));
        assert!(!config.verify.parallel);
        assert_eq!(config.generate.default_count, 25);
        assert_eq!(config.generate.sample_size, 3);
        assert_eq!(config.generate.collision_policy, CollisionPolicy::Fail);
        assert_eq!(config.keys.file, Some(PathBuf::from("/etc/lumos/keys.json")));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_defaults() {
        let config: LumosConfig = toml::from_str("").unwrap();

        assert_eq!(
            config.registry.path,
            PathBuf::from("redemption_codes_SECRET.json")
        );
        assert_eq!(
            config.publish.path,
            PathBuf::from("src/constants/redemptionHashes.ts")
        );
        assert!(!config.publish.include_raw_keys);
        assert_eq!(config.verify.bound, 99_999);
        assert_eq!(config.verify.timeout_secs, None);
        assert!(config.verify.parallel);
        assert_eq!(config.generate.default_count, 100);
        assert_eq!(config.generate.collision_policy, CollisionPolicy::Warn);
        assert!(config.keys.file.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[verify]
bound = 250
"#;
        let config: LumosConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.verify.bound, 250);
        // Defaults
        assert!(config.verify.parallel);
        assert_eq!(config.generate.sample_size, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unknown_collision_policy_rejected() {
        let toml_str = r#"
[generate]
collision_policy = "retry"
"#;
        assert!(toml::from_str::<LumosConfig>(toml_str).is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = LumosConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: LumosConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.registry.path, parsed.registry.path);
        assert_eq!(config.verify.bound, parsed.verify.bound);
        assert_eq!(config.generate.collision_policy, parsed.generate.collision_policy);
    }
}
