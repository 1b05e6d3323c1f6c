//! Build configuration and API credentials.
//!
//! The build configuration is a JSON document named on the command line.
//! API credentials come from the environment via `ortho-config` so the key
//! never has to be written into the build file.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::build::BuildSpec;
use crate::hyperstack::DEFAULT_API_BASE;
use crate::provision::ProvisioningPlan;

/// Flavor used when the configuration leaves `flavor_name` empty.
pub const DEFAULT_FLAVOR: &str = "n1-A100x1";

/// Base image used when the configuration leaves `base_image_name` empty.
pub const DEFAULT_BASE_IMAGE: &str = "Ubuntu Server 22.04 LTS R535 CUDA 12.2 with Docker";

/// Tag every build carries unless the configuration lists its own.
pub const DEFAULT_TAG: &str = "k8s";

fn default_tags() -> Vec<String> {
    vec![String::from(DEFAULT_TAG)]
}

fn tags_or_default<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_else(default_tags))
}

/// Persisted description of one image build.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BuildConfig {
    /// Region the base image and flavor were chosen from.
    #[serde(default)]
    pub region: String,
    /// Name of the published image, before the version suffix.
    #[serde(default)]
    pub image_name: String,
    /// Version appended to the published image name.
    #[serde(default)]
    pub image_version: String,
    /// Image the build instance boots from.
    #[serde(default)]
    pub base_image_name: String,
    /// Prefix for the build instance and snapshot names.
    #[serde(default)]
    pub vm_name: String,
    /// Hardware flavor of the build instance.
    #[serde(default)]
    pub flavor_name: String,
    /// Keypair injected into the build instance.
    #[serde(default)]
    pub keypair_name: String,
    /// Local private key matching `keypair_name`.
    #[serde(default)]
    pub private_key_path: String,
    /// Environment owning the build instance.
    #[serde(default)]
    pub environment_name: String,
    /// Labels attached to the instance and the published image.
    #[serde(default = "default_tags", deserialize_with = "tags_or_default")]
    pub tags: Vec<String>,
    /// Provisioning steps; the stock GPU node plan when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<ProvisioningPlan>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            region: String::new(),
            image_name: String::new(),
            image_version: String::new(),
            base_image_name: String::new(),
            vm_name: String::new(),
            flavor_name: String::new(),
            keypair_name: String::new(),
            private_key_path: String::new(),
            environment_name: String::new(),
            tags: default_tags(),
            provisioning: None,
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    json_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, json_key: &'static str) -> Self {
        Self {
            description,
            json_key,
        }
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 8] = [
    FieldMetadata::new("output image name", "image_name"),
    FieldMetadata::new("output image version", "image_version"),
    FieldMetadata::new("base image", "base_image_name"),
    FieldMetadata::new("VM name", "vm_name"),
    FieldMetadata::new("VM flavor", "flavor_name"),
    FieldMetadata::new("SSH keypair", "keypair_name"),
    FieldMetadata::new("private key path", "private_key_path"),
    FieldMetadata::new("environment", "environment_name"),
];

impl BuildConfig {
    /// Fills the fields that have documented defaults when they are empty.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.flavor_name.trim().is_empty() {
            self.flavor_name = String::from(DEFAULT_FLAVOR);
        }
        if self.base_image_name.trim().is_empty() {
            self.base_image_name = String::from(DEFAULT_BASE_IMAGE);
        }
        self
    }

    fn field(&self, json_key: &str) -> &str {
        match json_key {
            "image_name" => &self.image_name,
            "image_version" => &self.image_version,
            "base_image_name" => &self.base_image_name,
            "vm_name" => &self.vm_name,
            "flavor_name" => &self.flavor_name,
            "keypair_name" => &self.keypair_name,
            "private_key_path" => &self.private_key_path,
            "environment_name" => &self.environment_name,
            _ => "",
        }
    }

    /// Performs semantic validation on required fields. Error messages name
    /// the JSON key to fill in.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for metadata in &REQUIRED_FIELDS {
            if self.field(metadata.json_key).trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "missing {}: set \"{}\" in the build configuration",
                    metadata.description, metadata.json_key
                )));
            }
        }
        Ok(())
    }

    /// Builds the orchestrator input from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn to_build_spec(&self) -> Result<BuildSpec, ConfigError> {
        self.validate()?;
        Ok(BuildSpec {
            base_image: self.base_image_name.clone(),
            flavor: self.flavor_name.clone(),
            environment: self.environment_name.clone(),
            keypair: self.keypair_name.clone(),
            private_key_path: self.private_key_path.clone(),
            image_name: self.image_name.clone(),
            image_version: self.image_version.clone(),
            tags: self.tags.clone(),
            vm_name: self.vm_name.clone(),
        })
    }

    /// Provisioning plan for this build.
    #[must_use]
    pub fn provisioning_plan(&self) -> ProvisioningPlan {
        self.provisioning.clone().unwrap_or_default()
    }
}

/// Hyperstack API settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "HYPERSTACK")]
pub struct ApiConfig {
    /// API key sent in the `api_key` header.
    pub api_key: Option<String>,
    /// Base URL of the infrastructure API.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base_url: String,
}

impl ApiConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("kiln")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the API key when one is configured and non-blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Returns the API key or an actionable error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when no key is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key().ok_or_else(|| {
            ConfigError::MissingField(String::from(
                "missing Hyperstack API key: set HYPERSTACK_API_KEY",
            ))
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing. The
    /// message names the key to set.
    #[error("{0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::provision::ProvisioningStep;

    #[fixture]
    fn complete() -> BuildConfig {
        BuildConfig {
            region: String::from("CANADA-1"),
            image_name: String::from("kubernetes_gpu_cuda"),
            image_version: String::from("202508.15.0"),
            base_image_name: String::from(DEFAULT_BASE_IMAGE),
            vm_name: String::from("thunder-build-vm"),
            flavor_name: String::from(DEFAULT_FLAVOR),
            keypair_name: String::from("build-key"),
            private_key_path: String::from("~/.ssh/id_rsa"),
            environment_name: String::from("default-CANADA-1"),
            tags: default_tags(),
            provisioning: None,
        }
    }

    fn parse(json: &str) -> BuildConfig {
        serde_json::from_str::<BuildConfig>(json)
            .unwrap_or_else(|err| panic!("config should parse: {err}"))
            .with_defaults()
    }

    #[test]
    fn loading_fills_documented_defaults() {
        let config = parse(r#"{"image_name": "img", "vm_name": "vm1"}"#);

        assert_eq!(config.flavor_name, DEFAULT_FLAVOR);
        assert_eq!(config.base_image_name, DEFAULT_BASE_IMAGE);
        assert_eq!(config.tags, vec![String::from("k8s")]);
        assert_eq!(config.provisioning, None);
    }

    #[rstest]
    #[case(r#"{"tags": null}"#, &["k8s"])]
    #[case(r#"{"tags": []}"#, &[])]
    #[case(r#"{"tags": ["gpu", "a100"]}"#, &["gpu", "a100"])]
    fn tags_default_only_when_absent_or_null(#[case] json: &str, #[case] expected: &[&str]) {
        let config = parse(json);
        assert_eq!(config.tags, expected);
    }

    #[rstest]
    #[case("image_name")]
    #[case("keypair_name")]
    #[case("environment_name")]
    fn validation_names_the_missing_json_key(complete: BuildConfig, #[case] key: &str) {
        let mut config = complete;
        match key {
            "image_name" => config.image_name.clear(),
            "keypair_name" => config.keypair_name.clear(),
            _ => config.environment_name.clear(),
        }

        let err = config.validate().expect_err("validation should fail");

        let ConfigError::MissingField(ref message) = err else {
            panic!("expected MissingField, got {err:?}");
        };
        assert!(message.contains(key), "message should name {key}: {message}");
    }

    #[rstest]
    fn build_spec_copies_every_field(complete: BuildConfig) {
        let spec = complete
            .to_build_spec()
            .unwrap_or_else(|err| panic!("spec should build: {err}"));

        assert_eq!(spec.vm_name, "thunder-build-vm");
        assert_eq!(spec.keypair, "build-key");
        assert_eq!(spec.environment, "default-CANADA-1");
        assert_eq!(spec.base_image, DEFAULT_BASE_IMAGE);
        assert_eq!(spec.tags, vec![String::from("k8s")]);
    }

    #[rstest]
    fn provisioning_plan_defaults_to_stock_steps(complete: BuildConfig) {
        assert_eq!(complete.provisioning_plan(), ProvisioningPlan::default());
    }

    #[test]
    fn provisioning_section_is_parsed() {
        let config = parse(
            r#"{"provisioning": {"steps": [{"kind": "script", "name": "only.sh"}]}}"#,
        );

        assert_eq!(
            config.provisioning_plan().steps,
            vec![ProvisioningStep::Script {
                name: String::from("only.sh"),
            }]
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some("   "))]
    fn missing_api_key_names_environment_variable(#[case] key: Option<&str>) {
        let config = ApiConfig {
            api_key: key.map(str::to_owned),
            api_base_url: String::from(DEFAULT_API_BASE),
        };

        let err = config.require_api_key().expect_err("key is required");

        assert!(err.to_string().contains("HYPERSTACK_API_KEY"));
    }

    #[test]
    fn api_key_is_trimmed() {
        let config = ApiConfig {
            api_key: Some(String::from(" secret \n")),
            api_base_url: String::from(DEFAULT_API_BASE),
        };

        assert_eq!(config.require_api_key(), Ok("secret"));
    }
}
