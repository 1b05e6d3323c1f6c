//! Inputs describing one image build.

use crate::backend::{BackendError, InstanceRequest};

/// Everything the orchestrator needs to produce one image.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildSpec {
    /// Image the build instance boots from.
    pub base_image: String,
    /// Hardware flavor of the build instance.
    pub flavor: String,
    /// Environment owning the build instance.
    pub environment: String,
    /// Keypair injected into the build instance.
    pub keypair: String,
    /// Local private key matching `keypair`.
    pub private_key_path: String,
    /// Name of the published image, before the version suffix.
    pub image_name: String,
    /// Version appended to the published image name.
    pub image_version: String,
    /// User tags attached to the instance and image.
    pub tags: Vec<String>,
    /// Prefix for the instance and snapshot names.
    pub vm_name: String,
}

impl BuildSpec {
    /// Checks that every identifying field is present.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] naming the first empty field.
    pub fn validate(&self) -> Result<(), BackendError> {
        for (field, value) in [
            ("base_image", &self.base_image),
            ("flavor", &self.flavor),
            ("environment", &self.environment),
            ("keypair", &self.keypair),
            ("private_key_path", &self.private_key_path),
            ("image_name", &self.image_name),
            ("image_version", &self.image_version),
            ("vm_name", &self.vm_name),
        ] {
            if value.trim().is_empty() {
                return Err(BackendError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }

    /// Builds the instance request for an instance called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when a required field is empty.
    pub fn instance_request(&self, name: &str) -> Result<InstanceRequest, BackendError> {
        InstanceRequest::builder()
            .name(name)
            .base_image(&self.base_image)
            .flavor(&self.flavor)
            .keypair(&self.keypair)
            .environment(&self.environment)
            .labels(self.tags.clone())
            .build()
    }
}
