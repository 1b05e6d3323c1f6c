//! Backend abstraction for the cloud resources an image build drives.
//!
//! A build touches three provider resources in sequence: a virtual machine,
//! a snapshot of its disk, and the image published from that snapshot. The
//! [`ResourceBackend`] trait exposes exactly the calls the build orchestrator
//! needs so tests can substitute scripted doubles for the real provider.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

/// Instance status reported once the machine has booted.
pub const INSTANCE_ACTIVE: &str = "ACTIVE";

/// Floating IP status reported once the public address is routable.
pub const FLOATING_IP_ATTACHED: &str = "ATTACHED";

/// Snapshot status reported once the disk capture has finished.
pub const SNAPSHOT_SUCCESS: &str = "SUCCESS";

/// Ingress rule attached to a new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityRule {
    /// Traffic direction (`ingress` or `egress`).
    pub direction: String,
    /// Transport protocol (for example `tcp`).
    pub protocol: String,
    /// Address family (for example `IPv4`).
    pub ethertype: String,
    /// CIDR the rule admits.
    pub remote_ip_prefix: String,
    /// Lowest port admitted by the rule.
    pub port_range_min: u16,
    /// Highest port admitted by the rule.
    pub port_range_max: u16,
}

impl SecurityRule {
    /// Admits inbound SSH from any IPv4 address.
    #[must_use]
    pub fn ssh_ingress() -> Self {
        Self {
            direction: String::from("ingress"),
            protocol: String::from("tcp"),
            ethertype: String::from("IPv4"),
            remote_ip_prefix: String::from("0.0.0.0/0"),
            port_range_min: 22,
            port_range_max: 22,
        }
    }
}

/// Parameters required to create the build instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Name given to the new instance.
    pub name: String,
    /// Name of the image the instance boots from.
    pub base_image: String,
    /// Hardware flavor (for example `n1-A100x1`).
    pub flavor: String,
    /// SSH keypair injected into the instance.
    pub keypair: String,
    /// Environment (region-scoped project) that owns the instance.
    pub environment: String,
    /// Labels attached to the instance.
    pub labels: Vec<String>,
    /// Whether the provider should attach a public floating IP.
    pub assign_floating_ip: bool,
    /// Firewall rules applied at creation.
    pub security_rules: Vec<SecurityRule>,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required string field is
    /// empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        for (field, value) in [
            ("name", &self.name),
            ("base_image", &self.base_image),
            ("flavor", &self.flavor),
            ("keypair", &self.keypair),
            ("environment", &self.environment),
        ] {
            if value.is_empty() {
                return Err(BackendError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    name: String,
    base_image: String,
    flavor: String,
    keypair: String,
    environment: String,
    labels: Vec<String>,
}

impl InstanceRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the base image name.
    #[must_use]
    pub fn base_image(mut self, value: impl Into<String>) -> Self {
        self.base_image = value.into();
        self
    }

    /// Sets the hardware flavor.
    #[must_use]
    pub fn flavor(mut self, value: impl Into<String>) -> Self {
        self.flavor = value.into();
        self
    }

    /// Sets the keypair name.
    #[must_use]
    pub fn keypair(mut self, value: impl Into<String>) -> Self {
        self.keypair = value.into();
        self
    }

    /// Sets the environment name.
    #[must_use]
    pub fn environment(mut self, value: impl Into<String>) -> Self {
        self.environment = value.into();
        self
    }

    /// Sets the instance labels.
    #[must_use]
    pub fn labels(mut self, value: Vec<String>) -> Self {
        self.labels = value;
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// The request always asks for a floating IP and opens port 22, since
    /// the build reaches the instance over SSH on its public address.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let request = InstanceRequest {
            name: self.name.trim().to_owned(),
            base_image: self.base_image.trim().to_owned(),
            flavor: self.flavor.trim().to_owned(),
            keypair: self.keypair.trim().to_owned(),
            environment: self.environment.trim().to_owned(),
            labels: self.labels,
            assign_floating_ip: true,
            security_rules: vec![SecurityRule::ssh_ingress()],
        };
        request.validate()?;
        Ok(request)
    }
}

/// Latest known state of a provider instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider identifier for the instance.
    pub id: u64,
    /// Instance name.
    pub name: String,
    /// Lifecycle status (for example `BUILD` or `ACTIVE`).
    pub status: String,
    /// Private address, empty until assigned.
    pub fixed_ip: String,
    /// Public address, empty until assigned.
    pub floating_ip: String,
    /// Attachment status of the public address.
    pub floating_ip_status: String,
}

impl InstanceHandle {
    /// Returns `true` once the instance is active and reachable on an
    /// attached floating IP.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == INSTANCE_ACTIVE
            && !self.floating_ip.is_empty()
            && self.floating_ip_status == FLOATING_IP_ATTACHED
    }
}

/// Latest known state of a provider snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SnapshotHandle {
    /// Provider identifier for the snapshot.
    pub id: u64,
    /// Snapshot name.
    pub name: String,
    /// Lifecycle status (for example `CREATING` or `SUCCESS`).
    pub status: String,
}

impl SnapshotHandle {
    /// Returns `true` once the snapshot can be converted into an image.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == SNAPSHOT_SUCCESS
    }
}

/// Image published from a snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageHandle {
    /// Provider identifier for the image.
    pub id: u64,
    /// Image name.
    pub name: String,
    /// Labels attached to the image.
    pub labels: Vec<String>,
}

/// Errors raised by backend-agnostic request validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Provider calls required to turn a base image into a published image.
pub trait ResourceBackend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates an instance and returns its initial state.
    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error>;

    /// Reads the current state of an instance.
    fn get_instance(&self, id: u64) -> BackendFuture<'_, InstanceHandle, Self::Error>;

    /// Deletes an instance.
    fn delete_instance(&self, id: u64) -> BackendFuture<'_, (), Self::Error>;

    /// Requests a snapshot of an instance's disk.
    fn create_snapshot<'a>(
        &'a self,
        instance_id: u64,
        name: &'a str,
    ) -> BackendFuture<'a, SnapshotHandle, Self::Error>;

    /// Reads the current state of a snapshot.
    fn get_snapshot(&self, id: u64) -> BackendFuture<'_, SnapshotHandle, Self::Error>;

    /// Publishes an image from a finished snapshot.
    fn create_image<'a>(
        &'a self,
        snapshot_id: u64,
        name: &'a str,
        labels: &'a [String],
    ) -> BackendFuture<'a, ImageHandle, Self::Error>;
}
