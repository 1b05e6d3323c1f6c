//! Wire types for the Hyperstack API.
//!
//! Optional fields are decoded leniently: the API returns `null` for
//! addresses that are not yet assigned and omits fields it has no value for.

use serde::{Deserialize, Serialize};

use crate::backend::{ImageHandle, InstanceHandle, InstanceRequest, SecurityRule, SnapshotHandle};
use crate::catalog::{CatalogImage, Environment, Flavor, Keypair, Region};

#[derive(Debug, Serialize)]
pub(super) struct CreateInstanceBody<'a> {
    name: &'a str,
    image_name: &'a str,
    flavor_name: &'a str,
    key_name: &'a str,
    environment_name: &'a str,
    count: u32,
    labels: &'a [String],
    assign_floating_ip: bool,
    security_rules: Vec<SecurityRuleBody<'a>>,
}

impl<'a> From<&'a InstanceRequest> for CreateInstanceBody<'a> {
    fn from(request: &'a InstanceRequest) -> Self {
        Self {
            name: &request.name,
            image_name: &request.base_image,
            flavor_name: &request.flavor,
            key_name: &request.keypair,
            environment_name: &request.environment,
            count: 1,
            labels: &request.labels,
            assign_floating_ip: request.assign_floating_ip,
            security_rules: request.security_rules.iter().map(SecurityRuleBody::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct SecurityRuleBody<'a> {
    direction: &'a str,
    protocol: &'a str,
    ethertype: &'a str,
    remote_ip_prefix: &'a str,
    port_range_min: u16,
    port_range_max: u16,
}

impl<'a> From<&'a SecurityRule> for SecurityRuleBody<'a> {
    fn from(rule: &'a SecurityRule) -> Self {
        Self {
            direction: &rule.direction,
            protocol: &rule.protocol,
            ethertype: &rule.ethertype,
            remote_ip_prefix: &rule.remote_ip_prefix,
            port_range_min: rule.port_range_min,
            port_range_max: rule.port_range_max,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSnapshotBody<'a> {
    pub(super) name: &'a str,
    pub(super) description: String,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateImageBody<'a> {
    pub(super) name: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub(super) labels: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireInstance {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    fixed_ip: Option<String>,
    #[serde(default)]
    floating_ip: Option<String>,
    #[serde(default)]
    floating_ip_status: Option<String>,
}

impl From<WireInstance> for InstanceHandle {
    fn from(wire: WireInstance) -> Self {
        Self {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            status: wire.status.unwrap_or_default(),
            fixed_ip: wire.fixed_ip.unwrap_or_default(),
            floating_ip: wire.floating_ip.unwrap_or_default(),
            floating_ip_status: wire.floating_ip_status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct InstancesData {
    #[serde(default)]
    pub(super) instances: Vec<WireInstance>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InstanceData {
    pub(super) instance: WireInstance,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireSnapshot {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<WireSnapshot> for SnapshotHandle {
    fn from(wire: WireSnapshot) -> Self {
        Self {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            status: wire.status.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SnapshotData {
    pub(super) snapshot: WireSnapshot,
}

#[derive(Debug, Deserialize)]
struct WireLabel {
    label: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireImage {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    is_public: Option<bool>,
    #[serde(default)]
    labels: Option<Vec<WireLabel>>,
}

impl WireImage {
    fn label_names(labels: Option<Vec<WireLabel>>) -> Vec<String> {
        labels
            .unwrap_or_default()
            .into_iter()
            .map(|label| label.label)
            .collect()
    }
}

impl From<WireImage> for ImageHandle {
    fn from(wire: WireImage) -> Self {
        Self {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            labels: WireImage::label_names(wire.labels),
        }
    }
}

impl From<WireImage> for CatalogImage {
    fn from(wire: WireImage) -> Self {
        Self {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            region_name: wire.region_name.unwrap_or_default(),
            size: wire.size.unwrap_or_default(),
            is_public: wire.is_public.unwrap_or_default(),
            labels: WireImage::label_names(wire.labels),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageData {
    pub(super) image: WireImage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImageGroup {
    #[serde(default)]
    pub(super) images: Vec<WireImage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ImagesData {
    #[serde(default)]
    pub(super) images: Vec<ImageGroup>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireRegion {
    id: u64,
    name: String,
}

impl From<WireRegion> for Region {
    fn from(wire: WireRegion) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct RegionsData {
    #[serde(default)]
    pub(super) regions: Vec<WireRegion>,
}

#[derive(Debug, Deserialize)]
pub(super) struct WireFlavor {
    name: String,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    cpu: Option<u32>,
    #[serde(default)]
    ram: Option<f64>,
    #[serde(default)]
    gpu: Option<String>,
    #[serde(default)]
    gpu_count: Option<u32>,
}

impl From<WireFlavor> for Flavor {
    fn from(wire: WireFlavor) -> Self {
        Self {
            name: wire.name,
            region_name: wire.region_name.unwrap_or_default(),
            cpu: wire.cpu.unwrap_or_default(),
            ram: wire.ram.unwrap_or_default(),
            gpu: wire.gpu.unwrap_or_default(),
            gpu_count: wire.gpu_count.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct FlavorGroup {
    #[serde(default)]
    pub(super) flavors: Vec<WireFlavor>,
}

#[derive(Debug, Deserialize)]
pub(super) struct FlavorsData {
    #[serde(default)]
    pub(super) data: Vec<FlavorGroup>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct WireEnvironment {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
}

impl From<WireEnvironment> for Environment {
    fn from(wire: WireEnvironment) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WireKeypair {
    name: String,
    #[serde(default)]
    environment: Option<WireEnvironment>,
}

impl From<WireKeypair> for Keypair {
    fn from(wire: WireKeypair) -> Self {
        Self {
            name: wire.name,
            environment: wire.environment.unwrap_or_default().name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct KeypairsData {
    #[serde(default)]
    pub(super) keypairs: Vec<WireKeypair>,
}

#[derive(Debug, Deserialize)]
pub(super) struct EnvironmentsData {
    #[serde(default)]
    pub(super) environments: Vec<WireEnvironment>,
}
