//! Read-only provider catalog used when authoring a build configuration.

use crate::backend::BackendFuture;

/// Label marking an image as a Kubernetes node image.
const KUBERNETES_LABELS: [&str; 2] = ["k8s", "kubernetes"];

/// Image listed in the provider catalog.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CatalogImage {
    /// Provider identifier.
    pub id: u64,
    /// Image name.
    pub name: String,
    /// Region hosting the image.
    pub region_name: String,
    /// Image size in gigabytes.
    pub size: u64,
    /// Whether the image is visible to all tenants.
    pub is_public: bool,
    /// Free-form labels attached to the image.
    pub labels: Vec<String>,
}

impl CatalogImage {
    /// Returns `true` when any label marks the image as a Kubernetes node.
    #[must_use]
    pub fn is_kubernetes(&self) -> bool {
        self.labels.iter().any(|label| {
            let lowered = label.to_lowercase();
            KUBERNETES_LABELS
                .iter()
                .any(|marker| lowered.contains(marker))
        })
    }

    /// Returns `true` for Ubuntu images that ship Docker.
    #[must_use]
    pub fn is_ubuntu_docker(&self) -> bool {
        let lowered = self.name.to_lowercase();
        lowered.contains("ubuntu") && lowered.contains("docker")
    }
}

/// Provider region.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Region {
    /// Provider identifier.
    pub id: u64,
    /// Region name (for example `CANADA-1`).
    pub name: String,
}

/// Hardware flavor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Flavor {
    /// Flavor name (for example `n1-A100x1`).
    pub name: String,
    /// Region offering the flavor.
    pub region_name: String,
    /// Virtual CPU count.
    pub cpu: u32,
    /// Memory in gigabytes.
    pub ram: f64,
    /// GPU model, empty for CPU-only flavors.
    pub gpu: String,
    /// Number of GPUs attached.
    pub gpu_count: u32,
}

/// SSH keypair registered with the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Keypair {
    /// Keypair name.
    pub name: String,
    /// Environment owning the keypair.
    pub environment: String,
}

/// Provider environment.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Environment {
    /// Provider identifier.
    pub id: u64,
    /// Environment name.
    pub name: String,
}

/// Catalog listings used to offer choices while authoring a configuration.
pub trait Catalog {
    /// Provider specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists images across all regions.
    fn list_images(&self) -> BackendFuture<'_, Vec<CatalogImage>, Self::Error>;

    /// Lists regions.
    fn list_regions(&self) -> BackendFuture<'_, Vec<Region>, Self::Error>;

    /// Lists flavors across all regions.
    fn list_flavors(&self) -> BackendFuture<'_, Vec<Flavor>, Self::Error>;

    /// Lists keypairs.
    fn list_keypairs(&self) -> BackendFuture<'_, Vec<Keypair>, Self::Error>;

    /// Lists environments.
    fn list_environments(&self) -> BackendFuture<'_, Vec<Environment>, Self::Error>;
}
