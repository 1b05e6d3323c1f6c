//! Names and labels derived from the build request.

use chrono::Utc;

/// Labels every published image carries regardless of user tags.
pub const PLATFORM_LABELS: [&str; 6] = [
    "kubernetes.io/os=linux",
    "kubernetes.io/arch=amd64",
    "nvidia.com/gpu=true",
    "nvidia.com/cuda=true",
    "container.runtime=docker",
    "image.type=kubernetes-node",
];

/// Source of wall-clock time for resource names.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn epoch_seconds(&self) -> u64;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_seconds(&self) -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// `<vm_name>-<unix seconds>`
#[must_use]
pub fn instance_name(vm_name: &str, started_at: u64) -> String {
    format!("{vm_name}-{started_at}")
}

/// `<vm_name>-snapshot-<unix seconds>`
#[must_use]
pub fn snapshot_name(vm_name: &str, taken_at: u64) -> String {
    format!("{vm_name}-snapshot-{taken_at}")
}

/// `<image_name>_<image_version>`
#[must_use]
pub fn image_name(name: &str, version: &str) -> String {
    format!("{name}_{version}")
}

/// User tags followed by the platform labels, without duplicates.
#[must_use]
pub fn image_labels(tags: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::with_capacity(tags.len() + PLATFORM_LABELS.len());
    for label in tags
        .iter()
        .map(String::as_str)
        .chain(PLATFORM_LABELS.iter().copied())
    {
        if !labels.iter().any(|existing| existing == label) {
            labels.push(label.to_owned());
        }
    }
    labels
}
