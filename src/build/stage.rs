//! Build lifecycle stages.

use std::fmt;

/// Stage the build has reached. Stages only advance; a failure is reported
/// together with the stage it happened in.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum BuildStage {
    /// Inputs accepted, nothing created yet.
    Created,
    /// Instance creation requested.
    InstanceRequested,
    /// Instance active with an attached floating IP.
    InstanceReady,
    /// Provisioning plan applied.
    Provisioned,
    /// Snapshot requested.
    SnapshotRequested,
    /// Snapshot finished.
    SnapshotReady,
    /// Image publication requested.
    ImageRequested,
    /// Image published.
    Complete,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::InstanceRequested => "instance-requested",
            Self::InstanceReady => "instance-ready",
            Self::Provisioned => "provisioned",
            Self::SnapshotRequested => "snapshot-requested",
            Self::SnapshotReady => "snapshot-ready",
            Self::ImageRequested => "image-requested",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}
