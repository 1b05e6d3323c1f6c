//! Command-line interface definitions for the `kiln` binary.
//!
//! The parser lives here so the build script can render the manual page from
//! the same definition.

use camino::Utf8PathBuf;
use clap::Parser;

/// Top-level CLI for the `kiln` binary.
#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Bake a GPU machine image on Hyperstack from a build configuration",
    long_about = "Creates a temporary VM from a base image, provisions it over SSH, \
                  snapshots it, and publishes an image from the snapshot. The VM is \
                  always deleted afterwards. When CONFIG does not exist, kiln offers \
                  to write one interactively."
)]
pub(crate) struct Cli {
    /// Path to the JSON build configuration.
    #[arg(value_name = "CONFIG")]
    pub(crate) config: Utf8PathBuf,
}
