//! Behavioural scenarios for `kiln` image builds.

mod build;
