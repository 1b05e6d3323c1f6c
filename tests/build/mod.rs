//! Image build behaviour driven through a configuration file on disk.

mod bdd_steps;
mod scenarios;
mod test_helpers;
