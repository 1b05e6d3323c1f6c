//! Interactive authoring of a build configuration.
//!
//! When the configuration file is missing, kiln offers to write one. Choices
//! are offered from the provider catalog when an API key is available; every
//! question also accepts free text, and an empty answer takes the default.

mod prompt;

use std::fmt::Display;

use camino::Utf8Path;
use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::warn;

pub use prompt::{Prompter, TerminalPrompter};

use crate::catalog::{Catalog, CatalogImage, Environment, Flavor, Keypair, Region};
use crate::config::{BuildConfig, DEFAULT_BASE_IMAGE, DEFAULT_FLAVOR, DEFAULT_TAG};

/// Region offered when the catalog does not suggest another.
pub const DEFAULT_REGION: &str = "CANADA-1";
/// Default name for the published image.
pub const DEFAULT_IMAGE_NAME: &str = "kubernetes_gpu_cuda";
/// Default name for the temporary build VM.
pub const DEFAULT_VM_NAME: &str = "thunder-build-vm";
/// Default private key used for SSH.
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "~/.ssh/id_rsa";

const DISPLAY_LIMIT: usize = 10;

/// Errors raised while authoring a configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AuthoringError {
    /// The user declined to create the missing configuration.
    #[error("configuration file is required")]
    Declined,
    /// Reading from or writing to the terminal failed.
    #[error("terminal I/O failed: {0}")]
    Io(String),
}

/// Asks whether a missing configuration at `path` should be created.
///
/// # Errors
///
/// Returns [`AuthoringError::Declined`] unless the answer is `y` or `yes`.
pub fn confirm_creation<P: Prompter>(prompter: &mut P, path: &Utf8Path) -> Result<(), AuthoringError> {
    prompter.say(&format!("Config file '{path}' not found."))?;
    let answer = prompter.ask("Would you like to create it interactively? (y/n)", None)?;
    match answer.to_lowercase().as_str() {
        "y" | "yes" => Ok(()),
        _ => Err(AuthoringError::Declined),
    }
}

/// Formats the default image version for `date`, e.g. `202508.15.0`.
#[must_use]
pub fn default_image_version(date: NaiveDate) -> String {
    date.format("%Y%m.%d.0").to_string()
}

/// Catalog listings offered as choices. Any of them may be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Listings {
    /// Images across all regions.
    pub images: Vec<CatalogImage>,
    /// Available regions.
    pub regions: Vec<Region>,
    /// Flavors across all regions.
    pub flavors: Vec<Flavor>,
    /// Registered keypairs.
    pub keypairs: Vec<Keypair>,
    /// Environments.
    pub environments: Vec<Environment>,
}

impl Listings {
    /// Fetches every listing. A listing that cannot be fetched is logged and
    /// left empty.
    pub async fn fetch<C: Catalog>(catalog: &C) -> Self {
        Self {
            images: settle("images", catalog.list_images().await),
            regions: settle("regions", catalog.list_regions().await),
            flavors: settle("flavors", catalog.list_flavors().await),
            keypairs: settle("keypairs", catalog.list_keypairs().await),
            environments: settle("environments", catalog.list_environments().await),
        }
    }
}

fn settle<T, E: Display>(listing: &str, result: Result<Vec<T>, E>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        warn!(listing, error = %err, "Could not fetch catalog listing");
        Vec::new()
    })
}

/// Resolves a 1-based menu answer against `names`.
fn pick<'a>(answer: &str, names: &[&'a str]) -> Option<&'a str> {
    let number: usize = answer.parse().ok()?;
    names.get(number.checked_sub(1)?).copied()
}

/// Walks the user through every field of a [`BuildConfig`].
pub struct ConfigAuthor<'p, P> {
    prompter: &'p mut P,
    today: NaiveDate,
}

impl<'p, P: Prompter> ConfigAuthor<'p, P> {
    /// Creates an author dating the default version with the local date.
    pub fn new(prompter: &'p mut P) -> Self {
        Self {
            prompter,
            today: Local::now().date_naive(),
        }
    }

    /// Uses `today` for the default image version.
    #[must_use]
    pub const fn dated(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Authors a configuration offering choices from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Io`] when the terminal fails. Catalog
    /// failures are not errors.
    pub async fn author_with_catalog<C: Catalog>(
        self,
        catalog: &C,
    ) -> Result<BuildConfig, AuthoringError> {
        self.prompter.say("Creating configuration file...")?;
        self.prompter
            .say("Fetching available options from Hyperstack API...")?;
        let listings = Listings::fetch(catalog).await;
        self.compose(&listings)
    }

    /// Authors a configuration from defaults and free text only.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Io`] when the terminal fails.
    pub fn author_offline(self) -> Result<BuildConfig, AuthoringError> {
        self.prompter.say("Creating configuration file...")?;
        self.prompter
            .say("(Using default values - API key not available for fetching options)")?;
        self.compose(&Listings::default())
    }

    /// Asks for every field, offering menus built from `listings`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthoringError::Io`] when the terminal fails.
    pub fn compose(mut self, listings: &Listings) -> Result<BuildConfig, AuthoringError> {
        let region = self.choose_region(&listings.regions)?;
        let image_name = self
            .prompter
            .ask("Output image name", Some(DEFAULT_IMAGE_NAME))?;
        let version = default_image_version(self.today);
        let image_version = self.prompter.ask("Output image version", Some(version.as_str()))?;
        let base_image_name = self.choose_base_image(&listings.images, &region)?;
        let vm_name = self.prompter.ask("Temporary VM name", Some(DEFAULT_VM_NAME))?;
        let flavor_name = self.choose_flavor(&listings.flavors, &region)?;
        let keypair_name = self.choose_keypair(&listings.keypairs)?;
        let private_key_path = self
            .prompter
            .ask("Private key path", Some(DEFAULT_PRIVATE_KEY_PATH))?;
        let environment_name = self.choose_environment(&listings.environments, &region)?;
        let tags = self.collect_tags()?;

        Ok(BuildConfig {
            region,
            image_name,
            image_version,
            base_image_name,
            vm_name,
            flavor_name,
            keypair_name,
            private_key_path,
            environment_name,
            tags,
            provisioning: None,
        })
    }

    fn list<T>(
        &mut self,
        items: &[T],
        describe: impl Fn(&T) -> String,
    ) -> Result<(), AuthoringError> {
        for (index, item) in items.iter().enumerate() {
            if index >= DISPLAY_LIMIT {
                self.prompter
                    .say(&format!("  ... (showing first {DISPLAY_LIMIT})"))?;
                break;
            }
            self.prompter
                .say(&format!("  {}. {}", index.saturating_add(1), describe(item)))?;
        }
        Ok(())
    }

    /// Asks for a menu choice among the displayed `names`, accepting free text.
    fn choose(
        &mut self,
        label: &str,
        names: &[&str],
        default: Option<&str>,
    ) -> Result<String, AuthoringError> {
        let shown = names.get(..DISPLAY_LIMIT).unwrap_or(names);
        let prompt = format!("{label} (1-{}) or enter custom name", shown.len());
        let answer = self.prompter.ask(&prompt, default)?;
        Ok(pick(&answer, shown).map_or(answer, str::to_owned))
    }

    fn choose_region(&mut self, regions: &[Region]) -> Result<String, AuthoringError> {
        if regions.is_empty() {
            return Ok(DEFAULT_REGION.to_owned());
        }
        self.prompter.say("Available regions:")?;
        self.list(regions, |region| format!("{} (ID: {})", region.name, region.id))?;
        let names: Vec<&str> = regions.iter().map(|region| region.name.as_str()).collect();
        let default_index = names
            .iter()
            .position(|name| *name == DEFAULT_REGION)
            .map_or(1, |index| index.saturating_add(1));
        let shown = names.get(..DISPLAY_LIMIT).unwrap_or(&names);
        let prompt = format!("Select region (1-{})", shown.len());
        let answer = self
            .prompter
            .ask(&prompt, Some(default_index.to_string().as_str()))?;
        let region = pick(&answer, shown).unwrap_or(DEFAULT_REGION).to_owned();
        self.prompter.say(&format!("Selected region: {region}"))?;
        Ok(region)
    }

    fn choose_base_image(
        &mut self,
        images: &[CatalogImage],
        region: &str,
    ) -> Result<String, AuthoringError> {
        let in_region: Vec<&CatalogImage> = images
            .iter()
            .filter(|image| image.region_name == region)
            .collect();
        let mut candidates: Vec<&CatalogImage> = in_region
            .iter()
            .copied()
            .filter(|image| image.is_kubernetes())
            .collect();
        if candidates.is_empty() && !in_region.is_empty() {
            candidates = in_region
                .iter()
                .copied()
                .filter(|image| image.is_ubuntu_docker())
                .collect();
            if !candidates.is_empty() {
                self.prompter
                    .say("No k8s-labeled images found, showing Ubuntu/Docker images:")?;
            }
        }
        if candidates.is_empty() {
            return self.prompter.ask("Base image name", Some(DEFAULT_BASE_IMAGE));
        }

        self.prompter
            .say(&format!("Available base images in {region}:"))?;
        self.list(&candidates, |image| {
            format!("{} (Size: {}GB, Public: {})", image.name, image.size, image.is_public)
        })?;
        let names: Vec<&str> = candidates.iter().map(|image| image.name.as_str()).collect();
        self.choose("Select base image", &names, Some("1"))
    }

    fn choose_flavor(&mut self, flavors: &[Flavor], region: &str) -> Result<String, AuthoringError> {
        let gpu_flavors: Vec<&Flavor> = flavors
            .iter()
            .filter(|flavor| flavor.region_name == region && flavor.gpu_count > 0)
            .collect();
        if gpu_flavors.is_empty() {
            return self.prompter.ask("VM flavor", Some(DEFAULT_FLAVOR));
        }

        self.prompter
            .say(&format!("Available GPU flavors in {region}:"))?;
        self.list(&gpu_flavors, |flavor| {
            format!(
                "{} (CPU: {}, RAM: {}GB, GPU: {} {})",
                flavor.name, flavor.cpu, flavor.ram, flavor.gpu_count, flavor.gpu
            )
        })?;
        let names: Vec<&str> = gpu_flavors.iter().map(|flavor| flavor.name.as_str()).collect();
        self.choose("Select flavor", &names, Some("1"))
    }

    fn choose_keypair(&mut self, keypairs: &[Keypair]) -> Result<String, AuthoringError> {
        if keypairs.is_empty() {
            return self.prompter.ask("SSH keypair name", None);
        }

        self.prompter.say("Available keypairs:")?;
        self.list(keypairs, |keypair| {
            format!("{} (Environment: {})", keypair.name, keypair.environment)
        })?;
        let names: Vec<&str> = keypairs.iter().map(|keypair| keypair.name.as_str()).collect();
        self.choose("Select keypair", &names, None)
    }

    fn choose_environment(
        &mut self,
        environments: &[Environment],
        region: &str,
    ) -> Result<String, AuthoringError> {
        let fallback = format!("default-{region}");
        if environments.is_empty() {
            return self.prompter.ask("Environment name", Some(fallback.as_str()));
        }

        let matching: Vec<&Environment> = environments
            .iter()
            .filter(|environment| environment.name.contains(region))
            .collect();
        if matching.is_empty() {
            self.prompter.say(&format!(
                "No environments found for {region}, using {fallback}"
            ))?;
            return Ok(fallback);
        }

        self.prompter
            .say(&format!("Available environments in {region}:"))?;
        self.list(&matching, |environment| environment.name.clone())?;
        let names: Vec<&str> = matching
            .iter()
            .map(|environment| environment.name.as_str())
            .collect();
        self.choose("Select environment", &names, Some("1"))
    }

    fn collect_tags(&mut self) -> Result<Vec<String>, AuthoringError> {
        self.prompter.say("Configure tags (simple labels):")?;
        let mut tags = vec![DEFAULT_TAG.to_owned()];
        self.prompter.say(&format!("  Added: {DEFAULT_TAG}"))?;
        self.prompter
            .say("Add custom labels (empty line to finish):")?;
        loop {
            let label = self.prompter.ask("Custom label", None)?;
            if label.is_empty() {
                break;
            }
            self.prompter.say(&format!("  Added: {label}"))?;
            tags.push(label);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests;
