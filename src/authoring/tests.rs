//! Unit tests for configuration authoring.

use std::io::Cursor;

use camino::Utf8Path;
use chrono::NaiveDate;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{ScriptedPrompter, StaticCatalog};

#[fixture]
fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 15).expect("valid date")
}

fn image(name: &str, region: &str, labels: &[&str]) -> CatalogImage {
    CatalogImage {
        id: 1,
        name: name.to_owned(),
        region_name: region.to_owned(),
        size: 50,
        is_public: true,
        labels: labels.iter().map(|label| (*label).to_owned()).collect(),
    }
}

fn gpu_flavor(name: &str, region: &str, gpu_count: u32) -> Flavor {
    Flavor {
        name: name.to_owned(),
        region_name: region.to_owned(),
        cpu: 28,
        ram: 120.0,
        gpu: "A100-80G-PCIe".to_owned(),
        gpu_count,
    }
}

fn region(id: u64, name: &str) -> Region {
    Region {
        id,
        name: name.to_owned(),
    }
}

fn environment(id: u64, name: &str) -> Environment {
    Environment {
        id,
        name: name.to_owned(),
    }
}

fn catalog() -> StaticCatalog {
    StaticCatalog {
        images: vec![
            image("Ubuntu 22.04 Docker", "CANADA-1", &[]),
            image("k8s-node-1.29", "CANADA-1", &["k8s"]),
            image("k8s-node-norway", "NORWAY-1", &["kubernetes"]),
        ],
        regions: vec![region(1, "NORWAY-1"), region(2, "CANADA-1")],
        flavors: vec![
            gpu_flavor("n1-cpu-small", "CANADA-1", 0),
            gpu_flavor("n1-A100x1", "CANADA-1", 1),
            gpu_flavor("n1-A100x8", "NORWAY-1", 8),
        ],
        keypairs: vec![Keypair {
            name: "builder-key".to_owned(),
            environment: "default-CANADA-1".to_owned(),
        }],
        environments: vec![
            environment(10, "default-NORWAY-1"),
            environment(11, "default-CANADA-1"),
        ],
        unavailable: false,
    }
}

#[rstest]
#[case("y")]
#[case("YES")]
#[case("Yes")]
fn confirm_creation_accepts_yes(#[case] answer: &str) {
    let mut prompter = ScriptedPrompter::new(&[answer]);
    confirm_creation(&mut prompter, Utf8Path::new("build.json")).expect("confirmed");
    assert!(prompter.said("Config file 'build.json' not found."));
}

#[rstest]
#[case("n")]
#[case("")]
#[case("sure")]
fn confirm_creation_declines_anything_else(#[case] answer: &str) {
    let mut prompter = ScriptedPrompter::new(&[answer]);
    let err = confirm_creation(&mut prompter, Utf8Path::new("build.json"))
        .expect_err("declined");
    assert_eq!(err, AuthoringError::Declined);
    assert_eq!(err.to_string(), "configuration file is required");
}

#[rstest]
fn default_version_follows_date(today: NaiveDate) {
    assert_eq!(default_image_version(today), "202508.15.0");
}

#[rstest]
fn offline_authoring_takes_every_default(today: NaiveDate) {
    let mut prompter = ScriptedPrompter::new(&[]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .author_offline()
        .expect("authored");

    assert_eq!(config.region, DEFAULT_REGION);
    assert_eq!(config.image_name, DEFAULT_IMAGE_NAME);
    assert_eq!(config.image_version, "202508.15.0");
    assert_eq!(config.base_image_name, DEFAULT_BASE_IMAGE);
    assert_eq!(config.vm_name, DEFAULT_VM_NAME);
    assert_eq!(config.flavor_name, DEFAULT_FLAVOR);
    assert_eq!(config.keypair_name, "");
    assert_eq!(config.private_key_path, DEFAULT_PRIVATE_KEY_PATH);
    assert_eq!(config.environment_name, "default-CANADA-1");
    assert_eq!(config.tags, vec!["k8s".to_owned()]);
    assert!(config.provisioning.is_none());
    assert!(prompter.said("API key not available"));
}

#[rstest]
#[tokio::test]
async fn catalog_authoring_offers_region_filtered_menus(today: NaiveDate) {
    // region, name, version, base image, vm, flavor, keypair, key, env, labels
    let mut prompter = ScriptedPrompter::new(&[
        "", "", "", "1", "", "1", "1", "", "", "gpu", "cuda-12", "",
    ]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .author_with_catalog(&catalog())
        .await
        .expect("authored");

    assert_eq!(prompter.default_for("Select region"), Some("2"));
    assert_eq!(config.region, "CANADA-1");
    assert_eq!(config.base_image_name, "k8s-node-1.29");
    assert_eq!(config.flavor_name, "n1-A100x1");
    assert_eq!(config.keypair_name, "builder-key");
    assert_eq!(config.environment_name, "default-CANADA-1");
    assert_eq!(config.tags, vec!["k8s", "gpu", "cuda-12"]);
    assert!(!prompter.said("k8s-node-norway"));
    assert!(!prompter.said("n1-cpu-small"));
    assert!(prompter.said("Selected region: CANADA-1"));
}

#[rstest]
fn region_choice_out_of_range_falls_back(today: NaiveDate) {
    let listings = Listings {
        regions: vec![region(1, "NORWAY-1"), region(2, "US-1")],
        ..Listings::default()
    };
    let mut prompter = ScriptedPrompter::new(&["7"]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&listings)
        .expect("authored");

    assert_eq!(prompter.default_for("Select region"), Some("1"));
    assert_eq!(config.region, DEFAULT_REGION);
}

#[rstest]
fn region_choice_is_limited_to_displayed_entries(today: NaiveDate) {
    let regions = (0..12)
        .map(|index| region(index, &format!("REGION-{index}")))
        .collect();
    let mut prompter = ScriptedPrompter::new(&["11"]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&Listings {
            regions,
            ..Listings::default()
        })
        .expect("authored");

    assert!(!prompter.said("REGION-10"));
    assert!(
        prompter
            .questions()
            .iter()
            .any(|(prompt, _)| prompt == "Select region (1-10)")
    );
    assert_eq!(config.region, DEFAULT_REGION);
}

#[rstest]
fn base_image_falls_back_to_ubuntu_docker(today: NaiveDate) {
    let listings = Listings {
        images: vec![
            image("Debian 12", "CANADA-1", &[]),
            image("Ubuntu 22.04 with Docker", "CANADA-1", &[]),
        ],
        ..Listings::default()
    };
    let mut prompter = ScriptedPrompter::new(&["", "", "1"]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&listings)
        .expect("authored");

    assert!(prompter.said("No k8s-labeled images found"));
    assert!(!prompter.said("Debian 12"));
    assert_eq!(config.base_image_name, "Ubuntu 22.04 with Docker");
}

#[rstest]
fn menus_accept_custom_names(today: NaiveDate) {
    let mut prompter = ScriptedPrompter::new(&[
        "",
        "",
        "my-custom-image",
        "",
        "n3-H100x1",
        "other-key",
    ]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&Listings {
            images: vec![image("k8s-node", "CANADA-1", &["k8s"])],
            flavors: vec![gpu_flavor("n1-A100x1", "CANADA-1", 1)],
            keypairs: vec![Keypair {
                name: "builder-key".to_owned(),
                environment: String::new(),
            }],
            ..Listings::default()
        })
        .expect("authored");

    assert_eq!(config.base_image_name, "my-custom-image");
    assert_eq!(config.flavor_name, "n3-H100x1");
    assert_eq!(config.keypair_name, "other-key");
}

#[rstest]
fn environment_without_regional_match_uses_region_default(today: NaiveDate) {
    let listings = Listings {
        environments: vec![environment(10, "default-NORWAY-1")],
        ..Listings::default()
    };
    let mut prompter = ScriptedPrompter::new(&[]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&listings)
        .expect("authored");

    assert_eq!(config.environment_name, "default-CANADA-1");
    assert!(prompter.said("No environments found for CANADA-1"));
    assert!(
        prompter
            .questions()
            .iter()
            .all(|(prompt, _)| !prompt.starts_with("Environment name"))
    );
}

#[rstest]
fn long_menus_show_the_first_ten(today: NaiveDate) {
    let flavors = (0..12)
        .map(|index| gpu_flavor(&format!("gpu-{index}"), "CANADA-1", 1))
        .collect();
    let mut prompter = ScriptedPrompter::new(&["", "", "", "", "11"]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .compose(&Listings {
            flavors,
            ..Listings::default()
        })
        .expect("authored");

    assert!(prompter.said("  10. gpu-9"));
    assert!(!prompter.said("gpu-10"));
    assert!(prompter.said("... (showing first 10)"));
    assert_eq!(config.flavor_name, "11");
}

#[rstest]
#[tokio::test]
async fn unavailable_catalog_degrades_to_free_text(today: NaiveDate) {
    let unavailable = StaticCatalog {
        unavailable: true,
        ..catalog()
    };
    let mut prompter = ScriptedPrompter::new(&[]);
    let config = ConfigAuthor::new(&mut prompter)
        .dated(today)
        .author_with_catalog(&unavailable)
        .await
        .expect("authored");

    assert_eq!(config.region, DEFAULT_REGION);
    assert_eq!(config.base_image_name, DEFAULT_BASE_IMAGE);
    assert_eq!(config.flavor_name, DEFAULT_FLAVOR);
}

#[rstest]
fn terminal_prompter_shows_default_and_trims_answers() {
    let mut prompter = TerminalPrompter::new(Cursor::new("  custom  \n"), Vec::new());
    let answer = prompter.ask("Temporary VM name", Some("vm")).expect("answer");
    assert_eq!(answer, "custom");
    let output = String::from_utf8(prompter.into_output()).expect("utf8");
    assert_eq!(output, "Temporary VM name [vm]: ");
}

#[rstest]
fn terminal_prompter_treats_eof_as_empty() {
    let mut prompter = TerminalPrompter::new(Cursor::new(""), Vec::new());
    assert_eq!(prompter.ask("Custom label", None).expect("answer"), "");
    assert_eq!(
        prompter.ask("VM flavor", Some("n1-A100x1")).expect("answer"),
        "n1-A100x1"
    );
    prompter.say("done").expect("say");
    let output = String::from_utf8(prompter.into_output()).expect("utf8");
    assert_eq!(output, "Custom label: VM flavor [n1-A100x1]: done\n");
}
