//! BDD scenarios for the image build workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{BuildContext, build_context};

#[scenario(
    path = "tests/features/build.feature",
    name = "Bake an image from a configuration file"
)]
fn scenario_bake_image(build_context: BuildContext) {
    drop(build_context);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "A failing provisioning script stops the build"
)]
fn scenario_failing_script(build_context: BuildContext) {
    drop(build_context);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "A failed cleanup does not fail the build"
)]
fn scenario_cleanup_failure(build_context: BuildContext) {
    drop(build_context);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "An instance that never becomes ready times out"
)]
fn scenario_readiness_timeout(build_context: BuildContext) {
    drop(build_context);
}

#[scenario(
    path = "tests/features/build.feature",
    name = "A missing script is caught before any instance exists"
)]
fn scenario_missing_script(build_context: BuildContext) {
    drop(build_context);
}
