//! Binary entry point for the kiln image builder.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use kiln::session::SessionConfigLoadError;
use kiln::{
    ApiConfig, AuthoringError, BuildConfigStore, BuildError, BuildOrchestrator, ConfigAuthor,
    ConfigError, ConfigStoreError, HyperstackBackend, HyperstackError, Prompter,
    ProvisioningPipeline, SessionConfig, SessionError, SshConnector, StreamingCommandRunner,
    TerminalPrompter, confirm_creation, render_error_chain,
};

mod cli;

use cli::Cli;

const DEFAULT_LOG_FILTER: &str = "kiln=info";

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] ConfigStoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Authoring(#[from] AuthoringError),
    #[error("Hyperstack client error: {0}")]
    Backend(#[from] HyperstackError),
    #[error(transparent)]
    SessionConfig(#[from] SessionConfigLoadError),
    #[error("SSH configuration rejected: {0}")]
    Session(#[from] SessionError),
    #[error("image build failed")]
    Build(#[from] BuildError<HyperstackError>),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let store = BuildConfigStore::new(cli.config);
    if store.exists()? {
        build_image(&store).await
    } else {
        author_config(&store).await
    }
}

async fn author_config(store: &BuildConfigStore) -> Result<(), CliError> {
    let mut prompter = TerminalPrompter::stdio();
    confirm_creation(&mut prompter, store.path())?;

    let api = ApiConfig::load_without_cli_args()?;
    let author = ConfigAuthor::new(&mut prompter);
    let config = if api.api_key().is_some() {
        let catalog = HyperstackBackend::from_config(&api)?;
        author.author_with_catalog(&catalog).await?
    } else {
        author.author_offline()?
    };

    store.save(&config)?;
    prompter.say(&format!("Configuration saved to {}", store.path()))?;
    prompter.say("Review the configuration, then run kiln again to start the build.")?;
    Ok(())
}

async fn build_image(store: &BuildConfigStore) -> Result<(), CliError> {
    let config = store.load()?;
    let spec = config.to_build_spec()?;

    let api = ApiConfig::load_without_cli_args()?;
    let backend = HyperstackBackend::from_config(&api)?;
    let connector = SshConnector::new(
        SessionConfig::load_without_cli_args()?,
        StreamingCommandRunner,
    )?;
    let pipeline = ProvisioningPipeline::new(config.provisioning_plan());

    info!(
        config = %store.path(),
        "Building {} {}", config.image_name, config.image_version
    );
    let report = BuildOrchestrator::new(backend, connector, pipeline)
        .execute(&spec)
        .await?;
    info!(
        image_id = report.image.id,
        instance_deleted = report.instance_deleted,
        "Image created successfully: {} (ID: {})",
        report.image.name,
        report.image.id
    );
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "Error: {}", render_error_chain(err)).ok();
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use kiln::build::BuildStage;

    use super::*;

    #[test]
    fn write_error_renders_the_cause_chain() {
        let err = CliError::Build(BuildError::ReadinessTimeout {
            stage: BuildStage::InstanceRequested,
            resource: String::from("instance 42"),
            attempts: 60,
        });
        let mut buf = Vec::new();
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert!(
            rendered.starts_with("Error: image build failed: "),
            "rendered: {rendered}"
        );
        assert!(rendered.contains("after 60 polls"), "rendered: {rendered}");
    }

    #[test]
    fn write_error_does_not_repeat_embedded_causes() {
        let err = CliError::Store(ConfigStoreError::Parse {
            path: Utf8PathBuf::from("build.json"),
            message: String::from("expected value at line 1 column 1"),
        });
        let mut buf = Vec::new();
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            rendered,
            "Error: failed to parse build.json: expected value at line 1 column 1\n"
        );
    }
}
