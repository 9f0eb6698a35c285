//! Topology CLI entrypoint.
//!
//! This is the main entrypoint for the topology command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use openstack_topology::bootstrap::{Bootstrapper, NoopBootstrapper, SshBootstrapper, SshOptions};
use openstack_topology::cli::{Cli, Commands, EnvironmentArgs, OutputFormat, OutputFormatter};
use openstack_topology::config::{ConfigParser, ConfigValidator, OpenStackCredentials, Settings};
use openstack_topology::error::Result;
use openstack_topology::naming::DeployParams;
use openstack_topology::openstack::{
    OpenStackClient, Reporter, ResourceFacade, SilentReporter, VerboseReporter,
};
use openstack_topology::topology::{EnvironmentInspector, TopologyBuilder};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // One build runs its calls strictly in sequence
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let reporter = select_reporter(&cli);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Build {
            target,
            server_size,
            destroy: true,
            no_load_balancers,
            ..
        } => {
            cmd_destroy(config, &target, &server_size, no_load_balancers, reporter, &formatter)
                .await
        }
        Commands::Build {
            target,
            server_size,
            no_load_balancers,
            skip_bootstrap,
            identity_file,
            ..
        } => {
            let options = BuildOptions {
                no_load_balancers,
                skip_bootstrap,
                identity_file,
            };
            cmd_build(config, &target, &server_size, options, reporter, &formatter).await
        }
        Commands::Status {
            target,
            no_load_balancers,
        } => cmd_status(config, &target, no_load_balancers, &formatter).await,
        Commands::Validate {
            target,
            server_size,
        } => cmd_validate(config, &target, &server_size, &formatter).await,
    }
}

/// Build flags that do not affect resource names.
struct BuildOptions {
    no_load_balancers: bool,
    skip_bootstrap: bool,
    identity_file: Option<PathBuf>,
}

/// Build an environment.
async fn cmd_build(
    config: Option<&Path>,
    target: &EnvironmentArgs,
    server_size: &str,
    options: BuildOptions,
    reporter: Arc<dyn Reporter>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let settings = load_settings(config)?;
    let params = deploy_params(target, server_size, &settings, options.no_load_balancers);
    validate_params(&settings, &params)?;

    let credentials = OpenStackCredentials::from_env()?;
    let facade = connect(&credentials, &settings, reporter).await?;

    if options.skip_bootstrap {
        info!("Skipping host configuration");
        return run_build(facade, NoopBootstrapper, params, &settings, formatter).await;
    }

    let ssh = SshOptions::new(
        settings.deployment.ssh_user.clone(),
        settings.deployment.salt_states_repo.clone(),
    )
    .with_identity_file(options.identity_file);
    let bootstrapper = SshBootstrapper::new(ssh, credentials, settings.cloud.public_network.clone());

    run_build(facade, bootstrapper, params, &settings, formatter).await
}

/// Tear an environment down.
async fn cmd_destroy(
    config: Option<&Path>,
    target: &EnvironmentArgs,
    server_size: &str,
    no_load_balancers: bool,
    reporter: Arc<dyn Reporter>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let settings = load_settings(config)?;
    let params = deploy_params(target, server_size, &settings, no_load_balancers);
    validate_params(&settings, &params)?;

    let credentials = OpenStackCredentials::from_env()?;
    let facade = connect(&credentials, &settings, reporter).await?;

    let builder = TopologyBuilder::new(facade, NoopBootstrapper, params)
        .with_key_pair_name(settings.deployment.key_pair_name.clone());
    builder.destroy().await?;

    emit(&formatter.format_destroyed(&target.app, &target.environment))
}

/// Show which resources of an environment exist.
async fn cmd_status(
    config: Option<&Path>,
    target: &EnvironmentArgs,
    no_load_balancers: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let settings = load_settings(config)?;
    let params = deploy_params(target, "", &settings, no_load_balancers);

    let credentials = OpenStackCredentials::from_env()?;
    let client =
        OpenStackClient::connect(&credentials, &settings.cloud.endpoint_interface).await?;

    let status = EnvironmentInspector::new(&client, &settings.cloud)
        .inspect(&params)
        .await?;

    emit(&formatter.format_status(&status))
}

/// Check the image and flavor without creating anything.
async fn cmd_validate(
    config: Option<&Path>,
    target: &EnvironmentArgs,
    server_size: &str,
    formatter: &OutputFormatter,
) -> Result<()> {
    let settings = load_settings(config)?;
    let params = deploy_params(target, server_size, &settings, false);
    validate_params(&settings, &params)?;

    let credentials = OpenStackCredentials::from_env()?;
    let facade = connect(&credentials, &settings, Arc::new(SilentReporter)).await?;

    let builder = TopologyBuilder::new(facade, NoopBootstrapper, params);
    let warning = builder.validate().await?;

    emit(&formatter.format_validation(
        &builder.params().image_name,
        server_size,
        warning.as_deref(),
    ))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads `.env` and the settings file.
fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let parser = ConfigParser::new();
    parser.load_dotenv()?;
    parser.load(config)
}

/// Combines the command-line target with the settings defaults.
fn deploy_params(
    target: &EnvironmentArgs,
    server_size: &str,
    settings: &Settings,
    no_load_balancers: bool,
) -> DeployParams {
    DeployParams::new(
        &target.app,
        &target.environment,
        target.num_servers,
        server_size,
        &settings.deployment.image_name,
    )
    .with_load_balancers(settings.deployment.load_balancers && !no_load_balancers)
}

/// Validates settings and parameters, logging any warnings.
fn validate_params(settings: &Settings, params: &DeployParams) -> Result<()> {
    let result = ConfigValidator::new().validate(settings, params)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok(())
}

/// Authenticates and wraps the client in a facade.
async fn connect(
    credentials: &OpenStackCredentials,
    settings: &Settings,
    reporter: Arc<dyn Reporter>,
) -> Result<ResourceFacade<OpenStackClient>> {
    let client = OpenStackClient::connect(credentials, &settings.cloud.endpoint_interface).await?;
    Ok(ResourceFacade::new(
        client,
        settings.cloud.clone(),
        settings.wait.clone(),
        reporter,
    ))
}

/// Runs a build with the given bootstrapper and prints the report.
async fn run_build<B: Bootstrapper>(
    facade: ResourceFacade<OpenStackClient>,
    bootstrapper: B,
    params: DeployParams,
    settings: &Settings,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut builder = TopologyBuilder::new(facade, bootstrapper, params)
        .with_key_pair_name(settings.deployment.key_pair_name.clone());

    match builder.build().await {
        Ok(report) => emit(&formatter.format_build(&report)),
        Err(e) => {
            error!("Build stopped after stage {}", builder.stage());
            Err(e)
        }
    }
}

/// Picks how resource progress is shown.
fn select_reporter(cli: &Cli) -> Arc<dyn Reporter> {
    if cli.quiet || cli.output == OutputFormat::Json {
        Arc::new(SilentReporter)
    } else {
        Arc::new(VerboseReporter::new(cli.verbose))
    }
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}
