use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, anyhow};
use clap::{Parser, Subcommand, ValueEnum};

use workshop_engine::cmd::container_runtime::ContainerRuntime;
use workshop_engine::constants::{DEFAULT_ENV_FILE, WORKSHOP_GUID};
use workshop_engine::errors::{ErrorMessageVerbosity, WorkshopError};
use workshop_engine::io_models::context::Context;
use workshop_engine::io_models::workshop::WorkshopConfig;
use workshop_engine::logger::{LogLevel, init_logger};
use workshop_engine::provisioning::ee::{RegistryCredentials, build_ee};
use workshop_engine::provisioning::{self, aap, cluster, playbook};
use workshop_engine::validation::{ValidateRequest, validate};

/// Provisions and validates workshop environments on OpenShift and Ansible Automation Platform
#[derive(Parser)]
#[command(name = "workshop", version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Environment file written at init and read by every other command
    #[arg(long, global = true, env = "WORKSHOP_ENV_FILE", default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,

    /// Workshop definition (YAML), built-in defaults when absent
    #[arg(long, global = true, env = "WORKSHOP_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig used by oc, kept apart from the user's one when set
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Directory relative paths are resolved from
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// JSON logs, always on when CI is set
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the details file and write the environment file
    Init {
        #[arg(long)]
        details: PathBuf,
        /// Overwrite an existing environment file
        #[arg(long)]
        force: bool,
    },

    /// Log into the cluster with the environment file credentials
    Login,

    /// Create the workshop namespaces, service account and role bindings
    SetupCluster,

    /// Create the controller resources and record their ids
    ConfigureAap,

    /// Build the execution environment image
    BuildEe {
        /// Push the image once built
        #[arg(long)]
        push: bool,
        #[arg(long, env = "REGISTRY_USERNAME", requires = "registry_password")]
        registry_username: Option<String>,
        #[arg(long, env = "REGISTRY_PASSWORD", hide_env_values = true, requires = "registry_username")]
        registry_password: Option<String>,
    },

    /// Run a playbook with the environment file values exported
    RunPlaybook {
        playbook: PathBuf,
        #[arg(short, long)]
        inventory: Option<String>,
        /// Extra variable as key=value, repeatable
        #[arg(short = 'e', long = "extra-vars")]
        extra_vars: Vec<String>,
    },

    /// init, login, setup-cluster and configure-aap in a row
    Provision {
        #[arg(long)]
        details: PathBuf,
        #[arg(long)]
        force: bool,
    },

    /// Check the live environment, exits 1 when a critical check fails
    Validate {
        namespace: String,
        /// Defaults to dev
        environment: Option<String>,
        /// host, host:port or URL, defaults to the environment file value
        mainframe_host: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn workshop_error(err: WorkshopError) -> anyhow::Error {
    anyhow!(
        err.to_command_error()
            .message(ErrorMessageVerbosity::FullDetailsWithoutEnvVars)
    )
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = WorkshopConfig::load(cli.config.as_deref())
        .map_err(|e| workshop_error(e.into()))
        .context("cannot load the workshop definition")?;
    let context = Context::new(cli.workspace, cli.env_file, cli.kubeconfig, config);

    match cli.command {
        Commands::Init { details, force } => {
            let env_file = provisioning::init(&context, &details, force).map_err(workshop_error)?;
            println!("Environment file written to {}", env_file.path().display());
        }
        Commands::Login => {
            let (_, details) = provisioning::load_workshop(&context).map_err(workshop_error)?;
            let oc = provisioning::cluster_client(&context).map_err(workshop_error)?;
            let user = cluster::login(&context, &oc, &details).map_err(workshop_error)?;
            println!("Logged into {} as {}", details.cluster.api_url, user);
        }
        Commands::SetupCluster => {
            let (_, details) = provisioning::load_workshop(&context).map_err(workshop_error)?;
            let oc = provisioning::cluster_client(&context).map_err(workshop_error)?;
            let summary = cluster::setup_cluster(&context, &oc, &details.guid).map_err(workshop_error)?;
            println!("{summary}");
        }
        Commands::ConfigureAap => {
            let (mut env_file, details) = provisioning::load_workshop(&context).map_err(workshop_error)?;
            let oc = provisioning::cluster_client(&context).map_err(workshop_error)?;
            let ensurer = provisioning::resource_ensurer(&context, &details).map_err(workshop_error)?;
            let summary =
                aap::configure_aap(&context, &oc, &ensurer, &details, &mut env_file).map_err(workshop_error)?;
            println!("{summary}");
        }
        Commands::BuildEe {
            push,
            registry_username,
            registry_password,
        } => {
            let env_file = context.load_env_file().map_err(|e| workshop_error(e.into()))?;
            let guid = env_file
                .require(WORKSHOP_GUID)
                .map_err(|e| workshop_error(e.into()))?
                .to_string();
            let runtime = ContainerRuntime::detect().map_err(|e| workshop_error(e.into()))?;
            let credentials = registry_username
                .zip(registry_password)
                .map(|(username, password)| RegistryCredentials { username, password });
            let tag = build_ee(&context, &guid, &runtime, push, credentials.as_ref()).map_err(workshop_error)?;
            println!("Execution environment image {tag} ready");
        }
        Commands::RunPlaybook {
            playbook: playbook_path,
            inventory,
            extra_vars,
        } => {
            let env_file = context.load_env_file().map_err(|e| workshop_error(e.into()))?;
            playbook::run_playbook(&context, &env_file, &playbook_path, inventory.as_deref(), &extra_vars)
                .map_err(workshop_error)?;
        }
        Commands::Provision { details, force } => {
            let summary = provisioning::provision(&context, &details, force).map_err(workshop_error)?;
            println!("{summary}");
        }
        Commands::Validate {
            namespace,
            environment,
            mainframe_host,
            output,
        } => {
            let request = ValidateRequest {
                namespace,
                environment,
                mainframe_host,
            };
            let report = validate(&context, &request).map_err(workshop_error)?;
            match output {
                OutputFormat::Text => println!("{report}"),
                OutputFormat::Json => println!(
                    "{}",
                    report.to_json().context("cannot serialize the validation report")?
                ),
            }
            return Ok(ExitCode::from(report.exit_code() as u8));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.log_level, cli.json_logs);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
