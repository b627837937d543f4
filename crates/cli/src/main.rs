use std::{collections::HashMap, env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use canvas_api::{CanvasApi, CanvasClient, resolve_api_key};
use canvas_engine::{BatchExecutor, BatchOptions, ExecutionRequest, OptionResolver, SchemaSource};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod input;

/// Run canvases against the canvas prompt-execution service.
#[derive(Parser, Debug)]
#[command(name = "canvas", version, about)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// API key; falls back to CANVAS_API_KEY, the keychain, then ~/.netrc
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Service base URL; falls back to CANVAS_API_BASE
    #[arg(long, global = true)]
    base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List projects
    Projects,
    /// List the canvases of a project
    Canvases {
        #[arg(long)]
        project: String,
    },
    /// List the variables declared by a canvas
    Variables {
        #[arg(long)]
        canvas: String,
    },
    /// Execute a canvas once per input record
    Run(RunArgs),
    /// Manage the stored API key
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Canvas identifier; may contain ${{ record.* }} templates
    #[arg(long)]
    canvas: String,

    /// Variable assignment as name=value
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// Variable assignment whose value is parsed as JSON
    #[arg(long = "var-json", value_name = "NAME=JSON")]
    json_vars: Vec<String>,

    /// JSON array of input records
    #[arg(long)]
    records: Option<PathBuf>,

    /// Attach a local file to every record as name=path
    #[arg(long = "attach", value_name = "NAME=PATH")]
    attachments: Vec<String>,

    /// Record failures as error items instead of aborting
    #[arg(long)]
    continue_on_fail: bool,

    /// Fetch the canvas schema for every record
    #[arg(long)]
    no_schema_cache: bool,

    /// Read the schema from the project's latest canvas version
    #[arg(long, requires = "project")]
    latest_version: bool,

    /// Project owning the canvas, used with --latest-version
    #[arg(long)]
    project: Option<String>,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Store the key given with --api-key in the OS keychain
    Login,
    /// Remove the stored API key
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let Cli { connection, command } = Cli::parse();

    match command {
        Command::Auth(auth) => run_auth(auth, connection.api_key.as_deref()),
        Command::Projects => {
            let resolver = OptionResolver::new(connect(&connection)?);
            print_json(&resolver.get_projects().await?)
        }
        Command::Canvases { project } => {
            let resolver = OptionResolver::new(connect(&connection)?);
            print_json(&resolver.get_canvases(&project).await?)
        }
        Command::Variables { canvas } => {
            let resolver = OptionResolver::new(connect(&connection)?);
            print_json(&resolver.get_canvas_variables(&canvas).await?)
        }
        Command::Run(args) => run_canvas(connect(&connection)?, args).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn connect(connection: &ConnectionArgs) -> Result<Arc<dyn CanvasApi>> {
    let client = match &connection.base_url {
        Some(base_url) => {
            let api_key = resolve_api_key(connection.api_key.clone()).ok_or(canvas_api::ApiError::MissingApiKey)?;
            CanvasClient::new(&api_key, base_url)?
        }
        None => CanvasClient::from_env(connection.api_key.clone())?,
    };
    info!(base_url = %client.base_url, "client configured");
    Ok(Arc::new(client))
}

async fn run_canvas(api: Arc<dyn CanvasApi>, args: RunArgs) -> Result<()> {
    let mut assignments = Vec::with_capacity(args.vars.len() + args.json_vars.len());
    for raw in &args.vars {
        assignments.push(input::parse_assignment(raw)?);
    }
    for raw in &args.json_vars {
        assignments.push(input::parse_json_assignment(raw)?);
    }

    let records = match &args.records {
        Some(path) => input::load_records(path).await?,
        None => Vec::new(),
    };
    let mut attachments = Vec::with_capacity(args.attachments.len());
    for raw in &args.attachments {
        attachments.push(input::load_attachment(raw).await?);
    }
    let mut records = input::attach_to_records(records, &attachments);
    if records.is_empty() {
        records.push(Default::default());
    }

    let schema_source = match (args.latest_version, args.project) {
        (true, Some(project_id)) => SchemaSource::LatestVersion { project_id },
        (true, None) => bail!("--latest-version requires --project"),
        (false, _) => SchemaSource::Promoted,
    };
    let options = BatchOptions {
        continue_on_fail: args.continue_on_fail,
        cache_schemas: !args.no_schema_cache,
        schema_source,
        environment_variables: env::vars().collect::<HashMap<_, _>>(),
    };

    let executor = BatchExecutor::new(api, options);
    let request = ExecutionRequest::new(args.canvas, assignments);
    let outcomes = executor.execute(&request, &records).await?;
    print_json(&outcomes)
}

fn run_auth(command: AuthCommand, api_key: Option<&str>) -> Result<()> {
    match command {
        AuthCommand::Login => {
            let Some(api_key) = api_key.map(str::trim).filter(|key| !key.is_empty()) else {
                bail!("pass the key to store with --api-key");
            };
            canvas_util::store_api_key(api_key).context("failed to store the API key")?;
            eprintln!("API key stored in the OS keychain");
        }
        AuthCommand::Logout => {
            canvas_util::remove_api_key().context("failed to remove the API key")?;
            eprintln!("API key removed from the OS keychain");
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "canvas",
            "run",
            "--canvas",
            "c-1",
            "--var",
            "topic=rust",
            "--var-json",
            "doc={\"data\":\"aGk=\"}",
            "--continue-on-fail",
            "--latest-version",
            "--project",
            "p-1",
        ])
        .expect("parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.canvas, "c-1");
        assert_eq!(args.vars, ["topic=rust"]);
        assert_eq!(args.json_vars.len(), 1);
        assert!(args.continue_on_fail);
        assert!(!args.no_schema_cache);
        assert_eq!(args.project.as_deref(), Some("p-1"));
    }

    #[test]
    fn latest_version_requires_project() {
        let parsed = Cli::try_parse_from(["canvas", "run", "--canvas", "c-1", "--latest-version"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn global_connection_flags_follow_subcommands() {
        let cli = Cli::try_parse_from(["canvas", "canvases", "--project", "p-1", "--api-key", "k"]).expect("parse");
        assert_eq!(cli.connection.api_key.as_deref(), Some("k"));
        assert!(matches!(cli.command, Command::Canvases { ref project } if project == "p-1"));
    }

    #[test]
    fn explicit_base_url_is_normalized_on_the_client() {
        let connection = ConnectionArgs {
            api_key: Some("tk-test".into()),
            base_url: Some("http://localhost:8080/".into()),
        };
        assert!(connect(&connection).is_ok());

        let client = CanvasClient::new("tk-test", "http://localhost:8080/").expect("client");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn login_takes_the_global_api_key() {
        let cli = Cli::try_parse_from(["canvas", "auth", "login", "--api-key", "secret"]).expect("parse");
        assert!(matches!(cli.command, Command::Auth(AuthCommand::Login)));
        assert_eq!(cli.connection.api_key.as_deref(), Some("secret"));
    }
}
