use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stepwizard::api::NgClient;
use stepwizard::config::Config;
use stepwizard::entities::{ArtifactSlot, ConnectorType, WizardKind};
use stepwizard::fetch::TagLookup;
use stepwizard::logging;
use stepwizard::routes::{match_path, Route};
use stepwizard::scope::{Module, Scope};
use stepwizard::submit::{
    diff, render_diff, Resolution, ServiceDefinition, ServiceDefinitionSubmitter,
    SubmissionAdapter,
};
use stepwizard::wizard::{StepOutput, ValidationErrors, WizardError, WizardSession};

#[derive(Parser)]
#[command(name = "stepwizard")]
#[command(about = "Drive entity wizards, resolve routes and diff conflicts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(flatten)]
    scope: ScopeArgs,
}

/// Scope overrides applied on top of the configured scope
#[derive(Args)]
struct ScopeArgs {
    /// Account identifier
    #[arg(long, global = true)]
    account: Option<String>,

    /// Organization identifier
    #[arg(long, global = true)]
    org: Option<String>,

    /// Project identifier
    #[arg(long, global = true)]
    project: Option<String>,

    /// Module slug (cd, ci, cf, ce, cv)
    #[arg(long, global = true)]
    module: Option<Module>,
}

impl ScopeArgs {
    fn apply(self, mut scope: Scope) -> Scope {
        if let Some(account) = self.account {
            scope.account_id = account;
        }
        if let Some(org) = self.org {
            scope.org_identifier = Some(org);
        }
        if let Some(project) = self.project {
            scope.project_identifier = Some(project);
        }
        if let Some(module) = self.module {
            scope.module = Some(module);
        }
        scope
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the path of a navigation intent
    Route {
        intent: Intent,

        /// Connector, service or pipeline identifier for detail pages
        #[arg(long)]
        id: Option<String>,
    },

    /// Print the intent and scope a path maps to
    Match { path: String },

    /// Run a wizard from an answers file
    Run(RunArgs),

    /// Diff a local payload against the server copy
    Diff { local: PathBuf, remote: PathBuf },

    /// List image tags, keeping only the newest lookup
    Tags {
        /// Docker connector reference
        #[arg(long)]
        connector: String,

        /// Image paths in the order they were typed
        #[arg(required = true)]
        images: Vec<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    wizard: WizardArg,

    /// YAML list of step outputs, each tagged with `step:`
    #[arg(short, long)]
    answers: PathBuf,

    /// Connector type (connector wizard only)
    #[arg(long = "type", value_name = "TYPE")]
    connector_type: Option<ConnectorType>,

    /// Artifact slot (artifact wizard only)
    #[arg(long, value_enum, default_value_t = SlotArg::Primary)]
    slot: SlotArg,

    /// Identifier of an existing entity to edit
    #[arg(long)]
    edit: Option<String>,

    /// Service definition file (manifest and artifact wizards)
    #[arg(long)]
    service: Option<PathBuf>,

    /// Print the payload instead of submitting it
    #[arg(long)]
    dry_run: bool,

    /// How to settle a conflict
    #[arg(long, value_enum)]
    resolve: Option<ResolveArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum WizardArg {
    Connector,
    Manifest,
    Artifact,
}

#[derive(Clone, Copy, ValueEnum)]
enum SlotArg {
    Primary,
    Sidecar,
}

impl From<SlotArg> for ArtifactSlot {
    fn from(slot: SlotArg) -> Self {
        match slot {
            SlotArg::Primary => ArtifactSlot::Primary,
            SlotArg::Sidecar => ArtifactSlot::Sidecar,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolveArg {
    KeepMine,
    TakeTheirs,
}

#[derive(Clone, Copy, ValueEnum)]
enum Intent {
    Home,
    Projects,
    ProjectOverview,
    Connectors,
    ConnectorDetails,
    Secrets,
    Services,
    ServiceDetails,
    Pipelines,
    PipelineStudio,
    PipelineDeployments,
}

impl Intent {
    fn into_route(self, id: Option<String>) -> Result<Route> {
        let id = move || id.context("--id is required for this intent");
        Ok(match self {
            Intent::Home => Route::Home,
            Intent::Projects => Route::Projects,
            Intent::ProjectOverview => Route::ProjectOverview,
            Intent::Connectors => Route::Connectors,
            Intent::ConnectorDetails => Route::ConnectorDetails { connector_id: id()? },
            Intent::Secrets => Route::Secrets,
            Intent::Services => Route::Services,
            Intent::ServiceDetails => Route::ServiceDetails { service_id: id()? },
            Intent::Pipelines => Route::Pipelines,
            Intent::PipelineStudio => Route::PipelineStudio { pipeline_id: id()? },
            Intent::PipelineDeployments => Route::PipelineDeployments { pipeline_id: id()? },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let mut config = Config::load(cli.config.as_deref())?;
    config.scope = cli.scope.apply(config.scope());

    let _logging = logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Route { intent, id } => cmd_route(&config, intent, id)?,
        Commands::Match { path } => cmd_match(&path)?,
        Commands::Run(args) => cmd_run(&config, args).await?,
        Commands::Diff { local, remote } => cmd_diff(&local, &remote)?,
        Commands::Tags { connector, images } => cmd_tags(&config, &connector, &images).await?,
    }

    Ok(())
}

fn cmd_route(config: &Config, intent: Intent, id: Option<String>) -> Result<()> {
    let route = intent.into_route(id)?;
    let path = route.to_path(&config.scope())?;
    println!("{}", path);
    Ok(())
}

fn cmd_match(path: &str) -> Result<()> {
    let Some(matched) = match_path(path) else {
        bail!("No route matches {}", path);
    };
    println!("intent:  {}", matched.route);
    println!("account: {}", matched.scope.account_id);
    if let Some(org) = &matched.scope.org_identifier {
        println!("org:     {}", org);
    }
    if let Some(project) = &matched.scope.project_identifier {
        println!("project: {}", project);
    }
    if let Some(module) = matched.scope.module {
        println!("module:  {} ({})", module, module.label());
    }
    Ok(())
}

fn cmd_diff(local: &Path, remote: &Path) -> Result<()> {
    let local = read_json(local)?;
    let remote = read_json(remote)?;
    let entries = diff(&local, &remote);
    if entries.is_empty() {
        println!("No differences");
    } else {
        println!("{}", render_diff(&entries));
    }
    Ok(())
}

async fn cmd_tags(config: &Config, connector: &str, images: &[String]) -> Result<()> {
    let client = Arc::new(NgClient::from_config(config)?);
    let lookup = TagLookup::new(client);
    for image in images {
        lookup.image_changed(connector, image);
    }
    let tags = lookup.tags().await.context("Failed to list tags")?;
    if tags.is_empty() {
        println!("No tags found");
    }
    for tag in tags {
        println!("{}", tag);
    }
    Ok(())
}

async fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    let kind = match args.wizard {
        WizardArg::Connector => WizardKind::Connector(
            args.connector_type
                .context("--type is required for the connector wizard")?,
        ),
        WizardArg::Manifest => WizardKind::Manifest,
        WizardArg::Artifact => WizardKind::Artifact(args.slot.into()),
    };
    let answers = read_answers(&args.answers)?;

    match kind {
        WizardKind::Connector(_) => run_connector(config, kind, &answers, &args).await,
        WizardKind::Manifest | WizardKind::Artifact(_) => {
            run_service_entity(config, kind, &answers, &args).await
        }
    }
}

async fn run_connector(
    config: &Config,
    kind: WizardKind,
    answers: &[StepOutput],
    args: &RunArgs,
) -> Result<()> {
    let client = NgClient::from_config(config)?;
    let mut session = match &args.edit {
        Some(identifier) => {
            let existing = client
                .get_connector(identifier)
                .await
                .with_context(|| format!("Failed to load connector '{}'", identifier))?;
            WizardSession::start_edit(kind, config.scope(), &existing)?
        }
        None => WizardSession::start(kind, config.scope()),
    };

    fill_steps(&mut session, answers)?;
    if args.dry_run {
        print_json(&session.payload()?)?;
        return Ok(());
    }

    if !session.mode().is_edit() {
        let identifier = kind.identifier(session.context()).unwrap_or_default();
        if !client.validate_unique_identifier(&identifier).await? {
            bail!("Connector identifier '{}' is already in use", identifier);
        }
    }

    let Some(entity) = submit_session(&mut session, &client, args.resolve).await? else {
        return Ok(());
    };
    print_json(&entity)?;

    if let Some(identifier) = entity["connector"]["identifier"].as_str() {
        match client.test_connection(identifier).await {
            Ok(status) if status.is_success() => println!("Connection test: {}", status.status),
            Ok(status) => {
                println!("Connection test: {}", status.status);
                for error in status.errors {
                    println!("  {}: {}", error.reason, error.message);
                }
            }
            Err(e) => tracing::warn!(error = %e, "connection test failed"),
        }
    }
    Ok(())
}

async fn run_service_entity(
    config: &Config,
    kind: WizardKind,
    answers: &[StepOutput],
    args: &RunArgs,
) -> Result<()> {
    let path = args
        .service
        .as_deref()
        .context("--service is required for manifest and artifact wizards")?;
    let definition = load_service_definition(path)?;

    let mut session = match &args.edit {
        Some(identifier) => {
            let existing = find_in_definition(&definition, kind, identifier)
                .with_context(|| format!("'{}' not found in {}", identifier, path.display()))?;
            WizardSession::start_edit(kind, config.scope(), &existing)?
        }
        None => WizardSession::start(kind, config.scope()),
    };

    fill_steps(&mut session, answers)?;
    if args.dry_run {
        print_json(&session.payload()?)?;
        return Ok(());
    }

    let submitter = ServiceDefinitionSubmitter::new(definition);
    if let Some(entity) = submit_session(&mut session, &submitter, args.resolve).await? {
        print_json(&entity)?;
    }
    save_service_definition(path, &submitter.into_inner())
}

/// Feed every step an answer, reusing prefilled context for steps without one
fn fill_steps(session: &mut WizardSession, answers: &[StepOutput]) -> Result<()> {
    let steps = session.steps().to_vec();
    for step in &steps {
        let output = match answers.iter().find(|a| a.kind() == step.accepts()) {
            Some(answer) => answer.clone(),
            None => StepOutput::from_context(step.accepts(), session.context())
                .with_context(|| format!("No answer for step '{}'", step.name()))?,
        };
        match session.next(output) {
            Ok(outcome) => tracing::debug!(step = step.name(), ?outcome, "step accepted"),
            Err(WizardError::Validation(errors)) => {
                eprintln!("Step '{}' has errors:", step.title());
                print_validation(&errors);
                bail!("Step '{}' failed validation", step.name());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn submit_session<A>(
    session: &mut WizardSession,
    adapter: &A,
    resolve: Option<ResolveArg>,
) -> Result<Option<Value>>
where
    A: SubmissionAdapter + ?Sized,
{
    match session.submit(adapter).await {
        Ok(entity) => Ok(Some(entity)),
        Err(WizardError::Submission(e)) if e.is_conflict() => {
            eprintln!("Conflict: {}", e);
            if let Some(entries) = session.conflict_diff() {
                eprintln!("{}", render_diff(&entries));
            }
            match resolve {
                None => bail!("Re-run with --resolve keep-mine or --resolve take-theirs"),
                Some(ResolveArg::KeepMine) => Ok(session
                    .resolve_conflict(Resolution::KeepMine, adapter)
                    .await?),
                Some(ResolveArg::TakeTheirs) => {
                    session
                        .resolve_conflict(Resolution::TakeTheirs, adapter)
                        .await?;
                    println!("Keeping the server copy:");
                    print_json(&session.payload()?)?;
                    Ok(None)
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn find_in_definition(
    definition: &ServiceDefinition,
    kind: WizardKind,
    identifier: &str,
) -> Option<Value> {
    match kind {
        WizardKind::Manifest => definition.manifest(identifier).cloned(),
        WizardKind::Artifact(ArtifactSlot::Sidecar) => definition.sidecar(identifier).cloned(),
        WizardKind::Artifact(ArtifactSlot::Primary) => definition
            .artifacts
            .primary
            .clone()
            .map(|primary| json!({ "primary": primary })),
        WizardKind::Connector(_) => None,
    }
}

fn print_validation(errors: &ValidationErrors) {
    for (field, messages) in errors.fields() {
        for message in messages {
            eprintln!("  {}: {}", field, message);
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn read_answers(path: &Path) -> Result<Vec<StepOutput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answers file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid answers in {}", path.display()))
}

fn load_service_definition(path: &Path) -> Result<ServiceDefinition> {
    if !path.exists() {
        return Ok(ServiceDefinition::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read service definition {}", path.display()))?;
    // YAML is a superset of JSON, so either format loads
    serde_yaml::from_str(&content)
        .with_context(|| format!("Invalid service definition in {}", path.display()))
}

fn save_service_definition(path: &Path, definition: &ServiceDefinition) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::to_string_pretty(definition)?
    } else {
        serde_yaml::to_string(definition)?
    };
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write service definition {}", path.display()))
}
