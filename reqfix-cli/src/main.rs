mod config;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use config::{CliOverrides, ConfigMerger};
use reqfix_core::ProposedChanges;
use reqfix_core::adapters::{FsChangeSetStore, FsGraphStore};
use reqfix_core::pipeline::{self, ToolError};
use reqfix_core::ports::ChangeSetStore;
use reqfix_core::settings::RunSettings;
use reqfix_render::{
    render_dependency_graph_mermaid, render_impact_md, render_ontology_validation_md,
    render_outcome_md, render_plan_md, render_rollback_md, render_violations_md,
};
use reqfix_types::changeset::ChangeSetStatus;
use reqfix_types::requirement::Priority;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "reqfix",
    version,
    about = "Policy-governed validation and repair for requirement graphs."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the stage ontology for internal consistency.
    ValidateOntology(CommonArgs),
    /// Evaluate the graph and list violations. Exits 2 when strict violations exist.
    Check(CommonArgs),
    /// Plan change sets without applying them.
    Plan(WriteArgs),
    /// Run the fix loop until a fixed point (default: dry-run).
    Fix(FixArgs),
    /// Apply recorded change sets by id (default: dry-run).
    Apply(ApplyArgs),
    /// Roll back applied change sets, newest first (default: dry-run).
    Rollback(RollbackArgs),
    /// Analyze the impact of changing one requirement.
    Impact(ImpactArgs),
    /// Draw the dependency closure of one requirement.
    Graph(GraphArgs),
    /// List recorded change sets.
    Changesets(ChangesetsArgs),
}

#[derive(Debug, Args)]
struct CommonArgs {
    /// Project root holding reqfix.toml (default: current directory).
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Requirement graph file (.json, .yaml, .yml).
    #[arg(long)]
    graph: Option<Utf8PathBuf>,

    /// Fix policy file (.toml, .json).
    #[arg(long)]
    policy: Option<Utf8PathBuf>,

    /// Stage ontology file (default: built-in).
    #[arg(long)]
    ontology: Option<Utf8PathBuf>,

    /// Change set audit directory.
    #[arg(long)]
    changesets_dir: Option<Utf8PathBuf>,

    /// Extra violations reported by an external detector.
    #[arg(long)]
    violations: Option<Utf8PathBuf>,

    /// Also flag statements without a subject.
    #[arg(long, default_value_t = false)]
    check_subjects: bool,

    /// Output format.
    #[arg(long, value_enum, default_value = "md")]
    format: OutputFormat,
}

#[derive(Debug, Args)]
struct WriteArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Persist results. Without it nothing is written.
    #[arg(long, default_value_t = false)]
    write: bool,
}

#[derive(Debug, Args)]
struct FixArgs {
    #[command(flatten)]
    base: WriteArgs,

    /// Override the policy's iteration cap.
    #[arg(long)]
    max_iterations: Option<u32>,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[command(flatten)]
    base: WriteArgs,

    /// Change set ids, applied in the order given.
    #[arg(required = true)]
    ids: Vec<String>,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    #[command(flatten)]
    base: WriteArgs,

    /// Change set ids to roll back. Omit to roll back every applied set.
    ids: Vec<String>,
}

#[derive(Debug, Args)]
struct ImpactArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Requirement id.
    id: String,

    /// Proposed new priority.
    #[arg(long, value_enum)]
    priority: Option<PriorityArg>,

    /// Proposed dependency set (repeatable).
    #[arg(long = "depends-on")]
    depends_on: Vec<String>,
}

#[derive(Debug, Args)]
struct GraphArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Requirement id.
    id: String,
}

#[derive(Debug, Args)]
struct ChangesetsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Only list sets in this status.
    #[arg(long, value_enum)]
    status: Option<StatusArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Md,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PriorityArg {
    Critical,
    High,
    Medium,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Critical => Priority::Critical,
            PriorityArg::High => Priority::High,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum StatusArg {
    Proposed,
    Approved,
    Applied,
    RolledBack,
}

impl From<StatusArg> for ChangeSetStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Proposed => ChangeSetStatus::Proposed,
            StatusArg::Approved => ChangeSetStatus::Approved,
            StatusArg::Applied => ChangeSetStatus::Applied,
            StatusArg::RolledBack => ChangeSetStatus::RolledBack,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match real_main() {
        Ok(()) => ExitCode::from(0),
        Err(ToolError::PolicyBlock) => {
            info!("policy block");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn real_main() -> Result<(), ToolError> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::ValidateOntology(args) => cmd_validate_ontology(args),
        Command::Check(args) => cmd_check(args),
        Command::Plan(args) => cmd_plan(args),
        Command::Fix(args) => cmd_fix(args),
        Command::Apply(args) => cmd_apply(args),
        Command::Rollback(args) => cmd_rollback(args),
        Command::Impact(args) => cmd_impact(args),
        Command::Graph(args) => cmd_graph(args),
        Command::Changesets(args) => cmd_changesets(args),
    }
}

fn settings(
    common: &CommonArgs,
    write: bool,
    max_iterations: Option<u32>,
) -> anyhow::Result<RunSettings> {
    let file_config = config::load_or_default(&common.root).context("load reqfix.toml config")?;
    let merged = ConfigMerger::new(file_config).merge(
        &common.root,
        CliOverrides {
            graph: common.graph.clone(),
            ontology: common.ontology.clone(),
            policy: common.policy.clone(),
            changesets: common.changesets_dir.clone(),
            violations: common.violations.clone(),
            check_subjects: common.check_subjects,
            max_iterations,
            write,
        },
    );
    debug!(
        "merged config: graph={}, policy={}, dry_run={}",
        merged.graph_path, merged.policy_path, merged.dry_run
    );
    Ok(merged)
}

fn stores(settings: &RunSettings) -> (FsGraphStore, FsChangeSetStore) {
    (
        FsGraphStore::new(settings.graph_path.clone()),
        FsChangeSetStore::new(settings.changesets_dir.clone()),
    )
}

fn emit<T: serde::Serialize>(
    format: OutputFormat,
    value: &T,
    md: impl FnOnce() -> String,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Md => print!("{}", md()),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).context("serialize json")?)
        }
    }
    Ok(())
}

fn block_if(blocked: bool) -> Result<(), ToolError> {
    if blocked {
        Err(ToolError::PolicyBlock)
    } else {
        Ok(())
    }
}

fn cmd_validate_ontology(args: CommonArgs) -> Result<(), ToolError> {
    let settings = settings(&args, false, None)?;
    let ontology = pipeline::load_ontology(&settings)?;
    let result = ontology.validate_schema();
    emit(args.format, &result, || render_ontology_validation_md(&result))?;
    block_if(!result.valid)
}

fn cmd_check(args: CommonArgs) -> Result<(), ToolError> {
    let settings = settings(&args, false, None)?;
    let (graphs, _) = stores(&settings);
    let outcome = pipeline::run_check(&settings, &graphs)?;
    emit(args.format, &outcome.violations, || {
        render_violations_md(&outcome.violations)
    })?;
    block_if(outcome.policy_block)
}

fn cmd_plan(args: WriteArgs) -> Result<(), ToolError> {
    let settings = settings(&args.common, args.write, None)?;
    let (graphs, store) = stores(&settings);
    let outcome = pipeline::run_plan(&settings, &graphs, &store)?;
    emit(args.common.format, &outcome.plan, || render_plan_md(&outcome.plan))?;
    if !outcome.recorded.is_empty() {
        info!(
            "recorded {} change sets in {}",
            outcome.recorded.len(),
            settings.changesets_dir
        );
    }
    Ok(())
}

fn cmd_fix(args: FixArgs) -> Result<(), ToolError> {
    let settings = settings(&args.base.common, args.base.write, args.max_iterations)?;
    let (graphs, store) = stores(&settings);
    let run = pipeline::run_fix(&settings, &graphs, &store)?;
    emit(args.base.common.format, &run.outcome, || {
        render_outcome_md(&run.outcome)
    })?;
    if let Some(error) = run.error() {
        return Err(anyhow::anyhow!("fix loop stopped: {}", error).into());
    }
    block_if(run.policy_block)
}

fn cmd_apply(args: ApplyArgs) -> Result<(), ToolError> {
    let settings = settings(&args.base.common, args.base.write, None)?;
    let (graphs, store) = stores(&settings);
    let run = pipeline::run_apply(&settings, &args.ids, &graphs, &store)?;
    emit(args.base.common.format, &run.outcome, || {
        render_outcome_md(&run.outcome)
    })?;
    block_if(run.policy_block)
}

fn cmd_rollback(args: RollbackArgs) -> Result<(), ToolError> {
    let settings = settings(&args.base.common, args.base.write, None)?;
    let (graphs, store) = stores(&settings);
    let result = pipeline::run_rollback(&settings, &args.ids, &graphs, &store)?;
    emit(args.base.common.format, &result, || render_rollback_md(&result))?;
    if !result.success {
        return Err(anyhow::anyhow!("{} rollback errors", result.errors.len()).into());
    }
    Ok(())
}

fn cmd_impact(args: ImpactArgs) -> Result<(), ToolError> {
    let settings = settings(&args.common, false, None)?;
    let (graphs, _) = stores(&settings);
    let proposed = ProposedChanges {
        priority: args.priority.map(Priority::from),
        dependencies: (!args.depends_on.is_empty())
            .then(|| args.depends_on.iter().cloned().collect()),
    };
    let report = pipeline::run_impact(&graphs, &args.id, Some(&proposed))?;
    emit(args.common.format, &report, || render_impact_md(&report))?;
    Ok(())
}

fn cmd_graph(args: GraphArgs) -> Result<(), ToolError> {
    let settings = settings(&args.common, false, None)?;
    let (graphs, _) = stores(&settings);
    let dg = pipeline::run_dependency_graph(&graphs, &args.id)?;
    emit(args.common.format, &dg, || render_dependency_graph_mermaid(&dg))?;
    Ok(())
}

fn cmd_changesets(args: ChangesetsArgs) -> Result<(), ToolError> {
    let settings = settings(&args.common, false, None)?;
    let (_, store) = stores(&settings);
    let wanted = args.status.map(ChangeSetStatus::from);
    let sets: Vec<_> = store
        .list()?
        .into_iter()
        .filter(|cs| wanted.is_none_or(|w| cs.status == w))
        .collect();

    emit(args.common.format, &sets, || {
        let mut out = String::new();
        out.push_str(&format!("  {:<40} {:<12} {:<6} CREATED\n", "ID", "STATUS", "RULE"));
        out.push_str(&format!("  {:<40} {:<12} {:<6} -------\n", "--", "------", "----"));
        for cs in &sets {
            out.push_str(&format!(
                "  {:<40} {:<12} {:<6} {}\n",
                cs.id,
                cs.status.as_str(),
                cs.metadata.rule_id.as_deref().unwrap_or("-"),
                cs.created_at.to_rfc3339()
            ));
        }
        out
    })?;
    Ok(())
}
