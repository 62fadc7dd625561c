//! Command-line surface.
//!
//! The binary is a thin shell around the library pipeline: every subcommand
//! reads its inputs, runs the pure core, and prints shell text or JSON to
//! stdout. Diagnostics go to stderr through `tracing` so stdout stays
//! machine-consumable.

use crate::config::Config;
use crate::instance::TaskInstance;
use crate::log_parser::{self, LogParserKind};
use crate::script::{DEFAULT_REPO_DIRECTORY, ScriptBuilder, ScriptPipeline};
use crate::specs::SpecRegistry;
use crate::synthesis::CommandSynthesizer;
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "gradebench", version)]
#[command(about = "Deterministic test-script synthesis and transcript grading \
                   for repository-replay task instances")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Emit the three execution stages for a task instance.
    Scripts(ScriptsArgs),
    /// Emit only the synthesized test commands for a task instance.
    #[command(name = "commands")]
    Synthesize(SynthesizeArgs),
    /// Grade an execution transcript into per-test verdicts.
    Grade(GradeArgs),
    /// List the registered repository/version specs.
    Specs(SpecsArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct ScriptsArgs {
    /// Task-instance JSON file (`-` for stdin).
    pub instance: PathBuf,
    /// Stage to emit.
    #[arg(long, value_enum, default_value_t = StageArg::All)]
    pub stage: StageArg,
    /// Output format.
    #[arg(long, value_enum, default_value_t = FormatArg::Shell)]
    pub format: FormatArg,
    /// Checkout directory inside the execution environment.
    #[arg(long = "repo-dir", default_value = DEFAULT_REPO_DIRECTORY)]
    pub repo_directory: String,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct SynthesizeArgs {
    /// Task-instance JSON file (`-` for stdin).
    pub instance: PathBuf,
    /// Output format.
    #[arg(long, value_enum, default_value_t = FormatArg::Shell)]
    pub format: FormatArg,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct GradeArgs {
    /// Transcript file (`-` for stdin).
    #[arg(long)]
    pub log: PathBuf,
    /// Select the matcher via this instance's registry entry.
    #[arg(long, conflicts_with_all = ["repo", "version"])]
    pub instance: Option<PathBuf>,
    /// Repository identity for registry lookup.
    #[arg(long, requires = "version")]
    pub repo: Option<String>,
    /// Version identifier for registry lookup.
    #[arg(long, requires = "repo")]
    pub version: Option<String>,
    /// Explicit matcher, bypassing the registry.
    #[arg(long, value_enum)]
    pub parser: Option<ParserKindArg>,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct SpecsArgs {
    /// Only list entries for this repository.
    #[arg(long)]
    pub repo: Option<String>,
    #[command(flatten)]
    pub registry: RegistryArgs,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

/// Flags shared by every subcommand that consults the spec registry.
#[derive(Debug, Args)]
pub struct RegistryArgs {
    /// Spec-overrides JSON file. Defaults to `~/.gradebench/specs.json`.
    #[arg(long, env = "GRADEBENCH_SPECS_PATH")]
    pub specs: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StageArg {
    Repo,
    Env,
    Eval,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Shell,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParserKindArg {
    Jest,
    Mocha,
    MochaJson,
    Karma,
    Tap,
    PhpunitTestdox,
    Generic,
}

impl From<ParserKindArg> for LogParserKind {
    fn from(arg: ParserKindArg) -> Self {
        match arg {
            ParserKindArg::Jest => Self::Jest,
            ParserKindArg::Mocha => Self::Mocha,
            ParserKindArg::MochaJson => Self::MochaJson,
            ParserKindArg::Karma => Self::Karma,
            ParserKindArg::Tap => Self::Tap,
            ParserKindArg::PhpunitTestdox => Self::PhpunitTestdox,
            ParserKindArg::Generic => Self::Generic,
        }
    }
}

/// Parse arguments and dispatch.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Scripts(args) => run_scripts(args),
        Commands::Synthesize(args) => run_synthesize(args),
        Commands::Grade(args) => run_grade(args),
        Commands::Specs(args) => run_specs(args),
        Commands::Completions(args) => run_completions(args),
    }
}

fn run_scripts(args: &ScriptsArgs) -> Result<()> {
    let instance = load_instance(&args.instance)?;
    let registry = load_registry(args.registry.specs.as_deref());
    let spec = registry.lookup(&instance.repo, &instance.version)?;
    let commands = CommandSynthesizer::with_builtin_strategies().synthesize(&instance, spec)?;
    let pipeline = ScriptBuilder::new(&instance, spec)
        .with_repo_directory(args.repo_directory.as_str())
        .build(&commands)?;
    emit_pipeline(&pipeline, args.stage, args.format)
}

fn run_synthesize(args: &SynthesizeArgs) -> Result<()> {
    let instance = load_instance(&args.instance)?;
    let registry = load_registry(args.registry.specs.as_deref());
    let spec = registry.lookup(&instance.repo, &instance.version)?;
    let commands = CommandSynthesizer::with_builtin_strategies().synthesize(&instance, spec)?;
    match args.format {
        FormatArg::Json => println!("{}", serde_json::to_string_pretty(&commands)?),
        FormatArg::Shell => {
            for command in &commands {
                println!("{command}");
            }
        }
    }
    Ok(())
}

fn run_grade(args: &GradeArgs) -> Result<()> {
    let transcript = read_input(&args.log)?;
    let kind = resolve_parser_kind(args)?;
    let report = log_parser::parse_transcript(&transcript, kind);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn resolve_parser_kind(args: &GradeArgs) -> Result<LogParserKind> {
    if let Some(parser) = args.parser {
        return Ok(parser.into());
    }
    let registry = load_registry(args.registry.specs.as_deref());
    if let Some(path) = &args.instance {
        let instance = load_instance(path)?;
        return Ok(registry.lookup(&instance.repo, &instance.version)?.log_parser);
    }
    if let (Some(repo), Some(version)) = (&args.repo, &args.version) {
        return Ok(registry.lookup(repo, version)?.log_parser);
    }
    tracing::warn!("no parser selection given; using the generic matcher");
    Ok(LogParserKind::Generic)
}

fn run_specs(args: &SpecsArgs) -> Result<()> {
    let registry = load_registry(args.registry.specs.as_deref());
    for repo in registry.repos() {
        if args.repo.as_deref().is_some_and(|wanted| wanted != repo) {
            continue;
        }
        for version in registry.versions(repo) {
            if let Ok(spec) = registry.lookup(repo, version) {
                println!("{repo}\t{version}\t{}", spec.log_parser);
            }
        }
    }
    Ok(())
}

fn run_completions(args: &CompletionsArgs) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(args.shell, &mut command, "gradebench", &mut io::stdout());
    Ok(())
}

fn emit_pipeline(pipeline: &ScriptPipeline, stage: StageArg, format: FormatArg) -> Result<()> {
    match format {
        FormatArg::Json => {
            let value = match stage {
                StageArg::All => serde_json::to_value(pipeline)?,
                StageArg::Repo => serde_json::to_value(&pipeline.repo_script)?,
                StageArg::Env => serde_json::to_value(&pipeline.env_script)?,
                StageArg::Eval => serde_json::to_value(&pipeline.eval_script)?,
            };
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        FormatArg::Shell => {
            let rendered = match stage {
                StageArg::All => format!(
                    "{}\n{}\n{}",
                    pipeline.repo_shell(),
                    pipeline.env_shell(),
                    pipeline.eval_shell()
                ),
                StageArg::Repo => pipeline.repo_shell(),
                StageArg::Env => pipeline.env_shell(),
                StageArg::Eval => pipeline.eval_shell(),
            };
            print!("{rendered}");
        }
    }
    Ok(())
}

fn load_registry(specs_flag: Option<&Path>) -> SpecRegistry {
    let path = specs_flag.map_or_else(Config::default_specs_path, Path::to_path_buf);
    SpecRegistry::load(Some(&path))
}

fn load_instance(path: &Path) -> Result<TaskInstance> {
    let text = read_input(path)?;
    TaskInstance::from_json(&text)
        .with_context(|| format!("parse task instance from {}", path.display()))
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("read stdin")?;
        return Ok(text);
    }
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
