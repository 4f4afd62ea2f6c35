//! sif-check - evaluate spreadsheet policies from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use sif_policy::config::{ColorMode, Config, OutputFormat};
use sif_policy::definition::{load_policy, PolicyDocument};
use sif_policy::facility::{EvaluationStats, Evaluator};
use sif_policy::output::{JsonFormatter, OutputFormatter, TextFormatter};
use sif_policy::rule::{PolicyRule, RuleKind};
use sif_policy::{CheckRegistry, PolicyReport, Spreadsheet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser)]
#[command(
    name = "sif-check",
    version,
    about = "Spreadsheet policy checker",
    long_about = "Evaluates monolithic, composite and dynamic policy rules against a spreadsheet snapshot."
)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a policy against a spreadsheet snapshot
    Check {
        /// Policy file (.yaml, .yml, .json or .xml)
        policy: PathBuf,

        /// Spreadsheet snapshot (JSON)
        snapshot: PathBuf,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<Format>,

        /// List every violation
        #[arg(short, long)]
        verbose: bool,

        /// Number of parallel jobs (0 = auto)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Evaluate composite sub-rules one after another
        #[arg(long)]
        sequential: bool,
    },
    /// Print the rule tree of a policy
    Rules {
        /// Policy file
        policy: PathBuf,
    },
    /// Rewrite a policy in the format chosen by the output extension
    Convert {
        /// Policy file to read
        policy: PathBuf,

        /// File to write (.yaml, .yml, .json or .xml)
        output: PathBuf,
    },
    /// List the built-in checks
    Checks,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Exit code when every rule conforms
const EXIT_CONFORMS: i32 = 0;
/// Exit code when violations exist
const EXIT_VIOLATIONS: i32 = 1;
/// Exit code on load or evaluation failure
const EXIT_FAILURE: i32 = 2;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            EXIT_FAILURE
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Check {
            policy,
            snapshot,
            config,
            format,
            verbose,
            jobs,
            sequential,
        } => {
            let mut config = match &config {
                Some(path) => Config::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => Config::load_default().unwrap_or_default(),
            };
            config.merge_cli(
                format.map(|f| match f {
                    Format::Text => OutputFormat::Text,
                    Format::Json => OutputFormat::Json,
                }),
                cli.no_color.then_some(ColorMode::Never),
                verbose.then_some(true),
                jobs,
                sequential.then_some(false),
            );
            handle_check(&policy, &snapshot, &config)
        }
        Commands::Rules { policy } => {
            handle_rules(&policy)?;
            Ok(EXIT_CONFORMS)
        }
        Commands::Convert { policy, output } => {
            handle_convert(&policy, &output)?;
            Ok(EXIT_CONFORMS)
        }
        Commands::Checks => {
            handle_checks();
            Ok(EXIT_CONFORMS)
        }
    }
}

fn handle_check(policy: &Path, snapshot: &Path, config: &Config) -> Result<i32> {
    let (document, rules) = load_policy(policy)
        .with_context(|| format!("Failed to load policy {}", policy.display()))?;
    let sheet = Spreadsheet::load(snapshot)
        .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;

    let mut rules = config.enabled_rules(rules);
    for rule in &mut rules {
        config.bind(rule);
    }

    let stats = Arc::new(EvaluationStats::new());
    let mut evaluator = Evaluator::with_builtin_checks()
        .with_parallel(config.engine.parallel)
        .with_stats(Arc::clone(&stats));
    if config.engine.parallel {
        evaluator = evaluator.with_jobs(config.engine.jobs);
    }

    let start = Instant::now();
    let evaluations = evaluator
        .evaluate_all(&rules, &sheet)
        .context("Evaluation failed")?;
    let report = PolicyReport::new(&document.name, &evaluations, start.elapsed());

    match config.output.color {
        ColorMode::Always => colored::control::set_override(true),
        ColorMode::Never => colored::control::set_override(false),
        ColorMode::Auto => {}
    }

    let formatter: Box<dyn OutputFormatter> = match config.output.format {
        OutputFormat::Text => {
            let mut f = TextFormatter::new();
            if config.output.color == ColorMode::Never {
                f = f.without_color();
            }
            if !config.output.verbose {
                f = f.summary_only();
            }
            Box::new(f)
        }
        OutputFormat::Json => Box::new(JsonFormatter::new().pretty()),
    };
    print!("{}", formatter.format(&report));
    if config.output.format == OutputFormat::Json {
        println!();
    }

    if config.output.verbose {
        eprintln!(
            "{} rule(s) evaluated, {} violation(s) found",
            stats.rules_evaluated(),
            stats.violations_found()
        );
    }

    Ok(if report.conforms() {
        EXIT_CONFORMS
    } else {
        EXIT_VIOLATIONS
    })
}

fn handle_rules(policy: &Path) -> Result<()> {
    let (document, rules) = load_policy(policy)
        .with_context(|| format!("Failed to load policy {}", policy.display()))?;

    println!(
        "{} {} (version {})",
        "Policy".bold(),
        document.name.cyan(),
        document.version
    );
    for rule in &rules {
        rule.walk(&mut |node, depth| print_rule(node, depth));
    }
    Ok(())
}

/// Helper function to print a rule in a consistent format
fn print_rule(rule: &PolicyRule, depth: usize) {
    let detail = match rule.kind() {
        RuleKind::Monolithic(m) => format!("check {}", m.check),
        RuleKind::Composite(c) => format!("{} of {}", c.combinator, c.rules.len()),
        RuleKind::Dynamic(d) => match &d.scope {
            Some(scope) => format!("when {} in {}", d.condition, scope),
            None => format!("when {}", d.condition),
        },
    };
    let declared = rule
        .rule_type()
        .map(|t| format!(" <{}>", t))
        .unwrap_or_default();

    println!(
        "{}{} [{}] weight {}{} - {}",
        "  ".repeat(depth + 1),
        rule.name().cyan(),
        rule.variant(),
        rule.severity_weight(),
        declared,
        detail
    );
}

fn handle_convert(policy: &Path, output: &Path) -> Result<()> {
    let (document, rules) = load_policy(policy)
        .with_context(|| format!("Failed to load policy {}", policy.display()))?;

    let converted = PolicyDocument {
        version: document.version.clone(),
        ..PolicyDocument::from_rules(&document.name, &rules)
    };
    converted
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Converted {} rule(s) from {} to {}",
        rules.iter().map(PolicyRule::rule_count).sum::<usize>(),
        policy.display(),
        output.display()
    );
    Ok(())
}

fn handle_checks() {
    let registry = CheckRegistry::with_builtin();
    println!("{}", "Built-in checks".bold());
    for kind in registry.kinds() {
        if let Some(check) = registry.get(kind) {
            println!("  {} - {}", kind.to_string().cyan(), check.description());
        }
    }
}
