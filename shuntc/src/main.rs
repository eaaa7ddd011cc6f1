///
/// shunt CLI - Apply and validate redirect plans
///
/// - shunt apply <plan>: rewrite the plan's routine and print the result
/// - shunt check <path>: validate one plan or every plan under a directory
///

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;

use shuntc::diagnostic::Conflict;
use shuntc::plan::{is_plan_file, PlannedRoutine};
use shuntc::{CollectingSink, DiagnosticReporter, DiagnosticSink, PassReport, Plan, PlanError, TracingSink};

#[derive(Parser)]
#[command(name = "shunt")]
#[command(author, version, about = "Redirect call sites and field accesses to handler methods", long_about = None)]
struct Cli {
    /// Log engine decisions (claims, overrides, rewrites)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a plan and print the rewritten routine
    Apply {
        /// The plan file (.toml or .json)
        plan: PathBuf,

        /// Print a JSON report instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// Validate plans without printing the rewrite
    Check {
        /// Plan file or directory of plans
        path: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ApplyOutput<'a> {
    routine: String,
    code: Vec<String>,
    conflicts: Vec<String>,
    #[serde(flatten)]
    report: &'a PassReport,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();

    match cli.command {
        Commands::Apply { plan, json } => {
            apply_plan(&plan, json);
        }
        Commands::Check { path } => {
            check_plans(path.as_deref());
        }
    }
}

fn apply_plan(path: &Path, json: bool) {
    let PlannedRoutine { mut routine, pass, .. } = match load_plan(path) {
        Some(planned) => planned,
        None => std::process::exit(1),
    };

    let mut sink = CollectingSink::new();
    let report = match pass.run(&mut routine, &mut sink) {
        Ok(report) => report,
        Err(err) => {
            DiagnosticReporter::report_redirect_error(&err);
            std::process::exit(1);
        }
    };
    forward_conflicts(&sink.conflicts);

    if json {
        let output = ApplyOutput {
            routine: routine.to_string(),
            code: routine.insns().iter().map(|(_, insn)| insn.to_string()).collect(),
            conflicts: sink.conflicts.iter().map(|c| c.to_string()).collect(),
            report: &report,
        };
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing report: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        println!("{}", routine);
        print!("{}", routine.insns());
        println!("max_stack = {}, max_locals = {}", report.max_stack, report.max_locals);
        println!(
            "{} redirect(s) applied, {} skipped",
            report.applied.len(),
            report.skipped.len()
        );
    }
}

fn check_plans(path: Option<&Path>) {
    let path = path.unwrap_or(Path::new("."));

    if path.is_file() {
        if !check_plan(path) {
            std::process::exit(1);
        }
        println!("No errors in {}", path.display());
    } else if path.is_dir() {
        check_directory(path);
    } else {
        eprintln!("Error: {} does not exist", path.display());
        std::process::exit(1);
    }
}

fn check_directory(path: &Path) {
    let mut checked = 0;
    let mut errors = 0;

    for entry in walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let file_path = entry.path();
        if entry.file_type().is_file() && is_plan_file(file_path) {
            checked += 1;
            if !check_plan(file_path) {
                errors += 1;
            }
        }
    }

    println!("Checked {} plans, {} with errors", checked, errors);
    if errors > 0 {
        std::process::exit(1);
    }
}

/// Loads, builds and dry-runs one plan. Returns false if anything failed.
fn check_plan(path: &Path) -> bool {
    let Some(PlannedRoutine { mut routine, pass, .. }) = load_plan(path) else {
        return false;
    };

    let mut sink = CollectingSink::new();
    match pass.run(&mut routine, &mut sink) {
        Ok(_) => {
            forward_conflicts(&sink.conflicts);
            true
        }
        Err(err) => {
            eprintln!("In {}:", path.display());
            DiagnosticReporter::report_redirect_error(&err);
            false
        }
    }
}

fn load_plan(path: &Path) -> Option<PlannedRoutine> {
    let built = Plan::load(path).and_then(|plan| plan.build());
    match built {
        Ok(planned) => Some(planned),
        Err(PlanError::Assembly { code, errors }) => {
            eprintln!("In {}:", path.display());
            DiagnosticReporter::new(&code).report_asm_errors(&errors);
            None
        }
        Err(e) => {
            eprintln!("Error in {}: {}", path.display(), e);
            None
        }
    }
}

fn forward_conflicts(conflicts: &[Conflict]) {
    let mut tracing_sink = TracingSink;
    for conflict in conflicts {
        tracing_sink.conflict(conflict);
    }
}
