//! apicheck CLI - API test runner with learned assertion suggestions

mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use apicheck_core::summary::format_pct;
use apicheck_core::{
    BatchReport, Config, ExecutionResult, InMemoryPatternStore, PatternStore, Suggestion,
    TestCase, TestSuite,
};
use apicheck_runner::{
    BatchOptions, Orchestrator, ReqwestTransport, SimulatedTransport, Transport,
};

#[derive(Parser)]
#[command(name = "apicheck")]
#[command(about = "API test runner with learned assertion and next-call suggestions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Verbose output (debug logs on stderr; APICHECK_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test in a suite
    Run {
        /// Suite file (.json, .yaml, .toml)
        suite: PathBuf,

        /// Config file (default: .apicheck.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run tests concurrently
        #[arg(long)]
        concurrent: bool,

        /// Max in-flight tests in concurrent mode
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Answer requests from a routes file instead of the network
        #[arg(long)]
        simulate: Option<PathBuf>,

        /// Pattern store file (default: ~/.apicheck/patterns.json)
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Do not write a report under ~/.apicheck/reports
        #[arg(long)]
        no_save: bool,
    },

    /// Suggest assertions and follow-up calls for tests in a suite
    Suggest {
        /// Suite file (.json, .yaml, .toml)
        suite: PathBuf,

        /// Only this test (id or name)
        #[arg(short, long)]
        test: Option<String>,

        /// Execute the test first and include response-based suggestions
        #[arg(long)]
        run: bool,

        /// Accept assertion suggestions and write the updated suite here (JSON)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Config file (default: .apicheck.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Answer requests from a routes file instead of the network
        #[arg(long)]
        simulate: Option<PathBuf>,

        /// Pattern store file (default: ~/.apicheck/patterns.json)
        #[arg(long)]
        patterns: Option<PathBuf>,
    },

    /// Show learned patterns
    Patterns {
        /// Config file (default: .apicheck.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pattern store file (default: ~/.apicheck/patterns.json)
        #[arg(long)]
        patterns: Option<PathBuf>,

        /// Delete the pattern store
        #[arg(long)]
        clear: bool,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for suite files
    Schema {
        /// Export the run report schema instead
        #[arg(long)]
        report: bool,
    },
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("APICHECK_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            suite,
            config,
            concurrent,
            max_concurrent,
            simulate,
            patterns,
            no_save,
        } => {
            let cfg = load_config(config.as_deref())?;
            let suite = load_suite(&suite)?;
            if suite.tests.is_empty() {
                eprintln!("Error: suite '{}' has no tests", suite.name);
                return Ok(3);
            }

            let patterns_path = storage::patterns_path(patterns.as_deref(), &cfg)?;
            let store = Arc::new(storage::load_patterns(&patterns_path)?);
            let orchestrator = orchestrator(&cfg, &suite, simulate.as_deref(), store.clone())?
                .with_max_concurrent(max_concurrent.unwrap_or(cfg.max_concurrent));

            if cli.output != OutputFormat::Silent {
                eprintln!("Suite:    {} ({} tests)", suite.name, suite.tests.len());
                if let Some(routes) = &simulate {
                    eprintln!("Simulate: {}", routes.display());
                }
                eprintln!(
                    "Mode:     {}",
                    if concurrent || cfg.concurrent { "concurrent" } else { "sequential" }
                );
                eprintln!();
            }

            let options = if concurrent || cfg.concurrent {
                BatchOptions::concurrent()
            } else {
                BatchOptions::sequential()
            };
            let report = orchestrator.run_batch(&suite.tests, &options);

            match cli.output {
                OutputFormat::Terminal => print_report(&suite, &report),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Silent => {}
            }

            if let Err(e) = storage::save_patterns(&patterns_path, store.as_ref()) {
                eprintln!("Warning: failed to save patterns: {e}");
            }

            if cfg.save_reports && !no_save {
                let data = storage::ReportData {
                    suite_name: &suite.name,
                    config: &cfg,
                    report: &report,
                    simulated: simulate.is_some(),
                };
                match storage::report_base_dir().and_then(|base| storage::save_report(&base, &data))
                {
                    Ok(path) => {
                        if cli.output != OutputFormat::Silent {
                            eprintln!("Report saved: {}", path.display());
                        }
                    }
                    Err(e) => eprintln!("Warning: failed to save report: {e}"),
                }
            }

            Ok(report.summary.exit_code())
        }

        Commands::Suggest {
            suite: suite_path,
            test,
            run,
            save,
            config,
            simulate,
            patterns,
        } => {
            let cfg = load_config(config.as_deref())?;
            let mut suite = load_suite(&suite_path)?;

            let patterns_path = storage::patterns_path(patterns.as_deref(), &cfg)?;
            let store = Arc::new(storage::load_patterns(&patterns_path)?);
            let orchestrator = orchestrator(&cfg, &suite, simulate.as_deref(), store.clone())?;

            let selected: Vec<usize> = match &test {
                Some(key) => {
                    let Some(index) = suite.position(key) else {
                        bail!("no test '{key}' in suite '{}'", suite.name);
                    };
                    vec![index]
                }
                None => (0..suite.tests.len()).collect(),
            };

            let mut output = Vec::new();
            let mut accepted = 0;
            for index in selected {
                let case = &mut suite.tests[index];
                let result = if run {
                    Some(orchestrator.run_and_record(case))
                } else {
                    case.last_result.clone()
                };
                let suggestions = orchestrator.suggestions(case, result.as_ref());
                if save.is_some() {
                    accepted += suggestions.iter().filter(|s| case.accept(s)).count();
                }
                output.push((case.label(), case.id.clone(), result, suggestions));
            }

            match cli.output {
                OutputFormat::Terminal => {
                    for (label, _, result, suggestions) in &output {
                        print_suggestions(label, result.as_ref(), suggestions);
                    }
                }
                OutputFormat::Json => {
                    let json: Vec<_> = output
                        .iter()
                        .map(|(_, id, result, suggestions)| {
                            serde_json::json!({
                                "test_id": id,
                                "result": result,
                                "suggestions": suggestions,
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Silent => {}
            }

            if run {
                if let Err(e) = storage::save_patterns(&patterns_path, store.as_ref()) {
                    eprintln!("Warning: failed to save patterns: {e}");
                }
            }

            if let Some(path) = save {
                suite.save(&path)?;
                if cli.output != OutputFormat::Silent {
                    eprintln!("Accepted {accepted} assertions -> {}", path.display());
                }
            }
            Ok(0)
        }

        Commands::Patterns {
            config,
            patterns,
            clear,
        } => {
            let cfg = load_config(config.as_deref())?;
            let path = storage::patterns_path(patterns.as_deref(), &cfg)?;

            if clear {
                if path.exists() {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("Cannot remove {}", path.display()))?;
                }
                println!("Cleared {}", path.display());
                return Ok(0);
            }

            let store = storage::load_patterns(&path)?;
            match cli.output {
                OutputFormat::Terminal => print_patterns(&path, &store),
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&store.entries())?);
                }
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Init => {
            let config_path = ".apicheck.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - variables: values for {{{{name}}}} placeholders");
            println!("  - headers: auth tokens, API keys");
            println!("  - max_concurrent: worker count for --concurrent");
            Ok(0)
        }

        Commands::Schema { report } => {
            let schema = if report {
                apicheck_core::schema::generate_report_schema()
            } else {
                apicheck_core::schema::generate_schema()
            };
            println!("{schema}");
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let cfg = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    Ok(cfg)
}

fn load_suite(path: &Path) -> Result<TestSuite> {
    TestSuite::load(path).with_context(|| format!("Cannot load suite {}", path.display()))
}

/// Suite variables, overridden by config variables.
fn orchestrator(
    cfg: &Config,
    suite: &TestSuite,
    simulate: Option<&Path>,
    store: Arc<InMemoryPatternStore>,
) -> Result<Orchestrator<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = match simulate {
        Some(routes) => Box::new(SimulatedTransport::load(routes)?),
        None => Box::new(ReqwestTransport::from_config(cfg)?),
    };
    Ok(Orchestrator::new(transport)
        .with_variables(suite.variables.clone())
        .with_variables(cfg.variables.clone())
        .with_default_headers(cfg.headers.clone())
        .with_max_concurrent(cfg.max_concurrent)
        .with_patterns(store))
}

fn print_report(suite: &TestSuite, report: &BatchReport) {
    for result in &report.results {
        let label = suite
            .find(&result.test_id)
            .map_or_else(|| result.test_id.clone(), TestCase::label);
        print_result(&label, result);
    }

    let s = &report.summary;
    let verdict = if s.all_passed() { "PASS" } else { "FAIL" };
    println!(
        "\n{verdict}: {} total, {} passed, {} failed, {} errored, {} cancelled ({})",
        s.total,
        s.passed,
        s.failed,
        s.errored,
        s.cancelled,
        format_pct(s.success_rate),
    );
    println!("  Duration: {:.0}ms", s.elapsed_ms);
    println!("  Exit code: {}", s.exit_code());
}

fn print_result(label: &str, result: &ExecutionResult) {
    if let Some(error) = &result.error {
        println!("ERROR {label}: {error}");
        return;
    }
    let icon = if result.passed { "PASS " } else { "FAIL " };
    let status = result.response.as_ref().map_or(0, |r| r.status_code);
    println!("{icon} {label} -> {status} ({:.0}ms)", result.elapsed_ms);
    for r in result.assertion_results.iter().filter(|r| !r.passed) {
        println!("        {} (actual: {})", r.assertion, r.actual_value);
    }
}

fn print_suggestions(label: &str, result: Option<&ExecutionResult>, suggestions: &[Suggestion]) {
    println!("{label}");
    if let Some(result) = result {
        print_result("  last run", result);
    }
    if suggestions.is_empty() {
        println!("  (no suggestions)");
    }
    for s in suggestions {
        println!("  {s}");
    }
    println!();
}

fn print_patterns(path: &Path, store: &InMemoryPatternStore) {
    let entries = store.entries();
    println!("{} ({} patterns)", path.display(), entries.len());
    for entry in &entries {
        println!(
            "\n{} {}  x{}",
            entry.method, entry.url_pattern, entry.confidence
        );
        if !entry.fields.is_empty() {
            let fields: Vec<&str> = entry.fields.iter().map(String::as_str).collect();
            println!("  fields: {}", fields.join(", "));
        }
        for assertion in &entry.assertions {
            println!("  - {assertion}");
        }
    }
}
