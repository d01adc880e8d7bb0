//! RulePivot CLI - convert clearance rules between .RUL files and pivot tables.

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use rulepivot::{
    Cell, CheckResult, ClearanceUnit, ConversionOptions, PivotConversion, Preferences,
    RulConversion, RulePivotCore, RuleError, UnitDetection,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rulepivot")]
#[command(about = "Net-class clearance rule and pivot table converter", long_about = None)]
#[command(version)]
struct Cli {
    /// Preferences file (JSON)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). RULEPIVOT_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Exit with error code if any rule block failed to parse
    #[arg(long, global = true)]
    fail_on_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a .RUL file and report its rules and errors
    Check {
        /// Path to .RUL file
        #[arg(value_name = "RUL")]
        file: PathBuf,

        /// Treat duplicate rule names as errors
        #[arg(long)]
        strict: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Build a clearance pivot table from a .RUL file
    ToPivot {
        /// Path to .RUL file
        #[arg(value_name = "RUL")]
        file: PathBuf,

        /// Unit of the table values
        #[arg(short, long)]
        unit: Option<ClearanceUnit>,

        /// Write the table as a JSON cell array to this file
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Generate a .RUL file from a pivot table
    ToRul {
        /// Pivot table as a JSON 2-D cell array
        #[arg(value_name = "PIVOT")]
        pivot: PathBuf,

        /// Unit of the table values (skips detection)
        #[arg(short, long)]
        unit: Option<ClearanceUnit>,

        /// Existing .RUL file to merge into
        #[arg(long, value_name = "RUL")]
        existing: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,

        /// Add a generation timestamp to the header
        #[arg(long)]
        timestamp: bool,

        /// Also write a Short-Circuit rule per net class
        #[arg(long)]
        short_circuit_rules: bool,

        /// Also write an Un-Routed Net rule per net class
        #[arg(long)]
        unrouted_net_rules: bool,
    },

    /// Suggest the unit of a pivot table
    DetectUnit {
        /// Pivot table as a JSON 2-D cell array
        #[arg(value_name = "PIVOT")]
        pivot: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_options(cli.config.as_deref()).and_then(|options| match cli.command {
        Commands::Check {
            file,
            strict,
            format,
        } => handle_check(&file, options, strict, &format, cli.fail_on_errors),
        Commands::ToPivot {
            file,
            unit,
            output,
            format,
        } => handle_to_pivot(&file, options, unit, output.as_deref(), &format, cli.fail_on_errors),
        Commands::ToRul {
            pivot,
            unit,
            existing,
            output,
            timestamp,
            short_circuit_rules,
            unrouted_net_rules,
        } => {
            let mut options = options;
            options.timestamp = timestamp;
            options.merge.short_circuit_rules |= short_circuit_rules;
            options.merge.unrouted_net_rules |= unrouted_net_rules;
            handle_to_rul(
                &pivot,
                options,
                unit,
                existing.as_deref(),
                output.as_deref(),
                cli.fail_on_errors,
            )
        }
        Commands::DetectUnit { pivot, format } => handle_detect_unit(&pivot, &format),
    });

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };
    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("RULEPIVOT_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_options(config: Option<&Path>) -> anyhow::Result<ConversionOptions> {
    let prefs = match config {
        Some(path) => Preferences::load(path)?,
        None => Preferences::default(),
    };
    Ok(ConversionOptions::try_from(&prefs)?)
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_pivot(path: &Path) -> anyhow::Result<Vec<Vec<Cell>>> {
    let text = read_text(path)?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of cell rows", path.display()))
}

fn write_text(path: &Path, text: &str) -> anyhow::Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn error_exit_code(errors: &[RuleError], fail_on_errors: bool) -> i32 {
    if fail_on_errors && !errors.is_empty() {
        1
    } else {
        0
    }
}

fn report_errors(errors: &[RuleError]) {
    for error in errors {
        eprintln!("  error: {}", error);
    }
}

fn report_warnings<W: std::fmt::Display>(warnings: &[W]) {
    for warning in warnings {
        eprintln!("  warning: {}", warning);
    }
}

fn handle_check(
    file: &Path,
    mut options: ConversionOptions,
    strict: bool,
    format: &OutputFormat,
    fail_on_errors: bool,
) -> anyhow::Result<i32> {
    if strict {
        options.parse.strict_names = true;
    }
    let result = RulePivotCore::check_rul(&read_text(file)?, &options);
    match format {
        OutputFormat::Human => output_check_human(file, &result),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": file.display().to_string(),
                "rules": result.rules.iter().map(|r| {
                    serde_json::json!({
                        "name": r.name(),
                        "kind": r.kind(),
                        "enabled": r.enabled,
                        "priority": r.priority,
                        "scope": [r.scope().0.to_string(), r.scope().1.to_string()],
                    })
                }).collect::<Vec<_>>(),
                "errors": result.errors,
                "stats": result.stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(error_exit_code(&result.errors, fail_on_errors))
}

fn output_check_human(file: &Path, result: &CheckResult) {
    println!("\nFile: {}", file.display());
    println!("{}", "─".repeat(60));
    for rule in &result.rules {
        let state = if rule.enabled { "" } else { " (disabled)" };
        println!(
            "  {:>3}  {:<28} {}{}",
            rule.priority,
            rule.name(),
            rule.kind().display_name(),
            state
        );
    }
    if result.has_errors() {
        println!("\n  ERRORS:");
        for error in &result.errors {
            println!("    - {}", error);
        }
    }
    println!("\n  Summary:");
    println!("    Rules:     {}", result.stats.rules);
    println!("    Clearance: {}", result.stats.clearance);
    println!("    Disabled:  {}", result.stats.disabled);
    println!("    Opaque:    {}", result.stats.opaque);
    println!("    Errors:    {}", result.stats.errors);
}

fn handle_to_pivot(
    file: &Path,
    mut options: ConversionOptions,
    unit: Option<ClearanceUnit>,
    output: Option<&Path>,
    format: &OutputFormat,
    fail_on_errors: bool,
) -> anyhow::Result<i32> {
    if let Some(unit) = unit {
        options.display_unit = unit;
    }
    let result = RulePivotCore::rul_to_pivot(&read_text(file)?, &options);
    report_errors(&result.errors);
    report_warnings(&result.warnings);
    report_warnings(&result.pivot_warnings);

    if let Some(path) = output {
        write_text(path, &serde_json::to_string_pretty(&result.cells)?)?;
        eprintln!(
            "Wrote {} classes ({}) to {}",
            result.table.classes().len(),
            result.unit,
            path.display()
        );
    }

    match format {
        OutputFormat::Human if output.is_none() => output_pivot_human(&result),
        OutputFormat::Human => {}
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(error_exit_code(&result.errors, fail_on_errors))
}

fn output_pivot_human(result: &PivotConversion) {
    let text: Vec<Vec<String>> = result
        .cells
        .iter()
        .map(|row| row.iter().map(Cell::to_string).collect())
        .collect();
    let columns = text.first().map_or(0, Vec::len);
    let widths: Vec<usize> = (0..columns)
        .map(|c| text.iter().map(|row| row[c].chars().count()).max().unwrap_or(0))
        .collect();

    for (r, row) in text.iter().enumerate() {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(c, (cell, width))| {
                if c == 0 {
                    format!("{:<width$}", cell, width = width)
                } else {
                    format!("{:>width$}", cell, width = width)
                }
            })
            .collect();
        println!("{}", line.join("  "));
        if r == 0 {
            println!("{}", "─".repeat(widths.iter().sum::<usize>() + 2 * columns.saturating_sub(1)));
        }
    }
}

fn handle_to_rul(
    pivot: &Path,
    options: ConversionOptions,
    unit: Option<ClearanceUnit>,
    existing: Option<&Path>,
    output: Option<&Path>,
    fail_on_errors: bool,
) -> anyhow::Result<i32> {
    let cells = read_pivot(pivot)?;
    let existing = existing.map(read_text).transpose()?;

    let result = RulePivotCore::pivot_to_rul(&cells, existing.as_deref(), unit, &options)?;
    report_detection(&result);
    report_errors(&result.errors);
    report_warnings(&result.pivot_warnings);
    report_warnings(&result.warnings);

    match output {
        Some(path) => {
            write_text(path, &result.text)?;
            eprintln!("Wrote {} rules to {}", result.rules.len(), path.display());
        }
        None => print!("{}", result.text),
    }
    Ok(error_exit_code(&result.errors, fail_on_errors))
}

fn report_detection(result: &RulConversion) {
    if result.detection.is_guess() {
        eprintln!(
            "  note: assuming values are in {} (pass --unit to override)",
            result.detection.unit
        );
    }
}

fn handle_detect_unit(pivot: &Path, format: &OutputFormat) -> anyhow::Result<i32> {
    let detection: UnitDetection = RulePivotCore::detect_pivot_unit(&read_pivot(pivot)?)?;
    match format {
        OutputFormat::Human => println!("{} ({:?})", detection.unit, detection.source),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&detection)?),
    }
    Ok(0)
}
