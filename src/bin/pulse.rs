//! Pulse CLI - Command-line interface for Pulse Metrics
//!
//! Commands:
//! - analyze: Run the full pipeline over a CSV export
//! - validate: Check headers and report what cleaning would drop
//! - schema: Print the canonical columns and accepted header aliases

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pulse_metrics::config::PipelineConfig;
use pulse_metrics::encoder::{encode_table_csv, ReportEncoder, TableKind};
use pulse_metrics::ingest;
use pulse_metrics::pipeline::AnalyticsPipeline;
use pulse_metrics::schema::AliasTable;
use pulse_metrics::types::{CanonicalField, Dimension};
use pulse_metrics::{AnalyticsError, ENGINE_VERSION};

/// Pulse - User-behavior and revenue analytics engine
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Turn user activity exports into retention and revenue metrics")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline over a CSV export
    Analyze {
        /// Input CSV path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,

        /// Table to export when the output format is csv
        #[arg(long)]
        table: Option<TableArg>,

        /// Pipeline configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Churn band edges, comma separated (e.g. 0,7,30)
        #[arg(long, value_delimiter = ',')]
        churn_bins: Option<Vec<i64>>,

        /// Loyalty band edges, comma separated (e.g. 100,300,500)
        #[arg(long, value_delimiter = ',')]
        loyalty_bins: Option<Vec<i64>>,

        /// Number of behavioral clusters
        #[arg(long)]
        clusters: Option<usize>,

        /// Clustering seed
        #[arg(long)]
        seed: Option<u64>,

        /// First day of the week for WAU buckets (e.g. mon, sun)
        #[arg(long)]
        week_start: Option<chrono::Weekday>,
    },

    /// Check headers and report what cleaning would drop
    Validate {
        /// Input CSV path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical columns and accepted header aliases
    Schema {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Compact JSON report envelope
    Json,
    /// Pretty-printed JSON report envelope
    JsonPretty,
    /// A single table as CSV (requires --table)
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum TableArg {
    Daily,
    Weekly,
    Monthly,
    RevenueTrend,
    Cohorts,
    Segments,
    Churn,
    Loyalty,
    Clusters,
    ClusterProfiles,
}

impl From<TableArg> for TableKind {
    fn from(arg: TableArg) -> Self {
        match arg {
            TableArg::Daily => TableKind::Daily,
            TableArg::Weekly => TableKind::Weekly,
            TableArg::Monthly => TableKind::Monthly,
            TableArg::RevenueTrend => TableKind::RevenueTrend,
            TableArg::Cohorts => TableKind::Cohorts,
            TableArg::Segments => TableKind::Segments,
            TableArg::Churn => TableKind::Churn,
            TableArg::Loyalty => TableKind::Loyalty,
            TableArg::Clusters => TableKind::Clusters,
            TableArg::ClusterProfiles => TableKind::ClusterProfiles,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| error.message.clone())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Analyze {
            input,
            output,
            output_format,
            table,
            config,
            churn_bins,
            loyalty_bins,
            clusters,
            seed,
            week_start,
        } => {
            let mut pipeline_config = match config {
                Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
                None => PipelineConfig::default(),
            };
            if let Some(bins) = churn_bins {
                pipeline_config.churn_bins = bins;
            }
            if let Some(bins) = loyalty_bins {
                pipeline_config.loyalty_bins = bins;
            }
            if let Some(k) = clusters {
                pipeline_config.cluster_count = k;
            }
            if let Some(seed) = seed {
                pipeline_config.cluster_seed = seed;
            }
            if let Some(day) = week_start {
                pipeline_config.week_start = day;
            }

            cmd_analyze(&input, &output, output_format, table, pipeline_config)
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Schema { json } => cmd_schema(json),
    }
}

/// Raw bytes; rows that are not UTF-8 are isolated during ingestion
fn read_input(input: &Path) -> Result<Vec<u8>, PulseCliError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(PulseCliError::InteractiveStdin);
        }
        let mut buffer = Vec::new();
        io::stdin().read_to_end(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read(input)?)
    }
}

fn cmd_analyze(
    input: &Path,
    output: &Path,
    output_format: OutputFormat,
    table: Option<TableArg>,
    config: PipelineConfig,
) -> Result<(), PulseCliError> {
    let input_data = read_input(input)?;
    let raw = ingest::read_csv(input_data.as_slice())?;

    let pipeline = AnalyticsPipeline::new(config)?;
    let report = pipeline.run(&raw)?;

    let output_data = match output_format {
        OutputFormat::Json => ReportEncoder::new().encode_to_json(&report, pipeline.config())?,
        OutputFormat::JsonPretty => {
            ReportEncoder::new().encode_to_json_pretty(&report, pipeline.config())?
        }
        OutputFormat::Csv => {
            let table = table.ok_or(PulseCliError::MissingTable)?;
            encode_table_csv(&report, table.into())?
        }
    };

    if output.to_string_lossy() == "-" {
        println!("{}", output_data.trim_end());
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), PulseCliError> {
    let input_data = read_input(input)?;
    let raw = ingest::read_csv(input_data.as_slice())?;

    let pipeline = AnalyticsPipeline::new(PipelineConfig::default())?;
    let cleaned = pipeline.prepare(&raw)?;
    let diagnostics = &cleaned.diagnostics;

    let report = ValidationReport {
        input_rows: diagnostics.input_rows,
        retained_records: diagnostics.retained_records,
        excluded_records: diagnostics.excluded_records(),
        revenue_excluded: diagnostics.revenue_excluded(),
        dimensions: cleaned.dimensions.iter().map(|d| d.key().to_string()).collect(),
        issues: diagnostics
            .samples
            .iter()
            .map(|s| IssueDetail {
                row: s.row_index,
                message: s.message.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Input rows:          {}", report.input_rows);
        println!("Retained records:    {}", report.retained_records);
        println!("Excluded records:    {}", report.excluded_records);
        println!("Revenue excluded:    {}", report.revenue_excluded);
        println!(
            "Optional dimensions: {}",
            if report.dimensions.is_empty() {
                "none".to_string()
            } else {
                report.dimensions.join(", ")
            }
        );

        if !report.issues.is_empty() {
            println!("\nIssues (first {}):", report.issues.len());
            for issue in &report.issues {
                println!("  - Row {}: {}", issue.row, issue.message);
            }
        }
    }

    if report.retained_records == 0 {
        return Err(PulseCliError::NoRecords);
    }

    Ok(())
}

fn cmd_schema(json: bool) -> Result<(), PulseCliError> {
    let aliases = AliasTable::default();
    let info = SchemaInfo {
        required: CanonicalField::ALL
            .iter()
            .map(|f| f.display_name().to_string())
            .collect(),
        optional: Dimension::ALL.iter().map(|d| d.key().to_string()).collect(),
        aliases: aliases
            .entries()
            .map(|(alias, target)| AliasEntry {
                header: alias.to_string(),
                column: target.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Required columns: {}", info.required.join(", "));
        println!("Optional columns: {}", info.optional.join(", "));
        println!("\nHeaders are trimmed, lowercased and separator runs become '_' before matching.");
        println!("\nAccepted headers:");
        for entry in &info.aliases {
            println!("  {:<24} -> {}", entry.header, entry.column);
        }
    }

    Ok(())
}

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Analytics(AnalyticsError),
    Json(serde_json::Error),
    InteractiveStdin,
    MissingTable,
    NoRecords,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<AnalyticsError> for PulseCliError {
    fn from(e: AnalyticsError) -> Self {
        PulseCliError::Analytics(e)
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Analytics(e) => {
                let (code, hint) = match &e {
                    AnalyticsError::Schema { .. } => (
                        "SCHEMA_ERROR",
                        "Run 'pulse schema' to see accepted header names",
                    ),
                    AnalyticsError::InvalidConfig(_) => (
                        "CONFIG_ERROR",
                        "Bins must be strictly increasing and cluster count at least 1",
                    ),
                    AnalyticsError::InsufficientData { .. } => (
                        "INSUFFICIENT_DATA",
                        "Run 'pulse validate' to see which rows were excluded",
                    ),
                    AnalyticsError::EmptyInput | AnalyticsError::Csv(_) => {
                        ("CSV_ERROR", "Ensure the input is a CSV file with a header row")
                    }
                    AnalyticsError::Json(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AnalyticsError::EncodingError(_) => {
                        ("ENCODING_ERROR", "Choose a table whose stage completed")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "Refusing to read CSV from an interactive terminal".to_string(),
                hint: Some("Pipe a file into stdin or pass --input <path>".to_string()),
            },
            PulseCliError::MissingTable => CliError {
                code: "MISSING_TABLE".to_string(),
                message: "CSV output needs a table to export".to_string(),
                hint: Some("Pass --table, e.g. --table churn".to_string()),
            },
            PulseCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records survived cleaning".to_string(),
                hint: Some("Check date columns and the validation issues above".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    input_rows: usize,
    retained_records: usize,
    excluded_records: usize,
    revenue_excluded: usize,
    dimensions: Vec<String>,
    issues: Vec<IssueDetail>,
}

#[derive(serde::Serialize)]
struct IssueDetail {
    row: usize,
    message: String,
}

#[derive(serde::Serialize)]
struct SchemaInfo {
    required: Vec<String>,
    optional: Vec<String>,
    aliases: Vec<AliasEntry>,
}

#[derive(serde::Serialize)]
struct AliasEntry {
    header: String,
    column: String,
}
