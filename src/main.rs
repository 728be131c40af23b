//! CLI entry point for the benchmarking pipeline.
//!
//! Provides commands for dataset conversion, LID profiling, the build/search
//! sweep and result aggregation. Library errors surface as `PipelineError`
//! and are mapped to semantic exit codes here.

use std::path::{Path, PathBuf};
use std::time::Instant;

use adasweep::adapters::{
    ArrayRole, RecordFormat, compute_ground_truth, convert_records, convert_role, extract_queries,
};
use adasweep::codec::{FileReport, inspect};
use adasweep::display::{
    THEME, TableBuilder, create_grid_table, create_help_text, create_ledger_summary_table,
    create_lid_stats_table, create_progress_bar, create_sweep_report_table, with_spinner,
};
use adasweep::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use adasweep::lid::{LidEstimator, LidMode, ProfileStats, default_profile_path, profile_stats};
use adasweep::results::{aggregate_results, load_ledger, write_summary};
use adasweep::sweep::{Orchestrator, ProcessEngine, expand_grid};
use adasweep::{Ledger, PipelineError, Settings};
use anyhow::{Context, Result, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// LID-adaptive graph index benchmarking pipeline
#[derive(Parser)]
#[command(
    name = "adasweep",
    version = env!("CARGO_PKG_VERSION"),
    about = "LID-adaptive graph index benchmarking pipeline",
    long_about = "Convert vector datasets, estimate LID profiles, sweep index parameters and aggregate results.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print one JSON document instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .adasweep directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display effective settings (defaults, file and AS_* environment)")]
    Config,

    /// Check canonical files
    #[command(about = "Print header and expected/actual size of canonical files")]
    Inspect {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Convert fvecs/ivecs/bvecs
    #[command(about = "Convert a per-record-header file (fvecs, ivecs, bvecs) to canonical form")]
    Convert {
        input: PathBuf,
        output: PathBuf,

        /// Input layout (inferred from the extension when omitted)
        #[arg(short, long)]
        format: Option<RecordFormat>,

        /// Convert only the first N records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Convert an NPY container directory
    #[command(
        about = "Convert train/test/neighbors arrays of an NPY container directory",
        after_help = "Writes <output_dir>/<name>_base.bin, _query.bin and _gt.bin."
    )]
    ConvertNpy {
        container: PathBuf,
        output_dir: PathBuf,

        /// Dataset name used in output file names (defaults to the container name)
        #[arg(long)]
        name: Option<String>,

        /// Roles to convert (train, test, neighbors); all present ones by default
        #[arg(long, value_delimiter = ',')]
        roles: Vec<ArrayRole>,

        /// L2-normalize float rows (angular source metric)
        #[arg(long)]
        normalize: bool,
    },

    /// Extract queries from a base file
    #[command(about = "Copy the first N rows of a base file into a query file")]
    Queries {
        base: PathBuf,
        output: PathBuf,

        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,
    },

    /// Compute exact ground truth
    #[command(about = "Compute exact top-K L2 neighbor ids of each query over a base file")]
    Groundtruth {
        base: PathBuf,
        queries: PathBuf,
        output: PathBuf,

        #[arg(short, long, default_value_t = 100)]
        k: usize,
    },

    /// Estimate a LID profile
    #[command(about = "Estimate the per-point LID profile of a float dataset")]
    Lid {
        input: PathBuf,

        /// Output profile (defaults to <name>_lid.bin next to a <name>_base.bin input)
        output: Option<PathBuf>,

        /// Neighbors in the MLE estimate (overrides config)
        #[arg(short, long)]
        k: Option<usize>,

        /// exact, sample or auto (overrides config)
        #[arg(short, long)]
        mode: Option<LidMode>,

        /// Prefix sample size for sample mode (overrides config)
        #[arg(long)]
        sample_size: Option<usize>,

        /// Seed for sample mode (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads for exact mode (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Summarize LID profiles
    #[command(about = "Print count, mean, std, min, max and median of LID profiles")]
    LidStats {
        #[arg(required = true)]
        profiles: Vec<PathBuf>,
    },

    /// Run the parameter sweep
    #[command(
        about = "Build and search every grid configuration, appending results to the ledger",
        after_help = "Configurations already in the ledger are skipped; rerun to resume."
    )]
    Sweep {
        /// Print the expanded grid without running anything
        #[arg(long)]
        dry_run: bool,

        /// Restrict to these datasets
        #[arg(short, long, value_delimiter = ',')]
        dataset: Vec<String>,

        /// Threads handed to the engine (overrides config)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Aggregate result files
    #[command(about = "Parse result text files into one sorted summary CSV")]
    Aggregate {
        /// Directories to scan (defaults to aggregate.input_dirs)
        dirs: Vec<PathBuf>,

        /// Summary CSV (defaults to aggregate.output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Summarize a ledger
    #[command(about = "Show the best recall per configuration of a ledger")]
    Ledger {
        /// Ledger CSV (defaults to sweep.ledger_path)
        path: Option<PathBuf>,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    if let Commands::Init { force } = cli.command {
        return match Settings::init_config_file(force) {
            Ok(path) => {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Created configuration file at: {}",
                        path.display()
                    ))
                );
                println!("Edit this file to customize your settings.");
                ExitCode::Success.into()
            }
            Err(e) => {
                eprintln!("{}", THEME.error_with_icon(&format!("Error: {e}")));
                ExitCode::ConfigError.into()
            }
        };
    }

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            report_error(&anyhow::Error::new(e), format);
            return ExitCode::ConfigError.into();
        }
    };
    init_tracing(&settings, cli.verbose);

    let started = Instant::now();
    match run(cli.command, &settings, format, started) {
        Ok(code) => code.into(),
        Err(e) => {
            report_error(&e, format);
            ExitCode::from_anyhow(&e).into()
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, PipelineError> {
    let loaded = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| PipelineError::ConfigError {
        reason: e.to_string(),
    })
}

/// RUST_LOG takes precedence over `log_level`; logs go to stderr.
fn init_tracing(settings: &Settings, verbose: bool) {
    let default = if verbose || settings.debug {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn report_error(error: &anyhow::Error, format: OutputFormat) {
    if format.is_json() {
        print_json(&JsonResponse::from_anyhow(error));
        return;
    }
    eprintln!("{}", THEME.error_with_icon(&format!("{error:#}")));
    if let Some(pipeline) = error.downcast_ref::<PipelineError>() {
        for suggestion in pipeline.recovery_suggestions() {
            eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error serializing output: {e}"),
    }
}

/// Prints `data` as a JSON envelope, or the text produced by `text`.
fn emit<T: Serialize>(
    format: OutputFormat,
    started: Instant,
    data: T,
    text: impl FnOnce(&T) -> String,
) -> ExitCode {
    if format.is_json() {
        let elapsed = u64::try_from(started.elapsed().as_millis()).ok();
        print_json(&JsonResponse::success(data).with_meta(ResponseMeta::new(elapsed)));
    } else {
        println!("{}", text(&data));
    }
    ExitCode::Success
}

fn run(
    command: Commands,
    settings: &Settings,
    format: OutputFormat,
    started: Instant,
) -> Result<ExitCode> {
    let block_rows = settings.codec.block_rows;

    match command {
        Commands::Init { .. } => unreachable!("handled before settings are loaded"),

        Commands::Config => {
            if format.is_json() {
                return Ok(emit(format, started, settings, |_| String::new()));
            }
            println!("{}", THEME.apply(&THEME.header, "Current Configuration:"));
            println!("{}", "=".repeat(50));
            let text = toml::to_string_pretty(settings).context("rendering settings")?;
            println!("{text}");
            Ok(ExitCode::Success)
        }

        Commands::Inspect { paths } => {
            #[derive(Serialize)]
            struct Inspected {
                path: PathBuf,
                #[serde(flatten)]
                report: FileReport,
            }

            let mut rows = Vec::with_capacity(paths.len());
            for path in paths {
                let report = inspect(&path)?;
                rows.push(Inspected { path, report });
            }
            let consistent = rows.iter().all(|r| r.report.is_consistent());

            emit(format, started, &rows, |rows| {
                let mut table = TableBuilder::new().set_headers(vec![
                    "File", "N", "D", "Expected bytes", "Actual bytes", "Status",
                ]);
                for r in rows.iter() {
                    let status = if r.report.is_consistent() { "ok" } else { "SIZE MISMATCH" };
                    table = table.add_row(vec![
                        r.path.display().to_string(),
                        r.report.header.num_points.to_string(),
                        r.report.header.dimension.to_string(),
                        r.report.expected_bytes.to_string(),
                        r.report.actual_bytes.to_string(),
                        status.to_string(),
                    ]);
                }
                table.align_right(&[1, 2, 3, 4]).build()
            });
            Ok(if consistent {
                ExitCode::Success
            } else {
                ExitCode::DatasetCorrupted
            })
        }

        Commands::Convert {
            input,
            output,
            format: record_format,
            limit,
        } => {
            let record_format = record_format
                .or_else(|| RecordFormat::from_path(&input))
                .with_context(|| {
                    format!(
                        "cannot infer the format of {} from its extension; pass --format",
                        input.display()
                    )
                })?;
            let summary =
                convert_records(&input, &output, record_format, &settings.convert, limit)?;
            Ok(emit(format, started, summary, |s| {
                THEME.success_with_icon(&format!(
                    "{} -> {}: {} x {} {} ({} batch{})",
                    s.source.display(),
                    s.output.display(),
                    s.header.num_points,
                    s.header.dimension,
                    s.kind,
                    s.batches,
                    if s.batches == 1 { "" } else { "es" }
                ))
            }))
        }

        Commands::ConvertNpy {
            container,
            output_dir,
            name,
            roles,
            normalize,
        } => {
            let name = match name {
                Some(name) => name,
                None => container
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("container path has no name; pass --name")?,
            };
            let explicit = !roles.is_empty();
            let roles = if explicit {
                roles
            } else {
                vec![ArrayRole::Train, ArrayRole::Test, ArrayRole::Neighbors]
            };

            let mut summaries = Vec::new();
            for role in roles {
                let dst = output_dir.join(format!("{name}_{}.bin", role.file_suffix()));
                match convert_role(&container, role, &dst, normalize, block_rows) {
                    Ok(summary) => summaries.push(summary),
                    Err(PipelineError::DatasetNotFound { path }) if !explicit => {
                        warn!("No '{}' array at {}; skipped", role.key(), path.display());
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Ok(emit(format, started, summaries, |all| {
                all.iter()
                    .map(|s| {
                        THEME.success_with_icon(&format!(
                            "{} -> {}: {} x {} {}",
                            s.source.display(),
                            s.output.display(),
                            s.header.num_points,
                            s.header.dimension,
                            s.kind
                        ))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }))
        }

        Commands::Queries {
            base,
            output,
            count,
        } => {
            let header = extract_queries(&base, &output, count, block_rows)?;
            Ok(emit(format, started, header, |h| {
                THEME.success_with_icon(&format!(
                    "Wrote {} queries of dimension {} to {}",
                    h.num_points,
                    h.dimension,
                    output.display()
                ))
            }))
        }

        Commands::Groundtruth {
            base,
            queries,
            output,
            k,
        } => {
            let run = || compute_ground_truth(&base, &queries, &output, k, block_rows);
            let header = if format.is_json() {
                run()?
            } else {
                with_spinner("Computing exact ground truth", run)?
            };
            Ok(emit(format, started, header, |h| {
                THEME.success_with_icon(&format!(
                    "Wrote top-{} neighbors of {} queries to {}",
                    h.dimension,
                    h.num_points,
                    output.display()
                ))
            }))
        }

        Commands::Lid {
            input,
            output,
            k,
            mode,
            sample_size,
            seed,
            threads,
        } => {
            let mut config = settings.lid.clone();
            if let Some(k) = k {
                config.k = k;
            }
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if let Some(sample_size) = sample_size {
                config.sample_size = sample_size;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(threads) = threads {
                config.threads = threads;
            }

            let estimator = LidEstimator::new(config, block_rows)?;
            let output = output.unwrap_or_else(|| default_profile_path(&input));
            let run = || estimator.estimate(&input, &output);
            let summary = if format.is_json() {
                run()?
            } else {
                with_spinner("Estimating LID profile", run)?
            };

            Ok(emit(format, started, summary, |s| {
                let line = THEME.success_with_icon(&format!(
                    "{} -> {} ({} mode, k={}, {} of {} points estimated)",
                    s.source.display(),
                    s.output.display(),
                    s.mode,
                    s.k,
                    s.estimated_points,
                    s.num_points
                ));
                let table =
                    create_lid_stats_table(&[(s.source.display().to_string(), s.estimated)]);
                format!("{line}\n{table}")
            }))
        }

        Commands::LidStats { profiles } => {
            #[derive(Serialize)]
            struct ProfileRow {
                profile: PathBuf,
                #[serde(flatten)]
                stats: ProfileStats,
            }

            let mut rows = Vec::with_capacity(profiles.len());
            for profile in profiles {
                let stats = profile_stats(&profile, block_rows)?;
                rows.push(ProfileRow { profile, stats });
            }
            Ok(emit(format, started, rows, |rows| {
                let named: Vec<(String, ProfileStats)> = rows
                    .iter()
                    .map(|r| (r.profile.display().to_string(), r.stats))
                    .collect();
                create_lid_stats_table(&named)
            }))
        }

        Commands::Sweep {
            dry_run,
            dataset,
            threads,
            no_progress,
        } => {
            let mut sweep = settings.sweep.clone();
            if let Some(threads) = threads {
                sweep.threads = threads;
            }
            let mut tasks = sweep.tasks.clone();
            if !dataset.is_empty() {
                tasks.retain(|t| dataset.contains(&t.dataset));
                if tasks.is_empty() {
                    return Err(anyhow!("no sweep task matches datasets {dataset:?}"));
                }
            }
            let grid = expand_grid(&tasks);

            if dry_run {
                return Ok(emit(format, started, &grid, |g| {
                    format!("{}\n{} configurations", create_grid_table(g), g.len())
                }));
            }

            std::fs::create_dir_all(&sweep.temp_dir).map_err(|source| {
                PipelineError::FileWrite {
                    path: sweep.temp_dir.clone(),
                    source,
                }
            })?;
            let ledger = Ledger::open(&sweep.ledger_path)?;
            info!(
                "Ledger {} holds {} rows; {} configurations in grid",
                ledger.path().display(),
                ledger.len(),
                grid.len()
            );

            let engine = ProcessEngine::new(sweep.clone());
            let mut orchestrator = Orchestrator::new(engine, sweep, ledger);
            if !format.is_json() && !no_progress {
                orchestrator =
                    orchestrator.with_progress(create_progress_bar(grid.len() as u64, "sweep"));
            }
            let report = orchestrator.run(&grid)?;
            let code = ExitCode::from_sweep_report(&report);

            if format.is_json() {
                let elapsed = u64::try_from(started.elapsed().as_millis()).ok();
                let message = format!("{} rows recorded", report.recorded);
                print_json(
                    &JsonResponse::partial(&report, code, &message)
                        .with_meta(ResponseMeta::new(elapsed)),
                );
            } else {
                println!("{}", create_sweep_report_table(&report));
                if !code.is_success() {
                    println!(
                        "{}",
                        THEME.warning_with_icon("Some configurations failed; see the log above")
                    );
                }
            }
            Ok(code)
        }

        Commands::Aggregate { dirs, output } => {
            let dirs = if dirs.is_empty() {
                settings.aggregate.input_dirs.clone()
            } else {
                dirs
            };
            let output = output.unwrap_or_else(|| settings.aggregate.output.clone());

            let (rows, report) = aggregate_results(&dirs)?;
            write_summary(&rows, &output)?;
            Ok(emit(format, started, report, |r| {
                THEME.success_with_icon(&format!(
                    "{} rows from {} files ({} skipped, {} duplicates dropped) -> {}",
                    r.rows,
                    r.files_seen - r.files_skipped,
                    r.files_skipped,
                    r.duplicates_dropped,
                    output.display()
                ))
            }))
        }

        Commands::Ledger { path } => {
            let path = path.unwrap_or_else(|| settings.sweep.ledger_path.clone());
            let rows = load_ledger(&path)?;
            Ok(emit(format, started, rows, |rows| {
                format!(
                    "{}\n{} rows in {}",
                    create_ledger_summary_table(rows),
                    THEME.apply(&THEME.number, rows.len()),
                    THEME.apply(&THEME.path, path.display())
                )
            }))
        }
    }
}
