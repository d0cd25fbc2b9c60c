//! build-keeper CLI
//!
//! Entry point for the `build-keeper` command-line tool. Plays the part of
//! the bundler hook: it is told which files a build produced and runs one
//! retention cycle for them.

use clap::{Args, Parser, Subcommand};
use build_keeper::config::DEFAULT_CONFIG_FILE;
use build_keeper::hash::capture_records;
use build_keeper::{ConfigError, KeeperConfig, KeeperOptions, RetentionEngine, Sha256Hasher};
use std::fs;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "build-keeper")]
#[command(about = "Keep the last N builds' assets and delete the rest", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to config file (default: build-keeper.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Build output directory
    #[arg(long, global = true)]
    output_root: Option<PathBuf>,

    /// Version ledger file
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Number of builds to retain (1-100)
    #[arg(long, global = true)]
    max_versions: Option<u32>,

    /// Path prefix of the retained subtree (e.g. "assets/")
    #[arg(long, global = true)]
    asset_prefix: Option<String>,

    /// Only log the cycle summary
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Bypass retention entirely
    #[arg(long, global = true)]
    disable: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a finished build and garbage-collect unreferenced assets
    Run {
        /// Files the build produced, relative to the output root
        files: Vec<String>,

        /// Read additional file names, one per line ("-" for stdin)
        #[arg(long)]
        files_from: Option<PathBuf>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List retained versions
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete the version ledger
    Reset,

    /// Validate the configuration and print effective values
    Check,
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.global) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    build_keeper::logging::init(config.verbose);

    match cli.command {
        Commands::Run { files, files_from, json } => {
            run_cycle(config, files, files_from, json);
        }
        Commands::Show { json } => {
            run_show(config, json);
        }
        Commands::Reset => {
            run_reset(config);
        }
        Commands::Check => {
            run_check(&config);
        }
    }
}

fn load_config(args: &GlobalArgs) -> Result<KeeperConfig, ConfigError> {
    let project_root = std::env::current_dir()?;

    let file_options = match &args.config {
        Some(path) => KeeperOptions::from_file(path)?,
        None => KeeperOptions::load_or_default(&project_root.join(DEFAULT_CONFIG_FILE))?,
    };

    let cli_options = KeeperOptions {
        enabled: args.disable.then_some(false),
        verbose: args.quiet.then_some(false),
        max_versions: args.max_versions,
        output_root: args.output_root.clone(),
        ledger_path: args.ledger.clone(),
        asset_prefix: args.asset_prefix.clone(),
    };

    file_options.merge(cli_options).validate(&project_root)
}

fn run_cycle(config: KeeperConfig, mut files: Vec<String>, files_from: Option<PathBuf>, json: bool) {
    if let Some(path) = files_from {
        match read_names(&path) {
            Ok(names) => files.extend(names),
            Err(e) => {
                eprintln!("Error reading file list {}: {}", path.display(), e);
                process::exit(1);
            }
        }
    }

    let engine = RetentionEngine::new(config);
    let records = capture_records(&Sha256Hasher, &engine.config().output_root, &files);

    let Some(report) = engine.run_cycle(records) else {
        if json {
            println!("null");
        } else {
            println!("Build keeper disabled; output left untouched");
        }
        return;
    };

    if json {
        match serde_json::to_string_pretty(&report.result) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        println!(
            "Version {}: {} files, {}/{} versions retained, {} files cleaned",
            report.result.version_id,
            report.result.file_count,
            report.result.total_versions,
            engine.config().max_versions,
            report.sweep.deleted
        );
        if !report.warnings.is_empty() {
            println!("{} warning(s); see log output", report.warnings.len());
        }
    }
}

fn read_names(path: &Path) -> io::Result<Vec<String>> {
    let lines: Vec<String> = if path == Path::new("-") {
        io::stdin().lock().lines().collect::<io::Result<_>>()?
    } else {
        fs::read_to_string(path)?.lines().map(str::to_string).collect()
    };

    Ok(lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

fn run_show(config: KeeperConfig, json: bool) {
    let max_versions = config.max_versions;
    let asset_prefix = config.asset_prefix.clone();
    let engine = RetentionEngine::new(config);
    let versions = engine.versions();

    if json {
        match serde_json::to_string_pretty(&versions) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Total versions: {}/{}", versions.len(), max_versions);
    for (i, version) in versions.iter().enumerate() {
        let local = version.timestamp.with_timezone(&chrono::Local);
        println!(
            "  {}. {} ({}) - {}: {} files",
            i + 1,
            version.id,
            local.format("%Y-%m-%d %H:%M:%S"),
            asset_prefix.trim_end_matches('/'),
            version.asset_files(&asset_prefix).count()
        );
    }
}

fn run_reset(config: KeeperConfig) {
    let engine = RetentionEngine::new(config);
    match engine.ledger().reset() {
        Ok(true) => println!("Deleted version ledger {}", engine.ledger().path().display()),
        Ok(false) => println!("No version ledger at {}", engine.ledger().path().display()),
        Err(e) => {
            eprintln!("Error deleting version ledger: {}", e);
            process::exit(1);
        }
    }
}

fn run_check(config: &KeeperConfig) {
    println!("Configuration valid");
    println!();
    println!("  Enabled: {}", config.enabled);
    println!("  Verbose: {}", config.verbose);
    println!("  Max versions: {}", config.max_versions);
    println!("  Output root: {}", config.output_root.display());
    println!("  Ledger: {}", config.ledger_path.display());
    println!("  Asset prefix: {}", config.asset_prefix);
    println!("  Swept directory: {}", config.asset_dir().display());
}
