use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use localeclone_core::config::{
    CloneConfig, ConfigOverrides, DEFAULT_CONFIG_PATH, load_file_config,
};
use localeclone_core::pipeline::{CloneOptions, CloneReport, CloneStatus, clone_locale};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "localeclone",
    version,
    about = "Clone every published document of the master locale into a new locale"
)]
struct Cli {
    #[arg(value_name = "LOCALE", help = "Target locale code (falls back to NEW_LOCALE)")]
    locale: Option<String>,
    #[arg(long, value_name = "PATH", help = "TOML file with [migration] tunables")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "N", help = "Documents per create batch")]
    batch_size: Option<usize>,
    #[arg(long, help = "Fetch and rewrite only; nothing is written")]
    dry_run: bool,
    #[arg(long, help = "Print resolved configuration diagnostics")]
    diagnostics: bool,
    #[arg(long, help = "Print the final report, id table included, as JSON")]
    json: bool,
    #[arg(short, long, help = "Debug-level progress output")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let config_path = match &cli.config {
        Some(path) if !path.exists() => {
            bail!("config file does not exist: {}", normalize_path(path));
        }
        Some(path) => path.clone(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };
    let file = load_file_config(&config_path)?;
    let config = CloneConfig::resolve(
        &file,
        &ConfigOverrides {
            target_locale: cli.locale.clone(),
            batch_size: cli.batch_size,
        },
    )?;
    if cli.diagnostics {
        println!(
            "[diagnostics]\nconfig_path={}\n{}\n",
            normalize_path(&config_path),
            config.diagnostics()
        );
    }

    let report = clone_locale(
        &config,
        &CloneOptions {
            dry_run: cli.dry_run,
        },
    )?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "localeclone={default_level},localeclone_core={default_level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn print_report(report: &CloneReport) {
    match &report.status {
        CloneStatus::Completed => println!("locale clone complete"),
        CloneStatus::DryRun => println!("locale clone dry run"),
        CloneStatus::StoppedAtCheckpoint {
            batch,
            total_batches,
        } => println!(
            "locale clone stopped after batch {batch}/{total_batches}; created copies stay in the pending release"
        ),
    }
    println!("target_locale: {}", report.target_locale);
    println!("fetched: {}", report.fetched);
    println!("batches: {}", report.batches);
    println!("cleared_integrations: {}", report.cleared_integrations);
    if report.status == CloneStatus::DryRun {
        println!("link_references: {}", report.link_references);
        println!("unresolved_links: {}", report.unresolved_links.len());
        for target in &report.unresolved_links {
            println!("  - {target}");
        }
    } else {
        println!("created: {}", report.created);
        println!("empty_ids: {}", report.empty_ids);
        println!("rewritten_links: {}", report.rewritten_links);
        println!("updated: {}", report.updated);
        println!("update_failures: {}", report.update_failures);
    }
    println!("request_count: {}", report.request_count);
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
