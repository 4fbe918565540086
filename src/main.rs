mod artifact;
mod clean;
mod config;
mod error;
mod harvest;
mod record;
mod source;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clean::classify::Classifier;
use crate::clean::{keywords, tags, title};
use crate::config::Settings;
use crate::harvest::HarvestReport;
use crate::source::{Source, CATEGORY_COLUMN};

#[derive(Parser)]
#[command(name = "jobfeed", about = "Harvest, clean and categorize remote job postings")]
struct Cli {
    /// Config file (optional, TOML)
    #[arg(long, global = true, default_value = config::CONFIG_FILE)]
    config: PathBuf,
    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the job boards and write raw artifacts
    Harvest {
        #[arg(short, long, value_enum, default_value = "all")]
        source: Selection,
        /// Max pages per source
        #[arg(short = 'n', long)]
        max_pages: Option<usize>,
    },
    /// Clean, dedup and categorize raw artifacts
    Clean {
        #[arg(short, long, value_enum, default_value = "all")]
        source: Selection,
    },
    /// Harvest every source, then clean every source
    Run {
        /// Max pages per source
        #[arg(short = 'n', long)]
        max_pages: Option<usize>,
    },
    /// Show tags and category for ad-hoc titles
    Classify {
        /// Apply this source's title cleanup first
        #[arg(short, long, value_enum)]
        source: Option<Source>,
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Row counts and category distribution per source
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum Selection {
    All,
    Upwork,
    Himalayas,
    #[value(name = "remoteok")]
    RemoteOk,
}

impl Selection {
    fn sources(self) -> Vec<Source> {
        match self {
            Selection::All => Source::ALL.to_vec(),
            Selection::Upwork => vec![Source::Upwork],
            Selection::Himalayas => vec![Source::Himalayas],
            Selection::RemoteOk => vec![Source::RemoteOk],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    info!(settings_loaded = ?settings, "starting jobfeed");

    let result = match cli.command {
        Commands::Harvest { source, max_pages } => {
            if let Some(n) = max_pages {
                settings.max_pages = n;
            }
            let run = harvest_sources(&settings, source.sources()).await?;
            print_harvest(&run.reports);
            if run.interrupted {
                anyhow::bail!("harvest interrupted");
            }
            Ok(())
        }
        Commands::Clean { source } => clean_sources(&settings, &source.sources()),
        Commands::Run { max_pages } => {
            if let Some(n) = max_pages {
                settings.max_pages = n;
            }

            let t_harvest = Instant::now();
            let run = harvest_sources(&settings, Source::ALL.to_vec()).await?;
            println!("Harvested in {}", format_duration(t_harvest.elapsed()));
            print_harvest(&run.reports);
            if run.interrupted {
                anyhow::bail!("harvest interrupted, clean stage skipped");
            }

            let t_clean = Instant::now();
            let cleaned = clean_sources(&settings, &Source::ALL);
            println!("Cleaned in {}", format_duration(t_clean.elapsed()));
            cleaned
        }
        Commands::Classify { source, titles } => {
            let path = settings.keywords_path();
            let table = keywords::load(&path)
                .with_context(|| format!("loading keyword table {}", path.display()))?;
            let classifier = Classifier::new(&table);

            for raw in &titles {
                let cleaned = match source {
                    Some(s) => title::clean(raw, s.profile().title_rule),
                    None => raw.clone(),
                };
                let tag_list = tags::tokenize(&cleaned, None)?;
                let category = classifier
                    .classify(Some(&tag_list), &cleaned)
                    .map(|c| {
                        if c.is_matched() {
                            c.into_value()
                        } else {
                            format!("{} (fallback)", c.value())
                        }
                    })
                    .unwrap_or_else(|| "-".into());
                println!("{}", raw);
                if cleaned != *raw {
                    println!("  cleaned:  {}", cleaned);
                }
                println!("  tags:     {}", tag_list);
                println!("  category: {}", category);
            }
            Ok(())
        }
        Commands::Stats => {
            print_stats(&settings);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct HarvestRun {
    reports: Vec<HarvestReport>,
    /// Ctrl-C arrived before every task finished.
    interrupted: bool,
}

/// Run one harvest task per source. Ctrl-C aborts the tasks still running and logs
/// them as aborted; rows already flushed stay on disk.
async fn harvest_sources(settings: &Settings, sources: Vec<Source>) -> anyhow::Result<HarvestRun> {
    let settings = Arc::new(settings.clone());
    let mp = MultiProgress::new();
    let style = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} pages  {msg}")?;

    let started_at = Utc::now();
    let mut pending: Vec<Source> = Vec::new();
    let mut set = JoinSet::new();
    for source in sources {
        if !source.harvestable() {
            info!("{}: skipping, no harvester", source);
            continue;
        }
        let pb = mp.add(ProgressBar::new_spinner());
        pb.set_style(style.clone());
        pb.enable_steady_tick(Duration::from_millis(120));
        let settings = Arc::clone(&settings);
        set.spawn(async move { (source, harvest::harvest_source(source, &settings, pb).await) });
        pending.push(source);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut reports = Vec::new();
    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((source, result))) => {
                    pending.retain(|s| *s != source);
                    match result {
                        Ok(Some(report)) => reports.push(report),
                        Ok(None) => {}
                        Err(e) => warn!("{}: harvest failed: {}", source, e),
                    }
                }
                Some(Err(e)) => warn!("harvest task failed: {}", e),
            },
            _ = &mut ctrl_c => {
                warn!("interrupted, aborting {} running harvests", set.len());
                set.abort_all();
                while let Some(joined) = set.join_next().await {
                    // a task may have finished just before the abort
                    if let Ok((source, result)) = joined {
                        pending.retain(|s| *s != source);
                        if let Ok(Some(report)) = result {
                            reports.push(report);
                        }
                    }
                }
                for source in pending.drain(..) {
                    let report = HarvestReport::interrupted(source, started_at);
                    harvest::log_report(&settings.data_dir, &report);
                    reports.push(report);
                }
                interrupted = true;
                break;
            }
        }
    }

    reports.sort_by_key(|r| r.source.name());
    Ok(HarvestRun {
        reports,
        interrupted,
    })
}

fn print_harvest(reports: &[HarvestReport]) {
    if reports.is_empty() {
        println!("No harvests completed.");
        return;
    }
    println!(
        "{:<10} | {:<8} | {:>5} | {:>8} | {:>7} | {}",
        "Source", "Outcome", "Pages", "Postings", "Skipped", "Error"
    );
    println!("{}", "-".repeat(72));
    for r in reports {
        println!(
            "{:<10} | {:<8} | {:>5} | {:>8} | {:>7} | {}",
            r.source.name(),
            format!("{:?}", r.outcome),
            r.pages,
            r.records,
            r.skipped,
            truncate(r.error.as_deref().unwrap_or(""), 30)
        );
    }
}

fn clean_sources(settings: &Settings, sources: &[Source]) -> anyhow::Result<()> {
    let path = settings.keywords_path();
    let table = keywords::load(&path)
        .with_context(|| format!("loading keyword table {}", path.display()))?;
    if table.is_empty() {
        warn!("{} has no keywords, every row falls back to its title", path.display());
    }

    let results = clean::clean_all(sources, &table, &settings.data_dir);

    println!(
        "{:<10} | {:>6} | {:>6} | {:>5} | {:>10} | {:>8} | {:>8}",
        "Source", "In", "Out", "Dupes", "Incomplete", "Matched", "Fallback"
    );
    println!("{}", "-".repeat(72));
    for (source, result) in &results {
        match result {
            Ok(r) => println!(
                "{:<10} | {:>6} | {:>6} | {:>5} | {:>10} | {:>8} | {:>8}",
                source.name(),
                r.rows_in,
                r.rows_out,
                r.duplicates,
                r.incomplete,
                r.matched,
                r.fallback
            ),
            Err(e) => println!("{:<10} | failed: {}", source.name(), truncate(&e.to_string(), 56)),
        }
    }
    Ok(())
}

fn print_stats(settings: &Settings) {
    let data_dir = &settings.data_dir;
    println!("Data dir: {}\n", data_dir.display());
    println!("{:<10} | {:>6} | {:>7} | {:<36}", "Source", "Raw", "Cleaned", "Cleaned file");
    println!("{}", "-".repeat(68));

    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for source in Source::ALL {
        let profile = source.profile();
        let raw = artifact::read_table(&data_dir.join(profile.raw_file))
            .map(|t| t.rows.len().to_string())
            .unwrap_or_else(|_| "-".into());
        let cleaned_path = clean::cleaned_path(data_dir, profile);
        let cleaned = match artifact::read_table(&cleaned_path) {
            Ok(t) => {
                if let Some(col) = t.column(CATEGORY_COLUMN) {
                    for row in &t.rows {
                        if let Some(c) = row.get(col).filter(|c| !c.is_empty()) {
                            *categories.entry(c.clone()).or_default() += 1;
                        }
                    }
                }
                t.rows.len().to_string()
            }
            Err(_) => "-".into(),
        };
        println!(
            "{:<10} | {:>6} | {:>7} | {:<36}",
            source.name(),
            raw,
            cleaned,
            truncate(profile.cleaned_file, 36)
        );
    }

    if categories.is_empty() {
        return;
    }
    let mut ranked: Vec<_> = categories.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    println!("\n--- Categories ---");
    for (category, count) in ranked.iter().take(25) {
        println!("  {:<40} {:>6}", truncate(category, 40), count);
    }
    if ranked.len() > 25 {
        println!("  ... {} more", ranked.len() - 25);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
