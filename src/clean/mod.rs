pub mod classify;
pub mod keywords;
pub mod tags;
pub mod title;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::artifact::{self, Table};
use crate::error::{Error, Result};
use crate::record::CleanedJobRecord;
use crate::source::{Source, SourceProfile, CATEGORY_COLUMN};
use classify::Classifier;
use keywords::KeywordTable;
use tags::MISSING_SENTINEL;

pub const CLEANED_DIR: &str = "cleaned_dataset";

/// Counters for one source's clean pass.
#[derive(Debug, Default, Clone)]
pub struct CleanReport {
    pub rows_in: usize,
    pub undecodable: usize,
    pub duplicates: usize,
    pub incomplete: usize,
    pub untokenizable: usize,
    pub rows_out: usize,
    pub matched: usize,
    pub fallback: usize,
    pub output: PathBuf,
}

/// Cleaned rows for one source, ready to be written.
pub struct Cleaned {
    pub headers: Vec<String>,
    pub records: Vec<CleanedJobRecord>,
    pub report: CleanReport,
}

/// Row after column pruning and text cleanup, before classification.
struct Prepared {
    values: Vec<String>,
    tags_raw: Option<String>,
}

/// Turn a raw table into cleaned, classified rows following `profile`.
///
/// Order: prune columns, clean title and job type, drop duplicates, drop rows with
/// any empty field, tokenize, classify.
pub fn normalize(profile: &SourceProfile, table: &Table, classifier: &Classifier) -> Result<Cleaned> {
    let column = |name: &str| table.column(name);
    let title_idx = column(profile.title_column).ok_or_else(|| Error::MissingColumn {
        artifact: profile.raw_file.to_string(),
        column: profile.title_column.to_string(),
    })?;
    let tags_idx = profile.tags_column.and_then(column);
    let job_type_idx = profile.job_type_column.and_then(column);

    let kept: Vec<usize> = (0..table.headers.len())
        .filter(|&i| Some(i) != tags_idx)
        .filter(|&i| !profile.drop_columns.iter().any(|d| *d == table.headers[i]))
        .collect();
    let mut headers: Vec<String> = kept.iter().map(|&i| table.headers[i].clone()).collect();
    let title_pos = kept.iter().position(|&i| i == title_idx).unwrap_or(0);

    let mut report = CleanReport {
        rows_in: table.rows.len(),
        undecodable: table.skipped,
        ..Default::default()
    };

    // prune + text cleanup
    let prepared = table.rows.iter().map(|row| {
        let cell = |i: usize| row.get(i).map(String::as_str).unwrap_or("");
        let values = kept
            .iter()
            .map(|&i| {
                if i == title_idx {
                    title::clean(cell(i), profile.title_rule)
                } else if Some(i) == job_type_idx {
                    title::normalize_job_type(cell(i)).to_string()
                } else {
                    cell(i).to_string()
                }
            })
            .collect();
        // a missing tag cell reads as the coerced sentinel
        let tags_raw = tags_idx.map(|i| match cell(i) {
            "" => MISSING_SENTINEL.to_string(),
            s => s.to_string(),
        });
        Prepared { values, tags_raw }
    });

    // dedup, first occurrence wins; the tag field is not part of the comparison
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut unique = Vec::new();
    for p in prepared {
        if seen.insert(p.values.clone()) {
            unique.push(p);
        } else {
            report.duplicates += 1;
        }
    }

    let mut records = Vec::with_capacity(unique.len());
    for (row, p) in unique.into_iter().enumerate() {
        if let Err(reason) = require_all_fields(row, &headers, &p.values) {
            debug!("{}: dropped: {}", profile.source, reason);
            report.incomplete += 1;
            continue;
        }

        let title = p.values[title_pos].as_str();
        let tag_source = p.tags_raw.as_deref().unwrap_or(title);
        let tags = match tags::tokenize(tag_source, Some(title)) {
            Ok(t) => t,
            Err(e) => {
                warn!("{}: skipping row {:?}: {}", profile.source, title, e);
                report.untokenizable += 1;
                continue;
            }
        };

        let category = classifier.classify(Some(&tags), title);
        match &category {
            Some(c) if c.is_matched() => report.matched += 1,
            Some(_) => report.fallback += 1,
            None => {}
        }
        records.push(CleanedJobRecord {
            values: p.values,
            category: category.map(|c| c.into_value()),
        });
    }

    report.rows_out = records.len();
    headers.push(CATEGORY_COLUMN.to_string());
    Ok(Cleaned {
        headers,
        records,
        report,
    })
}

fn require_all_fields(row: usize, headers: &[String], values: &[String]) -> Result<()> {
    match values.iter().position(|v| v.trim().is_empty()) {
        Some(i) => Err(Error::RecordIncomplete {
            row,
            column: headers.get(i).cloned().unwrap_or_default(),
        }),
        None => Ok(()),
    }
}

pub fn cleaned_path(data_dir: &Path, profile: &SourceProfile) -> PathBuf {
    data_dir.join(CLEANED_DIR).join(profile.cleaned_file)
}

/// Read one raw artifact, clean it and overwrite its cleaned artifact.
pub fn clean_source(
    profile: &SourceProfile,
    keywords: &KeywordTable,
    data_dir: &Path,
) -> Result<CleanReport> {
    let raw = data_dir.join(profile.raw_file);
    let table = artifact::read_table(&raw)?;
    let cleaned = normalize(profile, &table, &Classifier::new(keywords))?;

    let output = cleaned_path(data_dir, profile);
    let rows: Vec<Vec<String>> = cleaned
        .records
        .into_iter()
        .map(CleanedJobRecord::into_row)
        .collect();
    artifact::write_table(&output, &cleaned.headers, &rows)?;

    let report = CleanReport {
        output,
        ..cleaned.report
    };
    info!(
        "{}: {} rows in, {} out ({} duplicate, {} incomplete, {} undecodable), {} categorized",
        profile.source,
        report.rows_in,
        report.rows_out,
        report.duplicates,
        report.incomplete,
        report.undecodable,
        report.matched
    );
    Ok(report)
}

/// Clean several sources in parallel. Each source succeeds or fails on its own.
pub fn clean_all(
    sources: &[Source],
    keywords: &KeywordTable,
    data_dir: &Path,
) -> Vec<(Source, Result<CleanReport>)> {
    let pb = ProgressBar::new(sources.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let results: Vec<_> = sources
        .par_iter()
        .map(|&source| {
            let result = clean_source(source.profile(), keywords, data_dir);
            if let Err(e) = &result {
                warn!("{}: clean failed: {}", source, e);
            }
            pb.set_message(source.name());
            pb.inc(1);
            (source, result)
        })
        .collect();

    pb.finish_and_clear();
    results
}
