use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

use crate::clean::title::TitleRule;

/// Job boards the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Upwork,
    Himalayas,
    #[value(name = "remoteok")]
    RemoteOk,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::Upwork, Source::Himalayas, Source::RemoteOk];

    pub fn name(self) -> &'static str {
        match self {
            Source::Upwork => "upwork",
            Source::Himalayas => "himalayas",
            Source::RemoteOk => "remoteok",
        }
    }

    /// Sources with a harvester in this crate. Upwork artifacts come from elsewhere.
    pub fn harvestable(self) -> bool {
        !matches!(self, Source::Upwork)
    }

    pub fn profile(self) -> &'static SourceProfile {
        match self {
            Source::Upwork => &UPWORK,
            Source::Himalayas => &HIMALAYAS,
            Source::RemoteOk => &REMOTE_OK,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How one source's raw artifact is turned into its cleaned artifact.
#[derive(Debug)]
pub struct SourceProfile {
    pub source: Source,
    pub raw_file: &'static str,
    pub cleaned_file: &'static str,
    pub title_column: &'static str,
    /// Separate tag field used for classification instead of the title.
    pub tags_column: Option<&'static str>,
    pub job_type_column: Option<&'static str>,
    /// Volatile columns removed before dedup.
    pub drop_columns: &'static [&'static str],
    pub title_rule: TitleRule,
}

pub const CATEGORY_COLUMN: &str = "JobCategory";

pub static UPWORK: SourceProfile = SourceProfile {
    source: Source::Upwork,
    raw_file: "upwork_jobs.csv",
    cleaned_file: "upwork_jobs_cleaned_dataset.csv",
    title_column: "Title",
    tags_column: Some("Tags"),
    job_type_column: Some("JobType"),
    drop_columns: &["DatePosted", "Duration", "Price", "JobLink"],
    title_rule: TitleRule::StripSalary,
};

pub static HIMALAYAS: SourceProfile = SourceProfile {
    source: Source::Himalayas,
    raw_file: "himalayas_jobs.csv",
    cleaned_file: "himalayas_jobs_cleaned_dataset.csv",
    title_column: "Title",
    tags_column: None,
    job_type_column: Some("JobType"),
    drop_columns: &["DatePosted", "JobLink"],
    title_rule: TitleRule::StripContractPrefix,
};

pub static REMOTE_OK: SourceProfile = SourceProfile {
    source: Source::RemoteOk,
    raw_file: "RemoteOK_jobs.csv",
    cleaned_file: "RemotOK_jobs_cleaned_dataset.csv",
    title_column: "JOB_NAME",
    tags_column: None,
    job_type_column: Some("JOB_TYPE"),
    drop_columns: &["JOB_URL", "DATE_POSTED", "COMPANY_COUNTRY"],
    title_rule: TitleRule::Shared,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_never_drop_title() {
        for s in Source::ALL {
            let p = s.profile();
            assert_eq!(p.source, s);
            assert!(!p.drop_columns.contains(&p.title_column), "{s}");
        }
    }

    #[test]
    fn only_upwork_is_external() {
        let harvestable: Vec<_> = Source::ALL.into_iter().filter(|s| s.harvestable()).collect();
        assert_eq!(harvestable, vec![Source::Himalayas, Source::RemoteOk]);
    }
}
