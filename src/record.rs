use serde::Serialize;

/// Fields a harvester can fill for one posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    CompanyName,
    DatePosted,
    JobType,
    Url,
    LocationRequirement,
    CompanyCountry,
}

/// One extracted posting. Only the title is mandatory; every other field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawJobRecord {
    pub title: String,
    pub company_name: Option<String>,
    pub date_posted: Option<String>,
    pub job_type: Option<String>,
    pub url: Option<String>,
    pub location_requirement: Option<String>,
    pub company_country: Option<String>,
}

impl RawJobRecord {
    pub fn new(title: impl Into<String>) -> Self {
        RawJobRecord {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Title => Some(self.title.as_str()),
            Field::CompanyName => self.company_name.as_deref(),
            Field::DatePosted => self.date_posted.as_deref(),
            Field::JobType => self.job_type.as_deref(),
            Field::Url => self.url.as_deref(),
            Field::LocationRequirement => self.location_requirement.as_deref(),
            Field::CompanyCountry => self.company_country.as_deref(),
        }
    }

    /// Render the record as one CSV row in the given column layout. Absent fields
    /// become empty cells.
    pub fn to_row(&self, layout: &[(Field, &str)]) -> Vec<String> {
        layout
            .iter()
            .map(|(field, _)| self.get(*field).unwrap_or("").to_string())
            .collect()
    }
}

/// Column layout helper: just the header names.
pub fn header_names(layout: &[(Field, &str)]) -> Vec<String> {
    layout.iter().map(|(_, name)| name.to_string()).collect()
}

/// One row of a cleaned artifact: retained source columns plus the computed category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedJobRecord {
    pub values: Vec<String>,
    pub category: Option<String>,
}

impl CleanedJobRecord {
    pub fn into_row(self) -> Vec<String> {
        let mut row = self.values;
        row.push(self.category.unwrap_or_default());
        row
    }
}
