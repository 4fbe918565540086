use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use super::{FlushPolicy, Page, SourceAdapter};
use crate::error::{Error, Result};
use crate::record::{Field, RawJobRecord};
use crate::source::Source;

const OFFSET_URL: &str = "https://remoteok.com/?&action=get_jobs&offset=";

/// The jobs endpoint only answers XHR-looking requests.
pub const HEADERS: &[(&str, &str)] = &[
    ("accept", "*/*"),
    ("accept-language", "en"),
    ("referer", "https://remoteok.com/"),
    ("x-requested-with", "XMLHttpRequest"),
];

pub const LAYOUT: &[(Field, &str)] = &[
    (Field::Title, "JOB_NAME"),
    (Field::JobType, "JOB_TYPE"),
    (Field::Url, "JOB_URL"),
    (Field::CompanyName, "COMPANY_NAME"),
    (Field::CompanyCountry, "COMPANY_COUNTRY"),
    (Field::DatePosted, "DATE_POSTED"),
    (Field::LocationRequirement, "LOCATION_REQUIREMENTS"),
];

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(v) => Some(v),
            OneOrMany::Many(v) => v.first(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JobPosting {
    title: Option<String>,
    employment_type: Option<OneOrMany<String>>,
    hiring_organization: Option<Organization>,
    job_location: Option<OneOrMany<Place>>,
    date_posted: Option<String>,
    applicant_location_requirements: Option<OneOrMany<Named>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Organization {
    name: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Place {
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Address {
    address_country: Option<Country>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Country {
    Code(String),
    Named(Named),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Named {
    name: Option<String>,
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl JobPosting {
    fn into_record(self) -> Result<RawJobRecord> {
        let title = non_empty(self.title.as_deref())
            .ok_or_else(|| Error::Extraction("JobPosting has no title".into()))?;

        let job_type = match &self.employment_type {
            Some(OneOrMany::One(t)) => non_empty(Some(t.as_str())),
            Some(OneOrMany::Many(ts)) => non_empty(Some(ts.join(",").as_str())),
            None => None,
        };
        let (company_name, job_url) = match &self.hiring_organization {
            Some(org) => (non_empty(org.name.as_deref()), non_empty(org.url.as_deref())),
            None => (None, None),
        };
        let company_country = self
            .job_location
            .as_ref()
            .and_then(OneOrMany::first)
            .and_then(|p| p.address.as_ref())
            .and_then(|a| a.address_country.as_ref())
            .and_then(|c| match c {
                Country::Code(code) => non_empty(Some(code.as_str())),
                Country::Named(n) => non_empty(n.name.as_deref()),
            });
        let location_requirement = self
            .applicant_location_requirements
            .as_ref()
            .and_then(OneOrMany::first)
            .and_then(|n| non_empty(n.name.as_deref()));

        Ok(RawJobRecord {
            title,
            company_name,
            date_posted: non_empty(self.date_posted.as_deref()),
            job_type,
            url: job_url,
            location_requirement,
            company_country,
        })
    }
}

fn is_job_posting(obj: &Value) -> bool {
    match obj.get("@type") {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(ts)) => ts.iter().any(|t| t.as_str() == Some("JobPosting")),
        _ => false,
    }
}

/// Flatten one decoded block (object, array or `@graph`) into its JobPosting objects.
fn collect_postings(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_postings(item, out);
            }
        }
        Value::Object(mut obj) => {
            if let Some(graph) = obj.remove("@graph") {
                collect_postings(graph, out);
            } else {
                let v = Value::Object(obj);
                if is_job_posting(&v) {
                    out.push(v);
                }
            }
        }
        _ => {}
    }
}

/// Offset-paginated XHR endpoint that embeds postings as JSON-LD.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteOkAdapter;

impl SourceAdapter for RemoteOkAdapter {
    fn source(&self) -> Source {
        Source::RemoteOk
    }

    fn entry_url(&self) -> String {
        format!("{}1", OFFSET_URL)
    }

    fn layout(&self) -> &'static [(Field, &'static str)] {
        LAYOUT
    }

    fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::PerPage
    }

    fn headers(&self) -> &'static [(&'static str, &'static str)] {
        HEADERS
    }

    fn follow_redirects(&self) -> bool {
        false
    }

    fn extract(&self, page: &Page) -> Vec<Result<RawJobRecord>> {
        let document = Html::parse_document(&page.body);
        let mut results = Vec::new();

        for script in document.select(&LD_JSON) {
            let text: String = script.text().collect();
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(text) {
                Ok(v) => v,
                Err(e) => {
                    results.push(Err(Error::Extraction(format!("malformed JSON-LD: {}", e))));
                    continue;
                }
            };

            let mut postings = Vec::new();
            collect_postings(value, &mut postings);
            for posting in postings {
                results.push(
                    serde_json::from_value::<JobPosting>(posting)
                        .map_err(|e| Error::Extraction(format!("bad JobPosting: {}", e)))
                        .and_then(JobPosting::into_record),
                );
            }
        }
        results
    }

    fn next_page(&self, page: &Page) -> Result<Option<String>> {
        let (_, tail) = page
            .url
            .rsplit_once('=')
            .ok_or_else(|| Error::pagination(&page.url, "no offset parameter"))?;
        let offset: u64 = tail
            .parse()
            .map_err(|_| Error::pagination(&page.url, format!("offset `{}` is not a number", tail)))?;
        Ok(Some(format!("{}{}", OFFSET_URL, offset + 1)))
    }
}
