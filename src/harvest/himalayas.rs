use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{FlushPolicy, Page, SourceAdapter};
use crate::error::{Error, Result};
use crate::record::{Field, RawJobRecord};
use crate::source::Source;

const BASE: &str = "https://himalayas.app/";
const ENTRY: &str = "https://himalayas.app/jobs/worldwide";

pub const LAYOUT: &[(Field, &str)] = &[
    (Field::Title, "Title"),
    (Field::CompanyName, "CompanyName"),
    (Field::DatePosted, "DatePosted"),
    (Field::JobType, "JobType"),
    (Field::Url, "JobLink"),
];

static BASE_URL: LazyLock<Url> = LazyLock::new(|| Url::parse(BASE).unwrap());

static ARTICLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article.flex").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.text-xl").unwrap());
static COMPANY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.inline-flex").unwrap());
static POSTED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time.hidden.flex-shrink-0").unwrap());
static JOB_INFO: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.inline-flex").unwrap());
static NEXT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.flex.flex-row-reverse").unwrap());

/// Server-rendered job list; one `<article>` per posting and a "next" link at the bottom.
#[derive(Debug, Clone)]
pub struct HimalayasAdapter {
    base: Url,
}

impl Default for HimalayasAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl HimalayasAdapter {
    pub fn new() -> Self {
        HimalayasAdapter {
            base: BASE_URL.clone(),
        }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        self.base.join(href.trim()).ok().map(String::from)
    }

    fn posting(&self, article: ElementRef<'_>) -> Result<RawJobRecord> {
        let title_el = article
            .select(&TITLE)
            .next()
            .ok_or_else(|| Error::Extraction("article without title link".into()))?;
        let title = text_of(title_el)
            .ok_or_else(|| Error::Extraction("title link has no text".into()))?;

        let info: Vec<String> = article.select(&JOB_INFO).filter_map(text_of).collect();

        Ok(RawJobRecord {
            title,
            company_name: article.select(&COMPANY).next().and_then(text_of),
            date_posted: article.select(&POSTED).next().and_then(text_of),
            job_type: (!info.is_empty()).then(|| info.join(",")),
            url: title_el.value().attr("href").and_then(|h| self.resolve(h)),
            ..Default::default()
        })
    }
}

/// Element text with whitespace runs collapsed; `None` when blank.
fn text_of(el: ElementRef<'_>) -> Option<String> {
    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

impl SourceAdapter for HimalayasAdapter {
    fn source(&self) -> Source {
        Source::Himalayas
    }

    fn entry_url(&self) -> String {
        ENTRY.to_string()
    }

    fn layout(&self) -> &'static [(Field, &'static str)] {
        LAYOUT
    }

    fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy::PerRecord
    }

    fn extract(&self, page: &Page) -> Vec<Result<RawJobRecord>> {
        let document = Html::parse_document(&page.body);
        document
            .select(&ARTICLE)
            .map(|article| self.posting(article))
            .collect()
    }

    fn next_page(&self, page: &Page) -> Result<Option<String>> {
        let document = Html::parse_document(&page.body);
        let Some(next) = document.select(&NEXT).next() else {
            return Ok(None);
        };
        let href = next
            .value()
            .attr("href")
            .ok_or_else(|| Error::pagination(&page.url, "next control has no href"))?;
        let current = Url::parse(&page.url).unwrap_or_else(|_| self.base.clone());
        current
            .join(href.trim())
            .map(|u| Some(u.to_string()))
            .map_err(|e| Error::pagination(&page.url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Page {
        Page {
            url: ENTRY.to_string(),
            body: std::fs::read_to_string("tests/fixtures/himalayas_page.html").unwrap(),
        }
    }

    #[test]
    fn extracts_articles() {
        let results = HimalayasAdapter::new().extract(&fixture());
        assert_eq!(results.len(), 4);

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.title, "Senior Data Analyst");
        assert_eq!(first.company_name.as_deref(), Some("Northwind"));
        assert_eq!(first.date_posted.as_deref(), Some("2 days ago"));
        assert_eq!(first.job_type.as_deref(), Some("Full Time,Senior"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://himalayas.app/companies/northwind/jobs/senior-data-analyst")
        );
    }

    #[test]
    fn posting_without_link_keeps_other_fields() {
        let results = HimalayasAdapter::new().extract(&fixture());
        let rec = results[1].as_ref().unwrap();
        assert_eq!(rec.title, "Technical Writer");
        assert_eq!(rec.url, None);
        assert_eq!(rec.company_name.as_deref(), Some("Docsmith"));
        assert_eq!(rec.job_type.as_deref(), Some("Contractor"));
    }

    #[test]
    fn posting_without_title_is_an_error() {
        let results = HimalayasAdapter::new().extract(&fixture());
        assert!(matches!(results[2], Err(Error::Extraction(_))));
        assert!(results[3].is_ok());
    }

    #[test]
    fn follows_next_control() {
        let next = HimalayasAdapter::new().next_page(&fixture()).unwrap();
        assert_eq!(
            next.as_deref(),
            Some("https://himalayas.app/jobs/worldwide?page=2")
        );
    }

    #[test]
    fn last_page_has_no_next() {
        let page = Page {
            url: ENTRY.to_string(),
            body: "<main><article class=\"flex\"><a class=\"text-xl\">Only</a></article></main>"
                .to_string(),
        };
        assert_eq!(HimalayasAdapter::new().next_page(&page).unwrap(), None);
    }
}
