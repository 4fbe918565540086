pub mod himalayas;
pub mod remoteok;
pub mod transport;

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::{self, ArtifactWriter};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::record::{Field, RawJobRecord};
use crate::source::Source;
use himalayas::HimalayasAdapter;
use remoteok::RemoteOkAdapter;
use transport::HttpTransport;

pub const HARVEST_LOG: &str = "harvest_log.jsonl";

/// A fetched page: the URL it was finally served from plus its body.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: String,
}

/// Fetches pages for a harvester.
pub trait Transport {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Page>> + Send;
}

/// When extracted postings are handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Every posting is written and flushed as soon as it is extracted.
    PerRecord,
    /// Postings are buffered and written once the page is done.
    PerPage,
}

/// Source-specific half of a harvest: where to start, how to pull postings out of a
/// page and how to find the next one.
pub trait SourceAdapter {
    fn source(&self) -> Source;

    fn entry_url(&self) -> String;

    /// Raw artifact column layout.
    fn layout(&self) -> &'static [(Field, &'static str)];

    fn flush_policy(&self) -> FlushPolicy;

    /// Request headers sent with every fetch.
    fn headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    fn follow_redirects(&self) -> bool {
        true
    }

    /// One entry per posting container on the page. A container whose fields can't
    /// be extracted yields an `Error::Extraction`.
    fn extract(&self, page: &Page) -> Vec<Result<RawJobRecord>>;

    /// URL of the page after `page`, `None` when there is none.
    fn next_page(&self, page: &Page) -> Result<Option<String>>;
}

/// Where harvested postings go.
pub trait RecordSink {
    fn append(&mut self, record: &RawJobRecord) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

impl RecordSink for Vec<RawJobRecord> {
    fn append(&mut self, record: &RawJobRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Observable harvest states, recorded in order in `HarvestReport::trace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    Init,
    Navigated,
    ExtractingPage(usize),
    Paginating(usize),
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Done,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub source: Source,
    pub outcome: Outcome,
    pub pages: usize,
    pub records: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    #[serde(skip)]
    pub trace: Vec<HarvestState>,
}

impl HarvestReport {
    /// Report for a run cancelled from outside before it could finish.
    pub fn interrupted(source: Source, started_at: DateTime<Utc>) -> Self {
        HarvestReport {
            source,
            outcome: Outcome::Aborted,
            pages: 0,
            records: 0,
            skipped: 0,
            started_at,
            finished_at: Utc::now(),
            error: Some("interrupted".to_string()),
            trace: vec![HarvestState::Aborted],
        }
    }
}

/// Internal step; carries the page being worked on.
enum Step {
    Init,
    Navigated(Page),
    Extracting(usize, Page),
    Paginating(usize, Page),
    Done,
    Aborted(Error),
}

impl Step {
    fn state(&self) -> HarvestState {
        match self {
            Step::Init => HarvestState::Init,
            Step::Navigated(_) => HarvestState::Navigated,
            Step::Extracting(n, _) => HarvestState::ExtractingPage(*n),
            Step::Paginating(n, _) => HarvestState::Paginating(*n),
            Step::Done => HarvestState::Done,
            Step::Aborted(_) => HarvestState::Aborted,
        }
    }
}

/// Sequential page walk over one source.
///
/// The walk never retries; a failed fetch aborts it. Postings that fail extraction
/// are logged and skipped. Whatever reached the sink before the walk ended stays
/// there, on `Aborted` too.
pub struct Harvester<'a, T, A, S> {
    transport: &'a T,
    adapter: &'a A,
    sink: &'a mut S,
    max_pages: usize,
    progress: ProgressBar,
}

impl<'a, T, A, S> Harvester<'a, T, A, S>
where
    T: Transport + Sync,
    A: SourceAdapter + Sync,
    S: RecordSink + Send,
{
    pub fn new(transport: &'a T, adapter: &'a A, sink: &'a mut S, max_pages: usize) -> Self {
        Harvester {
            transport,
            adapter,
            sink,
            max_pages,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(mut self) -> HarvestReport {
        let source = self.adapter.source();
        let mut report = HarvestReport {
            source,
            outcome: Outcome::Done,
            pages: 0,
            records: 0,
            skipped: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            error: None,
            trace: Vec::new(),
        };

        let mut step = Step::Init;
        loop {
            report.trace.push(step.state());
            debug!("{}: {:?}", source, step.state());

            step = match step {
                Step::Init if self.max_pages == 0 => {
                    info!("{}: page limit is 0, nothing to fetch", source);
                    Step::Done
                }
                Step::Init => {
                    let entry = self.adapter.entry_url();
                    info!("{}: fetching {}", source, entry);
                    match self.transport.fetch(&entry).await {
                        Ok(page) => Step::Navigated(page),
                        Err(e) => Step::Aborted(e),
                    }
                }
                Step::Navigated(page) => Step::Extracting(1, page),
                Step::Extracting(n, page) => {
                    self.progress.set_message(format!("{} page {}", source, n));
                    report.pages += 1;
                    match self.extract_page(n, &page, &mut report) {
                        Ok(0) => {
                            info!("{}: page {} has no postings, stopping", source, n);
                            Step::Done
                        }
                        Ok(_) => Step::Paginating(n, page),
                        Err(e) => Step::Aborted(e),
                    }
                }
                Step::Paginating(n, page) => self.paginate(n, &page).await,
                Step::Done => {
                    report.outcome = Outcome::Done;
                    break;
                }
                Step::Aborted(e) => {
                    warn!("{}: harvest aborted: {}", source, e);
                    report.outcome = Outcome::Aborted;
                    report.error = Some(e.to_string());
                    break;
                }
            };
        }

        if let Err(e) = self.sink.flush() {
            warn!("{}: final flush failed: {}", source, e);
            report.outcome = Outcome::Aborted;
            report.error.get_or_insert_with(|| e.to_string());
        }
        self.progress.finish_and_clear();
        report.finished_at = Utc::now();
        info!(
            "{}: {:?} after {} pages, {} postings ({} skipped)",
            source, report.outcome, report.pages, report.records, report.skipped
        );
        report
    }

    /// Extract every container on the page; returns how many containers were found.
    fn extract_page(&mut self, n: usize, page: &Page, report: &mut HarvestReport) -> Result<usize> {
        let source = self.adapter.source();
        let policy = self.adapter.flush_policy();
        let found = self.adapter.extract(page);
        let containers = found.len();
        info!("{}: page {}: {} postings", source, n, containers);

        let mut buffered = Vec::new();
        for item in found {
            match item {
                Ok(record) => match policy {
                    FlushPolicy::PerRecord => {
                        self.sink.append(&record)?;
                        self.sink.flush()?;
                        report.records += 1;
                    }
                    FlushPolicy::PerPage => buffered.push(record),
                },
                Err(e) => {
                    warn!("{}: page {}: skipping posting: {}", source, n, e);
                    report.skipped += 1;
                }
            }
        }

        if !buffered.is_empty() {
            for record in &buffered {
                self.sink.append(record)?;
            }
            self.sink.flush()?;
            report.records += buffered.len();
        }
        self.progress.inc(1);
        Ok(containers)
    }

    async fn paginate(&mut self, n: usize, page: &Page) -> Step {
        let source = self.adapter.source();
        if n >= self.max_pages {
            info!("{}: reached page limit ({})", source, self.max_pages);
            return Step::Done;
        }
        match self.adapter.next_page(page) {
            Ok(Some(url)) => {
                debug!("{}: next page {}", source, url);
                match self.transport.fetch(&url).await {
                    Ok(next) => Step::Extracting(n + 1, next),
                    Err(e) => Step::Aborted(e),
                }
            }
            Ok(None) => {
                info!("{}: no next page after page {}", source, n);
                Step::Done
            }
            Err(e) => {
                warn!("{}: stopping: {}", source, e);
                Step::Done
            }
        }
    }
}

/// Harvest one source over HTTP into its raw artifact under `settings.data_dir`, then
/// append the run report to the harvest log. Returns `None` for sources without a
/// harvester.
pub async fn harvest_source(
    source: Source,
    settings: &Settings,
    progress: ProgressBar,
) -> Result<Option<HarvestReport>> {
    let report = match source {
        Source::Himalayas => run_http(&HimalayasAdapter::new(), settings, progress).await?,
        Source::RemoteOk => run_http(&RemoteOkAdapter, settings, progress).await?,
        Source::Upwork => {
            warn!("{}: no harvester, raw artifact is produced externally", source);
            return Ok(None);
        }
    };

    log_report(&settings.data_dir, &report);
    Ok(Some(report))
}

/// Append one run report to `<data_dir>/harvest_log.jsonl`. Failures are only logged.
pub fn log_report(data_dir: &Path, report: &HarvestReport) {
    let log = data_dir.join(HARVEST_LOG);
    if let Err(e) = artifact::append_json_line(&log, report) {
        warn!("could not append to {}: {}", log.display(), e);
    }
}

async fn run_http<A>(adapter: &A, settings: &Settings, progress: ProgressBar) -> Result<HarvestReport>
where
    A: SourceAdapter + Sync,
{
    let transport = HttpTransport::new(settings, adapter.headers(), adapter.follow_redirects())?;
    let path = settings.data_dir.join(adapter.source().profile().raw_file);
    let mut sink = ArtifactWriter::new(path, adapter.layout());
    let report = Harvester::new(&transport, adapter, &mut sink, settings.max_pages)
        .with_progress(progress)
        .run()
        .await;
    debug!("{} rows written to {}", sink.written(), sink.path().display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Serves canned bodies; unknown URLs fail like a 404.
    struct FakeTransport {
        pages: HashMap<String, String>,
    }

    impl FakeTransport {
        fn new(pages: &[(&str, &str)]) -> Self {
            FakeTransport {
                pages: pages
                    .iter()
                    .map(|(u, b)| (u.to_string(), b.to_string()))
                    .collect(),
            }
        }
    }

    impl Transport for FakeTransport {
        async fn fetch(&self, url: &str) -> Result<Page> {
            match self.pages.get(url) {
                Some(body) => Ok(Page {
                    url: url.to_string(),
                    body: body.clone(),
                }),
                None => Err(Error::transport(url, "HTTP 404")),
            }
        }
    }

    /// Pages look like `t:Title|t:Other|!bad|next:URL`.
    struct LineAdapter {
        policy: FlushPolicy,
    }

    impl SourceAdapter for LineAdapter {
        fn source(&self) -> Source {
            Source::Himalayas
        }
        fn entry_url(&self) -> String {
            "p1".into()
        }
        fn layout(&self) -> &'static [(Field, &'static str)] {
            &[(Field::Title, "Title")]
        }
        fn flush_policy(&self) -> FlushPolicy {
            self.policy
        }
        fn extract(&self, page: &Page) -> Vec<Result<RawJobRecord>> {
            page.body
                .split('|')
                .filter_map(|part| {
                    if let Some(t) = part.strip_prefix("t:") {
                        Some(Ok(RawJobRecord::new(t)))
                    } else if part.starts_with('!') {
                        Some(Err(Error::Extraction(part.to_string())))
                    } else {
                        None
                    }
                })
                .collect()
        }
        fn next_page(&self, page: &Page) -> Result<Option<String>> {
            let next = page.body.split('|').find_map(|p| p.strip_prefix("next:"));
            match next {
                Some("???") => Err(Error::pagination(&page.url, "unparseable")),
                other => Ok(other.map(str::to_string)),
            }
        }
    }

    async fn harvest(pages: &[(&str, &str)], max_pages: usize) -> (HarvestReport, Vec<RawJobRecord>) {
        let transport = FakeTransport::new(pages);
        let adapter = LineAdapter {
            policy: FlushPolicy::PerRecord,
        };
        let mut sink: Vec<RawJobRecord> = Vec::new();
        let report = Harvester::new(&transport, &adapter, &mut sink, max_pages)
            .run()
            .await;
        (report, sink)
    }

    fn titles(records: &[RawJobRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[tokio::test]
    async fn walks_until_no_next_control() {
        let (report, records) = harvest(
            &[("p1", "t:A|t:B|next:p2"), ("p2", "t:C")],
            10,
        )
        .await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(report.pages, 2);
        assert_eq!(titles(&records), vec!["A", "B", "C"]);
        assert_eq!(
            report.trace,
            vec![
                HarvestState::Init,
                HarvestState::Navigated,
                HarvestState::ExtractingPage(1),
                HarvestState::Paginating(1),
                HarvestState::ExtractingPage(2),
                HarvestState::Paginating(2),
                HarvestState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn entry_failure_aborts() {
        let (report, records) = harvest(&[], 10).await;
        assert_eq!(report.outcome, Outcome::Aborted);
        assert!(report.error.as_deref().unwrap().contains("404"));
        assert!(records.is_empty());
        assert_eq!(
            report.trace,
            vec![HarvestState::Init, HarvestState::Aborted]
        );
    }

    #[tokio::test]
    async fn bad_posting_is_skipped() {
        let (report, records) = harvest(&[("p1", "t:A|!broken|t:B")], 10).await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(report.skipped, 1);
        assert_eq!(titles(&records), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn page_limit_stops_gracefully() {
        let (report, records) = harvest(
            &[("p1", "t:A|next:p2"), ("p2", "t:B|next:p3"), ("p3", "t:C")],
            2,
        )
        .await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(titles(&records), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn unparseable_next_page_is_done() {
        let (report, records) = harvest(&[("p1", "t:A|next:???")], 10).await;
        assert_eq!(report.outcome, Outcome::Done);
        assert!(report.error.is_none());
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn empty_page_is_done() {
        let (report, records) = harvest(&[("p1", "t:A|next:p2"), ("p2", "next:p3")], 10).await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(report.pages, 2);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn later_fetch_failure_keeps_earlier_postings() {
        let (report, records) = harvest(&[("p1", "t:A|t:B|next:gone")], 10).await;
        assert_eq!(report.outcome, Outcome::Aborted);
        assert_eq!(titles(&records), vec!["A", "B"]);
        assert_eq!(report.records, 2);
    }

    #[tokio::test]
    async fn per_page_policy_writes_whole_pages() {
        let transport = FakeTransport::new(&[("p1", "t:A|!x|t:B|next:p2"), ("p2", "t:C")]);
        let adapter = LineAdapter {
            policy: FlushPolicy::PerPage,
        };
        let mut sink: Vec<RawJobRecord> = Vec::new();
        let report = Harvester::new(&transport, &adapter, &mut sink, 5).run().await;
        assert_eq!(report.records, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(titles(&sink), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn writes_raw_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        let transport = FakeTransport::new(&[("p1", "t:A|next:p2"), ("p2", "t:B")]);
        let adapter = LineAdapter {
            policy: FlushPolicy::PerRecord,
        };
        let mut sink = ArtifactWriter::new(&path, adapter.layout());
        Harvester::new(&transport, &adapter, &mut sink, 5).run().await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Title\nA\nB\n");
    }

    #[tokio::test]
    async fn report_serializes_for_log() {
        let (report, _) = harvest(&[("p1", "t:A")], 1).await;
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["source"], "himalayas");
        assert_eq!(json["outcome"], "done");
        assert_eq!(json["records"], 1);
        assert!(json.get("trace").is_none());
    }

    #[test]
    fn interrupted_run_is_logged_as_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let report = HarvestReport::interrupted(Source::RemoteOk, Utc::now());
        log_report(dir.path(), &report);
        log_report(dir.path(), &report);

        let text = std::fs::read_to_string(dir.path().join(HARVEST_LOG)).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let json: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(json["source"], "remoteok");
        assert_eq!(json["outcome"], "aborted");
        assert_eq!(json["error"], "interrupted");
    }

    #[tokio::test]
    async fn zero_page_limit_fetches_nothing() {
        // an empty transport would abort on any fetch
        let (report, records) = harvest(&[], 0).await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(report.pages, 0);
        assert!(records.is_empty());
        assert_eq!(report.trace, vec![HarvestState::Init, HarvestState::Done]);
    }

    #[tokio::test]
    async fn remoteok_non_numeric_offset_ends_walk() {
        let body = std::fs::read_to_string("tests/fixtures/remoteok_page.html").unwrap();
        let adapter = RemoteOkAdapter;
        let entry = adapter.entry_url();
        let transport = FakeTransport::new(&[(entry.as_str(), body.as_str())]);
        // the server answered from a URL whose offset isn't a number
        struct Redirected(FakeTransport);
        impl Transport for Redirected {
            async fn fetch(&self, url: &str) -> Result<Page> {
                let mut page = self.0.fetch(url).await?;
                page.url = "https://remoteok.com/?&action=get_jobs&offset=last".into();
                Ok(page)
            }
        }

        let mut sink: Vec<RawJobRecord> = Vec::new();
        let report = Harvester::new(&Redirected(transport), &adapter, &mut sink, 10)
            .run()
            .await;
        assert_eq!(report.outcome, Outcome::Done);
        assert_eq!(report.pages, 1);
        assert_eq!(report.records, 3);
        assert_eq!(report.skipped, 2);
        assert!(report.error.is_none());
        assert_eq!(sink.len(), 3);
        assert_eq!(
            report.trace.last(),
            Some(&HarvestState::Done)
        );
    }
}
