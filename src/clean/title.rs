use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\[\(\{<]+[^\]\)\}>]*[\]\)\}>]+").unwrap());
static EDGE_JUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^a-zA-Z0-9$]+|[^a-zA-Z0-9$]+$").unwrap());
static SALARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$.*?[:\-]+(?:\s*\$[\d.,]+[kK]?)?").unwrap());
static LEADING_1099: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^1099").unwrap());
static LEADING_RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d.*?-+").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Source-specific step run after the shared title rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleRule {
    /// Shared rules only.
    Shared,
    /// Strip `$…:`/`$…-` salary annotations (and a directly following amount).
    StripSalary,
    /// Strip a leading `1099`, then numeric prefixes running up to a hyphen
    /// (`2024-2025 School Year - `) for as long as the title starts with a digit.
    StripContractPrefix,
}

/// Run the cleanup chain on one title.
///
/// Shared rules: trim, drop bracketed spans, trim characters other than ASCII
/// alphanumerics and `$` from both ends. Then the source rule, then a tidy pass
/// that collapses whitespace runs and re-trims the edges.
pub fn clean(title: &str, rule: TitleRule) -> String {
    let t = title.trim();
    let t = BRACKETED.replace_all(t, "");
    let t = EDGE_JUNK.replace_all(&t, "");

    let t: Cow<str> = match rule {
        TitleRule::StripSalary => Cow::Owned(SALARY.replace_all(&t, "").into_owned()),
        TitleRule::StripContractPrefix => {
            let mut rest = LEADING_1099.replace(&t, "").trim_start().to_string();
            while let Some(m) = LEADING_RANGE.find(&rest) {
                rest = rest[m.end()..].trim_start().to_string();
            }
            Cow::Owned(rest)
        }
        TitleRule::Shared => t,
    };

    tidy(&t)
}

fn tidy(t: &str) -> String {
    let collapsed = WHITESPACE.replace_all(t.trim(), " ");
    EDGE_JUNK.replace_all(&collapsed, "").into_owned()
}

/// `Hourly: $15-$30` and friends collapse to `Hourly`; anything else is unchanged.
pub fn normalize_job_type(job_type: &str) -> &str {
    match job_type.get(..6) {
        Some(p) if p.eq_ignore_ascii_case("hourly") => "Hourly",
        _ => job_type,
    }
}
