use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Text a missing cell turns into after string coercion. A title equal to it is
/// treated as absent and the fallback is tokenized instead.
pub const MISSING_SENTINEL: &str = "nan";

static DELIMITERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s&,\-]+").unwrap());

/// Lower-cased title tokens in title order.
///
/// Leading or trailing delimiters leave empty tokens at the ends; they are kept here
/// and skipped by the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagList(Vec<String>);

impl TagList {
    #[cfg(test)]
    pub fn tags(&self) -> &[String] {
        &self.0
    }

    /// Parse the comma-joined form back into a tag list.
    #[cfg(test)]
    pub fn parse(joined: &str) -> Self {
        TagList(joined.split(',').map(str::to_string).collect())
    }

    pub fn non_empty(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str).filter(|t| !t.is_empty())
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Split a title into tags, falling back to `fallback` when the title is the
/// `"nan"` sentinel.
pub fn tokenize(title: &str, fallback: Option<&str>) -> Result<TagList> {
    let source = if title != MISSING_SENTINEL {
        title
    } else {
        fallback.ok_or(Error::MissingFallback)?
    };
    let lower = source.to_lowercase();
    Ok(TagList(DELIMITERS.split(&lower).map(str::to_string).collect()))
}
