use super::keywords::KeywordTable;
use super::tags::TagList;

/// Outcome of classifying one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A category from the keyword table.
    Matched(String),
    /// No tag overlapped any keyword; carries the fallback text (the title).
    Fallback(String),
}

impl Classification {
    pub fn value(&self) -> &str {
        match self {
            Classification::Matched(c) | Classification::Fallback(c) => c,
        }
    }

    pub fn into_value(self) -> String {
        match self {
            Classification::Matched(c) | Classification::Fallback(c) => c,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Classification::Matched(_))
    }
}

/// Scores categories by tag/keyword overlap.
pub struct Classifier<'a> {
    keywords: &'a KeywordTable,
}

impl<'a> Classifier<'a> {
    pub fn new(keywords: &'a KeywordTable) -> Self {
        Classifier { keywords }
    }

    /// Pick the best category for `tags`.
    ///
    /// Every non-empty tag that is a substring of a keyword adds one point to that
    /// keyword's category. The highest score wins; on a tie the category that scored
    /// first during the scan wins (tags in order, keywords in table order).
    /// No tags at all gives `None`.
    pub fn classify(&self, tags: Option<&TagList>, fallback: &str) -> Option<Classification> {
        let tags = tags?;

        // (category, score) in first-scored order
        let mut scores: Vec<(&str, usize)> = Vec::new();
        for tag in tags.non_empty() {
            for (keyword, category) in self.keywords.iter() {
                if !keyword.contains(tag) {
                    continue;
                }
                match scores.iter_mut().find(|(c, _)| *c == category) {
                    Some((_, n)) => *n += 1,
                    None => scores.push((category, 1)),
                }
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for &(category, score) in &scores {
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((category, score));
            }
        }

        Some(match best {
            Some((category, _)) => Classification::Matched(category.to_string()),
            None => Classification::Fallback(fallback.to_string()),
        })
    }
}
