use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::artifact::read_table;
use crate::error::{Error, Result};

pub const KEYWORD_COLUMN: &str = "Keywords";
pub const CATEGORY_COLUMN: &str = "JobSection";

/// Keyword → category lookup, iterated in insertion order.
///
/// A repeated keyword overwrites the category but keeps the position of its first
/// occurrence, so iteration order (and with it classifier tie-breaks) only depends on
/// where each keyword first appears in the source file.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule. The keyword is lower-cased and trimmed; empty keywords are ignored.
    /// Returns the category it replaced, if any.
    pub fn insert(&mut self, keyword: &str, category: &str) -> Option<String> {
        let key = keyword.trim().to_lowercase();
        if key.is_empty() {
            return None;
        }
        match self.index.get(&key) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, category.to_string())),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, category.to_string()));
                None
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.index
            .get(keyword)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, C: AsRef<str>> FromIterator<(K, C)> for KeywordTable {
    fn from_iter<I: IntoIterator<Item = (K, C)>>(iter: I) -> Self {
        let mut table = KeywordTable::new();
        for (k, c) in iter {
            table.insert(k.as_ref(), c.as_ref());
        }
        table
    }
}

/// Load the keyword dictionary from a `Keywords,JobSection` CSV.
pub fn load(path: &Path) -> Result<KeywordTable> {
    let shown = path.display().to_string();
    let table = read_table(path).map_err(|e| Error::config_load(&shown, e))?;

    let kw_col = table
        .column(KEYWORD_COLUMN)
        .ok_or_else(|| Error::config_load(&shown, format!("missing column `{}`", KEYWORD_COLUMN)))?;
    let cat_col = table
        .column(CATEGORY_COLUMN)
        .ok_or_else(|| Error::config_load(&shown, format!("missing column `{}`", CATEGORY_COLUMN)))?;

    let mut keywords = KeywordTable::new();
    for row in &table.rows {
        let (Some(kw), Some(cat)) = (row.get(kw_col), row.get(cat_col)) else {
            continue;
        };
        if let Some(previous) = keywords.insert(kw, cat) {
            debug!("keyword {:?} reassigned: {} -> {}", kw.trim(), previous, cat);
        }
    }

    info!("Loaded {} keywords from {}", keywords.len(), shown);
    Ok(keywords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_keywords() {
        let t: KeywordTable = [("  Python ", "Programming")].into_iter().collect();
        assert_eq!(t.get("python"), Some("Programming"));
        assert_eq!(t.get("  Python "), None);
    }

    #[test]
    fn duplicate_keyword_last_wins_first_position() {
        let t: KeywordTable = [
            ("seo", "Marketing"),
            ("python", "Programming"),
            ("SEO", "Writing"),
        ]
        .into_iter()
        .collect();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("seo"), Some("Writing"));
        let order: Vec<_> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["seo", "python"]);
    }

    #[test]
    fn empty_keywords_ignored() {
        let t: KeywordTable = [("   ", "Nothing"), ("sql", "Data")].into_iter().collect();
        assert_eq!(t.len(), 1);
        assert!(t.iter().all(|(_, c)| c != "Nothing"));
    }

    #[test]
    fn load_fixture() {
        let t = load(Path::new("tests/fixtures/keywords.csv")).unwrap();
        assert_eq!(t.get("data entry clerk"), Some("Admin Support"));
        assert_eq!(t.get("copywriting"), Some("Writing"));
        assert!(t.len() > 10);
    }

    #[test]
    fn load_rejects_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kw.csv");
        std::fs::write(&path, "Keyword,Section\npython,Programming\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { .. }));
        assert!(err.to_string().contains("Keywords"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = load(Path::new("tests/fixtures/nope.csv")).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { .. }));
    }
}
