use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Description patterns as written in configuration. `patterns` are regular
/// expressions, `contains` are literal substrings; both match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordSpec {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub contains: Vec<String>,
}

impl KeywordSpec {
    pub fn patterns(list: &[&str]) -> Self {
        KeywordSpec {
            patterns: list.iter().map(|s| s.to_string()).collect(),
            contains: Vec::new(),
        }
    }

    pub fn contains(list: &[&str]) -> Self {
        KeywordSpec {
            patterns: Vec::new(),
            contains: list.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.contains.is_empty()
    }
}

/// Internal pairing of a keyword with its precompiled regex.
#[derive(Debug, Clone)]
struct CompiledKeyword {
    source: String,
    regex: Regex,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordSet {
    keywords: Vec<CompiledKeyword>,
}

impl KeywordSet {
    pub fn compile(spec: &KeywordSpec) -> Result<Self, regex::Error> {
        let literal = spec.contains.iter().map(|c| (c, regex::escape(c.trim())));
        let patterns = spec.patterns.iter().map(|p| (p, p.clone()));
        let keywords = patterns
            .chain(literal)
            .map(|(source, expr)| {
                RegexBuilder::new(&expr)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CompiledKeyword {
                        source: source.clone(),
                        regex,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeywordSet { keywords })
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// The configured keyword that matched, for match evidence.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let text = text.trim();
        self.keywords
            .iter()
            .find(|k| k.regex.is_match(text))
            .map(|k| k.source.as_str())
    }
}

/// Keyword sets keyed by casino name, looked up by a platform transaction's `name`.
#[derive(Debug, Clone, Default)]
pub struct CasinoKeywords {
    by_name: BTreeMap<String, KeywordSet>,
}

impl CasinoKeywords {
    pub fn compile(table: &BTreeMap<String, Vec<String>>) -> Result<Self, regex::Error> {
        let mut by_name = BTreeMap::new();
        for (name, words) in table {
            let spec = KeywordSpec {
                patterns: Vec::new(),
                contains: words.clone(),
            };
            by_name.insert(normalize_casino(name), KeywordSet::compile(&spec)?);
        }
        Ok(CasinoKeywords { by_name })
    }

    pub fn get(&self, casino: &str) -> Option<&KeywordSet> {
        self.by_name
            .get(&normalize_casino(casino))
            .filter(|set| !set.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn normalize_casino(name: &str) -> String {
    name.trim().to_uppercase()
}

#[derive(Debug, Deserialize)]
struct CasinoKeywordRow {
    name: Option<String>,
    keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CasinoKeywordDocument {
    #[serde(default)]
    data: Vec<CasinoKeywordRow>,
}

/// Parses the ledger's casino keyword export: `{"data": [{"name": .., "keyword": "A, B"}]}`.
/// Rows for the same casino accumulate.
pub fn casino_table_from_json(json: &str) -> Result<BTreeMap<String, Vec<String>>, serde_json::Error> {
    let doc: CasinoKeywordDocument = serde_json::from_str(json)?;
    let mut table: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in doc.data {
        let (Some(name), Some(keyword)) = (row.name, row.keyword) else {
            continue;
        };
        let words: Vec<String> = keyword
            .split(',')
            .map(|k| k.trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .collect();
        if name.trim().is_empty() || words.is_empty() {
            continue;
        }
        table.entry(normalize_casino(&name)).or_default().extend(words);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_patterns_are_case_insensitive() {
        let set = KeywordSet::compile(&KeywordSpec::patterns(&["^paypal transfer$", "transfer.*paypal"]))
            .unwrap();
        assert!(set.is_match("PAYPAL TRANSFER"));
        assert!(set.is_match("RTP Transfer from PayPal"));
        assert!(!set.is_match("PAYPAL TRANSFER FEE REFUND ACH"));
    }

    #[test]
    fn contains_escapes_regex_metacharacters() {
        let set = KeywordSet::compile(&KeywordSpec::contains(&["CHECKBOOK INC.", "reel ventures"])).unwrap();
        assert!(set.is_match("Checkbook Inc. payment"));
        assert!(!set.is_match("CHECKBOOK INCX payment"));
        assert!(set.is_match("REEL VENTURES LLC"));
    }

    #[test]
    fn first_match_reports_the_keyword() {
        let set = KeywordSet::compile(&KeywordSpec::contains(&["overdraft", "monthly service fee"])).unwrap();
        assert_eq!(set.first_match("MONTHLY SERVICE FEE"), Some("monthly service fee"));
        assert_eq!(set.first_match("ATM"), None);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(KeywordSet::compile(&KeywordSpec::patterns(&["paypal("])).is_err());
    }

    #[test]
    fn casino_lookup_is_normalized() {
        let mut table = BTreeMap::new();
        table.insert("DraftKings".to_string(), vec!["DRAFTKINGS".to_string(), "DK CROWN".to_string()]);
        let casinos = CasinoKeywords::compile(&table).unwrap();
        let set = casinos.get(" draftkings ").unwrap();
        assert!(set.is_match("ACH DEBIT DK Crown Holdings"));
        assert!(casinos.get("FanDuel").is_none());
    }

    #[test]
    fn casino_export_rows_accumulate() {
        let json = r#"{"data": [
            {"name": "FanDuel", "keyword": "FANDUEL, BETFAIR"},
            {"name": "fanduel", "keyword": "FD SPORTSBOOK"},
            {"name": "Empty", "keyword": " , "},
            {"keyword": "ORPHAN"}
        ]}"#;
        let table = casino_table_from_json(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table["FANDUEL"], vec!["FANDUEL", "BETFAIR", "FD SPORTSBOOK"]);
    }
}
