//! Heuristic rules kept as versioned data.
//!
//! Keyword catalogues, stopwords, ditto marks and the slaveholder/enslaved
//! patterns are read from a TOML document so that a rule change can be
//! replayed against archived OCR text. The built-in set is embedded from
//! `default.toml`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

const DEFAULT_RULES: &str = include_str!("default.toml");

/// Keyword category names used by the relevance filter.
pub const CATEGORIES: [&str; 6] = [
    "ownership",
    "transaction",
    "description",
    "gender",
    "relationship",
    "legal",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordCategories {
    #[serde(default)]
    pub ownership: Vec<String>,
    #[serde(default)]
    pub transaction: Vec<String>,
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default)]
    pub gender: Vec<String>,
    #[serde(default)]
    pub relationship: Vec<String>,
    #[serde(default)]
    pub legal: Vec<String>,
}

impl KeywordCategories {
    fn entries(&self) -> [(&'static str, &Vec<String>); 6] {
        [
            ("ownership", &self.ownership),
            ("transaction", &self.transaction),
            ("description", &self.description),
            ("gender", &self.gender),
            ("relationship", &self.relationship),
            ("legal", &self.legal),
        ]
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionKeywords {
    #[serde(default)]
    pub sale: Vec<String>,
    #[serde(default)]
    pub manumission: Vec<String>,
    #[serde(default)]
    pub inheritance: Vec<String>,
    #[serde(default)]
    pub compensation: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleIndicators {
    #[serde(default)]
    pub slaveholder: Vec<String>,
    #[serde(default)]
    pub enslaved: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRules {
    pub name_pattern: String,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub verb_endings: Vec<String>,
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub header_tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableRules {
    #[serde(default)]
    pub ditto_marks: Vec<String>,
    #[serde(default)]
    pub noise_phrases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerRules {
    #[serde(default)]
    pub labels: Vec<String>,
}

/// One pattern with the confidence given to its matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub confidence: f64,
    /// Only applies in sentences with an ownership keyword.
    #[serde(default)]
    pub ownership_context: bool,
    /// The `list` group holds several comma/"and" separated names.
    #[serde(default)]
    pub list: bool,
}

/// Rule set as written in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub keywords: KeywordCategories,
    #[serde(default)]
    pub transactions: TransactionKeywords,
    #[serde(default)]
    pub roles: RoleIndicators,
    pub names: NameRules,
    #[serde(default)]
    pub table: TableRules,
    #[serde(default)]
    pub owners: OwnerRules,
    #[serde(default)]
    pub slaveholder_patterns: Vec<PatternRule>,
    #[serde(default)]
    pub enslaved_patterns: Vec<PatternRule>,
    #[serde(default)]
    pub family_patterns: Vec<PatternRule>,
}

impl RuleSet {
    /// The embedded rule set.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml(DEFAULT_RULES)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(format!("rule set: {}", e)))
    }

    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml(&contents)
    }

    /// Load the replacement rule set if a path is given, else the built-in one.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_path(p).await,
            None => Self::builtin(),
        }
    }

    /// Compile every pattern and build lookup sets.
    pub fn compile(&self) -> Result<CompiledRules, ConfigError> {
        let title_alt = self
            .names
            .titles
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let expand = |p: &str| {
            p.replace("{NAME}", &self.names.name_pattern)
                .replace("{TITLE}", &format!("(?:{})", title_alt))
        };

        let compile_rules = |rules: &[PatternRule]| -> Result<Vec<CompiledPattern>, ConfigError> {
            rules
                .iter()
                .map(|rule| {
                    let regex = compile_one(&expand(&rule.pattern))?;
                    Ok(CompiledPattern {
                        regex,
                        confidence: rule.confidence.clamp(0.0, 1.0),
                        ownership_context: rule.ownership_context,
                        list: rule.list,
                    })
                })
                .collect()
        };

        let mut keywords = HashMap::new();
        for (category, words) in self.keywords.entries() {
            keywords.insert(category, lower_set(words));
        }

        let transactions = vec![
            ("sale", lower_set(&self.transactions.sale)),
            ("manumission", lower_set(&self.transactions.manumission)),
            ("inheritance", lower_set(&self.transactions.inheritance)),
            ("compensation", lower_set(&self.transactions.compensation)),
        ];

        let owner_labels = self
            .owners
            .labels
            .iter()
            .map(|p| compile_one(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledRules {
            version: self.version.clone(),
            keywords,
            transactions,
            slaveholder_roles: lower_set(&self.roles.slaveholder),
            enslaved_roles: lower_set(&self.roles.enslaved),
            titles: self.names.titles.clone(),
            verb_endings: lower_set(&self.names.verb_endings),
            stopwords: lower_set(&self.names.stopwords),
            header_tokens: lower_set(&self.names.header_tokens),
            ditto_marks: lower_set(&self.table.ditto_marks),
            noise_phrases: self
                .table
                .noise_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            owner_labels,
            slaveholder_patterns: compile_rules(&self.slaveholder_patterns)?,
            enslaved_patterns: compile_rules(&self.enslaved_patterns)?,
            family_patterns: compile_rules(&self.family_patterns)?,
        })
    }
}

fn compile_one(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRule {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn lower_set(words: &[String]) -> HashSet<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub confidence: f64,
    pub ownership_context: bool,
    pub list: bool,
}

/// Compiled, read-only rules shared across jobs.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub version: String,
    keywords: HashMap<&'static str, HashSet<String>>,
    transactions: Vec<(&'static str, HashSet<String>)>,
    slaveholder_roles: HashSet<String>,
    enslaved_roles: HashSet<String>,
    pub titles: Vec<String>,
    verb_endings: HashSet<String>,
    stopwords: HashSet<String>,
    header_tokens: HashSet<String>,
    ditto_marks: HashSet<String>,
    noise_phrases: Vec<String>,
    pub owner_labels: Vec<Regex>,
    pub slaveholder_patterns: Vec<CompiledPattern>,
    pub enslaved_patterns: Vec<CompiledPattern>,
    pub family_patterns: Vec<CompiledPattern>,
}

impl CompiledRules {
    /// Compile the built-in rule set.
    pub fn builtin() -> Result<Arc<Self>, ConfigError> {
        RuleSet::builtin()?.compile().map(Arc::new)
    }

    /// Categories with at least one keyword among `words` (lowercased tokens).
    pub fn categories_for(&self, words: &[String]) -> Vec<&'static str> {
        CATEGORIES
            .iter()
            .copied()
            .filter(|cat| {
                self.keywords
                    .get(cat)
                    .is_some_and(|set| words.iter().any(|w| set.contains(w)))
            })
            .collect()
    }

    pub fn has_keyword(&self, category: &str, word: &str) -> bool {
        self.keywords
            .get(category)
            .is_some_and(|set| set.contains(&word.to_lowercase()))
    }

    /// Transaction kinds whose keywords occur among `words`, with the first
    /// matching keyword.
    pub fn transaction_kinds<'a>(&self, words: &'a [String]) -> Vec<(&'static str, &'a str)> {
        self.transactions
            .iter()
            .filter_map(|(kind, set)| {
                words
                    .iter()
                    .find(|w| set.contains(*w))
                    .map(|w| (*kind, w.as_str()))
            })
            .collect()
    }

    pub fn is_slaveholder_indicator(&self, word: &str) -> bool {
        self.slaveholder_roles.contains(word)
    }

    pub fn is_enslaved_indicator(&self, word: &str) -> bool {
        self.enslaved_roles.contains(word)
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(&word.to_lowercase())
    }

    pub fn is_verb_ending(&self, word: &str) -> bool {
        self.verb_endings.contains(&word.to_lowercase())
    }

    pub fn is_header_token(&self, word: &str) -> bool {
        self.header_tokens.contains(&word.to_lowercase())
    }

    pub fn is_title(&self, word: &str) -> bool {
        self.titles.iter().any(|t| t == word)
    }

    pub fn is_ditto(&self, cell: &str) -> bool {
        self.ditto_marks.contains(&cell.trim().to_lowercase())
    }

    pub fn is_noise_phrase(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.noise_phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

/// Lowercased alphabetic word tokens of a sentence.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Arc<CompiledRules> {
        CompiledRules::builtin().unwrap()
    }

    #[test]
    fn test_builtin_rules_compile() {
        let r = rules();
        assert!(!r.version.is_empty());
        assert_eq!(r.slaveholder_patterns.len(), 7);
        assert!(r.slaveholder_patterns[6].ownership_context);
        assert!(r.enslaved_patterns.iter().any(|p| p.list));
        assert_eq!(r.owner_labels.len(), 4);
    }

    #[test]
    fn test_categories_for_sentence() {
        let r = rules();
        let w = words("He freed mulatto Robin in his will.");
        let cats = r.categories_for(&w);
        assert_eq!(cats, vec!["transaction", "description", "legal"]);
    }

    #[test]
    fn test_transaction_kinds() {
        let r = rules();
        let w = words("He freed mulatto Robin, Nanny, and Daniel in his will.");
        let kinds = r.transaction_kinds(&w);
        assert_eq!(kinds, vec![("manumission", "freed")]);
    }

    #[test]
    fn test_ditto_marks() {
        let r = rules();
        assert!(r.is_ditto("\""));
        assert!(r.is_ditto(" Do. "));
        assert!(r.is_ditto("″"));
        assert!(!r.is_ditto("Dolly"));
    }

    #[test]
    fn test_name_placeholder_expanded() {
        let r = rules();
        let caps = r.slaveholder_patterns[0]
            .regex
            .captures("Richard Marsham owned 36 slaves at his death")
            .unwrap();
        assert_eq!(&caps["name"], "Richard Marsham");
        assert_eq!(&caps["count"], "36");
    }

    #[test]
    fn test_title_pattern() {
        let r = rules();
        let caps = r.slaveholder_patterns[6]
            .regex
            .captures("the slaves of Col. Lloyd were sold")
            .unwrap();
        assert_eq!(&caps["name"], "Col. Lloyd");
    }

    #[test]
    fn test_invalid_rule_is_reported() {
        let mut set = RuleSet::builtin().unwrap();
        set.enslaved_patterns.push(PatternRule {
            pattern: "(unclosed".to_string(),
            confidence: 0.5,
            ownership_context: false,
            list: false,
        });
        assert!(matches!(
            set.compile(),
            Err(ConfigError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_owner_label_is_case_sensitive_on_name() {
        let r = rules();
        let text = "Petition of the undersigned\nBy whom owned: John Smith of the county\n";
        let caps = r.owner_labels[0].captures(text).unwrap();
        assert_eq!(&caps["name"], "John Smith");
    }
}
