//! Pattern and keyword extraction over prose.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use super::ner::{NerBackend, NerEntityType};
use super::types::{
    Currency, DateMention, DatePrecision, MoneyAmount, NarrativePerson, NarrativeResult,
    NarrativeStatistics, TargetMention, Transaction, TransactionKind,
};
use super::validator::{clean_name, is_valid_given_name, is_valid_name, is_valid_slaveholder_name};
use crate::models::{PersonType, Relationship, RelationshipKind};
use crate::rules::{words, CompiledRules};

/// Characters captured on each side of a transaction keyword or target name.
const WINDOW_RADIUS: usize = 100;
const OWNERSHIP_CONFIDENCE: f64 = 0.6;
const TARGET_CONFIDENCE: f64 = 0.5;
const NER_PERSON_CONFIDENCE: f64 = 0.4;
const NER_OTHER_CONFIDENCE: f64 = 0.5;
const MIN_YEAR: u16 = 1600;
const MAX_YEAR: u16 = 1899;

const ABBREVIATIONS: &[&str] = &[
    "Mr", "Mrs", "Col", "Gen", "Dr", "Capt", "Maj", "Rev", "St", "Jr", "Sr", "Esq", "Co", "No",
    "Vol", "viz", "Wm", "Jas", "Geo", "Thos", "Chas", "Jno",
];

const PRONOUNS: &[&str] = &["He", "She", "His", "Her"];

const MONTHS: &str = r"(?:January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sept|Sep|Oct|Nov|Dec)\.?";

static FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b{MONTHS}\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+(\d{{4}})\b|\b\d{{1,2}}[/-]\d{{1,2}}[/-](\d{{4}})\b"
    ))
    .expect("full date pattern should compile")
});

static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b{MONTHS},?\s+(\d{{4}})\b")).expect("month-year pattern should compile")
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year pattern should compile"));

static POUNDS_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"£\s?(\d{1,3}(?:,\d{3})+|\d+)(\.\d{1,2})?").expect("pound pattern should compile")
});

static DOLLARS_SYMBOL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)(\.\d{1,2})?").expect("dollar pattern should compile")
});

static MONEY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?\s+(?i:(pounds|dollars))\b")
        .expect("money words pattern should compile")
});

/// A sentence and its byte offset in the normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Sentence {
    text: String,
    offset: usize,
}

pub struct NarrativeExtractor {
    rules: Arc<CompiledRules>,
    ner: Option<Arc<dyn NerBackend>>,
}

impl NarrativeExtractor {
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        Self { rules, ner: None }
    }

    pub fn with_ner(mut self, ner: Arc<dyn NerBackend>) -> Self {
        self.ner = Some(ner);
        self
    }

    pub fn extract(&self, text: &str, target_names: &[String]) -> NarrativeResult {
        let (normalized, sentences) = segment(text);
        let rules = &self.rules;

        let mut stats = NarrativeStatistics {
            total_sentences: sentences.len(),
            ..Default::default()
        };
        let mut slaveholders: Vec<NarrativePerson> = Vec::new();
        let mut enslaved: Vec<NarrativePerson> = Vec::new();
        let mut others: Vec<NarrativePerson> = Vec::new();
        let mut transactions = Vec::new();
        let mut dates: Vec<DateMention> = Vec::new();
        let mut relationships: Vec<Relationship> = Vec::new();
        let mut relevant: Vec<&Sentence> = Vec::new();
        let mut last_slaveholder: Option<String> = None;

        for sentence in &sentences {
            let tokens = words(&sentence.text);
            let categories = rules.categories_for(&tokens);
            if categories.is_empty() {
                continue;
            }
            relevant.push(sentence);
            for token in &tokens {
                for category in crate::rules::CATEGORIES {
                    if rules.has_keyword(category, token) {
                        *stats.category_hits.entry(category.to_string()).or_default() += 1;
                    }
                }
            }

            let ownership_context =
                categories.contains(&"ownership") || categories.contains(&"transaction");
            let holders = self.slaveholders_in(sentence, ownership_context);
            let held = self.enslaved_in(sentence, &holders);

            let mut owners: Vec<String> = holders.iter().map(|p| p.name.clone()).collect();
            for known in &slaveholders {
                if !contains_name(&owners, &known.name) && sentence.text.contains(&known.name) {
                    owners.push(known.name.clone());
                }
            }
            if owners.is_empty() && starts_with_pronoun(&sentence.text) {
                if let Some(last) = &last_slaveholder {
                    owners.push(last.clone());
                }
            }
            for owner in &owners {
                for person in &held {
                    push_relationship(
                        &mut relationships,
                        Relationship {
                            kind: RelationshipKind::Ownership,
                            subject: owner.clone(),
                            object: person.name.clone(),
                            confidence: OWNERSHIP_CONFIDENCE,
                            evidence: sentence.text.clone(),
                        },
                    );
                }
            }
            if let Some(last) = holders.last() {
                last_slaveholder = Some(last.name.clone());
            }

            for (kind, keyword) in rules.transaction_kinds(&tokens) {
                let Some(kind) = TransactionKind::from_str(kind) else {
                    continue;
                };
                let window = keyword_window(&normalized, sentence, keyword);
                transactions.push(Transaction {
                    kind,
                    keyword: keyword.to_string(),
                    window: window.to_string(),
                    dates: find_dates(window),
                    amounts: find_amounts(window),
                });
            }

            for date in find_dates(&sentence.text) {
                if !dates.iter().any(|d| d.text == date.text) {
                    dates.push(date);
                }
            }

            merge_people(&mut slaveholders, holders);
            merge_people(&mut enslaved, held);
        }
        stats.relevant_sentences = relevant.len();

        let target_mentions = self.target_pass(&normalized, target_names);
        for mention in &target_mentions {
            if contains_person(&slaveholders, &mention.name)
                || contains_person(&enslaved, &mention.name)
            {
                continue;
            }
            let person = NarrativePerson::new(
                mention.name.clone(),
                PersonType::Other,
                TARGET_CONFIDENCE,
                &mention.window,
            );
            match mention.role {
                Some(PersonType::Slaveholder) => {
                    merge_people(&mut slaveholders, vec![with_role(person, PersonType::Slaveholder)])
                }
                Some(PersonType::Enslaved) => {
                    merge_people(&mut enslaved, vec![with_role(person, PersonType::Enslaved)])
                }
                _ => {}
            }
        }

        if let Some(ner) = &self.ner {
            self.ner_pass(ner.as_ref(), &relevant, &mut slaveholders, &mut enslaved, &mut others);
        }

        for sentence in &relevant {
            self.family_in(sentence, &enslaved, &mut relationships);
        }

        stats.slave_count_total = slaveholders.iter().filter_map(|p| p.slave_count).sum();

        let confidence = aggregate_confidence(
            stats.relevant_sentences,
            !slaveholders.is_empty(),
            !enslaved.is_empty(),
            !transactions.is_empty(),
            relationships
                .iter()
                .any(|r| r.kind == RelationshipKind::Ownership),
        );

        debug!(
            "Narrative: {} sentences ({} relevant), {} slaveholders, {} enslaved, {} transactions, confidence {:.2}",
            stats.total_sentences,
            stats.relevant_sentences,
            slaveholders.len(),
            enslaved.len(),
            transactions.len(),
            confidence
        );

        NarrativeResult {
            slaveholders,
            enslaved,
            other_entities: others,
            transactions,
            dates,
            relationships,
            target_mentions,
            statistics: stats,
            confidence,
        }
    }

    fn slaveholders_in(&self, sentence: &Sentence, ownership_context: bool) -> Vec<NarrativePerson> {
        let rules = &self.rules;
        let mut found: Vec<NarrativePerson> = Vec::new();
        for pattern in &rules.slaveholder_patterns {
            if pattern.ownership_context && !ownership_context {
                continue;
            }
            for caps in pattern.regex.captures_iter(&sentence.text) {
                let Some(m) = caps.name("name") else {
                    continue;
                };
                let name = clean_name(m.as_str(), rules);
                if !is_valid_slaveholder_name(&name, rules) {
                    continue;
                }
                // A titled form and a bare form of the same person.
                let lower = name.to_lowercase();
                if found.iter().any(|p| {
                    let other = p.name.to_lowercase();
                    other.contains(&lower) || lower.contains(&other)
                }) {
                    continue;
                }
                let mut person = NarrativePerson::new(
                    name,
                    PersonType::Slaveholder,
                    pattern.confidence,
                    &sentence.text,
                );
                person.slave_count = caps.name("count").and_then(|c| c.as_str().parse().ok());
                found.push(person);
            }
        }
        found
    }

    fn enslaved_in(&self, sentence: &Sentence, holders: &[NarrativePerson]) -> Vec<NarrativePerson> {
        let rules = &self.rules;
        let holder_tokens: HashSet<String> = holders
            .iter()
            .flat_map(|p| p.name.split_whitespace().map(str::to_lowercase))
            .collect();

        let mut found: Vec<NarrativePerson> = Vec::new();
        for pattern in &rules.enslaved_patterns {
            for caps in pattern.regex.captures_iter(&sentence.text) {
                let names: Vec<String> = if pattern.list {
                    let Some(m) = caps.name("list") else {
                        continue;
                    };
                    let mut names = split_list(m.as_str());
                    // "sold Daniel Smith": the last item is the head of a longer name.
                    if continues_with_capital(&sentence.text[m.end()..]) {
                        names.pop();
                    }
                    names
                } else {
                    caps.name("name")
                        .map(|m| vec![m.as_str().to_string()])
                        .unwrap_or_default()
                };

                for name in names {
                    if !is_valid_given_name(&name, rules)
                        || holder_tokens.contains(&name.to_lowercase())
                        || contains_person(&found, &name)
                    {
                        continue;
                    }
                    let mut person = NarrativePerson::new(
                        name,
                        PersonType::Enslaved,
                        pattern.confidence,
                        &sentence.text,
                    );
                    person.age = caps.name("age").map(|a| a.as_str().to_string());
                    person.gender = caps
                        .name("descriptor")
                        .map(|d| d.as_str().to_lowercase())
                        .filter(|d| d == "male" || d == "female");
                    found.push(person);
                }
            }
        }
        found
    }

    fn family_in(
        &self,
        sentence: &Sentence,
        enslaved: &[NarrativePerson],
        relationships: &mut Vec<Relationship>,
    ) {
        for pattern in &self.rules.family_patterns {
            for caps in pattern.regex.captures_iter(&sentence.text) {
                let (Some(subject), Some(object)) = (caps.name("subject"), caps.name("object")) else {
                    continue;
                };
                let (subject, object) = (subject.as_str(), object.as_str());
                if subject.eq_ignore_ascii_case(object)
                    || !contains_person(enslaved, subject)
                    || !contains_person(enslaved, object)
                {
                    continue;
                }
                push_relationship(
                    relationships,
                    Relationship {
                        kind: RelationshipKind::Family,
                        subject: subject.to_string(),
                        object: object.to_string(),
                        confidence: pattern.confidence,
                        evidence: sentence.text.clone(),
                    },
                );
            }
        }
    }

    fn target_pass(&self, normalized: &str, target_names: &[String]) -> Vec<TargetMention> {
        let mut mentions = Vec::new();
        for name in target_names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !is_valid_name(name, &self.rules) {
                continue;
            }
            let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))) else {
                continue;
            };
            for m in re.find_iter(normalized) {
                let window = window_around(normalized, m.start(), m.end());
                let tokens = words(window);
                let slaveholder_hits = tokens
                    .iter()
                    .filter(|t| self.rules.is_slaveholder_indicator(t))
                    .count();
                let enslaved_hits = tokens
                    .iter()
                    .filter(|t| self.rules.is_enslaved_indicator(t))
                    .count();
                mentions.push(TargetMention {
                    name: name.to_string(),
                    window: window.to_string(),
                    slaveholder_hits,
                    enslaved_hits,
                    role: role_from_hits(slaveholder_hits, enslaved_hits),
                });
            }
        }
        mentions
    }

    fn ner_pass(
        &self,
        ner: &dyn NerBackend,
        relevant: &[&Sentence],
        slaveholders: &mut Vec<NarrativePerson>,
        enslaved: &mut Vec<NarrativePerson>,
        others: &mut Vec<NarrativePerson>,
    ) {
        let rules = &self.rules;
        for sentence in relevant {
            let result = ner.extract(&sentence.text);
            let places: Vec<String> = result
                .of_type(NerEntityType::Location)
                .map(|e| e.text.clone())
                .collect();
            for entity in result.entities {
                match entity.entity_type {
                    NerEntityType::Person => {
                        let name = clean_name(&entity.text, rules);
                        if !is_valid_name(&name, rules)
                            || contains_person(slaveholders, &name)
                            || contains_person(enslaved, &name)
                        {
                            continue;
                        }
                        let tokens = words(&sentence.text);
                        let sh = tokens.iter().filter(|t| rules.is_slaveholder_indicator(t)).count();
                        let en = tokens.iter().filter(|t| rules.is_enslaved_indicator(t)).count();
                        match role_from_hits(sh, en) {
                            Some(PersonType::Slaveholder) if is_valid_slaveholder_name(&name, rules) => {
                                slaveholders.push(NarrativePerson::new(
                                    name,
                                    PersonType::Slaveholder,
                                    NER_PERSON_CONFIDENCE,
                                    &sentence.text,
                                ));
                            }
                            Some(PersonType::Enslaved) => {
                                enslaved.push(NarrativePerson::new(
                                    name,
                                    PersonType::Enslaved,
                                    NER_PERSON_CONFIDENCE,
                                    &sentence.text,
                                ));
                            }
                            _ => {}
                        }
                    }
                    NerEntityType::Vessel | NerEntityType::FinancialActor => {
                        let role = if entity.entity_type == NerEntityType::Vessel {
                            PersonType::Vessel
                        } else {
                            PersonType::FinancialActor
                        };
                        merge_people(
                            others,
                            vec![NarrativePerson::new(
                                entity.text,
                                role,
                                NER_OTHER_CONFIDENCE,
                                &sentence.text,
                            )],
                        );
                    }
                    NerEntityType::Location => {}
                }
            }
            for person in slaveholders.iter_mut().chain(enslaved.iter_mut()) {
                if person.contexts.contains(&sentence.text) {
                    for place in &places {
                        person.add_location(place);
                    }
                }
            }
        }
    }
}

/// Base 0.3, up to 0.3 for relevant sentences, 0.15 each for slaveholders and
/// enslaved persons, 0.1 for transactions, 0.05 when a slaveholder is linked
/// to an enslaved person in the same sentence; capped at 0.95.
pub fn aggregate_confidence(
    relevant_sentences: usize,
    has_slaveholders: bool,
    has_enslaved: bool,
    has_transactions: bool,
    has_ownership: bool,
) -> f64 {
    let mut confidence = 0.3 + (relevant_sentences as f64 / 50.0).min(0.3);
    if has_slaveholders {
        confidence += 0.15;
    }
    if has_enslaved {
        confidence += 0.15;
    }
    if has_transactions {
        confidence += 0.1;
    }
    if has_ownership {
        confidence += 0.05;
    }
    confidence.min(0.95)
}

fn role_from_hits(slaveholder: usize, enslaved: usize) -> Option<PersonType> {
    match slaveholder.cmp(&enslaved) {
        std::cmp::Ordering::Greater => Some(PersonType::Slaveholder),
        std::cmp::Ordering::Less => Some(PersonType::Enslaved),
        std::cmp::Ordering::Equal => None,
    }
}

fn with_role(mut person: NarrativePerson, role: PersonType) -> NarrativePerson {
    person.role = role;
    person
}

/// Case-insensitive dedupe: max confidence, union of contexts.
fn merge_people(into: &mut Vec<NarrativePerson>, found: Vec<NarrativePerson>) {
    let mut index: HashMap<String, usize> = into
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.to_lowercase(), i))
        .collect();
    for person in found {
        let key = person.name.to_lowercase();
        match index.get(&key) {
            Some(&i) => into[i].merge(person),
            None => {
                index.insert(key, into.len());
                into.push(person);
            }
        }
    }
}

fn push_relationship(relationships: &mut Vec<Relationship>, rel: Relationship) {
    let duplicate = relationships.iter().any(|r| {
        r.kind == rel.kind
            && r.subject.eq_ignore_ascii_case(&rel.subject)
            && r.object.eq_ignore_ascii_case(&rel.object)
    });
    if !duplicate {
        relationships.push(rel);
    }
}

fn contains_person(people: &[NarrativePerson], name: &str) -> bool {
    people.iter().any(|p| p.name.eq_ignore_ascii_case(name))
}

fn contains_name(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

fn starts_with_pronoun(sentence: &str) -> bool {
    sentence
        .split_whitespace()
        .next()
        .is_some_and(|w| PRONOUNS.contains(&w))
}

fn continues_with_capital(rest: &str) -> bool {
    rest.starts_with(' ')
        && rest
            .trim_start()
            .chars()
            .next()
            .is_some_and(|c| c.is_uppercase())
}

/// "Robin, Nanny, and Daniel" -> [Robin, Nanny, Daniel]
fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .flat_map(|part| part.split(" and "))
        .map(|part| part.trim().trim_start_matches("and ").trim())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collapse whitespace within paragraphs and split into sentences.
///
/// Returns the normalized text and its sentences with byte offsets.
fn segment(text: &str) -> (String, Vec<Sentence>) {
    let mut normalized = String::new();
    let mut sentences = Vec::new();
    for paragraph in split_paragraphs(text) {
        let collapsed = paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            continue;
        }
        if !normalized.is_empty() {
            normalized.push(' ');
        }
        let base = normalized.len();
        for (start, end) in sentence_ranges(&collapsed) {
            sentences.push(Sentence {
                text: collapsed[start..end].to_string(),
                offset: base + start,
            });
        }
        normalized.push_str(&collapsed);
    }
    (normalized, sentences)
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

/// Byte ranges of sentences in whitespace-collapsed text.
///
/// A `.`, `!` or `?` ends a sentence when followed by a space and a capital,
/// digit or quote (or by the end of text). Abbreviations and single-letter
/// initials do not end sentences.
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut ranges = Vec::new();
    let mut start = 0;
    for (i, &(pos, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let boundary = match chars.get(i + 1).map(|&(_, n)| n) {
            None => true,
            Some(' ') => chars
                .get(i + 2)
                .map(|&(_, a)| a.is_uppercase() || a.is_ascii_digit() || a == '"' || a == '\u{201C}')
                .unwrap_or(true),
            _ => false,
        };
        if !boundary || (c == '.' && ends_with_abbreviation(&text[start..pos])) {
            continue;
        }
        let end = pos + c.len_utf8();
        push_trimmed(text, start, end, &mut ranges);
        start = end;
    }
    push_trimmed(text, start, text.len(), &mut ranges);
    ranges
}

fn push_trimmed(text: &str, start: usize, end: usize, ranges: &mut Vec<(usize, usize)>) {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return;
    }
    let lead = slice.len() - slice.trim_start().len();
    ranges.push((start + lead, start + lead + trimmed.len()));
}

fn ends_with_abbreviation(before: &str) -> bool {
    let last = before.rsplit(' ').next().unwrap_or("");
    ABBREVIATIONS.contains(&last)
        || (last.chars().count() == 1 && last.chars().all(|c| c.is_ascii_uppercase()))
}

/// Window of up to `WINDOW_RADIUS` characters on each side of `start..end`.
fn window_around(text: &str, start: usize, end: usize) -> &str {
    let mut lo = start.saturating_sub(WINDOW_RADIUS);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + WINDOW_RADIUS).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].trim()
}

fn keyword_window<'a>(normalized: &'a str, sentence: &Sentence, keyword: &str) -> &'a str {
    let located = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
        .ok()
        .and_then(|re| re.find(&sentence.text).map(|m| (m.start(), m.end())));
    match located {
        Some((s, e)) => window_around(normalized, sentence.offset + s, sentence.offset + e),
        None => window_around(
            normalized,
            sentence.offset,
            sentence.offset + sentence.text.len(),
        ),
    }
}

/// Dates between 1600 and 1899, most precise form first.
pub fn find_dates(text: &str) -> Vec<DateMention> {
    let mut covered: Vec<(usize, usize)> = Vec::new();
    let mut dates = Vec::new();
    let passes: [(&Regex, DatePrecision); 3] = [
        (&*FULL_DATE, DatePrecision::Full),
        (&*MONTH_YEAR, DatePrecision::MonthYear),
        (&*YEAR, DatePrecision::Year),
    ];
    for (re, precision) in passes {
        for caps in re.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if covered
                .iter()
                .any(|&(s, e)| whole.start() < e && s < whole.end())
            {
                continue;
            }
            let year = caps
                .iter()
                .skip(1)
                .flatten()
                .find_map(|m| m.as_str().parse::<u16>().ok());
            let Some(year) = year.filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y)) else {
                continue;
            };
            covered.push((whole.start(), whole.end()));
            dates.push(DateMention {
                text: whole.as_str().to_string(),
                year,
                precision,
            });
        }
    }
    dates
}

/// Sums of money in pounds or dollars.
pub fn find_amounts(text: &str) -> Vec<MoneyAmount> {
    let mut amounts = Vec::new();
    let symbol_passes: [(&Regex, Currency); 2] = [
        (&*POUNDS_SYMBOL, Currency::Pounds),
        (&*DOLLARS_SYMBOL, Currency::Dollars),
    ];
    for (re, currency) in symbol_passes {
        for caps in re.captures_iter(text) {
            if let Some(value) = parse_amount(caps.get(1).map(|m| m.as_str()), caps.get(2).map(|m| m.as_str())) {
                amounts.push(MoneyAmount {
                    text: caps[0].to_string(),
                    value,
                    currency,
                });
            }
        }
    }
    for caps in MONEY_WORDS.captures_iter(text) {
        let currency = match caps.get(3).map(|m| m.as_str().to_lowercase()) {
            Some(unit) if unit == "pounds" => Currency::Pounds,
            Some(_) => Currency::Dollars,
            None => continue,
        };
        if let Some(value) = parse_amount(caps.get(1).map(|m| m.as_str()), caps.get(2).map(|m| m.as_str())) {
            amounts.push(MoneyAmount {
                text: caps[0].to_string(),
                value,
                currency,
            });
        }
    }
    amounts
}

fn parse_amount(whole: Option<&str>, fraction: Option<&str>) -> Option<f64> {
    let digits = whole?.replace(',', "");
    let text = match fraction {
        Some(f) => format!("{digits}{f}"),
        None => digits,
    };
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{RegexNerBackend, LOCATIONS_COLUMN, NAME_COLUMN};

    const MARSHAM: &str = "Richard Marsham owned 36 slaves at his death in 1713. \
                           He freed mulatto Robin, Nanny, and Daniel in his will.";

    fn extractor() -> NarrativeExtractor {
        NarrativeExtractor::new(CompiledRules::builtin().unwrap())
    }

    fn names(people: &[NarrativePerson]) -> Vec<&str> {
        people.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_marsham_paragraph() {
        let result = extractor().extract(MARSHAM, &[]);

        assert_eq!(names(&result.slaveholders), vec!["Richard Marsham"]);
        assert_eq!(result.slaveholders[0].slave_count, Some(36));
        assert_eq!(names(&result.enslaved), vec!["Robin", "Nanny", "Daniel"]);

        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].kind, TransactionKind::Manumission);

        let ownership: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Ownership)
            .collect();
        assert_eq!(ownership.len(), 3);
        assert!(ownership.iter().all(|r| r.subject == "Richard Marsham"));
        assert!(ownership.iter().all(|r| r.confidence == 0.6));

        assert_eq!(result.dates.len(), 1);
        assert_eq!(result.dates[0].year, 1713);
        assert_eq!(result.statistics.total_sentences, 2);
        assert_eq!(result.statistics.relevant_sentences, 2);
        assert_eq!(result.statistics.slave_count_total, 36);
        assert!(result.confidence >= 0.75);
    }

    #[test]
    fn test_irrelevant_text_scores_base() {
        let result = extractor().extract("The weather was fair. Crops were planted early.", &[]);
        assert!(result.is_empty());
        assert_eq!(result.statistics.relevant_sentences, 0);
        assert_eq!(result.confidence, 0.3);
    }

    #[test]
    fn test_single_token_slaveholder_rejected() {
        let result = extractor().extract("Marsham owned 12 slaves on the river.", &[]);
        assert!(result.slaveholders.is_empty());
    }

    #[test]
    fn test_owned_by_and_named_patterns() {
        let text = "A negro man named Caesar, owned by Thomas Addison, ran away in June 1781.";
        let result = extractor().extract(text, &[]);
        assert_eq!(names(&result.slaveholders), vec!["Thomas Addison"]);
        assert_eq!(names(&result.enslaved), vec!["Caesar"]);
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.dates[0].precision, DatePrecision::MonthYear);
    }

    #[test]
    fn test_aged_pattern_captures_age_and_gender() {
        let text = "Inventory of the estate: Hannah, aged 30, female, valued at $400.";
        let result = extractor().extract(text, &[]);
        let hannah = &result.enslaved[0];
        assert_eq!(hannah.name, "Hannah");
        assert_eq!(hannah.age.as_deref(), Some("30"));
        assert_eq!(hannah.gender.as_deref(), Some("female"));
    }

    #[test]
    fn test_titled_slaveholder_needs_ownership_context() {
        let e = extractor();
        let with_context = e.extract("Col. Lloyd owned the land and the slaves upon it.", &[]);
        assert_eq!(names(&with_context.slaveholders), vec!["Col. Lloyd"]);

        let without = e.extract("Col. Lloyd recorded the census of the county.", &[]);
        assert!(without.slaveholders.is_empty());
    }

    #[test]
    fn test_transaction_window_carries_dates_and_money() {
        let text = "On March 3, 1852 the negro Peter was sold to James Hall for $1,200.50 at auction.";
        let result = extractor().extract(text, &[]);
        let sale = result
            .transactions
            .iter()
            .find(|t| t.kind == TransactionKind::Sale)
            .unwrap();
        assert_eq!(sale.dates[0].precision, DatePrecision::Full);
        assert_eq!(sale.dates[0].year, 1852);
        assert_eq!(sale.amounts[0].value, 1200.50);
        assert_eq!(sale.amounts[0].currency, Currency::Dollars);
    }

    #[test]
    fn test_family_relationship_between_enslaved() {
        let text = "He bequeathed Sarah and Jacob to his son. Sarah, the mother of Jacob, was a slave.";
        let result = extractor().extract(text, &[]);
        let family: Vec<_> = result
            .relationships
            .iter()
            .filter(|r| r.kind == RelationshipKind::Family)
            .collect();
        assert_eq!(family.len(), 1);
        assert_eq!(family[0].subject, "Sarah");
        assert_eq!(family[0].object, "Jacob");
        assert_eq!(family[0].confidence, 0.5);
    }

    #[test]
    fn test_target_names_classified_by_indicators() {
        let text = "The petitioner Ann Dorsey owned the estate. Lewis, a slave, was named in the deed.";
        let targets = vec!["Ann Dorsey".to_string(), "Lewis".to_string()];
        let result = extractor().extract(text, &targets);
        let dorsey = result
            .target_mentions
            .iter()
            .find(|m| m.name == "Ann Dorsey")
            .unwrap();
        assert!(dorsey.slaveholder_hits > 0);
        assert_eq!(result.target_mentions.len(), 2);
    }

    #[test]
    fn test_ner_contributes_vessels() {
        let text = "Twelve slaves were sold from the brig Wanderer at Charleston.";
        let result = extractor()
            .with_ner(Arc::new(RegexNerBackend::new()))
            .extract(text, &[]);
        assert_eq!(result.other_entities.len(), 1);
        assert_eq!(result.other_entities[0].role, PersonType::Vessel);
        assert_eq!(result.other_entities[0].name, "Wanderer");
    }

    #[test]
    fn test_ner_locations_attach_to_people_in_sentence() {
        let text = "A negro man named Caesar, owned by Thomas Addison, ran away in Maryland. \
                    The weather was fair.";
        let result = extractor()
            .with_ner(Arc::new(RegexNerBackend::new()))
            .extract(text, &[]);
        assert!(result.enslaved[0].locations.contains(&"Maryland".to_string()));
        assert!(result.slaveholders[0].locations.contains(&"Maryland".to_string()));

        let caesar = result
            .to_rows()
            .into_iter()
            .find(|r| r.get(NAME_COLUMN) == Some("Caesar"))
            .unwrap();
        assert_eq!(caesar.get(LOCATIONS_COLUMN), Some("Maryland"));
    }

    #[test]
    fn test_dedupe_is_case_insensitive() {
        let text = "A slave named Tom was sold. The slave called Tom ran away.";
        let result = extractor().extract(text, &[]);
        assert_eq!(result.enslaved.len(), 1);
        assert_eq!(result.enslaved[0].contexts.len(), 2);
    }

    #[test]
    fn test_sentence_split_keeps_abbreviations() {
        let (_, sentences) = segment("Col. Lloyd sold Ned. Mrs. J. Dorsey bought him.\n\nNew paragraph here");
        let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Col. Lloyd sold Ned.", "Mrs. J. Dorsey bought him.", "New paragraph here"]
        );
    }

    #[test]
    fn test_dates_outside_range_ignored() {
        let dates = find_dates("Recorded 1713, copied 1950, indexed 2003.");
        assert_eq!(dates.len(), 1);
        assert_eq!(dates[0].text, "1713");
    }

    #[test]
    fn test_amounts() {
        let amounts = find_amounts("valued at £45.10 and 300 dollars");
        assert_eq!(amounts.len(), 2);
        assert_eq!(amounts[0].currency, Currency::Pounds);
        assert_eq!(amounts[0].value, 45.10);
        assert_eq!(amounts[1].value, 300.0);
    }

    #[test]
    fn test_aggregate_confidence_caps() {
        assert_eq!(aggregate_confidence(0, false, false, false, false), 0.3);
        assert!((aggregate_confidence(2, true, true, true, false) - 0.74).abs() < 1e-9);
        assert!((aggregate_confidence(2, true, true, true, true) - 0.79).abs() < 1e-9);
        assert_eq!(aggregate_confidence(100, true, true, true, true), 0.95);
    }
}
