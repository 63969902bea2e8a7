//! Name validation shared by the narrative extractor and the row emitter.

use crate::rules::CompiledRules;

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 50;

/// Whether `name` looks like a person's name.
///
/// Accepts strings that start with a capital, are 3 to 50 characters, carry a
/// vowel, are not a stopword, are not shouted (all caps beyond 3 characters),
/// are not numeric and do not end in a verb.
pub fn is_valid_name(name: &str, rules: &CompiledRules) -> bool {
    let name = name.trim();
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return false;
    }
    if !name.chars().next().is_some_and(|c| c.is_uppercase()) {
        return false;
    }
    if !name.chars().any(|c| "aeiouyAEIOUY".contains(c)) {
        return false;
    }
    if name.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return false;
    }
    if rules.is_stopword(name) {
        return false;
    }
    let letters: Vec<char> = name.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 3 && letters.iter().all(|c| c.is_uppercase()) {
        return false;
    }
    match name.split_whitespace().last() {
        Some(last) if rules.is_verb_ending(last) => false,
        _ => true,
    }
}

/// Slaveholder names need two capitalized tokens, or a title and a surname.
pub fn is_valid_slaveholder_name(name: &str, rules: &CompiledRules) -> bool {
    if !is_valid_name(name, rules) {
        return false;
    }
    let tokens: Vec<&str> = name.split_whitespace().collect();
    let capitalized = tokens
        .iter()
        .filter(|t| t.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    if tokens.first().is_some_and(|t| rules.is_title(t)) {
        return tokens.len() >= 2;
    }
    capitalized >= 2
}

/// Single-word enslaved names.
pub fn is_valid_given_name(name: &str, rules: &CompiledRules) -> bool {
    !name.trim().contains(char::is_whitespace) && is_valid_name(name, rules)
}

/// Drop leading stopwords ("The", "In", ...) and a trailing possessive.
pub fn clean_name(raw: &str, rules: &CompiledRules) -> String {
    let trimmed = raw
        .trim()
        .trim_end_matches("'s")
        .trim_end_matches("\u{2019}s");
    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let start = tokens
        .iter()
        .position(|t| !rules.is_stopword(t.trim_end_matches('.')))
        .unwrap_or(tokens.len());
    tokens[start..].join(" ")
}
