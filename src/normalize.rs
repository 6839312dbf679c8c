//! First-name and company-name cleaning.
//!
//! Both cleaners are pure and deterministic, return an empty string for empty
//! input, and are run to a fixpoint so applying them twice changes nothing.

use regex::Regex;
use std::sync::OnceLock;

/// Upper bound on cleaning passes; real inputs settle in one or two.
const MAX_PASSES: usize = 6;

const NAME_SUFFIXES: [&str; 8] = ["jr", "jr.", "sr", "sr.", "ii", "iii", "iv", "v"];

/// Legal suffixes removed from company names (case-insensitive regex fragments).
const LEGAL_SUFFIXES: &[&str] = &[
    // English
    r"inc\.?", r"incorporated", r"corp\.?", r"corporation", r"company", r"co\.?",
    r"llc", r"l\.l\.c\.?", r"llp", r"l\.l\.p\.?", r"lp", r"l\.p\.?",
    r"ltd\.?", r"limited", r"plc", r"p\.l\.c\.?",
    r"holdings?", r"enterprises?", r"group", r"intl\.?", r"international",
    // German
    r"gmbh", r"g\.m\.b\.h\.?", r"ag", r"a\.g\.?", r"kg", r"k\.g\.?", r"ohg", r"ug",
    // French
    r"sarl", r"s\.a\.r\.l\.?", r"sas", r"s\.a\.s\.?", r"sa", r"s\.a\.?", r"snc", r"sci",
    // Spanish / Portuguese
    r"s\.l\.?", r"sl", r"ltda\.?", r"cia\.?",
    // Italian
    r"spa", r"s\.p\.a\.?", r"srl", r"s\.r\.l\.?",
    // Dutch / Belgian
    r"bv", r"b\.v\.?", r"nv", r"n\.v\.?", r"bvba", r"cvba",
    // Nordic
    r"ab", r"a\.b\.?", r"as", r"a\.s\.?", r"oy", r"oyj", r"aps",
    // Czech / Slovak
    r"s\.r\.o\.?", r"sro", r"spol\.?\s*s\s*r\.?\s*o\.?",
    // Asian
    r"pte\.?\s*ltd\.?", r"pty\.?\s*ltd\.?", r"pvt\.?\s*ltd\.?",
    r"kk", r"k\.k\.?", r"kabushiki\s*kaisha", r"gk", r"g\.k\.?",
    // Australian
    r"pty", r"proprietary",
    // Indian
    r"pvt\.?", r"private",
    // Other
    r"psc", r"pc", r"pllc", r"professional",
];

const LOWERCASE_WORDS: [&str; 12] = [
    "and", "or", "the", "a", "an", "of", "for", "to", "in", "on", "at", "by",
];

const KNOWN_ACRONYMS: [&str; 15] = [
    "IBM", "BMW", "SAP", "AWS", "USA", "UK", "AI", "IT", "HR", "CEO", "CFO", "CTO", "VP", "3M",
    "GE",
];

struct Patterns {
    paren_inner: Regex,
    quoted: Regex,
    doctor: Regex,
    initial: Regex,
    whitespace: Regex,
    parenthetical: Regex,
    dba: Regex,
    comma_suffix: Regex,
    legal_suffix: Regex,
    leading_the: Regex,
    special_chars: Regex,
    trailing_junk: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let suffixes = LEGAL_SUFFIXES.join("|");
        Patterns {
            paren_inner: compile(r"\(([^)]+)\)"),
            quoted: compile("[\"'\u{201C}\u{201D}\u{2018}\u{2019}]([^\"'\u{201C}\u{201D}\u{2018}\u{2019}]+)[\"'\u{201C}\u{201D}\u{2018}\u{2019}]"),
            doctor: compile(r"(?i)^\s*(dr\.?|doctor)\s+"),
            initial: compile(r"^[A-Za-z]\.?$"),
            whitespace: compile(r"\s+"),
            parenthetical: compile(r"\s*\([^)]*\)"),
            dba: compile(r"(?i)\s+(?:d\.?b\.?a\.?|d/b/a|trading\s+as|t/a)\s+"),
            comma_suffix: compile(&format!(r"(?i)^(?:{})\.?\s*$", suffixes)),
            legal_suffix: compile(&format!(
                r"(?i)(?:\s+(?:and|&))?\s*\b(?:{})\.?\b",
                suffixes
            )),
            leading_the: compile(r"(?i)^the\s+"),
            special_chars: compile(r"[^\w\s&\-'.·]"),
            trailing_junk: compile(r"[\s&\-,.]+$"),
        }
    })
}

fn compile(pattern: &str) -> Regex {
    // Patterns are compile-time constants; a failure here is a programming error.
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid normalizer pattern {}: {}", pattern, e))
}

fn to_fixpoint(raw: &str, pass: fn(&str) -> String) -> String {
    let mut current = pass(raw);
    for _ in 1..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Python-style `capitalize`: first character upper-cased, the rest lower-cased.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn has_cased(text: &str) -> bool {
    text.chars().any(|c| c.is_uppercase() || c.is_lowercase())
}

fn is_all_upper(text: &str) -> bool {
    has_cased(text) && !text.chars().any(char::is_lowercase)
}

fn is_all_lower(text: &str) -> bool {
    has_cased(text) && !text.chars().any(char::is_uppercase)
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}

// ============ First names ============

/// Cleans a raw first-name field into a Title Case first name.
///
/// "John (Johnny) Smith" → "Johnny", "\"Nick\" John" → "Nick",
/// "dr john" → "Dr. John", "J. Robert" → "Robert", "mary-jane" → "Mary-Jane".
pub fn clean_first_name(raw: &str) -> String {
    to_fixpoint(raw, clean_first_name_once)
}

fn clean_first_name_once(raw: &str) -> String {
    let p = patterns();
    let mut name = raw.trim().to_string();
    if name.is_empty() {
        return String::new();
    }

    if let Some(inner) = p.paren_inner.captures(&name).and_then(|c| c.get(1)) {
        name = inner.as_str().trim().to_string();
    } else if let Some(inner) = p.quoted.captures(&name).and_then(|c| c.get(1)) {
        name = inner.as_str().trim().to_string();
    }

    let mut dr_prefix = "";
    if let Some(m) = p.doctor.find(&name) {
        dr_prefix = "Dr. ";
        name = name[m.end()..].trim().to_string();
    }

    // Keep letters, spaces and name punctuation; drop emojis and symbols.
    let kept: String = name
        .chars()
        .filter(|&c| c.is_alphabetic() || c == ' ' || c == '-' || c == '.' || is_apostrophe(c))
        .collect();
    let name = p.whitespace.replace_all(&kept, " ").trim().to_string();
    if name.is_empty() {
        return String::new();
    }

    let words: Vec<&str> = name.split(' ').collect();
    let real_words: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !p.initial.is_match(w))
        .filter(|w| !NAME_SUFFIXES.contains(&w.to_lowercase().as_str()))
        .collect();
    let first = real_words.first().or_else(|| words.first()).copied().unwrap_or("");
    if first.is_empty() {
        return String::new();
    }

    format!("{}{}", dr_prefix, title_case_name(first))
}

fn title_case_name(word: &str) -> String {
    if word.contains('-') {
        return word.split('-').map(capitalize).collect::<Vec<_>>().join("-");
    }
    if word.chars().any(is_apostrophe) {
        let mut result = String::new();
        let mut segment = String::new();
        for c in word.chars() {
            if is_apostrophe(c) {
                result.push_str(&capitalize(&segment));
                result.push(c);
                segment.clear();
            } else {
                segment.push(c);
            }
        }
        result.push_str(&capitalize(&segment));
        return result;
    }
    capitalize(word)
}

// ============ Company names ============

/// Cleans a raw company name: legal suffixes, parentheticals, DBA tails and
/// a leading "The" are removed and casing is normalized.
///
/// "Acme, Inc." → "Acme", "THE BOEING COMPANY" → "Boeing", "AT&T Inc." → "AT&T".
pub fn clean_company_name(raw: &str) -> String {
    to_fixpoint(raw, clean_company_name_once)
}

fn clean_company_name_once(raw: &str) -> String {
    let p = patterns();
    let mut name = raw.trim().to_string();
    if name.is_empty() {
        return String::new();
    }

    name = p.parenthetical.replace_all(&name, "").into_owned();

    // Keep the legal name in front of "DBA" / "trading as".
    if let Some(m) = p.dba.find(&name) {
        name = name[..m.start()].trim().to_string();
    }

    if let Some((head, tail)) = name.split_once(',') {
        let second = tail.split(',').next().unwrap_or("").trim();
        if p.comma_suffix.is_match(second) {
            name = head.trim().to_string();
        }
    }

    name = p.legal_suffix.replace_all(&name, "").into_owned();
    name = p.leading_the.replace(&name, "").into_owned();
    name = p.special_chars.replace_all(&name, " ").into_owned();
    name = p.trailing_junk.replace(&name, "").into_owned();
    name = p.whitespace.replace_all(&name, " ").trim().to_string();
    let name = name.trim_end_matches('.').trim();
    if name.is_empty() {
        return String::new();
    }

    smart_title_case(name)
}

fn smart_title_case(text: &str) -> String {
    let all_caps_input = is_all_upper(text);

    text.split(' ')
        .enumerate()
        .map(|(i, word)| {
            let upper = word.to_uppercase();
            if KNOWN_ACRONYMS.contains(&upper.as_str()) {
                upper
            } else if word.contains('&') && word.chars().count() <= 5 {
                upper
            } else if all_caps_input {
                let lower = word.to_lowercase();
                if i > 0 && LOWERCASE_WORDS.contains(&lower.as_str()) {
                    lower
                } else {
                    capitalize(word)
                }
            } else if is_all_upper(word) {
                // Short all-caps words inside mixed text are probably acronyms.
                if word.chars().count() <= 4 {
                    word.to_string()
                } else {
                    capitalize(word)
                }
            } else if is_all_lower(word) {
                capitalize(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
