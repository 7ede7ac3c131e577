use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use unicode_normalization::UnicodeNormalization;

/// Blocked-content decision over user text: messages, edits, usernames,
/// display names. Rejects, never censors.
///
/// Matching happens on a homoglyph-normalized projection of the input so
/// that leet digits, Latin/Greek/full-width lookalikes, and zero-width
/// padding cannot slip a blocked term through.
pub struct ProfanityFilter {
    blocklist_path: PathBuf,
    /// Serializes blocklist mutations; readers never take this.
    writer: Mutex<()>,
    /// Current dictionary snapshot, swapped whole on rebuild.
    dict: RwLock<Arc<Dictionary>>,
}

struct Dictionary {
    /// Normalized blocked terms (static set plus persisted blocklist).
    terms: Vec<String>,
    /// Raw blocklist entries as persisted (lowercased, trimmed, sorted).
    blocklist: Vec<String>,
}

/// Terms that are never flagged when they make up the entire input.
const WHITELIST: &[&str] = &["говно"];

const STATIC_TERMS: &[&str] = &[
    "бляд", "блять", "бля", "сука", "суки", "сучка", "мразь", "ебан", "ебать",
    "ебёт", "ебет", "уёбок", "уебок", "уебище", "пизда", "пиздец", "хуй",
    "хуя", "хуйня", "хер", "гондон", "долбоёб", "долбоеб", "дебил", "хуесос",
    "пидор", "пидорас", "порно", "порнуха", "порнография", "эротика", "секс",
    "инцест", "сексвидео", "порносайт",
];

/// Phrase patterns applied to the space-preserving projection.
fn phrase_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\bxxx\b",
            r"\bпорно\s+сайт\b",
            r"\bсекс\s+чат\b",
            r"\bэскорт\s+услуги\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern compiles"))
        .collect()
    })
}

/// Multi-token phrases matched with one edit of slack per token.
const FUZZY_PHRASES: &[&[&str]] = &[&["купи", "подписку"], &["переходи", "по", "ссылке"]];

/// Map one character to its canonical form. Latin, Greek, full-width, and
/// digit lookalikes collapse onto Cyrillic; everything else lowercases.
fn normalize_char(ch: char) -> char {
    match ch {
        // digits to letters
        '0' => 'о',
        '1' => 'и',
        '3' => 'е',
        '4' => 'а',
        // Latin to Cyrillic
        'a' | 'A' => 'а',
        'c' | 'C' => 'с',
        'e' | 'E' => 'е',
        'f' | 'F' => 'ф',
        'g' | 'G' => 'г',
        'i' | 'I' => 'и',
        'm' | 'M' => 'м',
        'n' | 'N' => 'н',
        'o' | 'O' => 'о',
        'p' | 'P' => 'п',
        's' | 'S' => 'с',
        't' | 'T' => 'т',
        'u' | 'U' => 'у',
        'v' | 'V' => 'в',
        'x' | 'X' => 'х',
        'y' | 'Y' => 'у',
        'z' | 'Z' => 'з',
        // Greek lookalikes
        'α' | 'Α' => 'а',
        'ο' | 'Ο' => 'о',
        'ρ' | 'Ρ' => 'р',
        'υ' | 'Υ' => 'у',
        'χ' | 'Χ' => 'х',
        'ε' | 'Ε' => 'е',
        'ι' | 'Ι' => 'и',
        'ν' | 'Ν' => 'н',
        'μ' | 'Μ' => 'м',
        'π' | 'Π' => 'п',
        'τ' | 'Τ' => 'т',
        'γ' | 'Γ' => 'г',
        'σ' | 'Σ' => 'с',
        'φ' | 'Φ' => 'ф',
        // full-width Latin
        'ａ' | 'Ａ' => 'а',
        'ｃ' | 'Ｃ' => 'с',
        'ｅ' | 'Ｅ' => 'е',
        'ｆ' | 'Ｆ' => 'ф',
        'ｇ' | 'Ｇ' => 'г',
        'ｉ' | 'Ｉ' => 'и',
        'ｍ' | 'Ｍ' => 'м',
        'ｎ' | 'Ｎ' => 'н',
        'ｏ' | 'Ｏ' => 'о',
        'ｐ' | 'Ｐ' => 'п',
        'ｓ' | 'Ｓ' => 'с',
        'ｔ' | 'Ｔ' => 'т',
        'ｕ' | 'Ｕ' => 'у',
        'ｖ' | 'Ｖ' => 'в',
        'ｘ' | 'Ｘ' => 'х',
        'ｙ' | 'Ｙ' => 'у',
        'ｚ' | 'Ｚ' => 'з',
        // Cyrillic variants onto canonical Cyrillic
        'ё' | 'Ё' => 'е',
        'ү' | 'Ү' => 'у',
        '@' => 'а',
        other => other.to_lowercase().next().unwrap_or(other),
    }
}

fn is_zero_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' | '\u{2060}' | '\u{2061}'
            | '\u{2062}' | '\u{2063}' | '\u{2064}'
    )
}

/// `}{` visually forms `х`; fold it before any other processing.
fn fold_visual_bypasses(text: &str) -> String {
    text.replace("}{", "х")
}

/// Normalize a whole token through the homoglyph map.
pub fn normalize_token(token: &str) -> String {
    token.chars().map(normalize_char).collect()
}

/// Alphanumeric projection of the input after NFKC, zero-width handling, and
/// homoglyph mapping. With `preserve_spaces`, runs of non-alphanumerics
/// collapse to single spaces so phrase patterns can match across them.
pub fn project(text: &str, preserve_spaces: bool) -> String {
    let folded = fold_visual_bypasses(text);
    let nfkc: String = folded.nfkc().collect();
    let mut out = String::with_capacity(nfkc.len());
    for ch in nfkc.chars() {
        if is_zero_width(ch) {
            if preserve_spaces && !out.ends_with(' ') && !out.is_empty() {
                out.push(' ');
            }
            continue;
        }
        if ch.is_alphanumeric() {
            // In the space-preserving projection ASCII letters keep their
            // script so English phrase patterns still match.
            if preserve_spaces && ch.is_ascii_alphabetic() {
                out.push(ch.to_ascii_lowercase());
            } else {
                out.push(normalize_char(ch));
            }
        } else if preserve_spaces && !out.ends_with(' ') && !out.is_empty() {
            out.push(' ');
        }
    }
    out
}

/// Span-length cap for subsequence matches, stricter for shorter terms.
fn max_span(term_len: usize) -> usize {
    let ratio = if term_len <= 3 {
        1.3
    } else if term_len == 4 {
        1.4
    } else if term_len <= 5 {
        1.5
    } else {
        1.8
    };
    (term_len as f64 * ratio) as usize
}

/// True if `term` occurs in `text` as a substring, or as a subsequence whose
/// span does not exceed the per-term cap.
fn term_matches(text: &[char], term: &str) -> bool {
    let term_chars: Vec<char> = term.chars().collect();
    if term_chars.is_empty() {
        return false;
    }
    let text_str: String = text.iter().collect();
    if text_str.contains(term) {
        return true;
    }

    let cap = max_span(term_chars.len());
    let mut i = 0usize;
    while i < text.len() {
        // attempt a subsequence match starting at the first char position
        if text[i] == term_chars[0] {
            let mut j = 1usize;
            let mut k = i + 1;
            while k < text.len() && j < term_chars.len() && k - i < cap {
                if text[k] == term_chars[j] {
                    j += 1;
                }
                k += 1;
            }
            if j == term_chars.len() && k - i <= cap {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Levenshtein distance capped at `max_distance`; true when within it.
fn within_edit_distance(a: &str, b: &str, max_distance: usize) -> bool {
    if a == b {
        return true;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max_distance {
        return false;
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1];
        let mut best = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let insert_cost = current[j] + 1;
            let delete_cost = previous[j + 1] + 1;
            let replace_cost = previous[j] + usize::from(ca != cb);
            let cost = insert_cost.min(delete_cost).min(replace_cost);
            current.push(cost);
            best = best.min(cost);
        }
        if best > max_distance {
            return false;
        }
        previous = current;
    }
    previous[b.len()] <= max_distance
}

fn fuzzy_phrase_match(projected: &str) -> bool {
    let tokens: Vec<&str> = projected.split_whitespace().collect();
    for phrase in FUZZY_PHRASES {
        let targets: Vec<String> = phrase.iter().map(|p| normalize_token(p)).collect();
        if targets.len() > tokens.len() {
            continue;
        }
        for window in tokens.windows(targets.len()) {
            if window
                .iter()
                .zip(targets.iter())
                .all(|(tok, target)| within_edit_distance(tok, target, 1))
            {
                return true;
            }
        }
    }
    false
}

impl ProfanityFilter {
    pub fn new(data_dir: &str) -> Self {
        let blocklist_path = PathBuf::from(data_dir).join("profanity").join("blocklist.json");
        if let Some(parent) = blocklist_path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let filter = Self {
            blocklist_path,
            writer: Mutex::new(()),
            dict: RwLock::new(Arc::new(Dictionary { terms: Vec::new(), blocklist: Vec::new() })),
        };
        filter.rebuild();
        filter
    }

    fn load_blocklist(&self) -> BTreeSet<String> {
        let Ok(raw) = fs::read_to_string(&self.blocklist_path) else {
            return BTreeSet::new();
        };
        let Ok(parsed) = serde_json::from_str::<Vec<String>>(&raw) else {
            return BTreeSet::new();
        };
        parsed
            .into_iter()
            .map(|w| w.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
            .filter(|w| !w.is_empty())
            .collect()
    }

    fn write_blocklist(&self, words: &BTreeSet<String>) {
        let list: Vec<&String> = words.iter().collect();
        let body = serde_json::to_string_pretty(&list).unwrap_or_else(|_| "[]".to_string());
        fs::write(&self.blocklist_path, body + "\n").ok();
    }

    /// Build a fresh dictionary from the static terms and the persisted
    /// blocklist, then swap the snapshot pointer.
    fn rebuild(&self) {
        let blocklist = self.load_blocklist();
        let whitelist: BTreeSet<String> =
            WHITELIST.iter().map(|w| normalize_token(w)).collect();
        let mut terms: BTreeSet<String> = STATIC_TERMS
            .iter()
            .map(|t| normalize_token(t))
            .collect();
        for word in &blocklist {
            terms.insert(normalize_token(word));
        }
        for white in &whitelist {
            terms.remove(white);
        }
        let dict = Dictionary {
            terms: terms.into_iter().collect(),
            blocklist: blocklist.into_iter().collect(),
        };
        *self.dict.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(dict);
    }

    fn snapshot(&self) -> Arc<Dictionary> {
        self.dict.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Decide whether the text contains blocked content.
    pub fn contains_profanity(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let spaced = project(text, true);
        for pattern in phrase_patterns() {
            if pattern.is_match(&spaced) {
                return true;
            }
        }
        if fuzzy_phrase_match(&spaced) {
            return true;
        }

        let flat = project(text, false);
        // whole-input whitelist carve-out
        for white in WHITELIST {
            if flat == normalize_token(white) {
                return false;
            }
        }

        let chars: Vec<char> = flat.chars().collect();
        let dict = self.snapshot();
        dict.terms.iter().any(|term| term_matches(&chars, term))
    }

    pub fn blocklist(&self) -> Vec<String> {
        self.snapshot().blocklist.clone()
    }

    /// Add terms; returns `(newly added, full list)`.
    pub fn add_terms(&self, words: &[String]) -> (Vec<String>, Vec<String>) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = self.load_blocklist();
        let mut added = Vec::new();
        for raw in words {
            let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            if !cleaned.is_empty() && current.insert(cleaned.clone()) {
                added.push(cleaned);
            }
        }
        if !added.is_empty() {
            self.write_blocklist(&current);
            self.rebuild();
        }
        (added, self.blocklist())
    }

    /// Remove terms; returns `(removed, full list)`.
    pub fn remove_terms(&self, words: &[String]) -> (Vec<String>, Vec<String>) {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = self.load_blocklist();
        let mut removed = Vec::new();
        for raw in words {
            let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            if current.remove(&cleaned) {
                removed.push(cleaned);
            }
        }
        if !removed.is_empty() {
            self.write_blocklist(&current);
            self.rebuild();
        }
        (removed, self.blocklist())
    }
}
