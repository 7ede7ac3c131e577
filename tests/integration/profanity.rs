use chatcore::profanity::{ProfanityFilter, normalize_token, project};

struct TempFilter {
    filter: ProfanityFilter,
    dir: String,
}

impl Drop for TempFilter {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn temp_filter() -> TempFilter {
    let tag = uuid::Uuid::new_v4().to_string().split('-').next().unwrap().to_string();
    let dir = format!("/tmp/chatcore_profanity_{tag}");
    let filter = ProfanityFilter::new(&dir);
    TempFilter { filter, dir }
}

#[test]
fn test_clean_text_passes() {
    let t = temp_filter();
    assert!(!t.filter.contains_profanity("привет, как дела?"));
    assert!(!t.filter.contains_profanity("hello world"));
    assert!(!t.filter.contains_profanity(""));
}

#[test]
fn test_static_term_detected() {
    let t = temp_filter();
    assert!(t.filter.contains_profanity("сука"));
    assert!(t.filter.contains_profanity("ну ты и сука, приятель"));
}

#[test]
fn test_homoglyph_substitution_detected() {
    let t = temp_filter();
    // Latin x/y standing in for Cyrillic х/у
    assert!(t.filter.contains_profanity("xуй"));
    // Latin z standing in for Cyrillic з
    assert!(t.filter.contains_profanity("пиzда"));
    // Greek chi for х
    assert!(t.filter.contains_profanity("χуй"));
}

#[test]
fn test_leet_digits_detected() {
    let t = temp_filter();
    assert!(t.filter.contains_profanity("п0рн0"));
}

#[test]
fn test_zero_width_noise_detected() {
    let t = temp_filter();
    assert!(t.filter.contains_profanity("су\u{200B}ка"));
    assert!(t.filter.contains_profanity("су\u{200D}\u{200C}ка"));
}

#[test]
fn test_whitespace_noise_detected() {
    // contains(x) implies contains(x + noise)
    let t = temp_filter();
    assert!(t.filter.contains_profanity("  сука  "));
    assert!(t.filter.contains_profanity("сука!!!"));
}

#[test]
fn test_visual_bypass_folded() {
    let t = temp_filter();
    // "}{" visually forms х
    assert!(t.filter.contains_profanity("}{уй"));
}

#[test]
fn test_whitelisted_whole_input_is_clean() {
    let t = temp_filter();
    assert!(!t.filter.contains_profanity("говно"));
    assert!(!t.filter.contains_profanity("Говно"));
}

#[test]
fn test_phrase_pattern_detected() {
    let t = temp_filter();
    assert!(t.filter.contains_profanity("check this xxx content"));
    // non-alphanumerics collapse to spaces, so punctuation cannot split it
    assert!(t.filter.contains_profanity("порно-сайт"));
    assert!(!t.filter.contains_profanity("xxxlarge"));
}

#[test]
fn test_subsequence_span_cap() {
    let t = temp_filter();
    // "хуйня" contains "хуй" as a plain substring
    assert!(t.filter.contains_profanity("хуйня"));
    // widely scattered letters must not match: х...у...й across a sentence
    assert!(!t.filter.contains_profanity("хорошо устроился, крой"));
}

#[test]
fn test_blocklist_add_and_remove() {
    let t = temp_filter();
    assert!(!t.filter.contains_profanity("badword"));

    let (added, all) = t.filter.add_terms(&["BadWord".to_string()]);
    assert_eq!(added, vec!["badword".to_string()]);
    assert!(all.contains(&"badword".to_string()));
    assert!(t.filter.contains_profanity("badword"));
    // homoglyph-normalized variants of a blocklist term are caught too
    assert!(t.filter.contains_profanity("B4dW0rd"));

    let (removed, all) = t.filter.remove_terms(&["badword".to_string()]);
    assert_eq!(removed, vec!["badword".to_string()]);
    assert!(all.is_empty());
    assert!(!t.filter.contains_profanity("badword"));
}

#[test]
fn test_blocklist_persisted_sorted() {
    let t = temp_filter();
    t.filter.add_terms(&["zeta".to_string(), "alpha".to_string()]);
    let raw = std::fs::read_to_string(format!("{}/profanity/blocklist.json", t.dir)).unwrap();
    let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed, vec!["alpha".to_string(), "zeta".to_string()]);
}

#[test]
fn test_projection_shapes() {
    assert_eq!(project("с у к а", false), "сука");
    assert_eq!(project("AB cd", true), "ab cd");
    assert_eq!(normalize_token("XYZ"), "хуз");
}
