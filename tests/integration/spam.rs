use chatcore::config::ChatConfig;
use chatcore::spam::{SpamMonitor, SpamVerdict, similarity_ratio};

fn monitor() -> SpamMonitor {
    SpamMonitor::new(&ChatConfig::default())
}

#[test]
fn test_varied_messages_stay_clean() {
    let spam = monitor();
    let messages = [
        "morning everyone",
        "did anyone see the game last night",
        "I pushed the fix to the branch",
        "lunch in ten minutes?",
    ];
    for (i, content) in messages.iter().enumerate() {
        assert_eq!(spam.record(7, i as i64 + 1, content), SpamVerdict::Clean);
    }
}

#[test]
fn test_burst_trips_at_limit() {
    let spam = monitor();
    // distinct contents so only the rate rule can fire
    let fillers = [
        "kettle", "bridge", "orchid", "granite", "velvet", "mosaic", "ember", "harbor", "quartz",
        "willow", "falcon", "meadow", "cobalt", "thimble", "lantern", "juniper", "saffron",
        "timber", "anchor", "breeze",
    ];
    let mut verdicts = Vec::new();
    for (i, filler) in fillers.iter().enumerate() {
        verdicts.push(spam.record(3, i as i64 + 1, &format!("{filler} status report {i:02}")));
    }
    for verdict in &verdicts[..19] {
        assert_eq!(*verdict, SpamVerdict::Clean);
    }
    match &verdicts[19] {
        SpamVerdict::Burst { count, message_ids } => {
            assert_eq!(*count, 20);
            assert_eq!(message_ids.len(), 20);
            assert!(message_ids.contains(&1) && message_ids.contains(&20));
        }
        other => panic!("expected burst, got {other:?}"),
    }
}

#[test]
fn test_short_repeat_trips_after_four_priors() {
    let spam = monitor();
    for i in 1..=4 {
        assert_eq!(spam.record(5, i, "spam"), SpamVerdict::Clean);
    }
    match spam.record(5, 5, "SPAM   ") {
        SpamVerdict::ShortRepeat { occurrences, message_ids } => {
            assert_eq!(occurrences, 5);
            assert_eq!(message_ids, vec![1, 2, 3, 4, 5]);
        }
        other => panic!("expected short repeat, got {other:?}"),
    }
}

#[test]
fn test_similar_repeat_trips_on_near_duplicates() {
    let spam = monitor();
    let variants = [
        "buy cheap followers at my site today",
        "buy cheap followers at my site today!",
        "buy cheap followers at my sites today",
        "buy cheap follewers at my site today",
        "buy cheap followers  at my site today",
    ];
    let mut last = SpamVerdict::Clean;
    for (i, content) in variants.iter().enumerate() {
        last = spam.record(9, i as i64 + 1, content);
    }
    match last {
        SpamVerdict::SimilarRepeat { similar, message_ids } => {
            assert_eq!(similar, 5);
            assert_eq!(message_ids.len(), 5);
        }
        other => panic!("expected similar repeat, got {other:?}"),
    }
}

#[test]
fn test_windows_are_per_user() {
    let spam = monitor();
    for i in 1..=4 {
        assert_eq!(spam.record(1, i, "hello"), SpamVerdict::Clean);
    }
    // a different user repeating the same text starts from a fresh window
    assert_eq!(spam.record(2, 10, "hello"), SpamVerdict::Clean);
}

#[test]
fn test_clear_resets_windows() {
    let spam = monitor();
    for i in 1..=4 {
        spam.record(6, i, "repeat me");
    }
    spam.clear(6);
    assert_eq!(spam.record(6, 5, "repeat me"), SpamVerdict::Clean);
}

#[test]
fn test_similarity_ratio_values() {
    assert_eq!(similarity_ratio("same text", "same text"), 1.0);
    // one substitution in a 25-char string: well above the 0.88 threshold
    let a = "buy cheap followers today";
    let b = "buy cheap follewers today";
    assert!(similarity_ratio(a, b) > 0.88);
    // unrelated strings score low
    assert!(similarity_ratio("completely different", "nothing alike here") < 0.5);
}
