//! Rule files on disk.

use std::io::Write;

use hygiene_core::{CleanlinessRules, DomainError};
use tempfile::NamedTempFile;

fn rule_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn load_premium_dealer_rules() {
    let file = rule_file(
        r#"
        # premium showroom standard
        confidence_threshold = 90.0
        max_negative_labels = 0
        review_on_low_confidence = true
        negative_vocabulary = ["Dirt", "Dust", "Fingerprint", "Smudge"]
        "#,
    );

    let rules = CleanlinessRules::load(file.path()).unwrap();

    assert_eq!(rules.confidence_threshold(), 90.0);
    assert_eq!(rules.negative_vocabulary().len(), 4);
    assert!(rules.is_negative("Smudged Glass"));
    assert!(!rules.is_negative("Trash"));
}

#[test]
fn empty_file_yields_defaults() {
    let file = rule_file("");
    assert_eq!(
        CleanlinessRules::load(file.path()).unwrap(),
        CleanlinessRules::default()
    );
}

#[test]
fn malformed_file_is_invalid_rules() {
    let file = rule_file("confidence_threshold = \"high\"");
    assert!(matches!(
        CleanlinessRules::load(file.path()),
        Err(DomainError::InvalidRules(_))
    ));
}

#[test]
fn rendered_rules_load_back() {
    let rules = CleanlinessRules::default()
        .with_review_on_low_confidence(false)
        .with_max_negative_labels(1);
    let file = rule_file(&rules.to_toml_string().unwrap());
    assert_eq!(CleanlinessRules::load(file.path()).unwrap(), rules);
}
