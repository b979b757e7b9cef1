//! Owner classification from the recorded owner name

use crate::models::OwnerType;

pub trait OwnerClassifier: Send + Sync {
    fn classify(&self, owner_name: Option<&str>) -> OwnerType;
}

/// Ordered keyword rules; the first matching rule wins
///
/// Keywords match whole words (or whole word sequences) after case folding
/// and punctuation removal, so "Inc." matches `inc` but "Vincent" does not.
#[derive(Debug, Clone)]
pub struct KeywordOwnerClassifier {
    rules: Vec<(OwnerType, Vec<String>)>,
}

impl Default for KeywordOwnerClassifier {
    fn default() -> Self {
        Self::new(vec![
            (
                OwnerType::Business,
                vec!["llc", "inc", "corp", "trust", "properties"],
            ),
            (
                OwnerType::Government,
                vec!["city of", "county", "state of", "department"],
            ),
        ])
    }
}

impl KeywordOwnerClassifier {
    pub fn new(rules: Vec<(OwnerType, Vec<&str>)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(owner_type, keywords)| {
                    (owner_type, keywords.into_iter().map(normalize).collect())
                })
                .collect(),
        }
    }
}

/// Lowercase, punctuation to spaces, single-spaced, padded with one space each side
fn normalize(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

impl OwnerClassifier for KeywordOwnerClassifier {
    fn classify(&self, owner_name: Option<&str>) -> OwnerType {
        let Some(name) = owner_name.map(normalize) else {
            return OwnerType::Individual;
        };
        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| name.contains(k.as_str())))
            .map(|(owner_type, _)| *owner_type)
            .unwrap_or(OwnerType::Individual)
    }
}
