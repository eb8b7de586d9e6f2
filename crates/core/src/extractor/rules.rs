use std::path::Path;

use regex_lite::Regex;

use super::{EntityEntry, ExtractError, Extraction, NameExtractionRule};

const NAME_GROUP: &str = "name";

struct CompiledRule {
    id: String,
    regex: Regex,
}

/// Compiled, ordered rule set.
///
/// Every rule is compiled up front, disabled ones included, so a broken
/// pattern is reported when the scanner is configured rather than mid-scan.
pub struct NameExtractor {
    rules: Vec<CompiledRule>,
}

impl NameExtractor {
    pub fn new(rules: &[NameExtractionRule]) -> Result<Self, ExtractError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = Regex::new(&rule.pattern).map_err(|e| ExtractError::InvalidPattern {
                rule_id: rule.id.clone(),
                reason: e.to_string(),
            })?;
            if !regex.capture_names().flatten().any(|n| n == NAME_GROUP) {
                return Err(ExtractError::MissingNameGroup {
                    rule_id: rule.id.clone(),
                });
            }
            if rule.enabled {
                compiled.push(CompiledRule {
                    id: rule.id.clone(),
                    regex,
                });
            }
        }
        Ok(Self { rules: compiled })
    }

    /// Extractor with no rules; every name passes through unchanged.
    pub fn passthrough() -> Self {
        Self { rules: Vec::new() }
    }

    /// Apply the first enabled rule whose `name` group captures a non-blank value.
    pub fn extract(&self, base_name: &str) -> Extraction {
        for rule in &self.rules {
            let captured = rule
                .regex
                .captures(base_name)
                .and_then(|caps| caps.name(NAME_GROUP))
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty());
            if let Some(name) = captured {
                return Extraction {
                    name: name.to_string(),
                    matched_rule_id: Some(rule.id.clone()),
                };
            }
        }
        Extraction {
            name: base_name.to_string(),
            matched_rule_id: None,
        }
    }

    /// Build the scan candidate for a filesystem entry.
    pub fn entry_for(&self, path: &Path, is_dir: bool) -> EntityEntry {
        let original_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let original_base_name = base_name(&original_name, is_dir);
        let extraction = self.extract(&original_base_name);
        EntityEntry {
            path: path.to_path_buf(),
            original_name,
            original_base_name,
            extracted_name: extraction.name,
            matched_rule_id: extraction.matched_rule_id,
            is_dir,
        }
    }
}

/// File stem for files, the full name for directories.
pub fn base_name(name: &str, is_dir: bool) -> String {
    if is_dir {
        return name.to_string();
    }
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CIRCLE_RULE: &str = r"^\[.*?\]\s*(?<name>.+)";

    #[test]
    fn test_rule_strips_circle_prefix() {
        let extractor = NameExtractor::new(&[NameExtractionRule::new("circle", CIRCLE_RULE)]).unwrap();

        let hit = extractor.extract("[Circle] Foo");
        assert_eq!(hit.name, "Foo");
        assert_eq!(hit.matched_rule_id.as_deref(), Some("circle"));

        let miss = extractor.extract("Bar");
        assert_eq!(miss.name, "Bar");
        assert!(miss.matched_rule_id.is_none());
    }

    #[test]
    fn test_first_enabled_rule_wins() {
        let rules = vec![
            NameExtractionRule::new("disabled", r"^(?<name>.+)$").disabled(),
            NameExtractionRule::new("version", r"^(?<name>.+?)\s+v\d+").disabled(),
            NameExtractionRule::new("circle", CIRCLE_RULE),
            NameExtractionRule::new("fallback", r"^(?<name>.+)$"),
        ];
        let extractor = NameExtractor::new(&rules).unwrap();

        let hit = extractor.extract("[X] Game v2");
        assert_eq!(hit.matched_rule_id.as_deref(), Some("circle"));
        assert_eq!(hit.name, "Game v2");

        let plain = extractor.extract("Plain");
        assert_eq!(plain.matched_rule_id.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_blank_capture_falls_through() {
        let rules = vec![
            NameExtractionRule::new("blank", r"^\[(?<name>\s*)\]"),
            NameExtractionRule::new("circle", CIRCLE_RULE),
        ];
        let extractor = NameExtractor::new(&rules).unwrap();
        let hit = extractor.extract("[ ] Title");
        assert_eq!(hit.matched_rule_id.as_deref(), Some("circle"));
        assert_eq!(hit.name, "Title");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = NameExtractor::new(&[NameExtractionRule::new("bad", r"(?<name>[")]);
        assert!(matches!(
            result,
            Err(ExtractError::InvalidPattern { rule_id, .. }) if rule_id == "bad"
        ));
    }

    #[test]
    fn test_missing_name_group_rejected_even_when_disabled() {
        let result =
            NameExtractor::new(&[NameExtractionRule::new("nogroup", r"^(.+)$").disabled()]);
        assert_eq!(
            result.err(),
            Some(ExtractError::MissingNameGroup {
                rule_id: "nogroup".to_string()
            })
        );
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("Game.zip", false), "Game");
        assert_eq!(base_name("Game.v1.2", true), "Game.v1.2");
        assert_eq!(base_name("README", false), "README");
    }

    #[test]
    fn test_entry_for_file() {
        let extractor = NameExtractor::new(&[NameExtractionRule::new("circle", CIRCLE_RULE)]).unwrap();
        let entry = extractor.entry_for(Path::new("/games/[Circle] Foo.zip"), false);
        assert_eq!(entry.original_name, "[Circle] Foo.zip");
        assert_eq!(entry.original_base_name, "[Circle] Foo");
        assert_eq!(entry.extracted_name, "Foo");
        assert!(!entry.is_dir);
    }
}
