//! Hierarchical field dependencies.
//!
//! The portal's geographic fields form a hierarchy: once a broader field is
//! set to "all values", narrower ones are redundant and the portal may hide
//! or disable them. The table is static; the decision is a pure function of
//! it and the run-so-far history.

use crate::types::ConfiguredField;

#[derive(Debug, Clone, Copy)]
pub struct DependencyRule {
    pub field: &'static str,
    pub prerequisites: &'static [&'static str],
}

pub const FIELD_DEPENDENCIES: &[DependencyRule] = &[
    DependencyRule {
        field: "UF",
        prerequisites: &["Região"],
    },
    DependencyRule {
        field: "Município",
        prerequisites: &["Região", "UF"],
    },
];

/// Displayed labels sometimes carry a leading `.` marker and stray
/// whitespace; matching happens on the stripped form.
pub fn normalize_label(label: &str) -> &str {
    label.trim_start_matches(['.', ' ']).trim()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDecision {
    pub skip: bool,
    pub reason: Option<String>,
}

impl SkipDecision {
    fn keep() -> Self {
        Self {
            skip: false,
            reason: None,
        }
    }
}

/// Skip iff any prerequisite of this field is already configured with
/// "all values". Matching is by label containment because displayed labels
/// carry prefixes and suffixes; prerequisites are an OR condition and the
/// first satisfied one names the skip reason.
pub fn should_skip(label: &str, configured: &[ConfiguredField]) -> SkipDecision {
    let normalized = normalize_label(label);
    let Some(rule) = FIELD_DEPENDENCIES
        .iter()
        .find(|rule| normalized.contains(rule.field))
    else {
        return SkipDecision::keep();
    };

    for prerequisite in rule.prerequisites {
        let satisfied = configured.iter().any(|entry| {
            entry.has_all_values
                && (entry.label.contains(prerequisite)
                    || normalize_label(&entry.label) == *prerequisite)
        });
        if satisfied {
            return SkipDecision {
                skip: true,
                reason: Some(format!(
                    "{prerequisite} já está configurado com \"Todos os Valores\""
                )),
            };
        }
    }
    SkipDecision::keep()
}

/// Position of a field in the dependency hierarchy: 0 for independent
/// fields, 1 + the deepest prerequisite otherwise. Processing fields in
/// ascending rank guarantees a dependent field is never configured before
/// its prerequisites have been attempted, whatever order discovery found
/// them in.
pub fn dependency_rank(label: &str) -> usize {
    let normalized = normalize_label(label);
    let Some(rule) = FIELD_DEPENDENCIES
        .iter()
        .find(|rule| normalized.contains(rule.field))
    else {
        return 0;
    };
    1 + rule
        .prerequisites
        .iter()
        .map(|prerequisite| dependency_rank(prerequisite))
        .max()
        .unwrap_or(0)
}

/// Whether other fields depend on this one. Used to decide when a re-scan
/// of the field set is warranted.
pub fn is_prerequisite(label: &str) -> bool {
    let normalized = normalize_label(label);
    FIELD_DEPENDENCIES.iter().any(|rule| {
        rule.prerequisites
            .iter()
            .any(|prerequisite| normalized.contains(prerequisite))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(label: &str, has_all_values: bool) -> ConfiguredField {
        ConfiguredField {
            label: label.to_string(),
            has_all_values,
        }
    }

    #[test]
    fn field_without_rule_is_never_skipped() {
        let history = vec![configured("Região", true)];
        let decision = should_skip("Situação Funcionamento", &history);
        assert!(!decision.skip);
        assert!(decision.reason.is_none());
    }

    #[test]
    fn skip_requires_all_values_not_mere_presence() {
        let history = vec![configured("Região", false)];
        assert!(!should_skip("UF", &history).skip);

        let history = vec![configured("Região", true)];
        assert!(should_skip("UF", &history).skip);
    }

    #[test]
    fn empty_history_never_skips() {
        assert!(!should_skip("UF", &[]).skip);
        assert!(!should_skip("Município", &[]).skip);
    }

    #[test]
    fn any_satisfied_prerequisite_is_enough() {
        // Município depends on Região OR UF.
        let history = vec![configured("UF", true)];
        let decision = should_skip("Município", &history);
        assert!(decision.skip);
        assert!(decision.reason.as_deref().unwrap_or("").contains("UF"));

        let history = vec![configured("Região", true)];
        assert!(should_skip("Município", &history).skip);
    }

    #[test]
    fn first_satisfied_prerequisite_names_the_reason() {
        let history = vec![configured("Região", true), configured("UF", true)];
        let decision = should_skip("Município", &history);
        assert!(decision.skip);
        assert!(decision.reason.as_deref().unwrap_or("").contains("Região"));
    }

    #[test]
    fn matching_tolerates_label_decorations() {
        // Leading marker on the field being decided.
        let history = vec![configured("Região", true)];
        assert!(should_skip(". UF", &history).skip);

        // Decorated history entries still match by containment.
        let history = vec![configured(". Região Geográfica", true)];
        assert!(should_skip("UF", &history).skip);
    }

    #[test]
    fn normalize_label_strips_leading_marker() {
        assert_eq!(normalize_label(". Município"), "Município");
        assert_eq!(normalize_label("UF "), "UF");
        assert_eq!(normalize_label("Região"), "Região");
    }

    #[test]
    fn ranks_follow_the_hierarchy() {
        assert_eq!(dependency_rank("Região"), 0);
        assert_eq!(dependency_rank("Situação Funcionamento"), 0);
        assert_eq!(dependency_rank(". UF"), 1);
        assert_eq!(dependency_rank("Município"), 2);
    }

    #[test]
    fn prerequisite_detection() {
        assert!(is_prerequisite("Região"));
        assert!(is_prerequisite(". UF"));
        assert!(!is_prerequisite("Município"));
        assert!(!is_prerequisite("Localização"));
    }
}
