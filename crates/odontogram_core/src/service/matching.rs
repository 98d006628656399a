//! Descriptor-to-instance matching for bulk reconciliation.
//!
//! # Invariants
//! - Only active instances of the same surface are candidates.
//! - A usable stable id wins over attribute equivalence.
//! - Both rules require the same catalog key.

use crate::model::diagnosis::{DiagnosisDescriptor, DiagnosisInstance};

/// Which rule matched an existing instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    StableId,
    Equivalence,
}

impl MatchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StableId => "stable_id",
            Self::Equivalence => "equivalence",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    /// Index into the candidate slice.
    Existing { index: usize, rule: MatchRule },
    New,
}

/// Resolves which existing instance, if any, `descriptor` refers to.
///
/// `existing` is the surface's current instance list; inactive entries are
/// skipped.
pub fn resolve_target(
    existing: &[DiagnosisInstance],
    descriptor: &DiagnosisDescriptor,
) -> MatchTarget {
    let catalog_key = descriptor.catalog_key.trim();
    let candidates = || {
        existing
            .iter()
            .enumerate()
            .filter(move |(_, instance)| instance.is_active && instance.catalog_key == catalog_key)
    };

    if let Some(stable_id) = descriptor.stable_id() {
        if let Some((index, _)) = candidates().find(|(_, instance)| instance.id == stable_id) {
            return MatchTarget::Existing {
                index,
                rule: MatchRule::StableId,
            };
        }
    }

    candidates()
        .find(|(_, instance)| instance.attributes == descriptor.attributes)
        .map_or(MatchTarget::New, |(index, _)| MatchTarget::Existing {
            index,
            rule: MatchRule::Equivalence,
        })
}

#[cfg(test)]
mod tests {
    use super::{resolve_target, MatchRule, MatchTarget};
    use crate::model::diagnosis::{DiagnosisDescriptor, DiagnosisInstance};
    use serde_json::json;
    use uuid::Uuid;

    fn instance(key: &str, icdas: i64) -> DiagnosisInstance {
        let descriptor = DiagnosisDescriptor::new(key).with_attribute("icdas", json!(icdas));
        DiagnosisInstance::from_descriptor(Uuid::new_v4(), &descriptor, Uuid::new_v4(), 1)
    }

    #[test]
    fn stable_id_takes_precedence_over_equivalent_attributes() {
        let equivalent = instance("caries", 3);
        let target = instance("caries", 5);
        let existing = vec![equivalent, target.clone()];

        let descriptor = DiagnosisDescriptor::new("caries")
            .with_id(target.id.to_string())
            .with_attribute("icdas", json!(3));

        assert_eq!(
            resolve_target(&existing, &descriptor),
            MatchTarget::Existing {
                index: 1,
                rule: MatchRule::StableId
            }
        );
    }

    #[test]
    fn placeholder_id_falls_back_to_equivalence() {
        let existing = vec![instance("caries", 3)];
        let descriptor = DiagnosisDescriptor::new("caries")
            .with_id("1718000000123")
            .with_attribute("icdas", json!(3));

        assert_eq!(
            resolve_target(&existing, &descriptor),
            MatchTarget::Existing {
                index: 0,
                rule: MatchRule::Equivalence
            }
        );
    }

    #[test]
    fn stable_id_with_other_catalog_key_does_not_match_by_id() {
        let other = instance("fractura", 3);
        let existing = vec![other.clone()];
        let descriptor = DiagnosisDescriptor::new("caries")
            .with_id(other.id.to_string())
            .with_attribute("icdas", json!(3));

        assert_eq!(resolve_target(&existing, &descriptor), MatchTarget::New);
    }

    #[test]
    fn inactive_and_differing_instances_are_ignored() {
        let mut deleted = instance("caries", 3);
        deleted.is_active = false;
        let different = instance("caries", 4);
        let existing = vec![deleted.clone(), different];

        let by_id = DiagnosisDescriptor::new("caries")
            .with_id(deleted.id.to_string())
            .with_attribute("icdas", json!(9));
        assert_eq!(resolve_target(&existing, &by_id), MatchTarget::New);

        let by_attrs = DiagnosisDescriptor::new("caries").with_attribute("icdas", json!(3));
        assert_eq!(resolve_target(&existing, &by_attrs), MatchTarget::New);
    }

    #[test]
    fn rule_names_are_stable_log_values() {
        assert_eq!(MatchRule::StableId.as_str(), "stable_id");
        assert_eq!(MatchRule::Equivalence.as_str(), "equivalence");
    }
}
