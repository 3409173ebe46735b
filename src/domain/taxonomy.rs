//! Program taxonomy
//!
//! Firms sell their rule sets as named programs, and the same program shows
//! up under many spellings (marketing names, abbreviations, hyphenation).
//! The taxonomy maps any externally observed string to the canonical
//! `program_id` the rule store is keyed by. Only the resolver and the review
//! path consult it; the monitor engine always sees resolved rules.

use std::collections::HashMap;

use crate::domain::presets::normalize_firm_name;

/// Programs and aliases for a single firm.
#[derive(Debug, Clone, Default)]
pub struct FirmTaxonomy {
    /// Canonical `program_id` -> official display name.
    pub official_programs: HashMap<String, String>,
    /// Observed alias -> canonical `program_id`.
    pub aliases: HashMap<String, String>,
}

/// Per-firm program taxonomy, keyed by normalized firm name.
#[derive(Debug, Clone, Default)]
pub struct ProgramTaxonomy {
    firms: HashMap<String, FirmTaxonomy>,
}

fn normalize(candidate: &str) -> String {
    candidate.trim().to_lowercase()
}

/// Strip separators so "stellar 1-step", "stellar_1step" and "stellar1step"
/// compare equal.
fn squash(candidate: &str) -> String {
    normalize(candidate)
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

impl ProgramTaxonomy {
    /// The built-in taxonomy for firms whose program lineups we track.
    pub fn builtin() -> Self {
        let mut firms = HashMap::new();

        let fundednext = FirmTaxonomy {
            official_programs: [
                ("stellar_1step", "Stellar 1-Step Challenge"),
                ("stellar_2step", "Stellar 2-Step Challenge"),
                ("evaluation_2step", "Evaluation Challenge"),
                ("stellar_lite", "Stellar Lite Challenge"),
                ("stellar_instant", "Stellar Instant Account"),
            ]
            .into_iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect(),
            aliases: [
                ("stellar", "stellar_1step"),
                ("stellar 1-step", "stellar_1step"),
                ("stellar 2-step", "stellar_2step"),
                ("1 step stellar", "stellar_1step"),
                ("2 step stellar", "stellar_2step"),
                ("evaluation", "evaluation_2step"),
                ("evaluation challenge", "evaluation_2step"),
                ("lite", "stellar_lite"),
                ("stellar lite", "stellar_lite"),
                ("instant", "stellar_instant"),
                ("stellar instant", "stellar_instant"),
                ("funded", "stellar_instant"),
            ]
            .into_iter()
            .map(|(a, id)| (a.to_string(), id.to_string()))
            .collect(),
        };
        firms.insert("fundednext".to_string(), fundednext);

        let ftmo = FirmTaxonomy {
            official_programs: [
                ("challenge", "FTMO Challenge"),
                ("verification", "FTMO Verification"),
                ("ftmo_account", "FTMO Account"),
            ]
            .into_iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect(),
            aliases: [
                ("ftmo challenge", "challenge"),
                ("funded account", "ftmo_account"),
            ]
            .into_iter()
            .map(|(a, id)| (a.to_string(), id.to_string()))
            .collect(),
        };
        firms.insert("ftmo".to_string(), ftmo);

        Self { firms }
    }

    pub fn firm(&self, firm: &str) -> Option<&FirmTaxonomy> {
        self.firms.get(&normalize_firm_name(firm))
    }

    /// Resolve any observed program string to its canonical `program_id`.
    ///
    /// Tries, in order: exact id, official display name, alias, and a
    /// separator-insensitive comparison of all three. Unknown firms and
    /// unmatched candidates return `None` — the candidate is passed through
    /// to the store untouched in that case, never invented.
    pub fn canonical_program_id(&self, firm: &str, candidate: &str) -> Option<String> {
        let taxonomy = self.firm(firm)?;
        let wanted = normalize(candidate);

        if taxonomy.official_programs.contains_key(&wanted) {
            return Some(wanted);
        }

        for (id, official_name) in &taxonomy.official_programs {
            if normalize(official_name) == wanted {
                return Some(id.clone());
            }
        }

        if let Some(id) = taxonomy.aliases.get(&wanted) {
            return Some(id.clone());
        }

        // Separator-insensitive fallback.
        let squashed = squash(candidate);
        for id in taxonomy.official_programs.keys() {
            if squash(id) == squashed {
                return Some(id.clone());
            }
        }
        for (id, official_name) in &taxonomy.official_programs {
            if squash(official_name) == squashed {
                return Some(id.clone());
            }
        }
        for (alias, id) in &taxonomy.aliases {
            if squash(alias) == squashed {
                return Some(id.clone());
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_program_ids_pass_through() {
        let taxonomy = ProgramTaxonomy::builtin();
        for id in [
            "stellar_1step",
            "stellar_2step",
            "evaluation_2step",
            "stellar_lite",
            "stellar_instant",
        ] {
            assert_eq!(
                taxonomy.canonical_program_id("FundedNext", id).as_deref(),
                Some(id)
            );
        }
    }

    #[test]
    fn official_names_map_to_ids() {
        let taxonomy = ProgramTaxonomy::builtin();
        assert_eq!(
            taxonomy
                .canonical_program_id("FundedNext", "Stellar 1-Step Challenge")
                .as_deref(),
            Some("stellar_1step")
        );
        assert_eq!(
            taxonomy
                .canonical_program_id("FundedNext", "Evaluation Challenge")
                .as_deref(),
            Some("evaluation_2step")
        );
    }

    #[test]
    fn aliases_resolve() {
        let taxonomy = ProgramTaxonomy::builtin();
        assert_eq!(
            taxonomy.canonical_program_id("FundedNext", "stellar").as_deref(),
            Some("stellar_1step")
        );
        assert_eq!(
            taxonomy.canonical_program_id("FundedNext", "lite").as_deref(),
            Some("stellar_lite")
        );
        assert_eq!(
            taxonomy.canonical_program_id("FundedNext", "funded").as_deref(),
            Some("stellar_instant")
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let taxonomy = ProgramTaxonomy::builtin();
        assert_eq!(
            taxonomy
                .canonical_program_id("FundedNext", "STELLAR_1STEP")
                .as_deref(),
            Some("stellar_1step")
        );
        assert_eq!(
            taxonomy
                .canonical_program_id("fundednext", "EVALUATION")
                .as_deref(),
            Some("evaluation_2step")
        );
    }

    #[test]
    fn separator_insensitive_fallback() {
        let taxonomy = ProgramTaxonomy::builtin();
        assert_eq!(
            taxonomy
                .canonical_program_id("FundedNext", "stellar1step")
                .as_deref(),
            Some("stellar_1step")
        );
        assert_eq!(
            taxonomy
                .canonical_program_id("FundedNext", "stellar-lite")
                .as_deref(),
            Some("stellar_lite")
        );
    }

    #[test]
    fn unknown_candidates_and_firms_return_none() {
        let taxonomy = ProgramTaxonomy::builtin();
        assert!(taxonomy
            .canonical_program_id("FundedNext", "fake program")
            .is_none());
        assert!(taxonomy
            .canonical_program_id("Unknown Firm", "stellar_1step")
            .is_none());
    }
}
