//! Rule-source resolution
//!
//! Three tiers, strict order, first success wins: the rule store (only when
//! a program id is known), the compiled-in preset registry, then an explicit
//! inline rules value. A rules set always comes from a single tier; the
//! winning tier is recorded so operators can audit where an account's rules
//! came from.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::domain::presets::PresetRegistry;
use crate::domain::rules::{PropRules, RulesError};
use crate::domain::taxonomy::ProgramTaxonomy;
use crate::ports::rule_store::RuleStorePort;

/// Which tier produced a resolved rules value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSource {
    Db,
    Preset,
    Custom,
}

impl std::fmt::Display for RuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSource::Db => write!(f, "db"),
            RuleSource::Preset => write!(f, "preset"),
            RuleSource::Custom => write!(f, "custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRules {
    pub rules: PropRules,
    pub source: RuleSource,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No rule source available for firm '{firm}' (program: {program_id:?})")]
    RuleSourceUnavailable {
        firm: String,
        program_id: Option<String>,
    },

    #[error(transparent)]
    Invalid(#[from] RulesError),
}

/// Resolves `(firm, program_id, custom)` to a validated rules value.
#[derive(Clone)]
pub struct RuleResolver {
    store: Option<Arc<dyn RuleStorePort>>,
    presets: Arc<PresetRegistry>,
    taxonomy: Arc<ProgramTaxonomy>,
}

impl RuleResolver {
    pub fn new(
        store: Option<Arc<dyn RuleStorePort>>,
        presets: Arc<PresetRegistry>,
        taxonomy: Arc<ProgramTaxonomy>,
    ) -> Self {
        Self {
            store,
            presets,
            taxonomy,
        }
    }

    /// Resolve rules for an account. Store misses and store errors both fall
    /// through to the next tier; only an all-tier miss is an error.
    pub async fn resolve(
        &self,
        firm: &str,
        program_id: Option<&str>,
        custom: Option<&PropRules>,
    ) -> Result<ResolvedRules, ResolveError> {
        if let Some(rules) = self.try_store(firm, program_id).await {
            return Ok(ResolvedRules {
                rules,
                source: RuleSource::Db,
            });
        }

        if let Some(rules) = self.presets.lookup(firm) {
            return Ok(ResolvedRules {
                rules: rules.clone(),
                source: RuleSource::Preset,
            });
        }

        if let Some(rules) = custom {
            rules.validate()?;
            return Ok(ResolvedRules {
                rules: rules.clone(),
                source: RuleSource::Custom,
            });
        }

        Err(ResolveError::RuleSourceUnavailable {
            firm: firm.to_string(),
            program_id: program_id.map(str::to_string),
        })
    }

    /// DB tier. Any failure is a miss: a broken store must never take the
    /// monitor down when a preset or custom rules can cover the account.
    async fn try_store(&self, firm: &str, program_id: Option<&str>) -> Option<PropRules> {
        let store = self.store.as_ref()?;
        let raw_program = program_id?;

        // Canonicalize observed program strings ("stellar 1-step") to the id
        // the store is keyed by; unknown strings pass through untouched.
        let program = self
            .taxonomy
            .canonical_program_id(firm, raw_program)
            .unwrap_or_else(|| raw_program.to_string());

        match store.lookup_rules(firm, &program).await {
            Ok(Some(rules)) => match rules.validate() {
                Ok(()) => Some(rules),
                Err(e) => {
                    tracing::warn!(firm, program = %program, error = %e, "store returned invalid rules; trying next tier");
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(firm, program = %program, "no rules in store; trying next tier");
                None
            }
            Err(e) => {
                tracing::warn!(firm, program = %program, error = %e, "rule store lookup failed; trying next tier");
                None
            }
        }
    }
}
