//! Rule store port
//!
//! Read-only access to the extracted-rules database. The store is the first
//! tier of rule-source resolution and the source of soft-rule guidance for
//! the review API. Store failures never propagate past the resolver: a
//! broken store is a tier miss, not an outage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::rules::PropRules;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Rule store unavailable: {0}")]
    Unavailable(String),

    #[error("Rule store query failed: {0}")]
    Query(String),
}

/// Advisory guidance extracted from a firm's help center that does not map
/// onto a numeric limit (news-trading windows, consistency rules, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftRuleInsight {
    pub rule_type: String,
    pub description: String,
    #[serde(default)]
    pub challenge_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    /// How the rule was extracted (pattern match, LLM, ...).
    #[serde(default)]
    pub extraction_method: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    /// Free-text conditions under which the rule applies.
    #[serde(default)]
    pub conditions: Option<String>,
}

#[async_trait]
pub trait RuleStorePort: Send + Sync {
    /// Rules for `(firm, program_id)`. `Ok(None)` is an ordinary miss.
    async fn lookup_rules(
        &self,
        firm: &str,
        program_id: &str,
    ) -> Result<Option<PropRules>, StoreError>;

    /// Soft-rule guidance for a firm, optionally narrowed to one program.
    async fn soft_rules(
        &self,
        firm: &str,
        program_id: Option<&str>,
    ) -> Result<Vec<SoftRuleInsight>, StoreError>;
}
