//! SQLite rule store
//!
//! Read-only access to the extraction pipeline's database: `prop_firm` rows
//! name the firms, `firm_rule` rows carry one extracted rule each. Hard
//! numeric rows for a program fold into a `PropRules`; soft rows surface as
//! advisory insights on the review path.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::domain::rules::PropRules;
use crate::ports::rule_store::{RuleStorePort, SoftRuleInsight, StoreError};

pub struct SqliteRuleStore {
    pool: SqlitePool,
}

impl SqliteRuleStore {
    /// Open an existing rules database. The file must already exist; this
    /// process never creates or migrates the store.
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("opening {path}: {e}")))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool; used by tests that build an in-memory store.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn firm_id(&self, firm: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM prop_firm WHERE name = ?1 COLLATE NOCASE")
            .bind(firm)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("firm lookup: {e}")))?;
        Ok(row.map(|r| r.get::<i64, _>("id")))
    }
}

/// Fold extracted hard-limit rows into a rules value. Returns `None` when
/// the extraction is too incomplete to monitor against (both drawdown
/// limits are required).
fn fold_hard_rules(
    firm: &str,
    program_id: &str,
    rows: &[(String, Option<f64>)],
) -> Option<PropRules> {
    let numeric = |rule_type: &str| -> Option<f64> {
        rows.iter()
            .find(|(t, _)| t == rule_type)
            .and_then(|(_, v)| *v)
    };
    let flag = |rule_type: &str| -> bool { numeric(rule_type).map(|v| v != 0.0).unwrap_or(false) };

    let max_daily_drawdown_pct = numeric("max_daily_drawdown")?;
    let max_total_drawdown_pct = numeric("max_total_drawdown")?;

    Some(PropRules {
        name: format!("{firm} - {program_id}"),
        program_id: Some(program_id.to_string()),
        max_daily_drawdown_pct,
        max_total_drawdown_pct,
        max_risk_per_trade_pct: numeric("max_risk_per_trade").unwrap_or(0.0),
        max_open_lots: numeric("max_open_lots").unwrap_or(0.0),
        max_positions: numeric("max_positions").unwrap_or(0.0) as usize,
        margin_warn_level_pct: numeric("margin_warn_level").unwrap_or(100.0),
        margin_critical_level_pct: numeric("margin_critical_level").unwrap_or(50.0),
        trading_days_only: flag("trading_days_only"),
        require_stop_loss: flag("require_stop_loss"),
        max_leverage: numeric("max_leverage"),
        warn_buffer_pct: 0.8,
    })
}

#[async_trait]
impl RuleStorePort for SqliteRuleStore {
    async fn lookup_rules(
        &self,
        firm: &str,
        program_id: &str,
    ) -> Result<Option<PropRules>, StoreError> {
        let Some(firm_id) = self.firm_id(firm).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT rule_type, numeric_value
            FROM firm_rule
            WHERE firm_id = ?1
              AND challenge_type = ?2
              AND rule_category = 'hard_limit'
            ORDER BY extracted_at DESC
            "#,
        )
        .bind(firm_id)
        .bind(program_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Query(format!("rule lookup: {e}")))?;

        let rows: Vec<(String, Option<f64>)> = rows
            .iter()
            .map(|r| (r.get::<String, _>("rule_type"), r.get::<Option<f64>, _>("numeric_value")))
            .collect();

        Ok(fold_hard_rules(firm, program_id, &rows))
    }

    async fn soft_rules(
        &self,
        firm: &str,
        program_id: Option<&str>,
    ) -> Result<Vec<SoftRuleInsight>, StoreError> {
        let Some(firm_id) = self.firm_id(firm).await? else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            r#"
            SELECT rule_type, details, challenge_type, severity,
                   extraction_method, confidence_score, conditions
            FROM firm_rule
            WHERE firm_id = ?1
              AND (rule_category = 'soft_rule' OR severity = 'optional')
            "#,
        );
        if program_id.is_some() {
            sql.push_str(" AND challenge_type = ?2");
        }
        sql.push_str(" ORDER BY extracted_at DESC");

        let mut query = sqlx::query(&sql).bind(firm_id);
        if let Some(program) = program_id {
            query = query.bind(program);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("soft rule lookup: {e}")))?;

        Ok(rows
            .iter()
            .map(|r| SoftRuleInsight {
                rule_type: r.get("rule_type"),
                description: r.get::<Option<String>, _>("details").unwrap_or_default(),
                challenge_type: r.get("challenge_type"),
                severity: r.get("severity"),
                extraction_method: r.get("extraction_method"),
                confidence_score: r.get("confidence_score"),
                conditions: r.get("conditions"),
            })
            .collect())
    }
}
