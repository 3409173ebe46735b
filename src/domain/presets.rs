//! Preset registry
//!
//! Compiled-in rule sets for well-known prop firms, keyed by normalized firm
//! name with an alias table for the spellings that show up in the wild. The
//! registry is assembled once in `main` and shared read-only; it is the
//! middle tier of rule-source resolution.

use std::collections::HashMap;

use crate::domain::rules::PropRules;

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_firm_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Immutable map of firm name -> preset rules.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    presets: HashMap<String, PropRules>,
    aliases: HashMap<String, String>,
}

impl PresetRegistry {
    /// The built-in firm presets.
    pub fn builtin() -> Self {
        let mut presets = HashMap::new();

        presets.insert(
            "ftmo".to_string(),
            PropRules {
                name: "FTMO Challenge".to_string(),
                program_id: None,
                max_daily_drawdown_pct: 5.0,
                max_total_drawdown_pct: 10.0,
                max_risk_per_trade_pct: 1.0,
                max_open_lots: 10.0,
                max_positions: 10,
                margin_warn_level_pct: 100.0,
                margin_critical_level_pct: 50.0,
                trading_days_only: false,
                require_stop_loss: false,
                max_leverage: Some(100.0),
                warn_buffer_pct: 0.8,
            },
        );

        presets.insert(
            "fundednext".to_string(),
            PropRules {
                name: "FundedNext Evaluation".to_string(),
                program_id: Some("evaluation_2step".to_string()),
                max_daily_drawdown_pct: 5.0,
                max_total_drawdown_pct: 10.0,
                max_risk_per_trade_pct: 1.0,
                max_open_lots: 10.0,
                max_positions: 10,
                margin_warn_level_pct: 100.0,
                margin_critical_level_pct: 50.0,
                trading_days_only: true,
                require_stop_loss: false,
                max_leverage: None,
                warn_buffer_pct: 0.8,
            },
        );

        presets.insert(
            "myforexfunds".to_string(),
            PropRules {
                name: "MyForexFunds Evaluation".to_string(),
                program_id: None,
                max_daily_drawdown_pct: 5.0,
                max_total_drawdown_pct: 12.0,
                max_risk_per_trade_pct: 2.0,
                max_open_lots: 20.0,
                max_positions: 15,
                margin_warn_level_pct: 100.0,
                margin_critical_level_pct: 50.0,
                trading_days_only: false,
                require_stop_loss: false,
                max_leverage: None,
                warn_buffer_pct: 0.8,
            },
        );

        presets.insert(
            "the5ers".to_string(),
            PropRules {
                name: "The5ers Bootcamp".to_string(),
                program_id: None,
                max_daily_drawdown_pct: 3.0,
                max_total_drawdown_pct: 6.0,
                max_risk_per_trade_pct: 0.5,
                max_open_lots: 5.0,
                max_positions: 5,
                margin_warn_level_pct: 100.0,
                margin_critical_level_pct: 50.0,
                trading_days_only: false,
                require_stop_loss: true,
                max_leverage: Some(30.0),
                warn_buffer_pct: 0.75,
            },
        );

        presets.insert(
            "e8markets".to_string(),
            PropRules {
                name: "E8 Markets Evaluation".to_string(),
                program_id: None,
                max_daily_drawdown_pct: 5.0,
                max_total_drawdown_pct: 8.0,
                max_risk_per_trade_pct: 1.0,
                max_open_lots: 15.0,
                max_positions: 12,
                margin_warn_level_pct: 100.0,
                margin_critical_level_pct: 50.0,
                trading_days_only: false,
                require_stop_loss: false,
                max_leverage: None,
                warn_buffer_pct: 0.8,
            },
        );

        let aliases = [
            ("funded next", "fundednext"),
            ("mff", "myforexfunds"),
            ("my forex funds", "myforexfunds"),
            ("5ers", "the5ers"),
            ("the 5ers", "the5ers"),
            ("e8", "e8markets"),
            ("e8 funding", "e8markets"),
            ("e8 markets", "e8markets"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();

        Self { presets, aliases }
    }

    /// Look up a preset by firm name or alias, case-insensitively.
    pub fn lookup(&self, firm: &str) -> Option<&PropRules> {
        let key = normalize_firm_name(firm);
        if let Some(rules) = self.presets.get(&key) {
            return Some(rules);
        }
        self.aliases
            .get(&key)
            .and_then(|canonical| self.presets.get(canonical))
    }

    /// Firm names with a preset, sorted for display.
    pub fn firm_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_spaces() {
        assert_eq!(normalize_firm_name("  FTMO  "), "ftmo");
        assert_eq!(normalize_firm_name("My   Forex\tFunds"), "my forex funds");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = PresetRegistry::builtin();
        assert!(registry.lookup("FTMO").is_some());
        assert!(registry.lookup("ftmo").is_some());
        assert!(registry.lookup("FundedNext").is_some());
    }

    #[test]
    fn aliases_resolve_to_canonical_preset() {
        let registry = PresetRegistry::builtin();
        let via_alias = registry.lookup("My Forex Funds").unwrap();
        let direct = registry.lookup("myforexfunds").unwrap();
        assert_eq!(via_alias.name, direct.name);

        assert_eq!(registry.lookup("E8").unwrap().name, "E8 Markets Evaluation");
    }

    #[test]
    fn unknown_firm_misses() {
        let registry = PresetRegistry::builtin();
        assert!(registry.lookup("Definitely Not A Firm").is_none());
    }

    #[test]
    fn all_presets_validate() {
        let registry = PresetRegistry::builtin();
        for firm in registry.firm_names() {
            registry.lookup(firm).unwrap().validate().unwrap();
        }
    }
}
