//! Domain Layer - Core compliance logic for the Guardian monitor
//!
//! This module contains pure domain types and logic with no external
//! dependencies. All platform and storage interactions happen through the
//! ports layer.

pub mod anchor;
pub mod evaluator;
pub mod presets;
pub mod rules;
pub mod snapshot;
pub mod taxonomy;

pub use anchor::{DayAnchor, DayStartAnchored};
pub use evaluator::evaluate;
pub use presets::{normalize_firm_name, PresetRegistry};
pub use rules::{BreachCode, BreachLevel, PropRules, RuleBreach, RulesError};
pub use snapshot::{AccountSnapshot, Platform, Position, Side};
pub use taxonomy::{FirmTaxonomy, ProgramTaxonomy};
