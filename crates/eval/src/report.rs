//! Run report: totals, per-category subtotals and the price tier.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::EvalError;
use crate::numeric;
use crate::pricing::{Category, CostLineItem};

// ──────────────────────────────────────────────
// Tiers
// ──────────────────────────────────────────────

/// One row of the tier table. Amounts strictly below `below` fall in this
/// tier; the final row has no bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBoundary {
    #[serde(default)]
    pub below: Option<Decimal>,
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierTable(pub Vec<TierBoundary>);

impl Default for TierTable {
    fn default() -> Self {
        let tier = |below: Option<i64>, name: &str, label: &str| TierBoundary {
            below: below.map(Decimal::from),
            name: name.to_string(),
            label: label.to_string(),
        };
        TierTable(vec![
            tier(Some(10_000), "low", "Tier 1"),
            tier(Some(50_000), "mid", "Tier 2"),
            tier(None, "high", "Tier 3"),
        ])
    }
}

impl TierTable {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (last, inner) = self.0.split_last().ok_or(ConfigError::EmptyTierTable)?;
        if last.below.is_some() {
            return Err(ConfigError::BoundedFinalTier {
                name: last.name.clone(),
            });
        }
        let mut previous: Option<Decimal> = None;
        for tier in inner {
            let bound = tier.below.ok_or_else(|| ConfigError::UnboundedInnerTier {
                name: tier.name.clone(),
            })?;
            if previous.is_some_and(|p| bound <= p) {
                return Err(ConfigError::UnorderedTiers {
                    name: tier.name.clone(),
                });
            }
            previous = Some(bound);
        }
        Ok(())
    }

    /// First tier whose bound exceeds `amount`. `None` only for a table
    /// that fails [`TierTable::validate`].
    pub fn classify(&self, amount: Decimal) -> Option<TierAssignment> {
        self.0
            .iter()
            .find(|t| t.below.map_or(true, |b| amount < b))
            .map(|t| TierAssignment {
                name: t.name.clone(),
                label: t.label.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierAssignment {
    pub name: String,
    pub label: String,
}

// ──────────────────────────────────────────────
// Report
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricingReport {
    pub run_id: String,
    pub total_min: Decimal,
    pub total_max: Decimal,
    pub tier: TierAssignment,
    pub by_category: BTreeMap<Category, CategoryTotals>,
    pub items: Vec<CostLineItem>,
}

/// Sum the run's line items and classify `total_max`.
pub fn build_report(
    run_id: &str,
    items: Vec<CostLineItem>,
    tiers: &TierTable,
) -> Result<PricingReport, EvalError> {
    if items.is_empty() {
        return Err(EvalError::NoPricingCalculated {
            run_id: run_id.to_string(),
        });
    }

    let mut total_min = Decimal::ZERO;
    let mut total_max = Decimal::ZERO;
    let mut by_category: BTreeMap<Category, CategoryTotals> = BTreeMap::new();
    for item in &items {
        total_min = numeric::checked_add(total_min, item.min_cost)?;
        total_max = numeric::checked_add(total_max, item.max_cost)?;
        let entry = by_category.entry(item.category).or_default();
        entry.min = numeric::checked_add(entry.min, item.min_cost)?;
        entry.max = numeric::checked_add(entry.max, item.max_cost)?;
    }

    let tier = tiers
        .classify(total_max)
        .ok_or_else(|| EvalError::malformed("tier table has no tier for the report total"))?;

    Ok(PricingReport {
        run_id: run_id.to_string(),
        total_min,
        total_max,
        tier,
        by_category,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(node_id: i64, category: Category, min: i64, max: i64) -> CostLineItem {
        CostLineItem {
            run_id: "run".into(),
            node_id,
            category,
            label: format!("item {}", node_id),
            min_cost: Decimal::from(min),
            max_cost: Decimal::from(max),
            explanation: String::new(),
            applied_facts: BTreeMap::new(),
        }
    }

    #[test]
    fn totals_two_items() {
        let report = build_report(
            "run",
            vec![item(1, Category::Labor, 100, 200), item(2, Category::Labor, 50, 80)],
            &TierTable::default(),
        )
        .unwrap();
        assert_eq!(report.total_min, Decimal::from(150));
        assert_eq!(report.total_max, Decimal::from(280));
        assert_eq!(report.tier.name, "low");
        assert_eq!(report.by_category[&Category::Labor].max, Decimal::from(280));
        assert_eq!(report.items.len(), 2);
    }

    #[test]
    fn empty_run_has_no_report() {
        assert_eq!(
            build_report("r9", vec![], &TierTable::default()).unwrap_err(),
            EvalError::NoPricingCalculated { run_id: "r9".into() }
        );
    }

    #[test]
    fn tier_boundaries_are_exclusive() {
        let tiers = TierTable::default();
        let name = |n: i64| tiers.classify(Decimal::from(n)).unwrap().name;
        assert_eq!(name(9_999), "low");
        assert_eq!(name(10_000), "mid");
        assert_eq!(name(49_999), "mid");
        assert_eq!(name(50_000), "high");
        assert_eq!(name(5_000_000), "high");
    }

    #[test]
    fn categories_are_split() {
        let report = build_report(
            "run",
            vec![
                item(1, Category::Materials, 1_000, 2_000),
                item(2, Category::Permits, 100, 100),
                item(3, Category::Materials, 20_000, 60_000),
            ],
            &TierTable::default(),
        )
        .unwrap();
        assert_eq!(report.by_category.len(), 2);
        assert_eq!(
            report.by_category[&Category::Materials],
            CategoryTotals {
                min: Decimal::from(21_000),
                max: Decimal::from(62_000)
            }
        );
        assert_eq!(report.tier.label, "Tier 3");
    }

    #[test]
    fn table_validation() {
        assert!(TierTable::default().validate().is_ok());
        assert_eq!(TierTable(vec![]).validate(), Err(ConfigError::EmptyTierTable));

        let mut bounded = TierTable::default();
        bounded.0[2].below = Some(Decimal::from(90_000));
        assert!(matches!(bounded.validate(), Err(ConfigError::BoundedFinalTier { .. })));

        let mut unordered = TierTable::default();
        unordered.0[1].below = Some(Decimal::from(5_000));
        assert_eq!(
            unordered.validate(),
            Err(ConfigError::UnorderedTiers { name: "mid".into() })
        );

        let mut gap = TierTable::default();
        gap.0[0].below = None;
        assert!(matches!(gap.validate(), Err(ConfigError::UnboundedInnerTier { .. })));
    }

    #[test]
    fn tiers_deserialize_from_rows() {
        let table: TierTable = serde_json::from_value(serde_json::json!([
            { "below": "500", "name": "small", "label": "S" },
            { "name": "large", "label": "L" }
        ]))
        .unwrap();
        assert!(table.validate().is_ok());
        assert_eq!(table.classify(Decimal::from(499)).unwrap().label, "S");
    }
}
