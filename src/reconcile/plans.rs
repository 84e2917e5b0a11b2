//! Plan table and amount matching
//!
//! The plan table is ordered configuration mapping plan names to prices in
//! minor currency units. Matching a transaction amount to a plan is a pure
//! function over that table, testable in isolation from the gateway:
//! exact price match first, otherwise the nearest plan by absolute amount
//! difference. Matching never fails — every transaction maps to some plan.

use serde::{Deserialize, Serialize};

/// One purchasable key plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan name, recorded on granted bundles
    pub name: String,

    /// Price in minor currency units
    ///
    /// Matching compares minor units against minor units; conversion to
    /// major units happens only for display and audit.
    pub price_minor: i64,

    /// Keys the plan grants
    pub keys: u32,
}

/// Ordered table of purchasable plans
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTable {
    plans: Vec<Plan>,
}

impl PlanTable {
    /// Build a table from ordered plan configuration
    ///
    /// # Errors
    ///
    /// Returns a message if the table is empty, a plan grants zero keys, or
    /// a plan's price is not positive.
    pub fn new(plans: Vec<Plan>) -> Result<Self, String> {
        if plans.is_empty() {
            return Err("plan table must contain at least one plan".to_string());
        }
        for plan in &plans {
            if plan.keys == 0 {
                return Err(format!("plan {} grants zero keys", plan.name));
            }
            if plan.price_minor <= 0 {
                return Err(format!(
                    "plan {} has non-positive price {}",
                    plan.name, plan.price_minor
                ));
            }
        }
        Ok(PlanTable { plans })
    }

    /// Match a transaction amount to a plan
    ///
    /// Exact price match wins; otherwise the plan with the smallest absolute
    /// difference to the amount. A tie resolves to the plan listed first in
    /// the table. Returns `None` only for an empty table, which the
    /// constructor rules out.
    pub fn match_amount(&self, amount_minor: i64) -> Option<&Plan> {
        if let Some(exact) = self.plans.iter().find(|p| p.price_minor == amount_minor) {
            return Some(exact);
        }
        // min_by_key keeps the first of equally-near plans
        self.plans
            .iter()
            .min_by_key(|p| (p.price_minor - amount_minor).abs())
    }

    /// Iterate the plans in table order
    pub fn iter(&self) -> impl Iterator<Item = &Plan> {
        self.plans.iter()
    }
}
