// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reserved-capacity and tiered-overage accounting, computed at query time
//! from the authoritative usage counters.

use serde::Serialize;
use signet_config::{OverageTier, ReservedCapacity};

/// The share of an overage attributable to one tier, priced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCharge {
    /// Overage units at which the tier begins.
    pub threshold: u64,
    /// Units that landed in this tier.
    pub units: u64,
    /// Price per unit in this tier.
    pub price: f64,
    /// `units × price`.
    pub charge: f64,
    /// Billing item the charge rolls up into.
    pub billing_item: Option<String>,
}

/// Split an overage across ordered tiers.
///
/// With usage `u`, reserved `R`, and tiers `[(t₁, p₁), (t₂, p₂), …]`: the
/// overage is `O = max(0, u − R)`, tier `k` receives
/// `max(0, min(O, t_{k+1}) − t_k)` with the final tier unbounded, and the
/// charge per tier is `units × price`. Tiers that receive zero units are
/// omitted.
#[must_use]
pub fn overage_breakdown(usage: u64, reserved: u64, tiers: &[OverageTier]) -> Vec<TierCharge> {
    let overage = usage.saturating_sub(reserved);
    let mut out = Vec::new();
    for (i, tier) in tiers.iter().enumerate() {
        let next_threshold = tiers.get(i + 1).map_or(u64::MAX, |t| t.threshold);
        let units = overage.min(next_threshold).saturating_sub(tier.threshold);
        if units > 0 {
            out.push(TierCharge {
                threshold: tier.threshold,
                units,
                price: tier.price,
                charge: units as f64 * tier.price,
                billing_item: tier.billing_item.clone(),
            });
        }
    }
    out
}

/// A tenant's month-to-date usage with overage pricing applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    /// Verified Exchange units consumed.
    pub vex: u64,
    /// Fallback Unit tokens consumed.
    pub fu: u64,
    /// VEx overage split across tiers.
    pub vex_overage: Vec<TierCharge>,
    /// FU overage split across tiers.
    pub fu_overage: Vec<TierCharge>,
}

/// Price a tenant's month-to-date usage against its reserved capacity.
#[must_use]
pub fn usage_report(capacity: &ReservedCapacity, vex: u64, fu: u64) -> UsageReport {
    UsageReport {
        vex,
        fu,
        vex_overage: overage_breakdown(vex, capacity.reserved_vex, &capacity.vex_tiers),
        fu_overage: overage_breakdown(fu, capacity.reserved_fu, &capacity.fu_tiers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(threshold: u64, price: f64) -> OverageTier {
        OverageTier {
            threshold,
            price,
            billing_item: None,
        }
    }

    #[test]
    fn usage_within_reservation_has_no_overage() {
        let tiers = [tier(0, 0.01)];
        assert!(overage_breakdown(900, 1000, &tiers).is_empty());
        assert!(overage_breakdown(1000, 1000, &tiers).is_empty());
    }

    #[test]
    fn single_tier_prices_full_overage() {
        let tiers = [tier(0, 0.01)];
        let breakdown = overage_breakdown(1500, 1000, &tiers);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].units, 500);
        assert!((breakdown[0].charge - 5.0).abs() < 1e-9);
    }

    #[test]
    fn overage_splits_across_tiers() {
        // Overage of 700: first 300 at 0.02, next 300 at 0.015, rest at 0.01.
        let tiers = [tier(0, 0.02), tier(300, 0.015), tier(600, 0.01)];
        let breakdown = overage_breakdown(1700, 1000, &tiers);
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[0].units, 300);
        assert_eq!(breakdown[1].units, 300);
        assert_eq!(breakdown[2].units, 100);
        let total: f64 = breakdown.iter().map(|t| t.charge).sum();
        assert!((total - (300.0 * 0.02 + 300.0 * 0.015 + 100.0 * 0.01)).abs() < 1e-9);
    }

    #[test]
    fn overage_stopping_inside_a_tier() {
        let tiers = [tier(0, 0.02), tier(300, 0.015)];
        let breakdown = overage_breakdown(1150, 1000, &tiers);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].units, 150);
    }

    #[test]
    fn exact_tier_boundary_goes_to_lower_tier() {
        let tiers = [tier(0, 0.02), tier(300, 0.015)];
        let breakdown = overage_breakdown(1300, 1000, &tiers);
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].units, 300);
    }

    #[test]
    fn no_tiers_means_unpriced_overage() {
        assert!(overage_breakdown(5000, 0, &[]).is_empty());
    }

    #[test]
    fn zero_reservation_prices_all_usage() {
        let tiers = [tier(0, 1.0)];
        let breakdown = overage_breakdown(7, 0, &tiers);
        assert_eq!(breakdown[0].units, 7);
        assert!((breakdown[0].charge - 7.0).abs() < 1e-9);
    }

    #[test]
    fn report_covers_both_units() {
        let capacity = ReservedCapacity {
            reserved_vex: 10,
            reserved_fu: 100,
            vex_tiers: vec![tier(0, 0.5)],
            fu_tiers: vec![tier(0, 0.001)],
        };
        let report = usage_report(&capacity, 14, 250);
        assert_eq!(report.vex, 14);
        assert_eq!(report.fu, 250);
        assert_eq!(report.vex_overage[0].units, 4);
        assert_eq!(report.fu_overage[0].units, 150);
    }

    #[test]
    fn billing_item_carried_through() {
        let tiers = [OverageTier {
            threshold: 0,
            price: 0.01,
            billing_item: Some("item_tier1".into()),
        }];
        let breakdown = overage_breakdown(10, 0, &tiers);
        assert_eq!(breakdown[0].billing_item.as_deref(), Some("item_tier1"));
    }
}
