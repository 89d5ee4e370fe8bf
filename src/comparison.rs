//! Computes convergence between the modern and legacy order collections
//! during a strangler-pattern migration.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{Order, OrderStatus};

pub const AMOUNT_TOLERANCE: f64 = 0.01;
pub const TIME_TOLERANCE_MILLIS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMismatch {
    pub order_id: String,
    pub field: String,
    pub severity: Severity,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub missing_in_legacy: Vec<String>,
    pub missing_in_modern: Vec<String>,
    pub mismatches: Vec<FieldMismatch>,
    pub perfect_matches: usize,
    pub sync_percentage: f64,
    pub status: &'static str,
    pub summary: String,
}

/// Compare the modern and legacy collections in full. Symmetric by construction:
/// swapping `modern` and `legacy` swaps `missing_in_legacy`/`missing_in_modern`
/// but leaves their total counts unchanged.
pub fn compare_all(modern: &[Order], legacy: &[Order]) -> ComparisonReport {
    let modern_by_id: HashMap<&str, &Order> = modern.iter().map(|o| (o.id.as_str(), o)).collect();
    let legacy_by_id: HashMap<&str, &Order> = legacy.iter().map(|o| (o.id.as_str(), o)).collect();

    let modern_keys: HashSet<&str> = modern_by_id.keys().copied().collect();
    let legacy_keys: HashSet<&str> = legacy_by_id.keys().copied().collect();

    let mut missing_in_legacy: Vec<String> = modern_keys.difference(&legacy_keys).map(|s| s.to_string()).collect();
    missing_in_legacy.sort();
    let mut missing_in_modern: Vec<String> = legacy_keys.difference(&modern_keys).map(|s| s.to_string()).collect();
    missing_in_modern.sort();

    let mut mismatches = Vec::new();
    let mut perfect_matches = 0usize;

    let mut shared: Vec<&str> = modern_keys.intersection(&legacy_keys).copied().collect();
    shared.sort_unstable();
    for id in shared {
        let pair_mismatches = compare_one_pair(modern_by_id[id], legacy_by_id[id]);
        if pair_mismatches.is_empty() {
            perfect_matches += 1;
        } else {
            mismatches.extend(pair_mismatches);
        }
    }

    let presence_mismatch_count = missing_in_legacy.len() + missing_in_modern.len();
    for id in &missing_in_legacy {
        mismatches.push(FieldMismatch {
            order_id: id.clone(),
            field: "presence".to_string(),
            severity: Severity::Critical,
            detail: "missing in legacy store".to_string(),
        });
    }
    for id in &missing_in_modern {
        mismatches.push(FieldMismatch {
            order_id: id.clone(),
            field: "presence".to_string(),
            severity: Severity::Warning,
            detail: "missing in modern store".to_string(),
        });
    }

    let union_size = modern_keys.union(&legacy_keys).count();
    let sync_percentage = if union_size == 0 {
        100.0
    } else {
        ((perfect_matches as f64 / union_size as f64) * 100.0 * 100.0).round() / 100.0
    };
    let status = if sync_percentage >= 95.0 {
        "excellent"
    } else if sync_percentage >= 85.0 {
        "good"
    } else if sync_percentage >= 70.0 {
        "fair"
    } else {
        "poor"
    };

    let summary = format!(
        "{perfect_matches}/{union_size} orders in sync ({sync_percentage:.2}%, {status}); {} missing in legacy, {} missing in modern, {} field mismatches",
        missing_in_legacy.len(),
        missing_in_modern.len(),
        mismatches.len() - presence_mismatch_count,
    );

    ComparisonReport { missing_in_legacy, missing_in_modern, mismatches, perfect_matches, sync_percentage, status, summary }
}

/// Per-order comparison, backing the single-order inspection endpoint
/// distinct from the system-wide `compare_all`.
pub fn compare_one(modern: Option<&Order>, legacy: Option<&Order>, id: &str) -> Vec<FieldMismatch> {
    match (modern, legacy) {
        (Some(l), Some(r)) => compare_one_pair(l, r),
        (Some(_), None) => vec![FieldMismatch {
            order_id: id.to_string(),
            field: "presence".to_string(),
            severity: Severity::Critical,
            detail: "missing in legacy store".to_string(),
        }],
        (None, Some(_)) => vec![FieldMismatch {
            order_id: id.to_string(),
            field: "presence".to_string(),
            severity: Severity::Warning,
            detail: "missing in modern store".to_string(),
        }],
        (None, None) => Vec::new(),
    }
}

fn compare_one_pair(l: &Order, r: &Order) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    if l.customer_id != r.customer_id {
        mismatches.push(FieldMismatch {
            order_id: l.id.clone(),
            field: "customer_id".to_string(),
            severity: Severity::Critical,
            detail: format!("{} != {}", l.customer_id, r.customer_id),
        });
    }

    if (l.total_amount - r.total_amount).abs() >= AMOUNT_TOLERANCE {
        mismatches.push(FieldMismatch {
            order_id: l.id.clone(),
            field: "total_amount".to_string(),
            severity: Severity::Critical,
            detail: format!("{} != {} (tolerance {})", l.total_amount, r.total_amount, AMOUNT_TOLERANCE),
        });
    }

    if l.items.len() != r.items.len() {
        mismatches.push(FieldMismatch {
            order_id: l.id.clone(),
            field: "item_count".to_string(),
            severity: Severity::Warning,
            detail: format!("{} != {}", l.items.len(), r.items.len()),
        });
    }

    if (l.delivery_date - r.delivery_date).num_milliseconds().unsigned_abs() >= TIME_TOLERANCE_MILLIS as u64 {
        mismatches.push(FieldMismatch {
            order_id: l.id.clone(),
            field: "delivery_date".to_string(),
            severity: Severity::Warning,
            detail: "delivery_date differs by more than the tolerance window".to_string(),
        });
    }

    if l.status != r.status {
        // Pending-vs-confirmed is the expected pairing while the legacy
        // consumer hasn't caught up yet; anything else is a genuine drift.
        let severity = if l.status == OrderStatus::Pending && r.status == OrderStatus::Confirmed {
            Severity::Info
        } else {
            Severity::Warning
        };
        mismatches.push(FieldMismatch {
            order_id: l.id.clone(),
            field: "status".to_string(),
            severity,
            detail: format!("{:?} != {:?}", l.status, r.status),
        });
    }

    mismatches
}
