//! Status aggregation.
//!
//! Counts found children against declared children and records the result
//! as a condition. The history only grows when the observation changes, so a
//! converged object sees no status writes at all.

use crate::crd::{Condition, ConditionStatus, ConditionType};

/// Found versus declared children of one parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Children currently found by label selector.
    pub available: i32,
    /// Children the parent declares.
    pub total: i32,
}

impl Tally {
    /// Create a tally from counts.
    pub fn new(available: usize, total: usize) -> Self {
        Self {
            available: i32::try_from(available).unwrap_or(i32::MAX),
            total: i32::try_from(total).unwrap_or(i32::MAX),
        }
    }

    /// Classify this tally.
    pub fn classify(&self) -> Classification {
        use std::cmp::Ordering;
        match self.available.cmp(&self.total) {
            Ordering::Equal => Classification::Available,
            Ordering::Greater => Classification::ExcessPendingDeletion,
            Ordering::Less => Classification::PendingCreation,
        }
    }
}

/// How a parent's children compare to its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Every declared child exists and nothing else does.
    Available,
    /// More children exist than are declared.
    ExcessPendingDeletion,
    /// Fewer children exist than are declared.
    PendingCreation,
}

impl Classification {
    /// Condition type recorded for this classification.
    pub fn condition_type(&self) -> ConditionType {
        match self {
            Classification::Available => ConditionType::Available,
            Classification::ExcessPendingDeletion | Classification::PendingCreation => {
                ConditionType::Progressing
            }
        }
    }

    /// Machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Classification::Available => "AllReconciled",
            Classification::ExcessPendingDeletion => "ExcessPendingDeletion",
            Classification::PendingCreation => "PendingCreation",
        }
    }

    fn message(&self, tally: Tally, children: &str) -> String {
        match self {
            Classification::Available => {
                format!("All {} {} are up to date.", tally.total, children)
            }
            Classification::ExcessPendingDeletion => format!(
                "{} {} found but {} declared; the rest are pending deletion.",
                tally.available, children, tally.total
            ),
            Classification::PendingCreation => format!(
                "{} of {} {} found; the rest are pending creation.",
                tally.available, tally.total, children
            ),
        }
    }
}

/// The condition history after observing `current`.
///
/// Returns `None` when neither the classification nor the counts changed
/// since `previous`, in which case the status should not be written. The
/// result keeps at most `limit` conditions, dropping the oldest.
pub fn next_conditions(
    history: &[Condition],
    previous: Tally,
    current: Tally,
    children: &str,
    limit: usize,
    now: &str,
) -> Option<Vec<Condition>> {
    let classification = current.classify();
    let condition_type = classification.condition_type();
    let last = history.last();

    let unchanged = last.is_some_and(|c| {
        c.condition_type == condition_type && c.reason.as_deref() == Some(classification.reason())
    }) && previous == current;
    if unchanged {
        return None;
    }

    let last_transition_time = match last {
        Some(c) if c.condition_type == condition_type => c
            .last_transition_time
            .clone()
            .or_else(|| Some(now.to_string())),
        _ => Some(now.to_string()),
    };

    let mut conditions = history.to_vec();
    conditions.push(Condition {
        condition_type,
        status: ConditionStatus::True,
        last_update_time: Some(now.to_string()),
        last_transition_time,
        reason: Some(classification.reason().to_string()),
        message: Some(classification.message(current, children)),
    });

    let limit = limit.max(1);
    if conditions.len() > limit {
        conditions.drain(..conditions.len() - limit);
    }
    Some(conditions)
}
