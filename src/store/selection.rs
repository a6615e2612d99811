//! Availability-driven storage selection

use std::sync::Arc;

use crate::availability::Availability;
use crate::backend::DocumentStorage;

/// Pick the candidate with the best live availability.
///
/// Every candidate is probed on each call. Ties go to the earliest
/// candidate. An unreachable candidate is still returned when nothing better
/// exists; `None` only for an empty list.
pub fn select_storage_by_availability(
    candidates: &[Arc<dyn DocumentStorage>],
) -> Option<(Arc<dyn DocumentStorage>, Availability)> {
    let mut best: Option<(&Arc<dyn DocumentStorage>, Availability)> = None;
    for candidate in candidates {
        let availability = candidate.storage_availability();
        match best {
            Some((_, current)) if current <= availability => {}
            _ => best = Some((candidate, availability)),
        }
    }
    best.map(|(storage, availability)| (Arc::clone(storage), availability))
}
