//! Eligibility predicate shared by pre-flight checks and commit-time
//! re-validation.

use crate::control::types::TunnelConfig;

/// Whether `candidate` may be active alongside the given active set.
///
/// Total and side-effect-free: usable both for pre-flight UI checks and as
/// the precondition inside the enable transaction. The candidate itself is
/// excluded from the active set before evaluation, so re-enabling an already
/// active configuration is always eligible. An empty remainder is eligible;
/// otherwise the store-supplied `conflicts` predicate decides.
pub fn can_coexist<F>(candidate: &TunnelConfig, active: &[TunnelConfig], conflicts: F) -> bool
where
    F: Fn(&TunnelConfig, &[TunnelConfig]) -> bool,
{
    let others: Vec<TunnelConfig> = active
        .iter()
        .filter(|c| c.id != candidate.id)
        .cloned()
        .collect();
    if others.is_empty() {
        return true;
    }
    !conflicts(candidate, &others)
}
