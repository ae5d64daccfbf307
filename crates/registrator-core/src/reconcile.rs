//! Add/remove delta between two registration snapshots

use std::collections::HashSet;

use crate::types::{RegistrationKey, Registrations};

/// Outcome of comparing the last advertised snapshot with the current one.
///
/// All three lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Present now, not advertised yet
    pub add: Vec<RegistrationKey>,
    /// Advertised, gone now
    pub remove: Vec<RegistrationKey>,
    /// Advertised and still present; rewritten to renew the lease
    pub unchanged: Vec<RegistrationKey>,
}

impl Reconciliation {
    /// Nothing to add or remove
    pub fn is_noop(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Compute the minimal set of writes and deletes that turns `last` into `current`.
///
/// `last` must already be filtered down to this instance's own entries. Only
/// identities are compared here; the caller decides which value to write.
pub fn reconcile(last: &Registrations, current: &Registrations) -> Reconciliation {
    let remove_raw: HashSet<&RegistrationKey> = last.keys().filter(|key| !current.contains_key(key)).collect();
    let add_raw: HashSet<&RegistrationKey> = current.keys().filter(|key| !last.contains_key(key)).collect();

    // A key seen in both directions in one pass is already consistent.
    let mut add: Vec<RegistrationKey> = add_raw
        .iter()
        .filter(|key| !remove_raw.contains(*key))
        .map(|key| (*key).clone())
        .collect();
    let mut remove: Vec<RegistrationKey> = remove_raw
        .iter()
        .filter(|key| !add_raw.contains(*key))
        .map(|key| (*key).clone())
        .collect();
    let mut unchanged: Vec<RegistrationKey> = current
        .keys()
        .filter(|key| last.contains_key(key))
        .cloned()
        .collect();

    add.sort();
    remove.sort();
    unchanged.sort();

    Reconciliation { add, remove, unchanged }
}
