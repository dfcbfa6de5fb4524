//! Native action → canonical event kind translation
//!
//! Every adapter first maps its platform flags onto [`NativeAction`] with
//! its own table; this module holds the single shared table from there
//! to [`EventKind`].

use fsmon_core::EventKind;

/// Platform-independent description of one native change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeAction {
    /// Entry appeared
    Added,
    /// Entry disappeared
    Removed,
    /// Entry contents changed
    Modified,
    /// Old half of a rename
    RenamedFrom,
    /// New half of a rename
    RenamedTo,
    /// The native queue overflowed and records were lost
    Overflow,
    /// The OS dropped the watch (directory deleted or unmounted)
    WatchRemoved,
}

/// Canonical translation table
///
/// A rename is split into its two halves: the old name is reported as
/// deleted and the new name as created, in the order the adapter saw them.
const CANONICAL_TABLE: &[(NativeAction, Option<EventKind>)] = &[
    (NativeAction::Added, Some(EventKind::Created)),
    (NativeAction::Removed, Some(EventKind::Deleted)),
    (NativeAction::Modified, Some(EventKind::Modified)),
    (NativeAction::RenamedFrom, Some(EventKind::Deleted)),
    (NativeAction::RenamedTo, Some(EventKind::Created)),
    (NativeAction::Overflow, None),
    (NativeAction::WatchRemoved, None),
];

/// Canonical kind for a native action, if it maps to one
pub fn canonical_kind(action: NativeAction) -> Option<EventKind> {
    CANONICAL_TABLE
        .iter()
        .find(|(native, _)| *native == action)
        .and_then(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_every_action() {
        let all = [
            NativeAction::Added,
            NativeAction::Removed,
            NativeAction::Modified,
            NativeAction::RenamedFrom,
            NativeAction::RenamedTo,
            NativeAction::Overflow,
            NativeAction::WatchRemoved,
        ];
        for action in all {
            assert!(
                CANONICAL_TABLE.iter().any(|(native, _)| *native == action),
                "{:?} missing from table",
                action
            );
        }
    }

    #[test]
    fn test_rename_halves() {
        assert_eq!(canonical_kind(NativeAction::RenamedFrom), Some(EventKind::Deleted));
        assert_eq!(canonical_kind(NativeAction::RenamedTo), Some(EventKind::Created));
    }

    #[test]
    fn test_bookkeeping_actions_are_not_events() {
        assert_eq!(canonical_kind(NativeAction::Overflow), None);
        assert_eq!(canonical_kind(NativeAction::WatchRemoved), None);
    }

    #[test]
    fn test_basic_kinds() {
        assert_eq!(canonical_kind(NativeAction::Added), Some(EventKind::Created));
        assert_eq!(canonical_kind(NativeAction::Removed), Some(EventKind::Deleted));
        assert_eq!(canonical_kind(NativeAction::Modified), Some(EventKind::Modified));
    }
}
