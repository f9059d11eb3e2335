//! Ownership of the directive buffer while the operator is typing.

/// Tracks whether the operator is composing a directive.
///
/// While `editing` is set, remote mirror values must never be written into the
/// directive buffer. Polls may still fetch the mirror; the value is discarded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EditGuard {
    editing: bool,
}

impl EditGuard {
    /// Directive input gained focus.
    pub fn acquire(&mut self) {
        self.editing = true;
    }

    /// Directive input lost focus.
    pub fn release(&mut self) {
        self.editing = false;
    }

    pub fn set(&mut self, editing: bool) {
        self.editing = editing;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Write a remote mirror value into `buffer` unless the operator holds it.
    ///
    /// Returns true when `buffer` changed.
    pub fn reconcile(&self, buffer: &mut String, remote: String) -> bool {
        if self.editing || *buffer == remote {
            return false;
        }
        *buffer = remote;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_value_lands_when_idle() {
        let guard = EditGuard::default();
        let mut buffer = String::from("old");
        assert!(guard.reconcile(&mut buffer, "new".to_string()));
        assert_eq!(buffer, "new");
    }

    #[test]
    fn remote_values_never_land_while_editing() {
        let mut guard = EditGuard::default();
        guard.acquire();
        let mut buffer = String::from("please wa");

        for remote in ["", "stale mirror", "please wait", "something else"] {
            assert!(!guard.reconcile(&mut buffer, remote.to_string()));
        }
        assert_eq!(buffer, "please wa");

        guard.release();
        assert!(guard.reconcile(&mut buffer, "mirror".to_string()));
        assert_eq!(buffer, "mirror");
    }

    #[test]
    fn identical_value_is_not_a_change() {
        let guard = EditGuard::default();
        let mut buffer = String::from("same");
        assert!(!guard.reconcile(&mut buffer, "same".to_string()));
    }
}
