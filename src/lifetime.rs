// egl-runtime/src/lifetime.rs
//
//! Reference counting for contexts and surfaces.

/// The outcome of dropping one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Release {
    /// References remain; the object stays alive.
    Retained(u32),
    /// The last reference is gone and the object must be removed and freed.
    Freed,
}

/// Reference count plus the "current" pin and validity flag shared by contexts and surfaces.
///
/// The count starts at one for the creating handle. Each binding to a thread adds one. While
/// the object is current to some thread the count never drops below one, so a destroy request
/// against a bound object only tags it; the final unbind frees it.
#[derive(Debug)]
pub(crate) struct Lifetime {
    references: u32,
    current: bool,
    valid: bool,
}

impl Lifetime {
    pub(crate) fn new() -> Lifetime {
        Lifetime { references: 1, current: false, valid: true }
    }

    #[inline]
    pub(crate) fn references(&self) -> u32 {
        self.references
    }

    #[inline]
    pub(crate) fn is_current(&self) -> bool {
        self.current
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.valid
    }

    /// Pins the object as current. `new_binding` adds a reference; rebinding an object that
    /// already held this role does not.
    pub(crate) fn bind(&mut self, new_binding: bool) {
        if new_binding {
            self.references += 1;
        }
        self.current = true;
    }

    /// Updates the pin after one of the object's bindings went away. `still_current` tells
    /// whether some other binding on the same thread keeps it current.
    pub(crate) fn unbind(&mut self, still_current: bool) {
        self.current = still_current;
    }

    /// Hides the object from checked handle lookups without freeing it.
    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    /// Drops one reference, optionally tagging the object invalid first.
    pub(crate) fn release(&mut self, tag_invalid: bool) -> Release {
        if tag_invalid {
            self.mark_invalid();
        }

        debug_assert!(self.references > 0, "negative reference count");
        self.references = self.references.saturating_sub(1);

        // Never free a current object.
        if self.references == 0 && self.current {
            self.references = 1;
        }

        match self.references {
            0 => Release::Freed,
            references => Release::Retained(references),
        }
    }

    /// Clears the pin unconditionally. Only used by process teardown, after every thread
    /// binding has been dropped.
    pub(crate) fn force_unpin(&mut self) {
        self.current = false;
    }
}
