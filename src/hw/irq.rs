//! Scoped interrupt masking

use super::InterruptSource;
use std::ops::{Deref, DerefMut};

/// Masks an interrupt source for as long as the guard lives.
///
/// Every API call that touches state shared with a tick handler holds one of
/// these, so the handler only ever observes a consistent snapshot.
pub struct InterruptGuard<'a, S: InterruptSource + ?Sized> {
    source: &'a mut S,
    was_enabled: bool,
}

impl<'a, S: InterruptSource + ?Sized> InterruptGuard<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        let was_enabled = source.mask();
        Self {
            source,
            was_enabled,
        }
    }
}

impl<S: InterruptSource + ?Sized> Deref for InterruptGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: InterruptSource + ?Sized> DerefMut for InterruptGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: InterruptSource + ?Sized> Drop for InterruptGuard<'_, S> {
    fn drop(&mut self) {
        self.source.unmask(self.was_enabled);
    }
}
