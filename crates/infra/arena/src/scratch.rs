//! Scratch checkpoints over an arena
//!
//! A [`Scratch`] remembers the arena cursor when it begins and pops back to
//! it when it ends (explicitly or on drop). Everything allocated in between
//! is reclaimed, including allocations that forced new pages to be
//! committed; the pages themselves stay committed for reuse.
//!
//! Nested scratches borrow their parent mutably, so they always close in
//! reverse order of opening.

use crate::arena::Arena;
use std::ops::Deref;

/// Stack-discipline checkpoint over an [`Arena`]
#[derive(Debug)]
pub struct Scratch<'a> {
    arena: &'a mut Arena,
    saved_offset: usize,
}

impl<'a> Scratch<'a> {
    /// Capture the arena's current offset
    #[inline]
    pub fn begin(arena: &'a mut Arena) -> Self {
        let saved_offset = arena.pos();
        Self {
            arena,
            saved_offset,
        }
    }

    /// Offset the arena returns to when this scratch ends
    #[inline]
    #[must_use]
    pub const fn saved_offset(&self) -> usize {
        self.saved_offset
    }

    /// Open a nested checkpoint; it must end before this one is usable again
    #[inline]
    pub fn nested(&mut self) -> Scratch<'_> {
        Scratch::begin(&mut *self.arena)
    }

    /// Pop the arena back to the saved offset
    #[inline]
    pub fn end(self) {
        drop(self);
    }
}

impl Deref for Scratch<'_> {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        self.arena
    }
}

impl Drop for Scratch<'_> {
    fn drop(&mut self) {
        self.arena.pop_to(self.saved_offset);
    }
}

impl Arena {
    /// Begin a scratch region on this arena
    #[inline]
    pub fn scratch(&mut self) -> Scratch<'_> {
        Scratch::begin(self)
    }
}
