//! Typed free lists for per-note oscillator states.
//!
//! Finalized states go back to their list and the next note of the same
//! kind reuses the allocation instead of boxing a fresh one. Each list keeps
//! at most `limit` boxes; extra ones are dropped.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::algorithmic::AlgorithmicOscillator;
use crate::fm::FmOscillator;
use crate::sample::SampleOscillator;

/// Default number of boxes kept per list.
pub const DEFAULT_FREELIST_LIMIT: usize = 64;

/// Recycled boxes of one type.
#[derive(Debug)]
pub struct Freelist<T> {
    free: Vec<Box<T>>,
    limit: usize,
    reused: u64,
}

impl<T> Freelist<T> {
    /// Keeps up to `limit` boxes.
    pub fn new(limit: usize) -> Self {
        Self {
            free: Vec::with_capacity(limit),
            limit,
            reused: 0,
        }
    }

    /// Boxes `value`, reusing a returned allocation if one is free.
    pub fn checkout(&mut self, value: T) -> Box<T> {
        match self.free.pop() {
            Some(mut slot) => {
                *slot = value;
                self.reused += 1;
                slot
            }
            None => Box::new(value),
        }
    }

    /// Returns a box for reuse.
    pub fn give_back(&mut self, slot: Box<T>) {
        if self.free.len() < self.limit {
            self.free.push(slot);
        }
    }

    /// Boxes waiting for reuse.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    /// True when no box is waiting.
    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    /// Checkouts served from the list.
    pub fn reused(&self) -> u64 {
        self.reused
    }
}

impl<T> Default for Freelist<T> {
    fn default() -> Self {
        Self::new(DEFAULT_FREELIST_LIMIT)
    }
}

/// One free list per pooled oscillator kind.
#[derive(Debug, Default)]
pub struct FreeLists {
    /// Sample oscillators.
    pub sample: Freelist<SampleOscillator>,
    /// Algorithmic oscillators.
    pub algorithmic: Freelist<AlgorithmicOscillator>,
    /// FM oscillators.
    pub fm: Freelist<FmOscillator>,
}

impl FreeLists {
    /// Every list keeps up to `limit` boxes.
    pub fn new(limit: usize) -> Self {
        Self {
            sample: Freelist::new(limit),
            algorithmic: Freelist::new(limit),
            fm: Freelist::new(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_reuses_returned_allocation() {
        let mut list = Freelist::new(2);
        let first = list.checkout([1u64; 8]);
        let address = &*first as *const [u64; 8];
        list.give_back(first);
        let second = list.checkout([2u64; 8]);
        assert_eq!(&*second as *const [u64; 8], address);
        assert_eq!(*second, [2; 8]);
        assert_eq!(list.reused(), 1);
    }

    #[test]
    fn give_back_respects_limit() {
        let mut list = Freelist::new(1);
        let a = list.checkout(1);
        let b = list.checkout(2);
        list.give_back(a);
        list.give_back(b);
        assert_eq!(list.len(), 1);
    }
}
