//! Scratch workspace handed out per synthesis cycle.
//!
//! A [`Workspace`] owns one flat `f32` buffer sized for the largest block and
//! the deepest nesting of scratch users. Each cycle the caller opens a
//! [`ScratchArena`] for the block's frame count; every consumer then carves
//! what it needs with [`ScratchArena::lease`], which returns the leased
//! regions plus the remaining arena for nested consumers (an effect chain
//! inside an oscillator, smoothed parameters inside a pluggable processor).
//!
//! Region offsets are padded to [`REGION_ALIGN`] floats and depend on the
//! block length, so they are recomputed from scratch each cycle. Nothing is
//! cached between cycles.
//!
//! ```rust
//! use sonant_core::Workspace;
//!
//! let mut workspace = Workspace::new(64, 4);
//! let mut arena = workspace.arena(10);
//! let (mut lease, mut rest) = arena.lease(2);
//! let [left, right] = lease.split::<2>();
//! left.fill(1.0);
//! right.fill(-1.0);
//! assert_eq!(left.len(), 10);
//! let (inner, _) = rest.lease(2);
//! assert_eq!(inner.count(), 2);
//! ```

use alloc::vec;
use alloc::vec::Vec;

/// Region alignment in floats.
pub const REGION_ALIGN: usize = 8;

fn padded(frames: usize) -> usize {
    frames.div_ceil(REGION_ALIGN) * REGION_ALIGN
}

/// Owner of the scratch memory.
#[derive(Debug)]
pub struct Workspace {
    buffer: Vec<f32>,
    max_frames: usize,
    max_regions: usize,
    in_use: bool,
}

impl Workspace {
    /// Allocates room for `max_regions` regions of `max_frames` frames.
    pub fn new(max_frames: usize, max_regions: usize) -> Self {
        Self {
            buffer: vec![0.0; padded(max_frames) * max_regions],
            max_frames,
            max_regions,
            in_use: false,
        }
    }

    /// Largest block the workspace can serve.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Number of full-size regions available.
    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    /// Opens the arena for one cycle of `frames` frames.
    ///
    /// # Panics
    ///
    /// Panics if `frames` exceeds the capacity. Debug builds also panic if an
    /// earlier arena was leaked without being dropped.
    pub fn arena(&mut self, frames: usize) -> ScratchArena<'_> {
        assert!(
            frames <= self.max_frames,
            "block of {frames} frames exceeds workspace capacity {}",
            self.max_frames
        );
        debug_assert!(!self.in_use, "workspace already in use");
        self.in_use = true;
        ScratchArena {
            rest: &mut self.buffer,
            frames,
            stride: padded(frames),
            guard: Some(&mut self.in_use),
        }
    }
}

/// Unleased scratch memory for one cycle.
#[derive(Debug)]
pub struct ScratchArena<'a> {
    rest: &'a mut [f32],
    frames: usize,
    stride: usize,
    guard: Option<&'a mut bool>,
}

impl ScratchArena<'_> {
    /// Frames per region this cycle.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Regions still available.
    pub fn available(&self) -> usize {
        if self.stride == 0 {
            usize::MAX
        } else {
            self.rest.len() / self.stride
        }
    }

    /// Leases `regions` regions; returns them with the arena that is left.
    ///
    /// Leased memory holds whatever the previous user left behind.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `regions` regions remain.
    pub fn lease(&mut self, regions: usize) -> (WorkspaceLease<'_>, ScratchArena<'_>) {
        let needed = regions * self.stride;
        assert!(
            needed <= self.rest.len(),
            "workspace exhausted: {regions} regions of {} frames requested, {} available",
            self.frames,
            self.available()
        );
        let (head, tail) = self.rest.split_at_mut(needed);
        (
            WorkspaceLease {
                regions: head,
                frames: self.frames,
                stride: self.stride,
                count: regions,
            },
            ScratchArena {
                rest: tail,
                frames: self.frames,
                stride: self.stride,
                guard: None,
            },
        )
    }
}

impl Drop for ScratchArena<'_> {
    fn drop(&mut self) {
        if let Some(in_use) = self.guard.as_deref_mut() {
            *in_use = false;
        }
    }
}

/// Regions leased for one cycle.
#[derive(Debug)]
pub struct WorkspaceLease<'a> {
    regions: &'a mut [f32],
    frames: usize,
    stride: usize,
    count: usize,
}

impl WorkspaceLease<'_> {
    /// Number of regions.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Frames per region.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Region `index`, `frames` long.
    pub fn region(&self, index: usize) -> &[f32] {
        assert!(index < self.count, "region {index} of {} leased", self.count);
        let start = index * self.stride;
        &self.regions[start..start + self.frames]
    }

    /// Region `index`, mutably.
    pub fn region_mut(&mut self, index: usize) -> &mut [f32] {
        assert!(index < self.count, "region {index} of {} leased", self.count);
        let start = index * self.stride;
        &mut self.regions[start..start + self.frames]
    }

    /// Every region at once.
    pub fn regions_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let frames = self.frames;
        self.regions
            .chunks_exact_mut(self.stride.max(1))
            .take(self.count)
            .map(move |region| &mut region[..frames])
    }

    /// The first `N` regions as disjoint slices.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `N` regions were leased.
    pub fn split<const N: usize>(&mut self) -> [&mut [f32]; N] {
        assert!(N <= self.count, "{N} regions requested, {} leased", self.count);
        let mut regions = self.regions_mut();
        core::array::from_fn(|_| regions.next().unwrap_or_default())
    }
}
