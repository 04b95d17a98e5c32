//! Sequence-validated slots

use crate::{GuardedScalar, RingError, NO_FRAME, RING_CAPACITY};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{fence, AtomicI64, AtomicU64, Ordering};

/// Ring position of a monotonic frame index
pub fn slot_of(index: i64) -> usize {
    index.rem_euclid(RING_CAPACITY as i64) as usize
}

type Plane = Box<[UnsafeCell<u8>]>;

fn zeroed_plane(len: usize) -> Plane {
    std::iter::repeat_with(|| UnsafeCell::new(0)).take(len).collect()
}

/// One slot holding `N` byte planes.
///
/// `sequence` is odd while the producer is writing. `generation` is the
/// monotonic index whose content the slot holds, or `NO_FRAME` while a
/// write is in flight or after an abandoned one.
pub(crate) struct Slot<const N: usize> {
    sequence: AtomicU64,
    generation: AtomicI64,
    timestamp_us: AtomicI64,
    planes: [Plane; N],
}

impl<const N: usize> Slot<N> {
    fn new(plane_sizes: [usize; N]) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            generation: AtomicI64::new(NO_FRAME),
            timestamp_us: AtomicI64::new(0),
            planes: plane_sizes.map(zeroed_plane),
        }
    }

    /// Overwrite the slot. Must only be called by the ring's producer.
    fn write<E>(
        &self,
        generation: i64,
        timestamp_us: i64,
        fill: impl FnOnce([&mut [u8]; N]) -> Result<(), E>,
    ) -> Result<(), E> {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        self.generation.store(NO_FRAME, Ordering::Relaxed);
        fence(Ordering::Release);

        // SAFETY: each ring has exactly one producer, so no other `&mut`
        // to these planes exists. Readers only copy through raw pointers
        // and discard the copy when `sequence` moved underneath them.
        let planes: [&mut [u8]; N] = std::array::from_fn(|i| unsafe {
            let plane = &self.planes[i];
            std::slice::from_raw_parts_mut(UnsafeCell::raw_get(plane.as_ptr()), plane.len())
        });

        let result = fill(planes);
        if result.is_ok() {
            self.timestamp_us.store(timestamp_us, Ordering::Relaxed);
            self.generation.store(generation, Ordering::Relaxed);
        }

        self.sequence
            .store(sequence.wrapping_add(2), Ordering::Release);
        result
    }

    /// Copy the slot out if it still holds `index`
    fn read(&self, index: i64, out: [&mut [u8]; N]) -> Result<i64, RingError> {
        let before = self.sequence.load(Ordering::Acquire);
        if before & 1 == 1 {
            return Err(RingError::Torn { index });
        }

        let generation = self.generation.load(Ordering::Relaxed);
        if generation != index {
            return Err(RingError::Overwritten { index, generation });
        }
        let timestamp_us = self.timestamp_us.load(Ordering::Relaxed);

        for (plane, dst) in self.planes.iter().zip(out) {
            // SAFETY: lengths were checked by the ring; a concurrent write
            // can only change the bytes, which the sequence check rejects.
            unsafe {
                ptr::copy_nonoverlapping(
                    UnsafeCell::raw_get(plane.as_ptr()) as *const u8,
                    dst.as_mut_ptr(),
                    plane.len(),
                );
            }
        }

        fence(Ordering::Acquire);
        if self.sequence.load(Ordering::Relaxed) != before {
            return Err(RingError::Torn { index });
        }

        Ok(timestamp_us)
    }
}

// SAFETY: plane bytes are written by a single producer and read under
// sequence validation; all other fields are atomics.
unsafe impl<const N: usize> Sync for Slot<N> {}

/// Fixed ring of `RING_CAPACITY` slots plus its published index
pub(crate) struct Ring<const N: usize> {
    slots: Box<[Slot<N>]>,
    plane_sizes: [usize; N],
    latest: GuardedScalar<i64>,
}

impl<const N: usize> Ring<N> {
    pub(crate) fn new(plane_sizes: [usize; N]) -> Self {
        let slots: Vec<Slot<N>> = (0..RING_CAPACITY).map(|_| Slot::new(plane_sizes)).collect();
        Self {
            slots: slots.into_boxed_slice(),
            plane_sizes,
            latest: GuardedScalar::new(NO_FRAME),
        }
    }

    pub(crate) fn latest_index(&self) -> i64 {
        self.latest.get()
    }

    /// Fill the next slot, then advance the published index.
    ///
    /// If `fill` fails nothing is published and the slot is left marked
    /// as holding no frame.
    pub(crate) fn publish<E>(
        &self,
        timestamp_us: i64,
        fill: impl FnOnce([&mut [u8]; N]) -> Result<(), E>,
    ) -> Result<i64, E> {
        let next = self.latest.get() + 1;
        self.slots[slot_of(next)].write(next, timestamp_us, fill)?;
        Ok(self.latest.increment())
    }

    /// Copy frame `index` into `out`, returning its timestamp
    pub(crate) fn read(&self, index: i64, out: [&mut [u8]; N]) -> Result<i64, RingError> {
        if index < 0 || index > self.latest.get() {
            return Err(RingError::NoFrame);
        }
        for (dst, &expected) in out.iter().zip(self.plane_sizes.iter()) {
            if dst.len() != expected {
                return Err(RingError::SizeMismatch {
                    expected,
                    actual: dst.len(),
                });
            }
        }
        self.slots[slot_of(index)].read(index, out)
    }
}
