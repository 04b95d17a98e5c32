//! Staging and Frame Rings

use crate::slot::Ring;
use crate::{FrameGeometry, RingError, NO_FRAME, RING_CAPACITY};

/// Copy of one Frame Ring slot, reused across reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Monotonic index the content was published under
    pub index: i64,
    /// Depth arrival time (microseconds)
    pub timestamp_us: i64,
    /// Raw depth samples, little-endian u16
    pub depth: Vec<u8>,
    /// Interleaved RGB24
    pub color: Vec<u8>,
}

impl FrameSnapshot {
    /// Preallocate a snapshot for `geometry`
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            index: NO_FRAME,
            timestamp_us: 0,
            depth: vec![0; geometry.depth_len()],
            color: vec![0; geometry.color_len()],
        }
    }

    /// Decode the depth plane into samples
    pub fn depth_samples(&self) -> impl Iterator<Item = u16> + '_ {
        self.depth
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
    }
}

/// Color frames staged for pairing, written only by the color producer
pub struct StagingRing {
    ring: Ring<1>,
    geometry: FrameGeometry,
}

impl StagingRing {
    /// Create a staging ring for `geometry`
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            ring: Ring::new([geometry.color_len()]),
            geometry,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Most recently completed color index, or `NO_FRAME`
    pub fn latest_index(&self) -> i64 {
        self.ring.latest_index()
    }

    /// Fill the next slot's RGB24 plane and publish it
    pub fn publish<E>(
        &self,
        timestamp_us: i64,
        fill: impl FnOnce(&mut [u8]) -> Result<(), E>,
    ) -> Result<i64, E> {
        self.ring.publish(timestamp_us, |[color]| fill(color))
    }

    /// Copy staged color frame `index` into `dst`, returning its timestamp
    pub fn read_color(&self, index: i64, dst: &mut [u8]) -> Result<i64, RingError> {
        self.ring.read(index, [dst])
    }
}

/// Paired depth+color frames, written only by the depth producer
pub struct FrameRing {
    ring: Ring<2>,
    geometry: FrameGeometry,
}

impl FrameRing {
    /// Create a frame ring for `geometry`
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            ring: Ring::new([geometry.depth_len(), geometry.color_len()]),
            geometry,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn capacity(&self) -> usize {
        RING_CAPACITY
    }

    /// Most recently published depth index, or `NO_FRAME`
    pub fn latest_index(&self) -> i64 {
        self.ring.latest_index()
    }

    /// Oldest index that can still be read, or `NO_FRAME`
    pub fn oldest_live_index(&self) -> i64 {
        match self.latest_index() {
            NO_FRAME => NO_FRAME,
            latest => (latest - (RING_CAPACITY as i64 - 1)).max(0),
        }
    }

    /// Fill the next slot's depth and color planes and publish it
    pub fn publish<E>(
        &self,
        timestamp_us: i64,
        fill: impl FnOnce(&mut [u8], &mut [u8]) -> Result<(), E>,
    ) -> Result<i64, E> {
        self.ring
            .publish(timestamp_us, |[depth, color]| fill(depth, color))
    }

    /// Copy frame `index` into `snapshot`
    pub fn read(&self, index: i64, snapshot: &mut FrameSnapshot) -> Result<(), RingError> {
        let timestamp_us = self
            .ring
            .read(index, [snapshot.depth.as_mut_slice(), snapshot.color.as_mut_slice()])?;
        snapshot.index = index;
        snapshot.timestamp_us = timestamp_us;
        Ok(())
    }

    /// Copy the newest frame into `snapshot`, returning its index
    pub fn read_latest(&self, snapshot: &mut FrameSnapshot) -> Result<i64, RingError> {
        let index = self.latest_index();
        self.read(index, snapshot)?;
        Ok(index)
    }
}
