//! Per-frame fragment reassembly and the receive-side frame buffer.
//!
//! A [`Frame`] accumulates the fragments of one compressed frame until it
//! is complete. The [`FrameBuffer`] keeps frames at or beyond the next
//! frame to consume, and recovers from gaps by skipping ahead to the
//! newest complete key frame.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ops::Bound;

use log::info;

use crate::error::{Error, Result};
use crate::protocol::{Datagram, FrameType};

/// Capacity of the scratch buffer a complete frame is assembled into.
pub const MAX_DECODING_BUF: usize = 1_000_000;

/// One compressed frame being reassembled from datagrams.
#[derive(Debug)]
pub struct Frame {
    id: u32,
    frame_type: FrameType,
    frags: Vec<Option<Datagram>>,
    null_frags: u16,
    frame_size: usize,
}

impl Frame {
    /// Creates an empty record for `frag_cnt` fragments.
    pub fn new(id: u32, frame_type: FrameType, frag_cnt: u16) -> Result<Self> {
        if frag_cnt == 0 {
            return Err(Error::ZeroFragments);
        }

        Ok(Self {
            id,
            frame_type,
            frags: (0..frag_cnt).map(|_| None).collect(),
            null_frags: frag_cnt,
            frame_size: 0,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    pub fn has_frag(&self, frag_id: u16) -> bool {
        self.frags
            .get(frag_id as usize)
            .is_some_and(|slot| slot.is_some())
    }

    fn validate_datagram(&self, datagram: &Datagram) -> Result<()> {
        if datagram.frame_id != self.id
            || datagram.frame_type != self.frame_type
            || datagram.frag_id as usize >= self.frags.len()
            || datagram.frag_cnt as usize != self.frags.len()
        {
            return Err(Error::IncompatibleDatagram);
        }
        Ok(())
    }

    /// Stores a fragment. Duplicates are ignored; a datagram whose fields
    /// disagree with this record is a protocol violation.
    pub fn insert_frag(&mut self, datagram: Datagram) -> Result<()> {
        self.validate_datagram(&datagram)?;

        let slot = &mut self.frags[datagram.frag_id as usize];
        if slot.is_none() {
            self.frame_size += datagram.payload.len();
            self.null_frags -= 1;
            *slot = Some(datagram);
        }
        Ok(())
    }

    /// True once every fragment slot is filled.
    pub fn complete(&self) -> bool {
        self.null_frags == 0
    }

    /// Total payload size; defined only for complete frames.
    pub fn frame_size(&self) -> Option<usize> {
        self.complete().then_some(self.frame_size)
    }

    /// Concatenates the fragments in ascending order into `buf`.
    ///
    /// `buf` is cleared first and is meant to be a scratch buffer reused
    /// across frames. Returns the assembled size; a frame larger than
    /// [`MAX_DECODING_BUF`] is rejected as oversized.
    pub fn copy_into(&self, buf: &mut Vec<u8>) -> Result<usize> {
        if !self.complete() {
            return Err(Error::IncompleteFrame);
        }
        if self.frame_size > MAX_DECODING_BUF {
            return Err(Error::OversizedFrame);
        }

        buf.clear();
        for datagram in self.frags.iter().flatten() {
            buf.extend_from_slice(&datagram.payload);
        }
        Ok(buf.len())
    }
}

/// Frames indexed by id, together with the in-order consumption cursor.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: BTreeMap<u32, Frame>,
    next_frame: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest frame id not yet consumed. Only ever increases.
    pub fn next_frame(&self) -> u32 {
        self.next_frame
    }

    /// Ingests one datagram.
    ///
    /// Datagrams for already-consumed frames are discarded silently; the
    /// first fragment of a new frame creates its record.
    pub fn accept(&mut self, datagram: Datagram) -> Result<()> {
        if datagram.frame_id < self.next_frame {
            return Ok(());
        }

        let frame = match self.frames.entry(datagram.frame_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(Frame::new(
                datagram.frame_id,
                datagram.frame_type,
                datagram.frag_cnt,
            )?),
        };
        frame.insert_frag(datagram)
    }

    /// True if the next frame can be consumed, skipping ahead first when a
    /// newer complete key frame offers a recovery point.
    ///
    /// The skip-ahead picks the complete key frame with the largest id
    /// strictly beyond the cursor and moves the cursor onto it.
    pub fn next_frame_complete(&mut self) -> bool {
        if let Some(frame) = self.frames.get(&self.next_frame) {
            if frame.complete() {
                return true;
            }
        }

        let key_frame = self
            .frames
            .range((Bound::Excluded(self.next_frame), Bound::Unbounded))
            .rev()
            .find(|(_, frame)| frame.frame_type() == FrameType::Key && frame.complete())
            .map(|(&id, _)| id);

        if let Some(id) = key_frame {
            let skipped = id - self.next_frame;
            self.next_frame = id;
            self.clean_up_to(id);
            info!("* Recovery: skipped {skipped} frames ahead to key frame {id}");
            return true;
        }

        false
    }

    /// Removes and returns the frame under the cursor, advancing the cursor
    /// and dropping every older record.
    pub fn take_next(&mut self) -> Result<Frame> {
        let frame = self
            .frames
            .remove(&self.next_frame)
            .ok_or(Error::IncompleteFrame)?;
        if !frame.complete() {
            return Err(Error::IncompleteFrame);
        }

        self.next_frame += 1;
        self.clean_up_to(self.next_frame);
        Ok(frame)
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn clean_up_to(&mut self, frontier: u32) {
        self.frames = self.frames.split_off(&frontier);
    }
}
