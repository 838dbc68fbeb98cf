//! Insertion-ordered table of in-flight datagrams.
//!
//! The retransmission policy needs O(1) lookup by `(frame_id, frag_id)`
//! together with stable iteration in first-send order, including "walk
//! backwards from a given key". The table is an arena of doubly-linked
//! nodes with stable indices plus a hash map from sequence number to node.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::{Datagram, SeqNum};

/// A datagram awaiting acknowledgment.
#[derive(Debug)]
pub struct PendingDatagram {
    pub datagram: Datagram,

    /// Retransmission count, bounded by the engine's retransmission cap.
    pub num_rtx: u32,

    /// Timestamp of the most recent transmission or retransmission
    /// scheduling decision.
    pub last_send_ts: u64,
}

#[derive(Debug)]
struct Node {
    prev: Option<usize>,
    next: Option<usize>,
    seq: SeqNum,
    pending: PendingDatagram,
}

/// Map from sequence number to pending datagram, iterable in send order.
#[derive(Debug, Default)]
pub struct UnackedMap {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    index: HashMap<SeqNum, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl UnackedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, seq: &SeqNum) -> bool {
        self.index.contains_key(seq)
    }

    /// Registers a freshly sent datagram at the tail, preserving send order.
    ///
    /// `last_send_ts` starts out as the datagram's send timestamp.
    pub fn insert(&mut self, datagram: Datagram) -> Result<()> {
        let seq = datagram.seq_num();
        if self.index.contains_key(&seq) {
            return Err(Error::DuplicateUnacked);
        }

        let pending = PendingDatagram {
            last_send_ts: datagram.send_ts,
            num_rtx: 0,
            datagram,
        };
        let node = Node {
            prev: self.tail,
            next: None,
            seq,
            pending,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        if let Some(tail) = self.tail {
            if let Some(t) = self.slots[tail].as_mut() {
                t.next = Some(idx);
            }
        } else {
            self.head = Some(idx);
        }
        self.tail = Some(idx);
        self.index.insert(seq, idx);

        Ok(())
    }

    pub fn get(&self, seq: &SeqNum) -> Option<&PendingDatagram> {
        let idx = *self.index.get(seq)?;
        self.slots[idx].as_ref().map(|n| &n.pending)
    }

    pub fn get_mut(&mut self, seq: &SeqNum) -> Option<&mut PendingDatagram> {
        let idx = *self.index.get(seq)?;
        self.slots[idx].as_mut().map(|n| &mut n.pending)
    }

    /// Oldest entry, by first-send order.
    pub fn first(&self) -> Option<&PendingDatagram> {
        let idx = self.head?;
        self.slots[idx].as_ref().map(|n| &n.pending)
    }

    /// Removes an entry, keeping the remaining order intact.
    pub fn remove(&mut self, seq: &SeqNum) -> Option<PendingDatagram> {
        let idx = self.index.remove(seq)?;
        let node = self.slots[idx].take()?;

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.slots[prev].as_mut() {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.slots[next].as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free.push(idx);
        Some(node.pending)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates in send order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (SeqNum, &PendingDatagram)> {
        Cursor {
            map: self,
            at: self.head,
            forward: true,
        }
    }

    /// Iterates backwards over entries sent strictly earlier than `seq`,
    /// most recent first. Empty if `seq` is not in the table.
    pub fn iter_earlier(&self, seq: &SeqNum) -> impl Iterator<Item = (SeqNum, &PendingDatagram)> {
        let at = self
            .index
            .get(seq)
            .and_then(|&idx| self.slots[idx].as_ref())
            .and_then(|n| n.prev);
        Cursor {
            map: self,
            at,
            forward: false,
        }
    }
}

struct Cursor<'a> {
    map: &'a UnackedMap,
    at: Option<usize>,
    forward: bool,
}

impl<'a> Iterator for Cursor<'a> {
    type Item = (SeqNum, &'a PendingDatagram);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.map.slots[self.at?].as_ref()?;
        self.at = if self.forward { node.next } else { node.prev };
        Some((node.seq, &node.pending))
    }
}
