use crate::input::codec::{normalize, pack, KeyEvent};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

pub const DEFAULT_KEY_QUEUE_CAPACITY: usize = 16;
pub const MAX_KEY_QUEUE_CAPACITY: usize = 1 << 16;

const DATA_BITS: u32 = 16;
const STAMP_MASK: u64 = u64::MAX >> DATA_BITS;

/// Fixed-capacity ring of packed key events.
///
/// Any number of producers may `push` concurrently with each other and with
/// the single consumer calling `poll`. Cursors are free-running sequence
/// numbers; a slot is `cursor & (capacity - 1)`, so the capacity is always a
/// power of two.
///
/// Each slot carries the stamp `seq + 1` of the write that filled it next to
/// the packed event. The consumer only takes a slot whose stamp matches its
/// cursor, so a reserved but not yet stored slot is never read.
///
/// The ring never blocks and never rejects a write. Once the writer is more
/// than a full lap ahead, unread events are overwritten and the next `poll`
/// skips the reader forward to the oldest surviving event.
#[derive(Debug)]
pub struct KeyQueue {
    slots: Box<[AtomicU64]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

impl Default for KeyQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_KEY_QUEUE_CAPACITY)
    }
}

fn stamp_for(seq: usize) -> u64 {
    (seq as u64).wrapping_add(1) & STAMP_MASK
}

fn stamp_of(word: u64) -> u64 {
    word >> DATA_BITS
}

/// Distance of `stamp` ahead of `expected`, modulo the stamp width. Values in
/// the upper half mean `stamp` is behind.
fn stamp_lead(stamp: u64, expected: u64) -> u64 {
    stamp.wrapping_sub(expected) & STAMP_MASK
}

fn is_ahead(lead: u64) -> bool {
    lead != 0 && lead <= STAMP_MASK / 2
}

impl KeyQueue {
    /// Creates a queue holding `capacity` events, clamped to
    /// `2..=MAX_KEY_QUEUE_CAPACITY` and rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = sanitize_capacity(capacity);
        let slots = (0..capacity)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Normalizes `raw` and appends it. Never blocks, never fails.
    pub fn push(&self, pressed: bool, raw: u8) {
        self.push_event(KeyEvent::new(pressed, normalize(raw)));
    }

    /// Appends an already normalized event.
    pub fn push_event(&self, event: KeyEvent) {
        let seq = self.reserve();
        self.commit(seq, pack(event.pressed, event.code));
    }

    fn reserve(&self) -> usize {
        self.write.fetch_add(1, Ordering::AcqRel)
    }

    fn commit(&self, seq: usize, data: u16) {
        let word = (stamp_for(seq) << DATA_BITS) | u64::from(data);
        // A writer delayed by a full lap must not clobber the newer event.
        let _ = self.slots[seq & self.mask].fetch_update(
            Ordering::Release,
            Ordering::Acquire,
            |current| {
                let lead = stamp_lead(stamp_of(current), stamp_for(seq));
                (!is_ahead(lead)).then_some(word)
            },
        );
    }

    /// Takes the oldest unread event. Returns `None` when the queue is empty
    /// or the next event has been reserved but not stored yet.
    pub fn poll(&self) -> Option<KeyEvent> {
        let capacity = self.capacity();
        loop {
            let write = self.write.load(Ordering::Acquire);
            let mut read = self.read.load(Ordering::Relaxed);
            if read == write {
                return None;
            }
            if write.wrapping_sub(read) > capacity {
                read = write.wrapping_sub(capacity);
            }

            let word = self.slots[read & self.mask].load(Ordering::Acquire);
            let lead = stamp_lead(stamp_of(word), stamp_for(read));
            if lead == 0 {
                self.read.store(read.wrapping_add(1), Ordering::Release);
                return Some(KeyEvent::unpack(word as u16));
            }
            if is_ahead(lead) {
                // Overwritten by a newer lap since `write` was loaded.
                continue;
            }
            self.read.store(read, Ordering::Release);
            return None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Number of events written but not yet polled, at most the capacity.
    pub fn pending(&self) -> usize {
        self.write
            .load(Ordering::Acquire)
            .wrapping_sub(self.read.load(Ordering::Acquire))
            .min(self.capacity())
    }
}

pub fn sanitize_capacity(capacity: usize) -> usize {
    capacity.clamp(2, MAX_KEY_QUEUE_CAPACITY).next_power_of_two()
}
