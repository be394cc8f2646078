//! Outbound buffer pool and stream buffers.
//!
//! # Data Flow
//! ```text
//! send path:
//!     pool.acquire() → fill PooledBuffer → transmit → pool.recycle()
//!
//! receive path:
//!     single long-lived inbound StreamBuffer, reset per message,
//!     grown monotonically to the largest message seen
//! ```
//!
//! # Design Decisions
//! - Three cursors per buffer: capacity, read position, end of valid data
//! - Growth preserves content and keeps both cursors valid
//! - Pool slots rotate round-robin; acquire moves the slot's storage out,
//!   so a buffer still in flight can never be handed out a second time

use std::sync::Mutex;

/// Growable byte region with a read position and an end-of-data cursor.
///
/// Invariant: `position <= end <= capacity`. Growing the buffer extends
/// capacity in place; content below `end` and both cursors are preserved.
#[derive(Debug)]
pub struct StreamBuffer {
    data: Vec<u8>,
    pos: usize,
    end: usize,
}

impl StreamBuffer {
    /// Create a buffer with the given initial capacity and empty content.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            pos: 0,
            end: 0,
        }
    }

    /// Current write limit in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Read cursor offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// End-of-valid-data offset from the start of the buffer.
    pub fn end(&self) -> usize {
        self.end
    }

    /// All valid bytes, from the start through `end`.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.end]
    }

    /// Unread bytes, from `position` through `end`.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..self.end]
    }

    /// Clear logical content without releasing memory.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.end = 0;
    }

    /// Grow capacity to at least `capacity` bytes. Never shrinks; content
    /// and cursors are untouched.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        if capacity > self.data.len() {
            self.data.resize(capacity, 0);
        }
    }

    /// Append bytes after `end`, growing if needed.
    pub fn append(&mut self, bytes: &[u8]) {
        let target = self.end + bytes.len();
        self.ensure_capacity(target);
        self.data[self.end..target].copy_from_slice(bytes);
        self.end = target;
    }

    /// Writable region between `end` and `target`. The caller must have
    /// grown the buffer to at least `target` beforehand.
    pub fn unfilled_to(&mut self, target: usize) -> &mut [u8] {
        &mut self.data[self.end..target]
    }

    /// Mark `n` more bytes after `end` as valid.
    pub fn advance_end(&mut self, n: usize) {
        self.end += n;
    }

    /// Consume `n` bytes by moving the read cursor forward.
    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}

/// Number of outbound slots without an auxiliary producer.
pub const DEFAULT_POOL_SLOTS: usize = 1;

/// Number of outbound slots when an auxiliary redirection producer shares
/// the pool.
pub const AUX_POOL_SLOTS: usize = 8;

/// Fixed-size pool of outbound buffers handed out in round-robin order.
///
/// A slot's storage moves out on [`BufferPool::acquire`] and back in on
/// [`BufferPool::recycle`]. When rotation lands on a slot that is still
/// checked out, the acquirer gets a freshly allocated buffer instead, so
/// in-flight data is never aliased regardless of how many sends overlap.
pub struct BufferPool {
    slots: Mutex<PoolSlots>,
}

struct PoolSlots {
    buffers: Vec<Option<StreamBuffer>>,
    next: usize,
    initial_capacity: usize,
}

/// An outbound buffer checked out of the pool.
///
/// Give it back with [`BufferPool::recycle`] once transmitted; dropping it
/// instead just forfeits the slot's storage until the next allocation.
pub struct PooledBuffer {
    buf: StreamBuffer,
    slot: usize,
}

impl PooledBuffer {
    /// Pool slot this buffer was checked out from.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = StreamBuffer;

    fn deref(&self) -> &StreamBuffer {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut StreamBuffer {
        &mut self.buf
    }
}

impl BufferPool {
    /// Create a pool with `slots` buffers, each pre-allocated at
    /// `initial_capacity` bytes.
    pub fn new(slots: usize, initial_capacity: usize) -> Self {
        let buffers = (0..slots)
            .map(|_| Some(StreamBuffer::new(initial_capacity)))
            .collect();
        Self {
            slots: Mutex::new(PoolSlots {
                buffers,
                next: 0,
                initial_capacity,
            }),
        }
    }

    /// Check out the next buffer in rotation, reset and ready to fill.
    pub fn acquire(&self) -> PooledBuffer {
        let mut slots = self.lock();
        let idx = slots.next;
        slots.next = (slots.next + 1) % slots.buffers.len();
        match slots.buffers[idx].take() {
            Some(mut buf) => {
                buf.reset();
                PooledBuffer { buf, slot: idx }
            }
            None => PooledBuffer {
                buf: StreamBuffer::new(slots.initial_capacity),
                slot: idx,
            },
        }
    }

    /// Return a transmitted buffer's storage to its slot.
    pub fn recycle(&self, pooled: PooledBuffer) {
        let mut slots = self.lock();
        let PooledBuffer { buf, slot } = pooled;
        if slots.buffers[slot].is_none() {
            slots.buffers[slot] = Some(buf);
        }
    }

    /// Clear logical content of every pooled buffer without releasing
    /// memory. Checked-out buffers are unaffected.
    pub fn reset_all(&self) {
        let mut slots = self.lock();
        for buf in slots.buffers.iter_mut().flatten() {
            buf.reset();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolSlots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}
