//! # Pool Memory Manager
//!
//! Fixed-size chunk allocation without a general-purpose heap. Two flavours
//! share the same free-list discipline:
//!
//! - [`BlockPool`] partitions a caller-supplied byte buffer into equally
//!   sized chunks and threads the free list through per-chunk headers.
//! - [`Pool`] is a typed arena of `N` slots, used by the dispatch queue for
//!   its callout slots.
//!
//! [`BlockPool`] is the standalone allocator API for raw byte payloads in
//! caller-owned buffers, such as messages handed between interrupt context
//! and the main loop. No driver in this crate needs one; the callout queue
//! draws its slots from [`Pool`].
//!
//! Both hand out opaque handles (indices), never raw pointers, and both
//! treat exhaustion as a normal condition: `allocate` returns nothing and
//! the caller drops or skips the action.
//!
//! ## Synchronization
//!
//! Neither pool is internally synchronized. A pool shared between the main
//! loop and an interrupt handler must be wrapped in a critical section by
//! its owner (see [`crate::sync`]).
//!
//! ## Block Pool Layout
//!
//! ```text
//! | offset          | usage                                   |
//! |-----------------|-----------------------------------------|
//! | 0               | free-list head (u16, little endian)     |
//! | 2               | chunk 0 link (u16) | chunk 0 data ...   |
//! | 2 + stride      | chunk 1 link (u16) | chunk 1 data ...   |
//! | ...             | ...                                     |
//! ```
//!
//! `stride = chunk_size + 2`. A free chunk's link holds the index of the
//! next free chunk (or the end marker); an allocated chunk's link holds the
//! in-use marker, which lets [`BlockPool::release`] reject handles whose
//! chunk is not currently allocated.

/// Size of the pool header (the free-list head) in bytes.
const HEADER: usize = 2;
/// Size of the per-chunk link in bytes.
const LINK: usize = 2;
/// End of the free list.
const END: u16 = 0xFFFF;
/// Link value of an allocated chunk.
const IN_USE: u16 = 0xFFFE;

/// Errors reported by [`BlockPool::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The block does not belong to this pool, or its chunk is not allocated.
    ForeignBlock,
}

/// Number of bytes a [`BlockPool`] buffer needs for `chunks` chunks of
/// `chunk_size` bytes each.
///
/// ```ignore
/// static mut POOL: [u8; pool_size(16, 8)] = [0; pool_size(16, 8)];
/// ```
pub const fn pool_size(chunks: usize, chunk_size: usize) -> usize {
    HEADER + chunks * (chunk_size + LINK)
}

/// Handle to a chunk allocated from a [`BlockPool`].
///
/// Not `Clone`: releasing consumes the handle, so a chunk cannot be released
/// twice through safe code. Releasing a handle into a pool other than the
/// one it came from is a precondition violation; the pool rejects it only
/// when the target chunk is out of range or not allocated.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Block {
    index: u16,
}

impl Block {
    /// Index of the chunk inside its pool.
    pub fn index(&self) -> u16 {
        self.index
    }
}

/// Fixed-chunk allocator over a caller-owned byte buffer.
pub struct BlockPool<'a> {
    buffer: &'a mut [u8],
    chunk_size: usize,
    chunks: u16,
    free: u16,
}

impl<'a> BlockPool<'a> {
    /// Partition `buffer` into `(len - header) / (chunk_size + link)` chunks.
    ///
    /// Returns `None` if not even one chunk fits. Use [`pool_size`] to size
    /// the buffer.
    pub fn new(buffer: &'a mut [u8], chunk_size: usize) -> Option<Self> {
        let stride = chunk_size.checked_add(LINK)?;
        let chunks = buffer.len().checked_sub(HEADER)? / stride;
        if chunks == 0 {
            return None;
        }
        // The two top link values are reserved markers.
        let chunks = chunks.min(usize::from(IN_USE)) as u16;

        let mut pool = Self {
            buffer,
            chunk_size,
            chunks,
            free: chunks,
        };
        for index in 0..chunks {
            let next = if index + 1 < chunks { index + 1 } else { END };
            pool.set_link(index, next);
        }
        pool.set_head(0);
        Some(pool)
    }

    /// Pop the free-list head. `None` when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<Block> {
        let index = self.head();
        if index == END {
            return None;
        }
        let next = self.link(index);
        self.set_head(next);
        self.set_link(index, IN_USE);
        self.free -= 1;
        Some(Block { index })
    }

    /// Push a chunk back onto the free list.
    pub fn release(&mut self, block: Block) -> Result<(), Error> {
        let index = block.index;
        if index >= self.chunks || self.link(index) != IN_USE {
            return Err(Error::ForeignBlock);
        }
        let head = self.head();
        self.set_link(index, head);
        self.set_head(index);
        self.free += 1;
        Ok(())
    }

    /// Data bytes of an allocated chunk.
    pub fn chunk(&self, block: &Block) -> Option<&[u8]> {
        let range = self.data_range(block.index)?;
        Some(&self.buffer[range])
    }

    /// Mutable data bytes of an allocated chunk.
    pub fn chunk_mut(&mut self, block: &Block) -> Option<&mut [u8]> {
        let range = self.data_range(block.index)?;
        Some(&mut self.buffer[range])
    }

    /// Total number of chunks.
    pub fn capacity(&self) -> usize {
        usize::from(self.chunks)
    }

    /// Number of chunks currently on the free list.
    pub fn available(&self) -> usize {
        usize::from(self.free)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn data_range(&self, index: u16) -> Option<core::ops::Range<usize>> {
        if index >= self.chunks || self.link(index) != IN_USE {
            return None;
        }
        let start = self.link_offset(index) + LINK;
        Some(start..start + self.chunk_size)
    }

    fn link_offset(&self, index: u16) -> usize {
        HEADER + usize::from(index) * (self.chunk_size + LINK)
    }

    fn head(&self) -> u16 {
        u16::from_le_bytes([self.buffer[0], self.buffer[1]])
    }

    fn set_head(&mut self, index: u16) {
        self.buffer[..HEADER].copy_from_slice(&index.to_le_bytes());
    }

    fn link(&self, index: u16) -> u16 {
        let at = self.link_offset(index);
        u16::from_le_bytes([self.buffer[at], self.buffer[at + 1]])
    }

    fn set_link(&mut self, index: u16, next: u16) {
        let at = self.link_offset(index);
        self.buffer[at..at + LINK].copy_from_slice(&next.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Typed slot arena
// ---------------------------------------------------------------------------

/// Handle to an occupied [`Pool`] slot.
///
/// Unlike [`Block`] this is `Copy`: the dispatch queue keeps it in its
/// pending lists. A stale id is harmless, [`Pool::release`] and
/// [`Pool::get`] report vacant slots as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(u16);

impl SlotId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

enum Slot<T> {
    Free(Option<u16>),
    Used(T),
}

/// Arena of `N` slots with an index-linked free list.
pub struct Pool<T, const N: usize> {
    slots: [Slot<T>; N],
    head: Option<u16>,
    used: usize,
}

impl<T, const N: usize> Pool<T, N> {
    const CAPACITY_OK: () = assert!(N > 0 && N < u16::MAX as usize, "pool capacity out of range");

    /// Create a pool with every slot on the free list.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_OK;
        let slots = core::array::from_fn(|i| {
            Slot::Free(if i + 1 < N { Some((i + 1) as u16) } else { None })
        });
        Self {
            slots,
            head: Some(0),
            used: 0,
        }
    }

    /// Move `value` into a free slot. Hands the value back when the pool is
    /// exhausted.
    pub fn allocate(&mut self, value: T) -> Result<SlotId, T> {
        let Some(index) = self.head else {
            return Err(value);
        };
        let slot = &mut self.slots[usize::from(index)];
        self.head = match *slot {
            Slot::Free(next) => next,
            // Only free slots are ever linked.
            Slot::Used(_) => return Err(value),
        };
        *slot = Slot::Used(value);
        self.used += 1;
        Ok(SlotId(index))
    }

    /// Take the value out of a slot and return the slot to the free list.
    /// `None` if the slot is already vacant.
    pub fn release(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if matches!(slot, Slot::Free(_)) {
            return None;
        }
        let Slot::Used(value) = core::mem::replace(slot, Slot::Free(self.head)) else {
            return None;
        };
        self.head = Some(id.0);
        self.used -= 1;
        Some(value)
    }

    pub fn get(&self, id: SlotId) -> Option<&T> {
        match self.slots.get(id.index())? {
            Slot::Used(value) => Some(value),
            Slot::Free(_) => None,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        match self.slots.get_mut(id.index())? {
            Slot::Used(value) => Some(value),
            Slot::Free(_) => None,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn is_full(&self) -> bool {
        self.used == N
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
