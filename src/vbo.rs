// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of this software
// and associated documentation files (the "Software"), to deal in the Software without
// restriction, including without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all copies or
// substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
// BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! Block allocator backing a GPU vertex buffer.
//!
//! A [`Vbo`] manages one linear byte range. Blocks form a doubly linked
//! list ordered by address, covering the whole range with no gaps; free
//! blocks additionally live in an index sorted by (capacity, address) so
//! allocation is a binary search for the smallest sufficient block.
//!
//! The buffer alternates between mapped (the allocator reads and writes
//! block memory) and unmapped (the GPU draws from it); `alloc`, `free` and
//! `pack` require the mapped state. Actual GL calls are behind the
//! [`GlBackend`] seam so the allocator works headless.

use byteorder::{ByteOrder, LittleEndian};
use cgmath::Vector3;
use slab::Slab;

/// Progress callback for [`Vbo::pack`]: invoked with bytes moved so far;
/// returning `false` cancels the operation.
pub type Progress<'a> = Option<&'a mut dyn FnMut(usize) -> bool>;

fn report_progress(progress: &mut Progress, moved: usize) -> bool {
    match progress {
        Some(callback) => callback(moved),
        None => true,
    }
}

/// Growth ceiling for the backing buffer.
pub const DEFAULT_MAX_CAPACITY: usize = 1 << 28;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(usize);

#[derive(Clone, Debug, Fail)]
pub enum VboError {
    /// Exhausted after compaction with the buffer at maximum capacity.
    /// Callers must retry with less data.
    #[fail(display = "vertex buffer exhausted at maximum capacity")]
    OutOfMemory,
    /// A GL call failed during activate/map/unmap.
    #[fail(display = "GL error {} while {}", code, operation)]
    Gl { code: u32, operation: String },
    /// A long-running operation was cancelled; the buffer is unchanged.
    #[fail(display = "operation cancelled")]
    Cancelled,
}

/// The GL side of the buffer. The editor wires in a real implementation;
/// [`NullBackend`] serves tests and headless use.
pub trait GlBackend {
    /// Binds the buffer, (re)creating GPU storage of the given size.
    fn activate(&mut self, total: usize) -> Result<(), VboError>;
    fn deactivate(&mut self) -> Result<(), VboError>;
    /// Makes block memory writable.
    fn map(&mut self) -> Result<(), VboError>;
    /// Publishes the buffer contents to the GPU.
    fn unmap(&mut self, contents: &[u8]) -> Result<(), VboError>;
}

pub struct NullBackend;

impl GlBackend for NullBackend {
    fn activate(&mut self, _total: usize) -> Result<(), VboError> {
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), VboError> {
        Ok(())
    }

    fn map(&mut self) -> Result<(), VboError> {
        Ok(())
    }

    fn unmap(&mut self, _contents: &[u8]) -> Result<(), VboError> {
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VboState {
    Inactive,
    Active,
    Mapped,
}

#[derive(Clone, Debug)]
struct VboBlock {
    address: usize,
    capacity: usize,
    free: bool,
    previous: Option<BlockId>,
    next: Option<BlockId>,
}

pub struct Vbo {
    blocks: Slab<VboBlock>,
    first: BlockId,
    last: BlockId,
    /// Free blocks sorted ascending by (capacity, address).
    free_blocks: Vec<BlockId>,
    total: usize,
    free: usize,
    max_capacity: usize,
    buffer: Vec<u8>,
    state: VboState,
    backend: Box<dyn GlBackend>,
}

impl Vbo {
    pub fn new(capacity: usize) -> Vbo {
        Vbo::with_backend(capacity, DEFAULT_MAX_CAPACITY, Box::new(NullBackend))
    }

    pub fn with_backend(
        capacity: usize,
        max_capacity: usize,
        backend: Box<dyn GlBackend>,
    ) -> Vbo {
        assert!(capacity > 0 && capacity <= max_capacity);

        let mut blocks = Slab::new();
        let first = BlockId(blocks.insert(VboBlock {
            address: 0,
            capacity,
            free: true,
            previous: None,
            next: None,
        }));

        Vbo {
            blocks,
            first,
            last: first,
            free_blocks: vec![first],
            total: capacity,
            free: capacity,
            max_capacity,
            buffer: vec![0; capacity],
            state: VboState::Inactive,
            backend,
        }
    }

    pub fn total_capacity(&self) -> usize {
        self.total
    }

    pub fn free_capacity(&self) -> usize {
        self.free
    }

    pub fn state(&self) -> VboState {
        self.state
    }

    pub fn block_address(&self, block: BlockId) -> usize {
        self.blocks[block.0].address
    }

    pub fn block_capacity(&self, block: BlockId) -> usize {
        self.blocks[block.0].capacity
    }

    pub fn activate(&mut self) -> Result<(), VboError> {
        assert_eq!(self.state, VboState::Inactive);
        self.backend.activate(self.total)?;
        self.state = VboState::Active;
        Ok(())
    }

    pub fn deactivate(&mut self) -> Result<(), VboError> {
        assert_eq!(self.state, VboState::Active);
        self.backend.deactivate()?;
        self.state = VboState::Inactive;
        Ok(())
    }

    pub fn map(&mut self) -> Result<(), VboError> {
        assert_eq!(self.state, VboState::Active);
        self.backend.map()?;
        self.state = VboState::Mapped;
        Ok(())
    }

    pub fn unmap(&mut self) -> Result<(), VboError> {
        assert_eq!(self.state, VboState::Mapped);
        self.backend.unmap(&self.buffer)?;
        self.state = VboState::Active;
        Ok(())
    }

    /// Index of the first free block with `(capacity, address)` not less
    /// than the given key, or `free_blocks.len()`.
    fn find_free_block(&self, address: usize, capacity: usize) -> usize {
        self.free_blocks
            .binary_search_by(|&bid| {
                let b = &self.blocks[bid.0];
                (b.capacity, b.address).cmp(&(capacity, address))
            })
            .unwrap_or_else(|insert_at| insert_at)
    }

    fn insert_free_block(&mut self, bid: BlockId) {
        debug_assert!(self.blocks[bid.0].free);
        let index = self.find_free_block(self.blocks[bid.0].address, self.blocks[bid.0].capacity);
        self.free_blocks.insert(index, bid);
    }

    fn remove_free_block(&mut self, bid: BlockId) {
        let index = self.find_free_block(self.blocks[bid.0].address, self.blocks[bid.0].capacity);
        debug_assert!(self.free_blocks.get(index) == Some(&bid));
        self.free_blocks.remove(index);
    }

    fn resize_free_block(&mut self, bid: BlockId, new_capacity: usize) {
        self.remove_free_block(bid);
        self.blocks[bid.0].capacity = new_capacity;
        self.insert_free_block(bid);
    }

    /// Allocates a contiguous block of `capacity` bytes, growing the buffer
    /// (doubling) when no free block fits and compacting before giving up
    /// at maximum capacity.
    pub fn alloc(&mut self, capacity: usize) -> Result<BlockId, VboError> {
        assert!(capacity > 0);
        assert_eq!(self.state, VboState::Mapped, "alloc requires a mapped buffer");

        loop {
            if capacity <= self.free {
                let index = self.find_free_block(0, capacity);
                if index < self.free_blocks.len() {
                    return Ok(self.take_block(index, capacity));
                }
            }

            if self.total * 2 > self.max_capacity {
                // enough bytes may exist in fragments
                self.pack(None)?;
                if capacity <= self.free {
                    let index = self.find_free_block(0, capacity);
                    if index < self.free_blocks.len() {
                        return Ok(self.take_block(index, capacity));
                    }
                }
                return Err(VboError::OutOfMemory);
            }

            let doubled = self.total * 2;
            self.resize(doubled)?;
        }
    }

    fn take_block(&mut self, index: usize, capacity: usize) -> BlockId {
        let bid = self.free_blocks.remove(index);
        let (block_capacity, block_address, block_next) = {
            let b = &self.blocks[bid.0];
            (b.capacity, b.address, b.next)
        };

        // split off a trailing remainder
        if capacity < block_capacity {
            let remainder = BlockId(self.blocks.insert(VboBlock {
                address: block_address + capacity,
                capacity: block_capacity - capacity,
                free: true,
                previous: Some(bid),
                next: block_next,
            }));
            if let Some(next) = block_next {
                self.blocks[next.0].previous = Some(remainder);
            }
            {
                let b = &mut self.blocks[bid.0];
                b.capacity = capacity;
                b.next = Some(remainder);
            }
            self.insert_free_block(remainder);
            if self.last == bid {
                self.last = remainder;
            }
        }

        self.blocks[bid.0].free = false;
        self.free -= self.blocks[bid.0].capacity;

        #[cfg(debug_assertions)]
        self.check();

        bid
    }

    /// Returns a block to the free pool, coalescing with free neighbors.
    /// Returns the block holding the freed range after coalescing.
    pub fn free(&mut self, bid: BlockId) -> BlockId {
        assert_eq!(self.state, VboState::Mapped, "free requires a mapped buffer");
        assert!(!self.blocks[bid.0].free, "double free of vbo block");

        self.free += self.blocks[bid.0].capacity;
        self.blocks[bid.0].free = true;

        let previous = self.blocks[bid.0].previous;
        let next = self.blocks[bid.0].next;
        let prev_free = previous.map_or(false, |p| self.blocks[p.0].free);
        let next_free = next.map_or(false, |n| self.blocks[n.0].free);

        let result = match (prev_free, next_free) {
            (true, true) => {
                let prev = previous.unwrap();
                let nxt = next.unwrap();
                let merged = self.blocks[prev.0].capacity
                    + self.blocks[bid.0].capacity
                    + self.blocks[nxt.0].capacity;
                self.remove_free_block(nxt);
                self.resize_free_block(prev, merged);

                let after = self.blocks[nxt.0].next;
                self.blocks[prev.0].next = after;
                if let Some(after) = after {
                    self.blocks[after.0].previous = Some(prev);
                }
                if self.last == nxt {
                    self.last = prev;
                }
                self.blocks.remove(bid.0);
                self.blocks.remove(nxt.0);
                prev
            }
            (true, false) => {
                let prev = previous.unwrap();
                let merged = self.blocks[prev.0].capacity + self.blocks[bid.0].capacity;
                self.resize_free_block(prev, merged);

                self.blocks[prev.0].next = next;
                if let Some(next) = next {
                    self.blocks[next.0].previous = Some(prev);
                }
                if self.last == bid {
                    self.last = prev;
                }
                self.blocks.remove(bid.0);
                prev
            }
            (false, true) => {
                let nxt = next.unwrap();
                self.remove_free_block(nxt);

                let after = self.blocks[nxt.0].next;
                self.blocks[bid.0].capacity += self.blocks[nxt.0].capacity;
                self.blocks[bid.0].next = after;
                if let Some(after) = after {
                    self.blocks[after.0].previous = Some(bid);
                }
                if self.last == nxt {
                    self.last = bid;
                }
                self.blocks.remove(nxt.0);
                self.insert_free_block(bid);
                bid
            }
            (false, false) => {
                self.insert_free_block(bid);
                bid
            }
        };

        #[cfg(debug_assertions)]
        self.check();

        result
    }

    /// Releases every block, leaving a single free block over the buffer.
    pub fn free_all(&mut self) {
        self.blocks.clear();
        self.free_blocks.clear();
        let first = BlockId(self.blocks.insert(VboBlock {
            address: 0,
            capacity: self.total,
            free: true,
            previous: None,
            next: None,
        }));
        self.first = first;
        self.last = first;
        self.free_blocks.push(first);
        self.free = self.total;
    }

    /// Grows the buffer to `new_total` bytes, preserving contents. The
    /// added range extends a trailing free block or becomes a new one.
    pub fn resize(&mut self, new_total: usize) -> Result<(), VboError> {
        assert!(new_total > self.total);

        let added = new_total - self.total;
        self.total = new_total;
        self.free += added;
        self.buffer.resize(new_total, 0);

        let last = self.last;
        if self.blocks[last.0].free {
            let grown = self.blocks[last.0].capacity + added;
            self.resize_free_block(last, grown);
        } else {
            let address = self.blocks[last.0].address + self.blocks[last.0].capacity;
            let tail = BlockId(self.blocks.insert(VboBlock {
                address,
                capacity: added,
                free: true,
                previous: Some(last),
                next: None,
            }));
            self.blocks[last.0].next = Some(tail);
            self.last = tail;
            self.insert_free_block(tail);
        }

        // the GPU buffer is recreated at the new size
        if self.state != VboState::Inactive {
            self.backend.activate(self.total)?;
        }

        #[cfg(debug_assertions)]
        self.check();

        Ok(())
    }

    /// Slides allocated blocks toward address zero so that all free space
    /// coalesces into one trailing block. Allocated contents are preserved
    /// bit for bit.
    ///
    /// The optional progress callback is invoked once per packed block with
    /// the number of bytes moved so far; returning `false` cancels and
    /// restores the pre-call state.
    pub fn pack(&mut self, mut progress: Progress) -> Result<(), VboError> {
        assert_eq!(self.state, VboState::Mapped, "pack requires a mapped buffer");

        // already packed?
        if self.total == self.free
            || (self.blocks[self.last.0].free && self.blocks[self.last.0].capacity == self.free)
        {
            return Ok(());
        }

        // snapshot for cancellation
        let saved = (
            self.blocks.clone(),
            self.free_blocks.clone(),
            self.buffer.clone(),
            self.first,
            self.last,
            self.free,
        );

        let mut moved = 0;

        // find the first free block
        let mut cursor = Some(self.first);
        while let Some(bid) = cursor {
            if self.blocks[bid.0].free {
                break;
            }
            cursor = self.blocks[bid.0].next;
        }

        while let Some(bid) = cursor {
            if self.blocks[bid.0].next.is_none() {
                break;
            }
            moved += self.blocks[bid.0].capacity;
            cursor = self.pack_block(bid);
            if !report_progress(&mut progress, moved) {
                let (blocks, free_blocks, buffer, first, last, free) = saved;
                self.blocks = blocks;
                self.free_blocks = free_blocks;
                self.buffer = buffer;
                self.first = first;
                self.last = last;
                self.free = free;
                return Err(VboError::Cancelled);
            }
        }

        #[cfg(debug_assertions)]
        self.check();

        Ok(())
    }

    /// Moves the run of allocated blocks following the free block `bid`
    /// down by its capacity and merges the freed range into the next free
    /// block (or a new tail block). Returns the free block to continue
    /// packing from.
    fn pack_block(&mut self, bid: BlockId) -> Option<BlockId> {
        let first_used = self.blocks[bid.0].next?;
        let gap = self.blocks[bid.0].capacity;
        let run_start = self.blocks[first_used.0].address;

        let mut run_size = 0;
        let mut last_used = first_used;
        let mut cursor = Some(first_used);
        while let Some(c) = cursor {
            if self.blocks[c.0].free {
                break;
            }
            self.blocks[c.0].address -= gap;
            run_size += self.blocks[c.0].capacity;
            last_used = c;
            cursor = self.blocks[c.0].next;
        }

        let destination = self.blocks[bid.0].address;
        self.buffer
            .copy_within(run_start..run_start + run_size, destination);

        let result = match cursor {
            Some(next_free) => {
                self.blocks[next_free.0].address -= gap;
                let grown = self.blocks[next_free.0].capacity + gap;
                self.resize_free_block(next_free, grown);
                Some(next_free)
            }
            None => {
                // the run reached the end; the freed range becomes the tail
                let address =
                    self.blocks[last_used.0].address + self.blocks[last_used.0].capacity;
                let tail = BlockId(self.blocks.insert(VboBlock {
                    address,
                    capacity: gap,
                    free: true,
                    previous: Some(last_used),
                    next: None,
                }));
                self.blocks[last_used.0].next = Some(tail);
                self.last = tail;
                self.insert_free_block(tail);
                None
            }
        };

        // unlink the packed-away block
        self.remove_free_block(bid);
        let previous = self.blocks[bid.0].previous;
        if let Some(p) = previous {
            self.blocks[p.0].next = Some(first_used);
        }
        self.blocks[first_used.0].previous = previous;
        if self.first == bid {
            self.first = first_used;
        }
        self.blocks.remove(bid.0);

        result
    }

    pub fn write_bytes(&mut self, block: BlockId, offset: usize, data: &[u8]) -> usize {
        assert_eq!(self.state, VboState::Mapped);
        let b = &self.blocks[block.0];
        assert!(offset + data.len() <= b.capacity);
        let start = b.address + offset;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        offset + data.len()
    }

    pub fn write_f32(&mut self, block: BlockId, offset: usize, value: f32) -> usize {
        assert_eq!(self.state, VboState::Mapped);
        let b = &self.blocks[block.0];
        assert!(offset + 4 <= b.capacity);
        let start = b.address + offset;
        LittleEndian::write_f32(&mut self.buffer[start..start + 4], value);
        offset + 4
    }

    pub fn write_u32(&mut self, block: BlockId, offset: usize, value: u32) -> usize {
        assert_eq!(self.state, VboState::Mapped);
        let b = &self.blocks[block.0];
        assert!(offset + 4 <= b.capacity);
        let start = b.address + offset;
        LittleEndian::write_u32(&mut self.buffer[start..start + 4], value);
        offset + 4
    }

    pub fn write_vec3(&mut self, block: BlockId, offset: usize, v: Vector3<f32>) -> usize {
        let offset = self.write_f32(block, offset, v.x);
        let offset = self.write_f32(block, offset, v.y);
        self.write_f32(block, offset, v.z)
    }

    /// Writes an RGBA color as four bytes.
    pub fn write_color(&mut self, block: BlockId, offset: usize, color: [f32; 4]) -> usize {
        let bytes = [
            (color[0] * 255.0) as u8,
            (color[1] * 255.0) as u8,
            (color[2] * 255.0) as u8,
            (color[3] * 255.0) as u8,
        ];
        self.write_bytes(block, offset, &bytes)
    }

    pub fn read_bytes(&self, block: BlockId, offset: usize, len: usize) -> &[u8] {
        let b = &self.blocks[block.0];
        assert!(offset + len <= b.capacity);
        let start = b.address + offset;
        &self.buffer[start..start + len]
    }

    /// Verifies the allocator invariants: the block chain covers exactly
    /// `[0, total)` with no gaps or overlaps, the free index matches the
    /// free flags, and the index is sorted by (capacity, address).
    pub fn check(&self) {
        let mut address = 0;
        let mut free_bytes = 0;
        let mut count = 0;
        let mut cursor = Some(self.first);
        let mut previous = None;
        while let Some(bid) = cursor {
            let b = &self.blocks[bid.0];
            assert_eq!(b.address, address, "block chain has a gap or overlap");
            assert_eq!(b.previous, previous, "block chain back-link broken");
            address += b.capacity;
            if b.free {
                free_bytes += b.capacity;
                assert!(
                    self.free_blocks.contains(&bid),
                    "free block missing from the index"
                );
            }
            count += 1;
            previous = Some(bid);
            cursor = b.next;
        }
        assert_eq!(previous, Some(self.last));
        assert_eq!(address, self.total, "block chain does not cover the buffer");
        assert_eq!(free_bytes, self.free, "free byte count out of sync");
        assert_eq!(count, self.blocks.len(), "orphaned blocks in the arena");

        assert_eq!(
            self.free_blocks.len(),
            self.blocks.iter().filter(|&(_, b)| b.free).count()
        );
        for pair in self.free_blocks.windows(2) {
            let a = &self.blocks[pair[0].0];
            let b = &self.blocks[pair[1].0];
            assert!(
                (a.capacity, a.address) < (b.capacity, b.address),
                "free index out of order"
            );
        }
    }
}
