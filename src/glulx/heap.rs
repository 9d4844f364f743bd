use std::fmt;

use super::state::image::Image;
use crate::{error::*, fatal_error, recoverable_error};

/// First-fit block allocator backing the dynamic-memory opcodes.
///
/// The heap occupies `[address, address + extent)`, a region appended after
/// the image's initial memory the first time a block is requested.  The
/// extent only shrinks when the highest-addressed block is freed, and the
/// whole region is released when the last block goes.
pub struct Heap {
    address: usize,
    extent: usize,
    blocks: Vec<(usize, usize)>,
    free: Vec<(usize, usize)>,
    max_size: usize,
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Heap: {:#x}+{:#x}, {} blocks, {} free",
            self.address,
            self.extent,
            self.blocks.len(),
            self.free.len()
        )
    }
}

impl Heap {
    pub fn new(max_size: usize) -> Heap {
        Heap {
            address: 0,
            extent: 0,
            blocks: Vec::new(),
            free: Vec::new(),
            max_size,
        }
    }

    pub fn active(&self) -> bool {
        self.address != 0
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn extent(&self) -> usize {
        self.extent
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn blocks(&self) -> &[(usize, usize)] {
        &self.blocks
    }

    fn insert_block(&mut self, offset: usize, length: usize) {
        let at = self
            .blocks
            .partition_point(|(o, _)| *o < offset);
        self.blocks.insert(at, (offset, length));
    }

    /// Return a region to the free list, merging adjacent entries.
    fn insert_free(&mut self, offset: usize, length: usize) {
        let at = self.free.partition_point(|(o, _)| *o < offset);
        self.free.insert(at, (offset, length));
        let mut i = if at > 0 { at - 1 } else { at };
        while i + 1 < self.free.len() {
            let (o1, l1) = self.free[i];
            let (o2, l2) = self.free[i + 1];
            if o1 + l1 == o2 {
                self.free[i] = (o1, l1 + l2);
                self.free.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// Allocate a block, growing the address space if no free block fits.
    ///
    /// Returns the block address, or 0 when the request cannot be satisfied.
    pub fn alloc(&mut self, image: &mut Image, size: usize) -> Result<usize, RuntimeError> {
        if size == 0 {
            return Ok(0);
        }

        if !self.active() {
            self.address = image.end_mem();
            self.extent = 0;
            self.free.clear();
        }

        // First fit, splitting the remainder back into the free list
        for i in 0..self.free.len() {
            let (offset, length) = self.free[i];
            if length >= size {
                self.free.remove(i);
                if length > size {
                    self.insert_free(offset + size, length - size);
                }
                self.insert_block(offset, size);
                debug!(target: "app::heap", "Alloc {:#x} bytes at {:#x}", size, self.address + offset);
                return Ok(self.address + offset);
            }
        }

        // Grow by at least a quarter, or exactly what is needed
        let offset = self.extent;
        let mut grow = usize::max(size, self.extent / 4);
        if self.max_size > 0 && self.extent + grow > self.max_size {
            grow = size;
        }
        if self.max_size > 0 && self.extent + grow > self.max_size {
            warn!(target: "app::heap", "Alloc of {:#x} bytes exceeds heap maximum {:#x}", size, self.max_size);
            return Ok(0);
        }
        if image.set_end_mem(self.address + self.extent + grow).is_err() {
            grow = size;
            if image.set_end_mem(self.address + self.extent + grow).is_err() {
                warn!(target: "app::heap", "Alloc of {:#x} bytes exceeds available memory", size);
                return Ok(0);
            }
        }
        // Memory sizes are rounded, so take what was actually granted
        self.extent = image.end_mem() - self.address;
        if self.extent > offset + size {
            self.insert_free(offset + size, self.extent - (offset + size));
        }

        self.insert_block(offset, size);
        debug!(target: "app::heap", "Alloc {:#x} bytes at {:#x} (heap grown to {:#x})", size, self.address + offset, self.extent);
        Ok(self.address + offset)
    }

    /// Free the block at `address`.
    pub fn free(&mut self, image: &mut Image, address: usize) -> Result<(), RuntimeError> {
        if address < self.address {
            return fatal_error!(
                ErrorCode::HeapBlock,
                "Free of {:#x}, which is below the heap at {:#x}",
                address,
                self.address
            );
        }
        let offset = address - self.address;
        let i = match self.blocks.iter().position(|(o, _)| *o == offset) {
            Some(i) => i,
            None => {
                return fatal_error!(
                    ErrorCode::HeapBlock,
                    "Free of {:#x}, which is not an allocated block",
                    address
                )
            }
        };
        let (_, length) = self.blocks.remove(i);
        debug!(target: "app::heap", "Free {:#x} bytes at {:#x}", length, address);

        if self.blocks.is_empty() {
            // Last block gone: release the whole region
            self.extent = 0;
            let base = self.address;
            self.address = 0;
            self.free.clear();
            return image.set_end_mem(base);
        }

        let highest = self
            .blocks
            .iter()
            .map(|(o, l)| o + l)
            .max()
            .unwrap_or(0);
        if offset + length >= highest {
            // Freed the highest block: shrink the extent down to the next one
            self.extent = highest;
            self.trim_free();
            image.set_end_mem(self.address + self.extent)?;
        } else {
            self.insert_free(offset, length);
        }

        // If utilization dropped to half or less, shrink the backing region
        let used: usize = self.blocks.iter().map(|(_, l)| l).sum();
        if used * 2 <= self.extent && highest < self.extent {
            self.extent = highest;
            self.trim_free();
            image.set_end_mem(self.address + self.extent)?;
        }

        Ok(())
    }

    fn trim_free(&mut self) {
        let extent = self.extent;
        self.free.retain_mut(|(o, l)| {
            if *o >= extent {
                false
            } else {
                if *o + *l > extent {
                    *l = extent - *o;
                }
                true
            }
        });
    }

    /// Discard all heap state without touching memory.
    pub fn clear(&mut self) {
        self.address = 0;
        self.extent = 0;
        self.blocks.clear();
        self.free.clear();
    }

    /// Reconstruct the heap from a saved block table.
    ///
    /// The block bytes themselves live in RAM and are restored separately.
    pub fn restore(&mut self, address: usize, blocks: &[(usize, usize)]) -> Result<(), RuntimeError> {
        self.clear();
        if address == 0 || blocks.is_empty() {
            return Ok(());
        }

        let mut sorted: Vec<(usize, usize)> = blocks.to_vec();
        sorted.sort();
        for w in sorted.windows(2) {
            if w[0].0 + w[0].1 > w[1].0 {
                return recoverable_error!(
                    ErrorCode::Restore,
                    "Saved heap blocks at {:#x} and {:#x} overlap",
                    address + w[0].0,
                    address + w[1].0
                );
            }
        }

        self.address = address;
        self.extent = sorted.iter().map(|(o, l)| o + l).max().unwrap_or(0);
        // Every gap between blocks is free space
        let mut cursor = 0;
        for (o, l) in &sorted {
            if *o > cursor {
                self.free.push((cursor, o - cursor));
            }
            cursor = o + l;
        }
        self.blocks = sorted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ok, assert_ok_eq, test_util::test_image};

    fn fixture() -> (Image, Heap) {
        let image = assert_ok!(Image::new(test_image()));
        (image, Heap::new(0))
    }

    fn overlap(heap: &Heap) -> bool {
        let mut blocks: Vec<(usize, usize)> = heap.blocks().to_vec();
        blocks.sort();
        blocks.windows(2).any(|w| w[0].0 + w[0].1 > w[1].0)
    }

    #[test]
    fn test_alloc_activates() {
        let (mut image, mut heap) = fixture();
        assert!(!heap.active());
        let a = assert_ok!(heap.alloc(&mut image, 16));
        assert!(heap.active());
        assert_eq!(a, 0x100);
        assert_eq!(heap.address(), 0x100);
        assert!(image.end_mem() > 0x100);
    }

    #[test]
    fn test_alloc_no_overlap() {
        let (mut image, mut heap) = fixture();
        let mut addrs = Vec::new();
        for size in [16, 300, 8, 256, 32] {
            let a = assert_ok!(heap.alloc(&mut image, size));
            assert_ne!(a, 0);
            addrs.push(a);
        }
        assert!(!overlap(&heap));
        // Free a middle block and allocate a smaller one into the hole
        assert!(heap.free(&mut image, addrs[1]).is_ok());
        let a = assert_ok!(heap.alloc(&mut image, 100));
        assert_eq!(a, addrs[1]);
        assert!(!overlap(&heap));
    }

    #[test]
    fn test_free_all_returns_extent_to_zero() {
        let (mut image, mut heap) = fixture();
        let mut addrs = Vec::new();
        for _ in 0..4 {
            addrs.push(assert_ok!(heap.alloc(&mut image, 64)));
        }
        for a in addrs {
            assert!(heap.free(&mut image, a).is_ok());
        }
        assert_eq!(heap.extent(), 0);
        assert!(!heap.active());
        assert_eq!(image.end_mem(), 0x100);
    }

    #[test]
    fn test_free_highest_shrinks() {
        let (mut image, mut heap) = fixture();
        let a = assert_ok!(heap.alloc(&mut image, 64));
        let b = assert_ok!(heap.alloc(&mut image, 512));
        assert!(b > a);
        let before = heap.extent();
        assert!(heap.free(&mut image, b).is_ok());
        assert!(heap.extent() < before);
        assert_eq!(heap.extent(), 64);
    }

    #[test]
    fn test_free_unallocated() {
        let (mut image, mut heap) = fixture();
        let a = assert_ok!(heap.alloc(&mut image, 64));
        assert!(heap.free(&mut image, a + 4).is_err());
    }

    #[test]
    fn test_alloc_respects_maximum() {
        let image = &mut assert_ok!(Image::new(test_image()));
        let mut heap = Heap::new(128);
        assert_ne!(assert_ok!(heap.alloc(image, 64)), 0);
        assert_ok_eq!(heap.alloc(image, 1024), 0);
    }

    #[test]
    fn test_restore() {
        let (_, mut heap) = fixture();
        assert!(heap
            .restore(0x100, &[(0, 16), (32, 64)])
            .is_ok());
        assert!(heap.active());
        assert_eq!(heap.extent(), 96);
        // The gap between the blocks is free for reuse
        let mut image = assert_ok!(Image::new(test_image()));
        assert!(image.set_end_mem(0x100 + 96).is_ok());
        let a = assert_ok!(heap.alloc(&mut image, 16));
        assert_eq!(a, 0x110);
    }

    #[test]
    fn test_restore_overlap() {
        let (_, mut heap) = fixture();
        assert!(heap.restore(0x100, &[(0, 32), (16, 16)]).is_err());
    }
}
