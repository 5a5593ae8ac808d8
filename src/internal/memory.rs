use alloc::sync::Arc;
use core::{alloc::Layout, ptr::NonNull};

use linked_list_allocator::LockedHeap;
use log::trace;

/// alignment of every block handed out to the kernel
const BLOCK_ALIGN: usize = 8;

/// An allocation owned by exactly one kernel object.
///
/// A `Block` cannot be cloned, so handing it back to `MemoryAllocator::free`
/// consumes the only reference and a double free cannot be written.
#[derive(Debug)]
pub struct Block {
    ptr: NonNull<u8>,
    size: usize,
}

// A block is the sole owner of its bytes, so moving it across the kernel lock is fine.
unsafe impl Send for Block {}

impl Block {
    /// size of the allocation in bytes
    pub fn len(&self) -> usize {
        self.size
    }

    /// true for zero-sized blocks, which allocators never hand out
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// view the allocation as bytes
    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// view the allocation as mutable bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    fn layout(&self) -> Layout {
        // the layout was valid when the block was created
        unsafe { Layout::from_size_align_unchecked(self.size, BLOCK_ALIGN) }
    }
}

/// The byte-granular allocator the scheduler and the serial driver draw from.
pub trait MemoryAllocator {
    /// allocate `size` bytes, `None` once the allocator is exhausted
    fn alloc(&self, size: usize) -> Option<Block>;
    /// give a block back
    fn free(&self, block: Block);
}

impl MemoryAllocator for LockedHeap {
    fn alloc(&self, size: usize) -> Option<Block> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, BLOCK_ALIGN).ok()?;
        let ptr = self.lock().allocate_first_fit(layout).ok()?;
        trace!("alloc {} bytes at {:#x}", size, ptr.as_ptr() as usize);
        Some(Block { ptr, size })
    }

    fn free(&self, block: Block) {
        trace!("free {} bytes at {:#x}", block.size, block.ptr.as_ptr() as usize);
        let layout = block.layout();
        unsafe { self.lock().deallocate(block.ptr, layout) }
    }
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for Arc<A> {
    fn alloc(&self, size: usize) -> Option<Block> {
        (**self).alloc(size)
    }

    fn free(&self, block: Block) {
        (**self).free(block)
    }
}

impl<A: MemoryAllocator + ?Sized> MemoryAllocator for &A {
    fn alloc(&self, size: usize) -> Option<Block> {
        (**self).alloc(size)
    }

    fn free(&self, block: Block) {
        (**self).free(block)
    }
}

/// Build a heap over a leaked arena of `size` bytes.
///
/// Used by host-side runs, where there is no kernel heap region to hand over.
pub fn leaked_heap(size: usize) -> Arc<LockedHeap> {
    let arena: &'static mut [u8] =
        alloc::boxed::Box::leak(alloc::vec![0u8; size].into_boxed_slice());
    let heap = LockedHeap::empty();
    unsafe { heap.lock().init(arena.as_mut_ptr(), arena.len()) };
    Arc::new(heap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_zeroable_and_returned() {
        let heap = leaked_heap(4096);
        let mut block = heap.alloc(64).unwrap();
        block.as_mut_slice().fill(0xAA);
        assert!(block.as_slice().iter().all(|&b| b == 0xAA));
        assert_eq!(block.len(), 64);
        heap.free(block);
        assert!(heap.alloc(64).is_some());
    }

    #[test]
    fn exhausted_heap_yields_none() {
        let heap = leaked_heap(1024);
        assert!(heap.alloc(4096).is_none());
        assert!(heap.alloc(0).is_none());
    }
}
