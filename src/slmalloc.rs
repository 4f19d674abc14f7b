// Core of the seg-list allocator: boundary-tagged blocks on one contiguous
// heap segment, indexed by 30 size-class free lists.
//
// Heap layout:
//
//   seg base                                                       seg end
//   |                                                                   |
//   [pad 8][hdr][block.....][hdr][block...]...............[epilogue hdr]
//           |                                              size 0, alloc
//           first block, base pointer 8-aligned
//
// A block's 4-byte header packs `size << 2 | prev_alloc << 1 | curr_alloc`.
// Free blocks mirror the header into their last 4 bytes and keep two 4-byte
// list links at the front of the payload, so the minimum block size is 12.
// Allocated blocks have no footer; the `prev_alloc` bit of the successor is
// the only record of their status, which is what lets the coalescer walk
// backwards only over free neighbors.

use core::cmp;
use core::ptr;
use core::ptr::null_mut;

use crate::common::align_up;
use crate::segment::{HeapSegment, MAX_SEGMENT_SIZE, SEGMENT_INIT};
use crate::slassert;
use crate::slverbose;
use crate::slverbose::{SL_VERBOSE, VERBOSE_DEL};

extern crate static_assertions;

const HDR_SIZE: usize = 4;
const FTR_SIZE: usize = 4;
const HDR_FTR_SIZE: usize = 8;
const LINK_SIZE: usize = 4;
const MIN_BLK_SIZE: usize = 12;

/// Only this alignment is offered; requests for more get a null back.
pub const ALIGNMENT: usize = 8;

const NBUCKETS: usize = 30;
const INIT_NPAGES: usize = 3;

// Per-bucket examination limits. They bound the worst-case search at the
// cost of sometimes skipping a usable block further down a list.
const BUCKET_CUTOFF: usize = 5;
const BEST_FIT_CUTOFF: usize = 15;

// Multiplier for the size of a moved reallocation.
const REALLOC_MULT: usize = 1;

// List links are stored as 4-byte offsets from the segment base, never as
// native pointers, so a 12-byte free block holds both links plus the footer
// on 64-bit targets too.
const NIL: u32 = u32::MAX;
// The first node's prev link carries this tag plus its bucket index instead
// of a block offset; remove branches on the tag to reach the head slot.
const HEAD_TAG: u32 = 1 << 31;

static BEST_FIT: bool = cfg!(feature = "best-fit");

static_assertions::const_assert_eq!(MIN_BLK_SIZE, 2 * LINK_SIZE + FTR_SIZE);
static_assertions::const_assert_eq!(MIN_BLK_SIZE % ALIGNMENT, HDR_SIZE);
static_assertions::const_assert!((MAX_SEGMENT_SIZE as u64) <= HEAD_TAG as u64);

/// One heap instance: the segment plus the free-list head slots. All block
/// state lives on the heap itself; nothing here is process-global, so
/// independent heaps can coexist.
pub struct Slmalloc {
    heads: [u32; NBUCKETS],
    segment: HeapSegment,
}

unsafe impl Send for Slmalloc {}

pub const SLMALLOC_INIT: Slmalloc = Slmalloc {
    heads: [NIL; NBUCKETS],
    segment: SEGMENT_INIT,
};

/// Maps a block size onto its size class: blocks with size in
/// `[2^k, 2^(k+1))` share a bucket. Sizes are at least `MIN_BLK_SIZE`, so
/// `leading_zeros` never sees zero.
fn bucket_index(size: usize) -> usize {
    let bucket = NBUCKETS as i32 - (size as u32).leading_zeros() as i32 - 2;
    if bucket < 0 {
        0
    } else if bucket > NBUCKETS as i32 - 1 {
        NBUCKETS - 1
    } else {
        bucket as usize
    }
}

/// Translates a requested payload size into a block size: at least
/// `MIN_BLK_SIZE`, and `12 + 8k` otherwise, so that `bp + size + HDR_SIZE`
/// lands on the next 8-aligned base pointer.
fn adjust_block_size(requested: usize) -> usize {
    if requested <= MIN_BLK_SIZE {
        MIN_BLK_SIZE
    } else {
        align_up(requested - HDR_SIZE, ALIGNMENT) + HDR_SIZE
    }
}

// Header/footer primitives over a block base pointer. No bounds checking
// here; callers only hand these valid blocks.
struct Block;

impl Block {
    unsafe fn hdr(bp: *mut u8) -> *mut u32 {
        bp.sub(HDR_SIZE) as *mut u32
    }

    unsafe fn word_size(p: *mut u32) -> usize {
        (*p >> 2) as usize
    }

    unsafe fn size(bp: *mut u8) -> usize {
        Block::word_size(Block::hdr(bp))
    }

    unsafe fn set_size(bp: *mut u8, size: usize) {
        let hdr = Block::hdr(bp);
        *hdr = (*hdr & 0x3) | ((size as u32) << 2);
    }

    unsafe fn curr_alloc(bp: *mut u8) -> bool {
        *Block::hdr(bp) & 0x1 != 0
    }

    unsafe fn set_curr_alloc(bp: *mut u8, alloc: bool) {
        let hdr = Block::hdr(bp);
        *hdr = (*hdr & !0x1) | alloc as u32;
    }

    unsafe fn prev_alloc(bp: *mut u8) -> bool {
        *Block::hdr(bp) & 0x2 != 0
    }

    unsafe fn set_prev_alloc(bp: *mut u8, alloc: bool) {
        let hdr = Block::hdr(bp);
        *hdr = (*hdr & !0x2) | ((alloc as u32) << 1);
    }

    unsafe fn write_header(bp: *mut u8, size: usize, curr_alloc: bool, prev_alloc: bool) {
        *Block::hdr(bp) = ((size as u32) << 2) | ((prev_alloc as u32) << 1) | curr_alloc as u32;
    }

    unsafe fn ftr(bp: *mut u8) -> *mut u32 {
        bp.add(Block::size(bp) - FTR_SIZE) as *mut u32
    }

    /// Mirrors the header into the last 4 bytes of the block. Only free
    /// blocks carry a footer; it is how a successor finds where its free
    /// predecessor starts.
    unsafe fn write_footer(bp: *mut u8) {
        *Block::ftr(bp) = *Block::hdr(bp);
    }

    unsafe fn next(bp: *mut u8) -> *mut u8 {
        bp.add(Block::size(bp) + HDR_SIZE)
    }

    /// Valid only while the previous block is free: reads its footer at
    /// `bp - 8` to step over it.
    unsafe fn prev(bp: *mut u8) -> *mut u8 {
        let ftr = bp.sub(HDR_FTR_SIZE) as *mut u32;
        bp.sub(HDR_SIZE + Block::word_size(ftr))
    }

    unsafe fn next_link(bp: *mut u8) -> *mut u32 {
        bp as *mut u32
    }

    unsafe fn prev_link(bp: *mut u8) -> *mut u32 {
        bp.add(LINK_SIZE) as *mut u32
    }
}

#[allow(clippy::missing_safety_doc)]
impl Slmalloc {
    fn base(&self) -> *mut u8 {
        self.segment.base()
    }

    unsafe fn off(&self, bp: *mut u8) -> u32 {
        (bp as usize - self.base() as usize) as u32
    }

    unsafe fn at(&self, off: u32) -> *mut u8 {
        self.base().add(off as usize)
    }

    /// Formats the whole committed segment as one free block between the
    /// 8-byte prologue pad and the zero-size epilogue header. The pad is
    /// treated as an allocated sentinel, so the first block never looks
    /// backwards.
    pub unsafe fn init(&mut self) -> bool {
        if self.segment.init(INIT_NPAGES).is_null() {
            return false;
        }
        self.heads = [NIL; NBUCKETS];

        let block = self.base().add(ALIGNMENT);
        Block::write_header(block, self.segment.size() - ALIGNMENT - HDR_SIZE, false, true);
        Block::write_footer(block);
        self.insert_free_list(block);

        let epilogue = Block::next(block);
        Block::write_header(epilogue, 0, true, false);

        self.check_state();
        true
    }

    pub unsafe fn malloc(&mut self, requested: usize) -> *mut u8 {
        slverbose!("{}", VERBOSE_DEL);
        slverbose!("MALLOC: size = {:#x}", requested);
        self.print_heap();
        self.check_state();

        if requested == 0 {
            // spurious request, not an error
            return null_mut();
        }
        if requested >= MAX_SEGMENT_SIZE {
            return null_mut();
        }

        let adjusted = adjust_block_size(requested);
        let mut block = if BEST_FIT {
            self.best_fit(adjusted)
        } else {
            self.first_fit(adjusted)
        };

        if block.is_null() {
            block = self.extend_heap(adjusted);
            if block.is_null() {
                return null_mut();
            }
        }

        let total = Block::size(block);
        slassert!(total >= adjusted);

        let block = if total < adjusted + HDR_SIZE + MIN_BLK_SIZE {
            // The leftover would be too small to stand alone, so the whole
            // block is consumed.
            self.remove_free_list(block);
            Block::set_curr_alloc(block, true);
            Block::set_prev_alloc(Block::next(block), true);
            block
        } else {
            self.remove_free_list(block);
            self.split_block(block, adjusted, total - adjusted - HDR_SIZE)
        };

        slverbose!("MALLOC: result mem {:?}", block);
        self.check_state();
        block
    }

    pub unsafe fn free(&mut self, ptr: *mut u8) {
        slverbose!("{}", VERBOSE_DEL);
        slverbose!("FREE: mem = {:?}", ptr);
        self.check_state();

        if ptr.is_null() {
            return;
        }
        self.coalesce(ptr);
        self.check_state();
    }

    pub unsafe fn realloc(&mut self, old_ptr: *mut u8, new_size: usize) -> *mut u8 {
        if old_ptr.is_null() {
            return self.malloc(new_size);
        }
        if new_size == 0 {
            self.free(old_ptr);
            return null_mut();
        }

        slverbose!("{}", VERBOSE_DEL);
        slverbose!("REALLOC: mem = {:?}, size = {:#x}", old_ptr, new_size);
        self.check_state();

        if new_size >= MAX_SEGMENT_SIZE {
            return null_mut();
        }

        let old_size = Block::size(old_ptr);
        let adjusted = adjust_block_size(new_size);

        // Shrink in place: the oversize stays as internal fragmentation,
        // the tail is deliberately not split off.
        if adjusted <= old_size {
            return old_ptr;
        }

        // Grow in place by absorbing a free successor.
        let next = Block::next(old_ptr);
        if !Block::curr_alloc(next) {
            let combined = old_size + Block::size(next) + HDR_SIZE;
            if adjusted < combined {
                slverbose!("REALLOC: absorb next [{:?}, {:#x}]", next, Block::size(next));
                Block::set_prev_alloc(Block::next(next), true);
                Block::set_size(old_ptr, combined);
                // lands inside the block, harmless for an allocated one
                Block::write_footer(old_ptr);
                self.remove_free_list(next);
                self.check_state();
                return old_ptr;
            }
        }

        // Move: on failure the old block is left untouched.
        let new_ptr = self.malloc(new_size * REALLOC_MULT);
        if new_ptr.is_null() {
            return null_mut();
        }
        ptr::copy_nonoverlapping(old_ptr, new_ptr, cmp::min(old_size, new_size));
        self.free(old_ptr);
        new_ptr
    }

    /// Sum of the sizes of all allocated blocks.
    pub unsafe fn alloced_mem_size(&self) -> usize {
        if self.base().is_null() {
            return 0;
        }
        let mut size = 0;
        let mut bp = self.base().add(ALIGNMENT);
        while Block::size(bp) != 0 {
            if Block::curr_alloc(bp) {
                size += Block::size(bp);
            }
            bp = Block::next(bp);
        }
        size
    }

    // Heap growth when the index has no fit. The new region starts where the
    // old epilogue header was, so its base pointer inherits that header and
    // with it the status of the last real block.
    unsafe fn extend_heap(&mut self, adjusted: usize) -> *mut u8 {
        let page = HeapSegment::page_size();
        let nbytes = align_up(adjusted, page);

        let mut block = self.segment.extend(nbytes / page);
        if block.is_null() {
            return null_mut();
        }
        slverbose!("EXTEND: {:#x} bytes at {:?}", nbytes, block);

        if !Block::prev_alloc(block) {
            // The last block was free: grow it in place over the new pages.
            let prev = Block::prev(block);
            let prev_size = Block::size(prev);
            let total = prev_size + nbytes;
            Block::set_size(prev, total);
            Block::write_footer(prev);
            self.update_bucket(prev, prev_size, total);
            block = prev;
        } else {
            // The old epilogue header becomes the header of the new block;
            // its prev_alloc bit is already correct.
            Block::set_size(block, nbytes - HDR_SIZE);
            Block::set_curr_alloc(block, false);
            Block::write_footer(block);
            self.insert_free_list(block);
        }

        let epilogue = Block::next(block);
        Block::write_header(epilogue, 0, true, false);
        block
    }

    /// Splits an already-unlinked free block: the free remainder keeps the
    /// lower address and the allocated part is carved from the top. Under
    /// reallocation-heavy loads this leaves the freed tail of one request
    /// adjacent to the next one.
    unsafe fn split_block(&mut self, block: *mut u8, alloc_bytes: usize, free_bytes: usize) -> *mut u8 {
        Block::set_size(block, free_bytes);
        Block::set_curr_alloc(block, false);
        Block::write_footer(block);
        self.insert_free_list(block);

        let alloc_block = Block::next(block);
        Block::write_header(alloc_block, alloc_bytes, true, false);
        Block::set_prev_alloc(Block::next(alloc_block), true);
        alloc_block
    }

    // The four-case merge state machine, keyed on the status of both
    // neighbors. A free predecessor is already indexed, so those cases
    // re-bucket it instead of inserting.
    unsafe fn coalesce(&mut self, block: *mut u8) -> *mut u8 {
        let next = Block::next(block);
        let prev_is_alloc = Block::prev_alloc(block);
        let next_is_alloc = Block::curr_alloc(next);
        let size = Block::size(block);

        if prev_is_alloc && next_is_alloc {
            Block::set_curr_alloc(block, false);
            Block::write_footer(block);
            Block::set_prev_alloc(next, false);
            self.insert_free_list(block);
            block
        } else if prev_is_alloc && !next_is_alloc {
            // merge with next; the block beyond it already records a free
            // predecessor
            let new_size = size + Block::size(next) + HDR_SIZE;
            Block::set_size(block, new_size);
            Block::set_curr_alloc(block, false);
            Block::write_footer(block);
            self.insert_free_list(block);
            self.remove_free_list(next);
            block
        } else if !prev_is_alloc && next_is_alloc {
            // merge into prev, which stays indexed
            let prev = Block::prev(block);
            let prev_size = Block::size(prev);
            let new_size = prev_size + size + HDR_SIZE;
            Block::set_size(prev, new_size);
            Block::write_footer(prev);
            self.update_bucket(prev, prev_size, new_size);
            Block::set_prev_alloc(next, false);
            prev
        } else {
            // merge all three into prev
            let prev = Block::prev(block);
            let prev_size = Block::size(prev);
            let new_size = prev_size + size + Block::size(next) + HDR_FTR_SIZE;
            Block::set_size(prev, new_size);
            Block::write_footer(prev);
            self.update_bucket(prev, prev_size, new_size);
            self.remove_free_list(next);
            prev
        }
    }

    // Free-list index maintenance. Insert is LIFO at the bucket head.

    unsafe fn insert_free_list(&mut self, block: *mut u8) {
        let bucket = bucket_index(Block::size(block));
        let head = self.heads[bucket];

        *Block::next_link(block) = head;
        *Block::prev_link(block) = HEAD_TAG | bucket as u32;
        if head != NIL {
            *Block::prev_link(self.at(head)) = self.off(block);
        }
        self.heads[bucket] = self.off(block);
    }

    unsafe fn remove_free_list(&mut self, block: *mut u8) {
        let next = *Block::next_link(block);
        let prev = *Block::prev_link(block);

        if prev & HEAD_TAG != 0 {
            self.heads[(prev & !HEAD_TAG) as usize] = next;
        } else {
            *Block::next_link(self.at(prev)) = next;
        }
        if next != NIL {
            *Block::prev_link(self.at(next)) = prev;
        }
    }

    /// Moves a resized free block between buckets when its size class
    /// changed. The links themselves stay valid across a pure size change.
    unsafe fn update_bucket(&mut self, block: *mut u8, old_size: usize, new_size: usize) {
        if bucket_index(old_size) != bucket_index(new_size) {
            self.remove_free_list(block);
            self.insert_free_list(block);
        }
    }

    unsafe fn first_fit(&self, target: usize) -> *mut u8 {
        for bucket in bucket_index(target)..NBUCKETS {
            let mut examined = 0;
            let mut curr = self.heads[bucket];
            while curr != NIL {
                if examined == BUCKET_CUTOFF {
                    break;
                }
                examined += 1;

                let bp = self.at(curr);
                if Block::size(bp) >= target {
                    return bp;
                }
                curr = *Block::next_link(bp);
            }
        }
        null_mut()
    }

    unsafe fn best_fit(&self, target: usize) -> *mut u8 {
        for bucket in bucket_index(target)..NBUCKETS {
            let mut examined = 0;
            let mut smallest_left = usize::MAX;
            let mut best = null_mut();

            let mut curr = self.heads[bucket];
            while curr != NIL {
                if examined == BEST_FIT_CUTOFF {
                    break;
                }
                examined += 1;

                let bp = self.at(curr);
                let size = Block::size(bp);
                if size >= target && size - target < smallest_left {
                    smallest_left = size - target;
                    best = bp;
                }
                curr = *Block::next_link(bp);
            }
            if !best.is_null() {
                return best;
            }
        }
        null_mut()
    }

    // Sanity checks

    unsafe fn check_state(&self) {
        slassert!(self.validate());
    }

    /// Read-only invariant check over the whole heap: one contiguous walk
    /// from the first block to the epilogue, then a walk of every bucket
    /// list. Returns false on the first violation.
    pub unsafe fn validate(&self) -> bool {
        if self.base().is_null() {
            return true;
        }
        let base = self.base();
        let end = base.add(self.segment.size());

        let mut bp = base.add(ALIGNMENT);
        let mut prev_alloc = true;
        let mut free_blocks = 0usize;
        loop {
            if (bp as usize) % ALIGNMENT != 0 {
                return self.invariant_failed(bp, "misaligned base pointer");
            }
            if bp < base || bp > end {
                return self.invariant_failed(bp, "base pointer outside segment");
            }
            if Block::prev_alloc(bp) != prev_alloc {
                return self.invariant_failed(bp, "stale prev_alloc bit");
            }

            let size = Block::size(bp);
            if size == 0 {
                // epilogue terminates the walk and must sit at the very end
                if !Block::curr_alloc(bp) {
                    return self.invariant_failed(bp, "epilogue not allocated");
                }
                if bp != end {
                    return self.invariant_failed(bp, "epilogue not at segment end");
                }
                break;
            }
            if size < MIN_BLK_SIZE || size % ALIGNMENT != HDR_SIZE {
                return self.invariant_failed(bp, "bad block size");
            }

            if Block::curr_alloc(bp) {
                prev_alloc = true;
            } else {
                if !prev_alloc {
                    return self.invariant_failed(bp, "adjacent free blocks");
                }
                if *Block::ftr(bp) != *Block::hdr(bp) {
                    return self.invariant_failed(bp, "footer does not mirror header");
                }
                if !self.in_bucket_list(bp) {
                    return self.invariant_failed(bp, "free block missing from its bucket");
                }
                free_blocks += 1;
                prev_alloc = false;
            }
            bp = Block::next(bp);
        }

        // Every listed node must be a free block of this bucket's class and
        // the prev links must mirror the next links.
        let mut listed = 0usize;
        for bucket in 0..NBUCKETS {
            let mut prev_word = HEAD_TAG | bucket as u32;
            let mut curr = self.heads[bucket];
            while curr != NIL {
                let bp = self.at(curr);
                if Block::curr_alloc(bp) {
                    return self.invariant_failed(bp, "allocated block on a free list");
                }
                if bucket_index(Block::size(bp)) != bucket {
                    return self.invariant_failed(bp, "free block in the wrong bucket");
                }
                if *Block::prev_link(bp) != prev_word {
                    return self.invariant_failed(bp, "broken prev link");
                }
                listed += 1;
                if listed > free_blocks {
                    return self.invariant_failed(bp, "free-list cycle");
                }
                prev_word = curr;
                curr = *Block::next_link(bp);
            }
        }
        if listed != free_blocks {
            return self.invariant_failed(null_mut(), "free-list membership count off");
        }
        true
    }

    unsafe fn in_bucket_list(&self, block: *mut u8) -> bool {
        let target = self.off(block);
        let mut steps = self.segment.size() / MIN_BLK_SIZE;
        let mut curr = self.heads[bucket_index(Block::size(block))];
        while curr != NIL && steps != 0 {
            if curr == target {
                return true;
            }
            curr = *Block::next_link(self.at(curr));
            steps -= 1;
        }
        false
    }

    unsafe fn invariant_failed(&self, bp: *mut u8, what: &str) -> bool {
        slverbose!("VALIDATE: {} at {:?}", what, bp);
        false
    }

    // Dumps

    unsafe fn print_heap(&self) {
        if !SL_VERBOSE || self.base().is_null() {
            return;
        }
        let mut i = 0;
        let mut bp = self.base().add(ALIGNMENT);
        loop {
            let size = Block::size(bp);
            slverbose!(
                "HEAP: block{} [{:?}, {:#x}]{}{}",
                i,
                bp,
                size,
                if Block::curr_alloc(bp) { "c" } else { "" },
                if Block::prev_alloc(bp) { "p" } else { "" }
            );
            if size == 0 {
                break;
            }
            bp = Block::next(bp);
            i += 1;
        }
    }
}
