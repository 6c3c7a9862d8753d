//! Page tree
//!
//! N-ary trie keyed by the digits of the page number. The fan-out is
//! `page_size / size_of::<usize>()`, so each node's child array is one page
//! worth of pointers. Every lookup descends exactly `depth` levels: levels
//! `depth-1 ..= 1` are branches, level 0 holds the slots.
//!
//! ```text
//!   page number:  [ digit(depth-1) | ... | digit(1) | digit(0) ]
//!                        │                    │          │
//!                     Branch ──────────▶ Branch ──▶ Slots[digit(0)]
//! ```

use std::sync::Arc;

use super::page::{PageBuf, PageState};

/// State of one page slot
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Unmapped,
    Anchored,
    Allocated(Arc<PageBuf>),
}

impl Slot {
    pub fn state(&self) -> PageState {
        match self {
            Slot::Unmapped => PageState::Unmapped,
            Slot::Anchored => PageState::Anchored,
            Slot::Allocated(_) => PageState::Allocated,
        }
    }

    /// Anchored and Allocated slots are charged against capacity
    pub fn is_charged(&self) -> bool {
        !matches!(self, Slot::Unmapped)
    }
}

/// Index of `page` within a node at `level`
fn digit(page: u64, level: u32, shift: u32) -> usize {
    let shifted = page.checked_shr(shift * level).unwrap_or(0);
    (shifted & ((1u64 << shift) - 1)) as usize
}

enum Node {
    Branch(Box<[Option<Box<Node>>]>),
    Slots(Box<[Slot]>),
}

impl Node {
    fn empty(level: u32, fanout: usize) -> Box<Self> {
        let node = if level == 0 {
            Node::Slots((0..fanout).map(|_| Slot::Unmapped).collect())
        } else {
            Node::Branch((0..fanout).map(|_| None).collect())
        };
        Box::new(node)
    }

    /// Slot for `page` below this node, if the nodes along its path exist
    fn slot_mut(&mut self, page: u64, level: u32, shift: u32) -> Option<&mut Slot> {
        let idx = digit(page, level, shift);
        match self {
            Node::Slots(slots) => slots.get_mut(idx),
            Node::Branch(children) => children[idx].as_mut()?.slot_mut(page, level - 1, shift),
        }
    }

    /// Slot for `page` below this node, creating missing nodes on the way down
    fn slot_or_insert(&mut self, page: u64, level: u32, shift: u32) -> &mut Slot {
        let idx = digit(page, level, shift);
        match self {
            Node::Slots(slots) => &mut slots[idx],
            Node::Branch(children) => children[idx]
                .get_or_insert_with(|| Node::empty(level - 1, 1 << shift))
                .slot_or_insert(page, level - 1, shift),
        }
    }

    /// Unmap every slot whose page is `>= first`. Returns the number of
    /// charged slots released and whether the whole node is now droppable.
    fn release_from(&mut self, level: u32, shift: u32, base: u64, first: u64) -> (u64, bool) {
        let mut released = 0;
        match self {
            Node::Slots(slots) => {
                for (i, slot) in slots.iter_mut().enumerate() {
                    if base + i as u64 >= first && slot.is_charged() {
                        *slot = Slot::Unmapped;
                        released += 1;
                    }
                }
                (released, base >= first)
            }
            Node::Branch(children) => {
                let span = 1u64 << (shift * level);
                for (i, child) in children.iter_mut().enumerate() {
                    let Some(child_base) = (i as u64).checked_mul(span).and_then(|o| base.checked_add(o)) else {
                        break;
                    };
                    if child_base.saturating_add(span) <= first {
                        continue;
                    }
                    if let Some(node) = child {
                        let (count, drop_child) = node.release_from(level - 1, shift, child_base, first);
                        released += count;
                        if drop_child {
                            *child = None;
                        }
                    }
                }
                (released, base >= first)
            }
        }
    }
}

/// The sparse page index of a ramdisk LUN
pub struct PageTree {
    /// log2(fan-out)
    shift: u32,

    /// Number of node levels on every root-to-slot path
    depth: u32,

    root: Option<Box<Node>>,
}

impl PageTree {
    /// Build an empty tree deep enough to address `total_pages` pages
    pub fn new(page_size: usize, total_pages: u64) -> Self {
        let fanout = page_size / std::mem::size_of::<usize>();
        let shift = fanout.trailing_zeros();
        Self {
            shift,
            depth: Self::depth_for(shift, total_pages),
            root: None,
        }
    }

    fn depth_for(shift: u32, total_pages: u64) -> u32 {
        let mut depth = 1;
        while shift * depth < 64 && (1u64 << (shift * depth)) < total_pages {
            depth += 1;
        }
        depth
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn fanout(&self) -> usize {
        1 << self.shift
    }

    /// Slot for `page`, if the nodes along its path exist
    pub fn get(&self, page: u64) -> Option<&Slot> {
        let mut node = self.root.as_deref()?;
        let mut level = self.depth - 1;
        loop {
            let idx = digit(page, level, self.shift);
            node = match node {
                Node::Branch(children) => children[idx].as_deref()?,
                Node::Slots(slots) => return slots.get(idx),
            };
            level -= 1;
        }
    }

    /// Mutable slot for `page`, without creating missing nodes
    pub fn get_mut(&mut self, page: u64) -> Option<&mut Slot> {
        let (level, shift) = (self.depth - 1, self.shift);
        self.root.as_mut()?.slot_mut(page, level, shift)
    }

    /// Mutable slot for `page`, creating missing nodes along the path
    pub fn get_or_insert(&mut self, page: u64) -> &mut Slot {
        let (level, shift, fanout) = (self.depth - 1, self.shift, self.fanout());
        self.root
            .get_or_insert_with(|| Node::empty(level, fanout))
            .slot_or_insert(page, level, shift)
    }

    /// Push root levels until the tree addresses `total_pages`. Never shrinks.
    pub fn grow(&mut self, total_pages: u64) {
        let target = Self::depth_for(self.shift, total_pages);
        while self.depth < target {
            if let Some(old_root) = self.root.take() {
                let mut children: Box<[Option<Box<Node>>]> = (0..self.fanout()).map(|_| None).collect();
                children[0] = Some(old_root);
                self.root = Some(Box::new(Node::Branch(children)));
            }
            self.depth += 1;
        }
    }

    /// Unmap every page `>= first`, returning how many charged pages went away
    pub fn release_from(&mut self, first: u64) -> u64 {
        let (shift, level) = (self.shift, self.depth - 1);
        match self.root.as_mut() {
            Some(root) => {
                let (released, drop_root) = root.release_from(level, shift, 0, first);
                if drop_root {
                    self.root = None;
                }
                released
            }
            None => 0,
        }
    }

    /// Drop every node
    pub fn clear(&mut self) {
        self.root = None;
    }
}
