//! Open-box stack
//!
//! While the walker descends into the container it keeps one
//! [`BoxDescriptor`] per open box, outermost first. Content accounting flows
//! upward: closing a box adds its whole declared size to its parent, and a
//! parent that is thereby exhausted closes as well.

use super::{format_fourcc, FourCc};

/// One open box
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxDescriptor {
    /// Box type
    pub box_type: FourCc,
    /// Declared size, header included
    pub declared_size: u64,
    /// Header length (8, or 16 for extended size)
    pub header_len: u64,
    /// Bytes of this box already accounted for, header included
    pub consumed: u64,
    /// Output offset of this box's 32-bit size field
    pub position: u64,
}

impl BoxDescriptor {
    /// Descriptor for a box whose header has just been read
    pub fn new(box_type: FourCc, declared_size: u64, header_len: u64, position: u64) -> Self {
        Self {
            box_type,
            declared_size,
            header_len,
            consumed: header_len,
            position,
        }
    }

    /// Declared bytes not yet accounted for
    pub fn remaining(&self) -> u64 {
        self.declared_size.saturating_sub(self.consumed)
    }

    /// Whether every declared byte has been accounted for
    pub fn is_exhausted(&self) -> bool {
        self.consumed >= self.declared_size
    }

    /// Whether the header uses the 64-bit size form
    pub fn is_extended(&self) -> bool {
        self.header_len > super::HEADER_LEN
    }
}

impl std::fmt::Display for BoxDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{} ({}/{})",
            format_fourcc(&self.box_type),
            self.position,
            self.consumed,
            self.declared_size
        )
    }
}

/// Currently open boxes, outermost first
#[derive(Debug, Default, Clone)]
pub struct BoxStack {
    boxes: Vec<BoxDescriptor>,
}

impl BoxStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, descriptor: BoxDescriptor) {
        self.boxes.push(descriptor);
    }

    /// Innermost open box
    pub fn top(&self) -> Option<&BoxDescriptor> {
        self.boxes.last()
    }

    pub fn depth(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Open boxes, outermost first
    pub fn iter(&self) -> impl Iterator<Item = &BoxDescriptor> {
        self.boxes.iter()
    }

    /// Every open box except the innermost one
    pub fn ancestors(&self) -> impl Iterator<Item = &BoxDescriptor> {
        let n = self.boxes.len().saturating_sub(1);
        self.boxes[..n].iter()
    }

    /// Room left in the innermost open box, `None` at top level
    pub fn remaining(&self) -> Option<u64> {
        self.top().map(BoxDescriptor::remaining)
    }

    /// Close the innermost box and every ancestor it exhausts
    ///
    /// The innermost box counts as fully consumed regardless of its
    /// `consumed` counter. Returns the innermost box and the number of boxes
    /// popped in total.
    pub fn close_top(&mut self) -> Option<(BoxDescriptor, usize)> {
        let mut closed = self.boxes.pop()?;
        closed.consumed = closed.declared_size;
        let innermost = closed.clone();
        let mut popped = 1;

        while let Some(parent) = self.boxes.last_mut() {
            parent.consumed += closed.declared_size;
            if !parent.is_exhausted() {
                break;
            }
            // Checked non-empty by the loop condition
            let Some(parent) = self.boxes.pop() else {
                break;
            };
            closed = parent;
            popped += 1;
        }

        Some((innermost, popped))
    }
}
