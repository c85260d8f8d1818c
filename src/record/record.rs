use std::fmt;

use crate::file::PageNum;

/// Slot index within a record page
pub type SlotNum = usize;

/// Record identifier: a slot within one table's data file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    pub page_num: PageNum,
    pub slot_num: SlotNum,
}

impl Rid {
    pub fn new(page_num: PageNum, slot_num: SlotNum) -> Self {
        Self { page_num, slot_num }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.page_num, self.slot_num)
    }
}

/// One fixed-width record. Scans hand records to the reader by reference;
/// the bytes are copied out of the pinned page, so keeping a record past
/// the callback is always safe.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub rid: Rid,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(data: Vec<u8>) -> Self {
        Self { rid: Rid::default(), data }
    }

    pub fn with_rid(rid: Rid, data: Vec<u8>) -> Self {
        Self { rid, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rid_display() {
        assert_eq!(Rid::new(3, 17).to_string(), "3.17");
    }

    #[test]
    fn test_rid_ordering() {
        assert!(Rid::new(1, 5) < Rid::new(2, 0));
        assert!(Rid::new(2, 0) < Rid::new(2, 1));
    }
}
