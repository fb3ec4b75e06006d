//! Contiguous byte blocks with shared ownership.

use std::sync::Arc;

use crate::common::MemoryAddress;

/// A block of bytes anchored at a base address.
///
/// Cloning is cheap: the payload is reference counted and shared between the
/// producer (loader, memory reads) and any number of consumers. Storage is
/// freed when the last clone drops.
#[derive(Clone, Debug)]
pub struct DataBlock {
    address: MemoryAddress,
    data: Arc<[u8]>,
}

impl DataBlock {
    pub fn new(address: MemoryAddress, data: Vec<u8>) -> Self {
        Self {
            address,
            data: data.into(),
        }
    }

    /// Base address of the first byte.
    pub fn address(&self) -> MemoryAddress {
        self.address
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
