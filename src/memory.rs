/*!
  The address space. A `MemoryUnit` dispatches each 32-bit address to the handler of the region
  containing it. Regions never overlap and an address outside every region is a fault.

  Multi-byte values are big-endian, matching the instruction stream.
*/

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum MemoryError {
  #[error("memory access violation at 0x{0:08x}")]
  Unmapped(u32),

  #[error("region at 0x{base:08x} overlaps the region at 0x{existing:08x}")]
  Overlap {
    base     : u32,
    existing : u32
  },

  #[error("region at 0x{base:08x} of {capacity} bytes extends past the address space")]
  OutOfAddressSpace {
    base     : u32,
    capacity : u32
  },

  #[error("region at 0x{0:08x} is empty")]
  EmptyRegion(u32),
}

/// A device or store occupying one region. Offsets are relative to the region base and always
/// below `capacity()`.
pub trait MemoryHandler {
  fn capacity(&self) -> u32;
  fn read_byte(&self, offset: u32) -> u8;
  fn write_byte(&mut self, offset: u32, value: u8);
}

/// Plain byte array storage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GenericMemory {
  bytes: Vec<u8>
}

impl GenericMemory {
  pub fn new(capacity: u32) -> GenericMemory {
    GenericMemory { bytes: vec![0; capacity as usize] }
  }

  /// A region of `capacity` bytes starting with `contents`. The region grows to fit `contents`.
  pub fn with_contents(capacity: u32, contents: &[u8]) -> GenericMemory {
    let mut bytes = contents.to_vec();
    if bytes.len() < capacity as usize {
      bytes.resize(capacity as usize, 0);
    }
    GenericMemory { bytes }
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.bytes
  }
}

impl From<Vec<u8>> for GenericMemory {
  fn from(bytes: Vec<u8>) -> GenericMemory {
    GenericMemory { bytes }
  }
}

impl MemoryHandler for GenericMemory {
  fn capacity(&self) -> u32 {
    self.bytes.len() as u32
  }

  fn read_byte(&self, offset: u32) -> u8 {
    self.bytes[offset as usize]
  }

  fn write_byte(&mut self, offset: u32, value: u8) {
    self.bytes[offset as usize] = value;
  }
}

#[derive(Default)]
pub struct MemoryUnit {
  regions: BTreeMap<u32, Box<dyn MemoryHandler>>
}

impl Debug for MemoryUnit {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_list()
     .entries(self.regions.iter().map(|(base, handler)| (*base, handler.capacity())))
     .finish()
  }
}

impl MemoryUnit {
  pub fn new() -> MemoryUnit {
    MemoryUnit::default()
  }

  pub fn map<H>(&mut self, base: u32, handler: H) -> Result<(), MemoryError>
    where H: MemoryHandler + 'static
  {
    let capacity = handler.capacity();
    if capacity == 0 {
      return Err(MemoryError::EmptyRegion(base));
    }
    let end = base as u64 + capacity as u64;
    if end > 1u64 << 32 {
      return Err(MemoryError::OutOfAddressSpace { base, capacity });
    }

    // The region with the greatest base below `end` is the only candidate for an overlap.
    if let Some((existing, region)) = self.regions.range(..=(end - 1) as u32).next_back() {
      if *existing as u64 + region.capacity() as u64 > base as u64 {
        return Err(MemoryError::Overlap { base, existing: *existing });
      }
    }

    debug!(base, capacity, "mapping memory region");
    self.regions.insert(base, Box::new(handler));
    Ok(())
  }

  pub fn is_mapped(&self, address: u32) -> bool {
    self.locate(address).is_ok()
  }

  fn locate(&self, address: u32) -> Result<(u32, &dyn MemoryHandler), MemoryError> {
    match self.regions.range(..=address).next_back() {
      Some((base, region)) if address - base < region.capacity() => Ok((*base, &**region)),
      _ => Err(MemoryError::Unmapped(address))
    }
  }

  pub fn read(&self, address: u32) -> Result<u8, MemoryError> {
    let (base, region) = self.locate(address)?;
    Ok(region.read_byte(address - base))
  }

  pub fn write(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
    let base = self.locate(address)?.0;
    match self.regions.get_mut(&base) {
      Some(region) => {
        region.write_byte(address - base, value);
        Ok(())
      }
      None => Err(MemoryError::Unmapped(address))
    }
  }

  /// Fills `buffer` from consecutive addresses, wrapping at the top of the address space.
  pub fn read_bytes(&self, address: u32, buffer: &mut [u8]) -> Result<(), MemoryError> {
    for (i, byte) in buffer.iter_mut().enumerate() {
      *byte = self.read(address.wrapping_add(i as u32))?;
    }
    Ok(())
  }

  pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
    for (i, byte) in bytes.iter().enumerate() {
      self.write(address.wrapping_add(i as u32), *byte)?;
    }
    Ok(())
  }

  pub fn read_u16(&self, address: u32) -> Result<u16, MemoryError> {
    let mut buffer = [0u8; 2];
    self.read_bytes(address, &mut buffer)?;
    Ok(u16::from_be_bytes(buffer))
  }

  pub fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
    let mut buffer = [0u8; 4];
    self.read_bytes(address, &mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
  }

  pub fn write_u16(&mut self, address: u32, value: u16) -> Result<(), MemoryError> {
    self.write_bytes(address, &value.to_be_bytes())
  }

  pub fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
    self.write_bytes(address, &value.to_be_bytes())
  }
}
