use crate::bytecode::{Register, Width, REGISTER_COUNT};

/// Sixteen 32-bit registers. `%R0` is hard-wired to zero and has no storage.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegisterFile {
  slots: [u32; (REGISTER_COUNT - 1) as usize]
}

impl RegisterFile {
  pub fn new() -> RegisterFile {
    RegisterFile::default()
  }

  pub fn reset(&mut self) {
    self.slots = Default::default();
  }

  /// The full 32-bit contents.
  pub fn get(&self, index: u8) -> u32 {
    match index & 0x0F {
      0     => 0,
      index => self.slots[index as usize - 1]
    }
  }

  pub fn set(&mut self, index: u8, value: u32) {
    if let index @ 1..=15 = index & 0x0F {
      self.slots[index as usize - 1] = value;
    }
  }

  /// Reads the view, zero-extended.
  pub fn read_unsigned(&self, register: Register) -> u32 {
    let value = self.get(register.index());
    match register.width() {
      Width::Word     => value & 0xFFFF,
      Width::LowByte  => value & 0xFF,
      Width::HighByte => (value >> 8) & 0xFF,
      Width::Dword    => value
    }
  }

  /// Reads the view, sign-extended.
  pub fn read_signed(&self, register: Register) -> i32 {
    let value = self.get(register.index());
    match register.width() {
      Width::Word     => value as u16 as i16 as i32,
      Width::LowByte  => value as u8 as i8 as i32,
      Width::HighByte => (value >> 8) as u8 as i8 as i32,
      Width::Dword    => value as i32
    }
  }

  /// Writes the low bits of `value` into the view. Bits outside the view are kept.
  pub fn write(&mut self, register: Register, value: u32) {
    let old = self.get(register.index());
    let new = match register.width() {
      Width::Word     => (old & 0xFFFF_0000) | (value & 0xFFFF),
      Width::LowByte  => (old & 0xFFFF_FF00) | (value & 0xFF),
      Width::HighByte => (old & 0xFFFF_00FF) | ((value & 0xFF) << 8),
      Width::Dword    => value
    };
    self.set(register.index(), new);
  }
}
