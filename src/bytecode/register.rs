/*!
  Register operands: a register index together with the width view through which the
  instruction reads and writes it. Without a REX prefix only `%R0`..`%R7` in word view are
  expressible.
*/

use std::fmt::{Display, Formatter};

use bimap::BiMap;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const REGISTER_COUNT: u8 = 16;
pub const SP_INDEX: u8 = 8;
pub const BP_INDEX: u8 = 9;

/// The part of a 32-bit register an operand refers to. The discriminant is the 2-bit REX code.
#[derive(TryFromPrimitive, IntoPrimitive, Clone, Copy, Eq, PartialEq, Debug, Hash)]
#[repr(u8)]
pub enum Width {
  /// Bits 0..15
  Word     = 0,
  /// Bits 0..7
  LowByte  = 1,
  /// Bits 8..15
  HighByte = 2,
  /// Bits 0..31
  Dword    = 3,
}

impl Width {
  pub fn suffix(&self) -> char {
    match self {
      Width::Word     => 'W',
      Width::LowByte  => 'L',
      Width::HighByte => 'H',
      Width::Dword    => 'D',
    }
  }

  pub fn bits(&self) -> u32 {
    match self {
      Width::Word                      => 16,
      Width::LowByte | Width::HighByte => 8,
      Width::Dword                     => 32,
    }
  }

  fn from_rex_bits(bits: u16) -> Width {
    match bits & 0b11 {
      0 => Width::Word,
      1 => Width::LowByte,
      2 => Width::HighByte,
      _ => Width::Dword,
    }
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Register {
  index : u8,
  width : Width
}

impl Register {
  pub const ZERO : Register = Register { index: 0,        width: Width::Word  };
  pub const SP   : Register = Register { index: SP_INDEX, width: Width::Dword };
  pub const BP   : Register = Register { index: BP_INDEX, width: Width::Dword };

  /// Only the low four bits of `index` are significant.
  pub const fn new(index: u8, width: Width) -> Register {
    Register { index: index & 0x0F, width }
  }

  pub const fn word(index: u8) -> Register {
    Register::new(index, Width::Word)
  }

  pub const fn dword(index: u8) -> Register {
    Register::new(index, Width::Dword)
  }

  /// Rebuilds an operand from the 3 in-word bits and its 3-bit REX field.
  pub fn from_parts(low_bits: u16, rex_field: u16) -> Register {
    Register {
      index : ((low_bits & 0b111) | ((rex_field & 0b1) << 3)) as u8,
      width : Width::from_rex_bits(rex_field >> 1)
    }
  }

  pub fn index(&self) -> u8 {
    self.index
  }

  pub fn width(&self) -> Width {
    self.width
  }

  pub fn with_width(self, width: Width) -> Register {
    Register { width, ..self }
  }

  /// The part of the index stored in the instruction word.
  pub fn low_bits(&self) -> u16 {
    (self.index & 0b111) as u16
  }

  /// The 3-bit field this operand contributes to a REX prefix.
  pub fn rex_field(&self) -> u16 {
    ((Into::<u8>::into(self.width) as u16) << 1) | ((self.index >> 3) as u16)
  }

  pub fn needs_rex(&self) -> bool {
    self.rex_field() != 0
  }

  /// Parses `%Rn`, `%RnW`, `%RnL`, `%RnH`, `%RnD`, `%SP` and `%BP`, ignoring case.
  pub fn parse(name: &str) -> Option<Register> {
    let upper = name.trim().to_uppercase();
    let canonical = match upper.as_str() {
      "%SP" => return Some(Register::SP),
      "%BP" => return Some(Register::BP),
      text if text.ends_with(|c: char| c.is_ascii_digit()) => format!("{}W", text),
      _ => upper
    };
    REGISTER_NAMES.get_by_left(&canonical).copied()
  }
}

impl Display for Register {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match REGISTER_NAMES.get_by_right(self) {
      Some(name) => write!(f, "{}", name),
      None       => write!(f, "%R{}{}", self.index, self.width.suffix())
    }
  }
}

lazy_static! {
  /// Canonical spelling of every register operand.
  static ref REGISTER_NAMES: BiMap<String, Register> = {
    let mut names = BiMap::new();
    for index in 0..REGISTER_COUNT {
      for width in &[Width::Word, Width::LowByte, Width::HighByte, Width::Dword] {
        names.insert(format!("%R{}{}", index, width.suffix()), Register::new(index, *width));
      }
    }
    names
  };
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_names(){
    assert_eq!(Register::parse("%R1"), Some(Register::word(1)));
    assert_eq!(Register::parse("%r12d"), Some(Register::dword(12)));
    assert_eq!(Register::parse("%R3H"), Some(Register::new(3, Width::HighByte)));
    assert_eq!(Register::parse("%sp"), Some(Register::new(8, Width::Dword)));
    assert_eq!(Register::parse("%BP"), Some(Register::dword(9)));
    assert_eq!(Register::parse("%R16"), None);
    assert_eq!(Register::parse("R1"), None);
    assert_eq!(Register::parse("%R1X"), None);
  }

  #[test]
  fn rex_fields(){
    assert_eq!(Register::word(3).rex_field(), 0);
    assert!(!Register::word(7).needs_rex());
    assert_eq!(Register::word(9).rex_field(), 0b001);
    assert_eq!(Register::new(2, Width::LowByte).rex_field(), 0b010);
    assert_eq!(Register::dword(15).rex_field(), 0b111);
    assert_eq!(Register::from_parts(0b111, 0b111), Register::dword(15));
    assert_eq!(Register::from_parts(0b001, 0b100), Register::new(1, Width::HighByte));
  }

  #[test]
  fn display_is_canonical(){
    assert_eq!(Register::word(1).to_string(), "%R1W");
    assert_eq!(Register::SP.to_string(), "%R8D");
    assert_eq!(Register::new(4, Width::LowByte).to_string(), "%R4L");
  }
}
