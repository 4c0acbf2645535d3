use std::fmt::{Display, Formatter};

use super::opcode::{Format, Opcode};
use super::register::{Register, Width, REGISTER_COUNT};

/// Width of the mnemonic column in textual output.
pub const MNEMONIC_COLUMN: usize = 11;

/**
  Holds the unencoded components of an instruction, one variant per payload format.

  A decoded instruction carries the folded immediate and registers, that is, the effect of any
  IEX/REX prefix is already applied. It is the caller's responsibility to pair each opcode with
  the variant matching `Opcode::format()`; the encoder rejects mismatches.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Instruction {
  /// `0ooo oooi iiii iiii`
  Imm {
    opcode : Opcode,
    imm    : u16
  },
  /// `0ooo oooi iiii iaaa`
  ImmReg {
    opcode : Opcode,
    imm    : u16,
    ra     : Register
  },
  /// `0ooo oooi iibb baaa`
  ImmRegReg {
    opcode : Opcode,
    imm    : u16,
    rb     : Register,
    ra     : Register
  },
  /// `0ooo oooc ccbb baaa`
  RegRegReg {
    opcode : Opcode,
    rc     : Register,
    rb     : Register,
    ra     : Register
  },
  /// `1ooo dddc ccbb baaa`
  RegRegRegReg {
    opcode : Opcode,
    rd     : Register,
    rc     : Register,
    rb     : Register,
    ra     : Register
  },
}

impl Instruction {
  pub fn opcode(&self) -> Opcode {
    match self {
      Instruction::Imm          { opcode, .. }
      | Instruction::ImmReg       { opcode, .. }
      | Instruction::ImmRegReg    { opcode, .. }
      | Instruction::RegRegReg    { opcode, .. }
      | Instruction::RegRegRegReg { opcode, .. } => *opcode
    }
  }

  /// The format this variant encodes, which may disagree with `self.opcode().format()`.
  pub fn format(&self) -> Format {
    match self {
      Instruction::Imm          { .. } => Format::Imm,
      Instruction::ImmReg       { .. } => Format::ImmReg,
      Instruction::ImmRegReg    { .. } => Format::ImmRegReg,
      Instruction::RegRegReg    { .. } => Format::RegRegReg,
      Instruction::RegRegRegReg { .. } => Format::RegRegRegReg,
    }
  }

  pub fn immediate(&self) -> Option<u16> {
    match self {
      Instruction::Imm       { imm, .. }
      | Instruction::ImmReg    { imm, .. }
      | Instruction::ImmRegReg { imm, .. } => Some(*imm),
      _ => None
    }
  }

  /// Register operands by slot, in REX field order D, C, B, A.
  pub fn register_slots(&self) -> [Option<Register>; 4] {
    match *self {
      Instruction::Imm          { .. }                 => [None,     None,     None,     None    ],
      Instruction::ImmReg       { ra, .. }             => [None,     None,     None,     Some(ra)],
      Instruction::ImmRegReg    { rb, ra, .. }         => [None,     None,     Some(rb), Some(ra)],
      Instruction::RegRegReg    { rc, rb, ra, .. }     => [None,     Some(rc), Some(rb), Some(ra)],
      Instruction::RegRegRegReg { rd, rc, rb, ra, .. } => [Some(rd), Some(rc), Some(rb), Some(ra)],
    }
  }

  /// Returns a copy with the immediate replaced. Instructions without an immediate are unchanged.
  pub fn with_immediate(self, value: u16) -> Instruction {
    match self {
      Instruction::Imm       { opcode, .. }         => Instruction::Imm       { opcode, imm: value },
      Instruction::ImmReg    { opcode, ra, .. }     => Instruction::ImmReg    { opcode, imm: value, ra },
      Instruction::ImmRegReg { opcode, rb, ra, .. } => Instruction::ImmRegReg { opcode, imm: value, rb, ra },
      other => other
    }
  }

  /// Returns a copy with each register slot rewritten by `f`, slots given in order D, C, B, A.
  pub fn map_registers<F>(self, f: F) -> Instruction
    where F: Fn(usize, Register) -> Register
  {
    match self {
      Instruction::Imm { .. } => self,
      Instruction::ImmReg { opcode, imm, ra } => {
        Instruction::ImmReg { opcode, imm, ra: f(3, ra) }
      }
      Instruction::ImmRegReg { opcode, imm, rb, ra } => {
        Instruction::ImmRegReg { opcode, imm, rb: f(2, rb), ra: f(3, ra) }
      }
      Instruction::RegRegReg { opcode, rc, rb, ra } => {
        Instruction::RegRegReg { opcode, rc: f(1, rc), rb: f(2, rb), ra: f(3, ra) }
      }
      Instruction::RegRegRegReg { opcode, rd, rc, rb, ra } => {
        Instruction::RegRegRegReg { opcode, rd: f(0, rd), rc: f(1, rc), rb: f(2, rb), ra: f(3, ra) }
      }
    }
  }

  /// Cost of executing this instruction, in scheduler quanta. Prefixes are free.
  pub fn quanta(&self) -> u32 {
    self.opcode().quanta()
  }
}

/// Writes the registers selected by bits 1..15 of `mask`, each shown through `width`.
fn write_register_list(f: &mut Formatter<'_>, mask: u16, width: Width) -> std::fmt::Result {
  let names: Vec<String> =
    (1..REGISTER_COUNT)
      .filter(|index| mask & (1 << index) != 0)
      .map(|index| Register::new(index, width).to_string())
      .collect();
  write!(f, "{}", names.join(", "))
}

fn transfer_width(opcode: Opcode) -> Width {
  match opcode {
    Opcode::LdmD | Opcode::StmD => Width::Dword,
    Opcode::LdmL | Opcode::StmL => Width::LowByte,
    Opcode::LdmH | Opcode::StmH => Width::HighByte,
    _                           => Width::Word
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match *self {

      Instruction::Imm { opcode: opcode @ Opcode::Push, imm }
      | Instruction::Imm { opcode: opcode @ Opcode::Pop, imm } => {
        let (suffix, width) = match imm & 1 {
          0 => ("W", Width::Word),
          _ => ("D", Width::Dword)
        };
        let mnemonic = format!("{}.{}", opcode, suffix);
        write!(f, "{:<width$}", mnemonic, width = MNEMONIC_COLUMN)?;
        write_register_list(f, imm, width)
      }

      Instruction::Imm { opcode: Opcode::Leave, .. } => {
        write!(f, "{}", Opcode::Leave)
      }

      Instruction::Imm { opcode, imm } => {
        write!(f, "{:<width$}0x{:x}", opcode.to_string(), imm, width = MNEMONIC_COLUMN)
      }

      Instruction::ImmReg { opcode, imm, ra } if opcode.is_transfer_multiple() => {
        let mnemonic = match imm & 1 {
          0 => opcode.to_string(),
          _ => format!("{}S", opcode)
        };
        write!(f, "{:<width$}", mnemonic, width = MNEMONIC_COLUMN)?;
        write_register_list(f, imm, transfer_width(opcode))?;
        write!(f, ", {}", ra)
      }

      Instruction::ImmReg { opcode, imm, ra } => {
        write!(f, "{:<width$}{}, 0x{:x}", opcode.to_string(), ra, imm, width = MNEMONIC_COLUMN)
      }

      Instruction::ImmRegReg { opcode, imm, rb, ra } => {
        write!(f, "{:<width$}{}, 0x{:x}, {}", opcode.to_string(), ra, imm, rb, width = MNEMONIC_COLUMN)
      }

      Instruction::RegRegReg { opcode, rc, rb, ra } => {
        write!(f, "{:<width$}{}, {}, {}", opcode.to_string(), ra, rc, rb, width = MNEMONIC_COLUMN)
      }

      Instruction::RegRegRegReg { opcode, rd, rc, rb, ra } => {
        write!(f, "{:<width$}{}, {}, {}, {}", opcode.to_string(), ra, rb, rd, rc, width = MNEMONIC_COLUMN)
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_follows_assembly_operand_order(){
    let add = Instruction::RegRegReg {
      opcode: Opcode::AddR, rc: Register::word(2), rb: Register::word(3), ra: Register::word(1)
    };
    assert_eq!(add.to_string(), "ADD.R      %R1W, %R2W, %R3W");

    let load = Instruction::ImmRegReg {
      opcode: Opcode::LdW, imm: 0x10, rb: Register::dword(9), ra: Register::word(1)
    };
    assert_eq!(load.to_string(), "LD.W       %R1W, 0x10, %R9D");

    let mul = Instruction::RegRegRegReg {
      opcode: Opcode::Imul,
      rd: Register::word(3), rc: Register::word(4), rb: Register::word(2), ra: Register::word(1)
    };
    assert_eq!(mul.to_string(), "IMUL       %R1W, %R2W, %R3W, %R4W");
  }

  #[test]
  fn display_register_lists(){
    let push = Instruction::Imm { opcode: Opcode::Push, imm: 0b1000_0000_0000_0111 };
    assert_eq!(push.to_string(), "PUSH.D     %R1D, %R2D, %R15D");

    let store = Instruction::ImmReg { opcode: Opcode::StmL, imm: 0b1101, ra: Register::dword(8) };
    assert_eq!(store.to_string(), "STM.LS     %R2L, %R3L, %R8D");

    assert_eq!(Instruction::Imm { opcode: Opcode::Leave, imm: 0 }.to_string(), "LEAVE");
  }

  #[test]
  fn slots_and_rewrites(){
    let cmov = Instruction::RegRegReg {
      opcode: Opcode::CmovR, rc: Register::word(2), rb: Register::word(3), ra: Register::word(1)
    };
    assert_eq!(cmov.register_slots()[0], None);
    assert_eq!(cmov.register_slots()[1], Some(Register::word(2)));
    assert_eq!(cmov.immediate(), None);
    assert_eq!(cmov.with_immediate(7), cmov);

    let widened = cmov.map_registers(|_, register| register.with_width(Width::Dword));
    assert_eq!(widened.register_slots()[3], Some(Register::dword(1)));
  }
}
