use std::convert::TryFrom;

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Number of opcode bits in an OP0 word.
pub const OP0_CODE_BITS: u32 = 6;
/// Number of opcode bits in an OP1 word.
pub const OP1_CODE_BITS: u32 = 3;
/// Bit 13 of an IEX payload is carried by the low bit of the IEX opcode.
pub const IEX_HIGH_BIT: u16 = 0x1000;

/// The two instruction word classes, selected by bit 15.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OpClass {
  /// `0ooo ooo? ???? ????`
  Op0,
  /// `1ooo ???? ???? ????`
  Op1,
}

/**
  How the payload bits of a word are laid out. Formats are not self-describing: the opcode
  determines its format.

  The immediate field of the in-word part is the low `immediate_bits()` bits of the full
  16-bit immediate. The remaining high bits travel in an IEX prefix.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Format {
  /// `iiiiiiiii`
  Imm,
  /// `iiiiii aaa`
  ImmReg,
  /// `iii bbb aaa`
  ImmRegReg,
  /// `ccc bbb aaa`
  RegRegReg,
  /// `ddd ccc bbb aaa`
  RegRegRegReg,
  Prefix,
  Reserved,
}

impl Format {
  pub fn immediate_bits(self) -> u32 {
    match self {
      Format::Imm       => 9,
      Format::ImmReg    => 6,
      Format::ImmRegReg => 3,
      _                 => 0
    }
  }

  /// Position of the immediate's low bit inside the instruction word.
  pub fn immediate_shift(self) -> u32 {
    match self {
      Format::ImmReg    => 3,
      Format::ImmRegReg => 6,
      _                 => 0
    }
  }

  /// The immediate field, in place, inside the instruction word.
  pub fn immediate_mask(self) -> u16 {
    (((1u32 << self.immediate_bits()) - 1) << self.immediate_shift()) as u16
  }

  pub fn has_immediate(self) -> bool {
    self.immediate_bits() > 0
  }

  pub fn register_slots(self) -> usize {
    match self {
      Format::ImmReg       => 1,
      Format::ImmRegReg    => 2,
      Format::RegRegReg    => 3,
      Format::RegRegRegReg => 4,
      _                    => 0
    }
  }
}

/// Branch condition of the `JABS`, `JREL` and `CALL` families, tested against a signed flag.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Condition {
  Zero,
  NotZero,
  GreaterOrEqual,
  Greater,
  LessOrEqual,
  Less,
}

impl Condition {
  pub fn holds(self, flag: i32) -> bool {
    match self {
      Condition::Zero           => flag == 0,
      Condition::NotZero        => flag != 0,
      Condition::GreaterOrEqual => flag >= 0,
      Condition::Greater        => flag > 0,
      Condition::LessOrEqual    => flag <= 0,
      Condition::Less           => flag < 0,
    }
  }

  fn from_offset(offset: u8) -> Condition {
    match offset {
      0 => Condition::Zero,
      1 => Condition::NotZero,
      2 => Condition::GreaterOrEqual,
      3 => Condition::Greater,
      4 => Condition::LessOrEqual,
      _ => Condition::Less,
    }
  }
}

/**
  Opcodes of the machine.

  The discriminant is `class << 6 | code`, so OP0 opcodes occupy `0..64` and OP1 opcodes
  `64..72`. The numeric codes are part of the binary format and must never be renumbered.
  Conditional families are contiguous and in the order of `Condition`, which
  `Opcode::condition()` relies on.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[repr(u8)]
pub enum Opcode {
  // OP0 //
  #[strum(to_string = "MOV.I")]   MovI    = 0,
  #[strum(to_string = "ADD.R")]   AddR    = 1,
  #[strum(to_string = "SUB.R")]   SubR    = 2,
  #[strum(to_string = "AND.R")]   AndR    = 3,
  #[strum(to_string = "OR.R")]    OrR     = 4,
  #[strum(to_string = "XOR.R")]   XorR    = 5,
  #[strum(to_string = "ANDN.R")]  AndnR   = 6,
  #[strum(to_string = "ORN.R")]   OrnR    = 7,
  #[strum(to_string = "ADD.I")]   AddI    = 8,
  #[strum(to_string = "SUB.I")]   SubI    = 9,
  #[strum(to_string = "RSUB.I")]  RsubI   = 10,

  #[strum(to_string = "JABS.Z")]  JabsZ   = 11,
  #[strum(to_string = "JABS.NZ")] JabsNz  = 12,
  #[strum(to_string = "JABS.GE")] JabsGe  = 13,
  #[strum(to_string = "JABS.GT")] JabsGt  = 14,
  #[strum(to_string = "JABS.LE")] JabsLe  = 15,
  #[strum(to_string = "JABS.LT")] JabsLt  = 16,

  #[strum(to_string = "JREL.Z")]  JrelZ   = 17,
  #[strum(to_string = "JREL.NZ")] JrelNz  = 18,
  #[strum(to_string = "JREL.GE")] JrelGe  = 19,
  #[strum(to_string = "JREL.GT")] JrelGt  = 20,
  #[strum(to_string = "JREL.LE")] JrelLe  = 21,
  #[strum(to_string = "JREL.LT")] JrelLt  = 22,

  #[strum(to_string = "PUSH")]    Push    = 23,
  #[strum(to_string = "POP")]     Pop     = 24,
  #[strum(to_string = "RET")]     Ret     = 25,
  #[strum(to_string = "ENTER")]   Enter   = 26,
  #[strum(to_string = "LEAVE")]   Leave   = 27,

  #[strum(to_string = "LD.D")]    LdD     = 28,
  #[strum(to_string = "ST.D")]    StD     = 29,
  #[strum(to_string = "LD.W")]    LdW     = 30,
  #[strum(to_string = "ST.W")]    StW     = 31,
  #[strum(to_string = "LD.B")]    LdB     = 32,
  #[strum(to_string = "ST.B")]    StB     = 33,

  #[strum(to_string = "SHL.R", serialize = "SAL.R")] ShlR = 34,
  #[strum(to_string = "SHR.R")]   ShrR    = 35,
  #[strum(to_string = "SAR.R")]   SarR    = 36,
  #[strum(to_string = "SHL.I", serialize = "SAL.I")] ShlI = 37,
  #[strum(to_string = "SHR.I")]   ShrI    = 38,
  #[strum(to_string = "SAR.I")]   SarI    = 39,

  #[strum(to_string = "CMOV.I")]  CmovI   = 40,
  #[strum(to_string = "CMOV.R")]  CmovR   = 41,

  #[strum(to_string = "PADD.W")]  PaddW   = 42,
  #[strum(to_string = "PADD.B")]  PaddB   = 43,
  #[strum(to_string = "PSUB.W")]  PsubW   = 44,
  #[strum(to_string = "PSUB.B")]  PsubB   = 45,

  #[strum(to_string = "CALL.Z")]  CallZ   = 46,
  #[strum(to_string = "CALL.NZ")] CallNz  = 47,
  #[strum(to_string = "CALL.GE")] CallGe  = 48,
  #[strum(to_string = "CALL.GT")] CallGt  = 49,
  #[strum(to_string = "CALL.LE")] CallLe  = 50,
  #[strum(to_string = "CALL.LT")] CallLt  = 51,

  #[strum(to_string = "MOV.LO")]  MovLo   = 52,
  #[strum(to_string = "MOV.HI")]  MovHi   = 53,

  #[strum(to_string = "LDM.D")]   LdmD    = 54,
  #[strum(to_string = "STM.D")]   StmD    = 55,
  #[strum(to_string = "LDM.W")]   LdmW    = 56,
  #[strum(to_string = "STM.W")]   StmW    = 57,
  #[strum(to_string = "LDM.L")]   LdmL    = 58,
  #[strum(to_string = "STM.L")]   StmL    = 59,
  #[strum(to_string = "LDM.H")]   LdmH    = 60,
  #[strum(to_string = "STM.H")]   StmH    = 61,
  // Code 62 is unassigned.
  #[strum(to_string = "RESERVED")] Reserved = 63,

  // OP1 //
  #[strum(to_string = "REX")]     Rex     = 0x40,
  #[strum(to_string = "IMUL")]    Imul    = 0x41,
  #[strum(to_string = "IDIV")]    Idiv    = 0x42,
  #[strum(to_string = "MUL")]     Mul     = 0x43,
  #[strum(to_string = "DIV")]     Div     = 0x44,
  #[strum(to_string = "IMAC")]    Imac    = 0x45,
  #[strum(to_string = "IEX")]     Iex0    = 0x46,
  #[strum(to_string = "IEX1")]    Iex1    = 0x47,
}

impl Opcode {
  pub fn from_op0(code: u16) -> Option<Opcode> {
    Opcode::try_from((code & ((1 << OP0_CODE_BITS) - 1)) as u8).ok()
  }

  pub fn from_op1(code: u16) -> Option<Opcode> {
    Opcode::try_from((1 << OP0_CODE_BITS) | (code & ((1 << OP1_CODE_BITS) - 1)) as u8).ok()
  }

  pub fn class(&self) -> OpClass {
    match Into::<u8>::into(*self) >> OP0_CODE_BITS {
      0 => OpClass::Op0,
      _ => OpClass::Op1
    }
  }

  /// The opcode field of the instruction word, without the class bit.
  pub fn code(&self) -> u16 {
    let value = Into::<u8>::into(*self) as u16;
    match self.class() {
      OpClass::Op0 => value & ((1 << OP0_CODE_BITS) - 1),
      OpClass::Op1 => value & ((1 << OP1_CODE_BITS) - 1)
    }
  }

  /// The instruction word with only the class and opcode fields set.
  pub fn base_word(&self) -> u16 {
    match self.class() {
      OpClass::Op0 => self.code() << 9,
      OpClass::Op1 => 0x8000 | (self.code() << 12)
    }
  }

  pub fn is_prefix(&self) -> bool {
    matches!(self, Opcode::Rex | Opcode::Iex0 | Opcode::Iex1)
  }

  pub fn format(&self) -> Format {
    use Opcode::*;
    match self {
      Push | Pop | Ret | Enter | Leave => Format::Imm,

      MovI | AddI | SubI | RsubI | ShlI | ShrI | SarI | MovLo | MovHi
      | JrelZ | JrelNz | JrelGe | JrelGt | JrelLe | JrelLt
      | LdmD | StmD | LdmW | StmW | LdmL | StmL | LdmH | StmH => Format::ImmReg,

      JabsZ | JabsNz | JabsGe | JabsGt | JabsLe | JabsLt
      | CallZ | CallNz | CallGe | CallGt | CallLe | CallLt
      | LdD | StD | LdW | StW | LdB | StB | CmovI => Format::ImmRegReg,

      AddR | SubR | AndR | OrR | XorR | AndnR | OrnR | ShlR | ShrR | SarR | CmovR
      | PaddW | PaddB | PsubW | PsubB => Format::RegRegReg,

      Imul | Idiv | Mul | Div | Imac => Format::RegRegRegReg,

      Rex | Iex0 | Iex1 => Format::Prefix,

      Reserved => Format::Reserved,
    }
  }

  /// Cost of one execution in scheduler quanta.
  pub fn quanta(&self) -> u32 {
    use Opcode::*;
    match self {
      LdD | StD | LdW | StW | LdB | StB => 4,

      JabsZ | JabsNz | JabsGe | JabsGt | JabsLe | JabsLt
      | JrelZ | JrelNz | JrelGe | JrelGt | JrelLe | JrelLt
      | CallZ | CallNz | CallGe | CallGt | CallLe | CallLt
      | Push | Pop
      | LdmD | StmD | LdmW | StmW | LdmL | StmL | LdmH | StmH => 6,

      Ret | Enter | Leave => 5,

      Imul | Mul | Imac => 2,
      Idiv | Div => 3,

      Rex | Iex0 | Iex1 | Reserved => 0,

      _ => 1
    }
  }

  /// The branch condition of conditional opcodes.
  pub fn condition(&self) -> Option<Condition> {
    let value = Into::<u8>::into(*self);
    let first = match self {
      Opcode::JabsZ | Opcode::JabsNz | Opcode::JabsGe
      | Opcode::JabsGt | Opcode::JabsLe | Opcode::JabsLt => Opcode::JabsZ,

      Opcode::JrelZ | Opcode::JrelNz | Opcode::JrelGe
      | Opcode::JrelGt | Opcode::JrelLe | Opcode::JrelLt => Opcode::JrelZ,

      Opcode::CallZ | Opcode::CallNz | Opcode::CallGe
      | Opcode::CallGt | Opcode::CallLe | Opcode::CallLt => Opcode::CallZ,

      _ => return None
    };
    Some(Condition::from_offset(value - Into::<u8>::into(first)))
  }

  /// `LDM.*` and `STM.*`, whose immediate is a register mask.
  pub fn is_transfer_multiple(&self) -> bool {
    use Opcode::*;
    matches!(self, LdmD | StmD | LdmW | StmW | LdmL | StmL | LdmH | StmH)
  }
}


#[cfg(test)]
mod tests {
  use std::str::FromStr;
  use strum::IntoEnumIterator;
  use super::*;

  #[test]
  fn codes_are_stable(){
    assert_eq!(Opcode::MovI.code(), 0);
    assert_eq!(Opcode::JrelZ.code(), 17);
    assert_eq!(Opcode::StmH.code(), 61);
    assert_eq!(Opcode::Reserved.code(), 63);
    assert_eq!(Opcode::Rex.code(), 0);
    assert_eq!(Opcode::Iex1.code(), 7);
    assert_eq!(Opcode::Imul.class(), OpClass::Op1);
    assert_eq!(Opcode::Iex0.base_word(), 0xE000);
    assert_eq!(Opcode::Rex.base_word(), 0x8000);
  }

  #[test]
  fn numeric_lookup_matches_enumeration(){
    for opcode in Opcode::iter() {
      let found = match opcode.class() {
        OpClass::Op0 => Opcode::from_op0(opcode.code()),
        OpClass::Op1 => Opcode::from_op1(opcode.code()),
      };
      assert_eq!(found, Some(opcode));
    }
    assert_eq!(Opcode::from_op0(62), None);
  }

  #[test]
  fn opcode_fields_are_masked_to_their_width(){
    assert_eq!(Opcode::from_op1(0b1001), Some(Opcode::Imul));
    assert_eq!(Opcode::from_op0(64 | 17), Some(Opcode::JrelZ));
    assert!(Opcode::iter().all(|op| match op.class() {
      OpClass::Op0 => op.code() < 1 << OP0_CODE_BITS,
      OpClass::Op1 => op.code() < 1 << OP1_CODE_BITS,
    }));
  }

  #[test]
  fn mnemonics_and_aliases(){
    assert_eq!(Opcode::from_str("JREL.NZ"), Ok(Opcode::JrelNz));
    assert_eq!(Opcode::from_str("SAL.I"), Ok(Opcode::ShlI));
    assert_eq!(Opcode::ShlR.to_string(), "SHL.R");
    assert!(Opcode::from_str("FROB").is_err());
  }

  #[test]
  fn format_metadata(){
    assert_eq!(Format::Imm.immediate_mask(), 0x01FF);
    assert_eq!(Format::ImmReg.immediate_mask(), 0x01F8);
    assert_eq!(Format::ImmRegReg.immediate_mask(), 0x01C0);
    assert_eq!(Format::RegRegReg.immediate_bits(), 0);
    assert_eq!(Opcode::CmovI.format(), Format::ImmRegReg);
  }

  #[test]
  fn conditions(){
    assert_eq!(Opcode::JabsGt.condition(), Some(Condition::Greater));
    assert_eq!(Opcode::CallLt.condition(), Some(Condition::Less));
    assert_eq!(Opcode::JrelZ.condition(), Some(Condition::Zero));
    assert_eq!(Opcode::AddR.condition(), None);
    assert!(Condition::LessOrEqual.holds(-3));
    assert!(!Condition::Greater.holds(0));
  }

  #[test]
  fn timing_costs(){
    assert_eq!(Opcode::MovI.quanta(), 1);
    assert_eq!(Opcode::LdW.quanta(), 4);
    assert_eq!(Opcode::CallGe.quanta(), 6);
    assert_eq!(Opcode::Leave.quanta(), 5);
    assert_eq!(Opcode::Idiv.quanta(), 3);
    assert_eq!(Opcode::Rex.quanta(), 0);
    assert!(Opcode::iter().all(|op| op.quanta() <= 6));
  }
}
