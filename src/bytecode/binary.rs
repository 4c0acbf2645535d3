/*!
  This module is responsible for encoding instructions into bytes.

  Each instruction is emitted as `[IEX] [REX] word`, every word most significant byte first.
  IEX is present only when the immediate does not fit the in-word field; REX only when some
  register operand is above `%R7` or not word width.
*/

use thiserror::Error;

use super::instruction::Instruction;
use super::opcode::{Format, Opcode, IEX_HIGH_BIT};

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum EncodeError {
  #[error("{0} cannot be encoded as an instruction")]
  IllegalOpcode(Opcode),

  #[error("{opcode} uses the {expected:?} format but was given {found:?} operands")]
  FormatMismatch {
    opcode   : Opcode,
    expected : Format,
    found    : Format
  },

  #[error("instruction at offset {0} has no extension word to patch")]
  MissingExtension(usize),
}

/// Byte offsets of the words emitted for one instruction.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct EmitLayout {
  pub iex    : Option<usize>,
  pub rex    : Option<usize>,
  pub opcode : usize
}

impl EmitLayout {
  /// Offset of the first emitted word.
  pub fn start(&self) -> usize {
    self.iex.or(self.rex).unwrap_or(self.opcode)
  }

  /// Offset just past the instruction.
  pub fn end(&self) -> usize {
    self.opcode + 2
  }
}

/// Accumulates encoded instructions and raw data.
#[derive(Clone, Debug, Default)]
pub struct Encoder {
  bytes: Vec<u8>
}

impl Encoder {
  pub fn new() -> Encoder {
    Encoder::default()
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.bytes
  }

  pub fn emit_byte(&mut self, byte: u8) {
    self.bytes.push(byte);
  }

  pub fn emit_fill(&mut self, byte: u8, times: usize) {
    self.bytes.resize(self.bytes.len() + times, byte);
  }

  fn emit_word(&mut self, word: u16) -> usize {
    let offset = self.bytes.len();
    self.bytes.extend_from_slice(&word.to_be_bytes());
    offset
  }

  pub fn word_at(&self, offset: usize) -> Option<u16> {
    self.bytes.get(offset..offset + 2).map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
  }

  /// Overwrites an already emitted word. Returns false if `offset` is out of bounds.
  pub fn patch_word(&mut self, offset: usize, word: u16) -> bool {
    match self.bytes.get_mut(offset..offset + 2) {
      Some(pair) => {
        pair.copy_from_slice(&word.to_be_bytes());
        true
      }
      None => false
    }
  }

  pub fn encode(&mut self, instruction: &Instruction) -> Result<EmitLayout, EncodeError> {
    let opcode = instruction.opcode();
    let format = opcode.format();

    match format {
      Format::Prefix | Format::Reserved => return Err(EncodeError::IllegalOpcode(opcode)),
      expected if expected != instruction.format() => {
        return Err(EncodeError::FormatMismatch { opcode, expected, found: instruction.format() });
      }
      _ => {}
    }

    let mut word = opcode.base_word();
    let mut iex = None;
    if let Some(imm) = instruction.immediate() {
      let high = imm >> format.immediate_bits();
      if high != 0 {
        iex = Some(self.emit_word(iex_word(high)));
      }
      word |= ((imm as u32) << format.immediate_shift()) as u16 & format.immediate_mask();
    }

    let slots = instruction.register_slots();
    let mut rex_payload = 0u16;
    for (slot, register) in slots.iter().enumerate() {
      if let Some(register) = register {
        let shift = 9 - 3 * slot as u16;
        rex_payload |= register.rex_field() << shift;
        word        |= register.low_bits()  << shift;
      }
    }
    let rex = match rex_payload {
      0       => None,
      payload => Some(self.emit_word(Opcode::Rex.base_word() | payload))
    };

    Ok(EmitLayout { iex, rex, opcode: self.emit_word(word) })
  }

  /**
    Rewrites the immediate of an instruction emitted with an IEX prefix, in place. Only the
    IEX word and the immediate field of the opcode word change.
  */
  pub fn patch_immediate(&mut self, layout: &EmitLayout, format: Format, value: u16)
    -> Result<(), EncodeError>
  {
    let iex_offset = layout.iex.ok_or(EncodeError::MissingExtension(layout.opcode))?;
    let bits = format.immediate_bits();
    let word = self.word_at(layout.opcode).ok_or(EncodeError::MissingExtension(layout.opcode))?;

    let low = ((value as u32) << format.immediate_shift()) as u16 & format.immediate_mask();
    let patched = (word & !format.immediate_mask()) | low;

    if self.patch_word(iex_offset, iex_word(value >> bits)) && self.patch_word(layout.opcode, patched) {
      Ok(())
    } else {
      Err(EncodeError::MissingExtension(layout.opcode))
    }
  }
}

/// The IEX prefix word carrying `high` (up to 13 bits).
fn iex_word(high: u16) -> u16 {
  let opcode = match high & IEX_HIGH_BIT {
    0 => Opcode::Iex0,
    _ => Opcode::Iex1
  };
  opcode.base_word() | (high & 0x0FFF)
}

/// Encodes a single instruction into a fresh buffer.
pub fn encode_instruction(instruction: &Instruction) -> Result<Vec<u8>, EncodeError> {
  let mut encoder = Encoder::new();
  encoder.encode(instruction)?;
  Ok(encoder.into_bytes())
}


#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;
  use crate::bytecode::decoder::{Decoder, Fetched, SliceReader};
  use crate::bytecode::register::{Register, Width};

  fn sample(opcode: Opcode, imm: u16, registers: [Register; 4]) -> Option<Instruction> {
    let [rd, rc, rb, ra] = registers;
    match opcode.format() {
      Format::Imm          => Some(Instruction::Imm { opcode, imm }),
      Format::ImmReg       => Some(Instruction::ImmReg { opcode, imm, ra }),
      Format::ImmRegReg    => Some(Instruction::ImmRegReg { opcode, imm, rb, ra }),
      Format::RegRegReg    => Some(Instruction::RegRegReg { opcode, rc, rb, ra }),
      Format::RegRegRegReg => Some(Instruction::RegRegRegReg { opcode, rd, rc, rb, ra }),
      _                    => None
    }
  }

  #[test]
  fn every_opcode_survives_encoding(){
    let plain    = [Register::word(1), Register::word(2), Register::word(3), Register::word(4)];
    let extended = [
      Register::dword(15), Register::new(9, Width::LowByte),
      Register::new(2, Width::HighByte), Register::SP
    ];
    let cases = [(3u16, plain), (0xFFFF, extended), (0x8001, plain), (0x0100, extended)];

    for opcode in Opcode::iter() {
      for (imm, registers) in cases.iter() {
        let instruction = match sample(opcode, *imm, *registers) {
          Some(instruction) => instruction,
          None => continue
        };
        let bytes = encode_instruction(&instruction).unwrap();
        let mut reader = SliceReader::new(&bytes);
        assert_eq!(Decoder::fetch(&mut reader), Ok(Fetched::Instruction(instruction)), "{}", instruction);
        assert!(reader.is_exhausted());
      }
    }
  }

  #[test]
  fn prefixes_only_when_needed(){
    let small = Instruction::ImmReg { opcode: Opcode::MovI, imm: 63, ra: Register::word(7) };
    assert_eq!(encode_instruction(&small).unwrap(), vec![0x01, 0xFF]);

    let wide = Instruction::ImmReg { opcode: Opcode::MovI, imm: 64, ra: Register::word(1) };
    assert_eq!(encode_instruction(&wide).unwrap(), vec![0xE0, 0x01, 0x00, 0x01]);

    let mut encoder = Encoder::new();
    let layout = encoder.encode(
      &Instruction::ImmReg { opcode: Opcode::MovI, imm: 0xFFFF, ra: Register::dword(9) }
    ).unwrap();
    assert_eq!(layout, EmitLayout { iex: Some(0), rex: Some(2), opcode: 4 });
    assert_eq!(encoder.bytes(), &[0xE3, 0xFF, 0x80, 0x07, 0x01, 0xF9]);
  }

  #[test]
  fn thirteenth_bit_selects_iex_opcode(){
    let jump = Instruction::ImmRegReg {
      opcode: Opcode::JabsZ, imm: 0xFFF8, rb: Register::word(0), ra: Register::word(0)
    };
    let bytes = encode_instruction(&jump).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFF]);
  }

  #[test]
  fn rejects_unencodable(){
    let reserved = Instruction::Imm { opcode: Opcode::Reserved, imm: 0 };
    assert_eq!(encode_instruction(&reserved), Err(EncodeError::IllegalOpcode(Opcode::Reserved)));

    let rex = Instruction::RegRegRegReg {
      opcode: Opcode::Rex,
      rd: Register::ZERO, rc: Register::ZERO, rb: Register::ZERO, ra: Register::ZERO
    };
    assert_eq!(encode_instruction(&rex), Err(EncodeError::IllegalOpcode(Opcode::Rex)));

    let mismatched = Instruction::Imm { opcode: Opcode::AddR, imm: 0 };
    assert!(matches!(encode_instruction(&mismatched), Err(EncodeError::FormatMismatch { .. })));
  }

  #[test]
  fn patch_in_place(){
    let mut encoder = Encoder::new();
    let layout = encoder.encode(
      &Instruction::ImmReg { opcode: Opcode::JrelZ, imm: 0xFFFF, ra: Register::word(1) }
    ).unwrap();
    let length = encoder.len();
    encoder.patch_immediate(&layout, Format::ImmReg, 0x4004).unwrap();
    assert_eq!(encoder.len(), length);

    let expected = encode_instruction(
      &Instruction::ImmReg { opcode: Opcode::JrelZ, imm: 0x4004, ra: Register::word(1) }
    ).unwrap();
    assert_eq!(encoder.bytes(), expected.as_slice());
  }

  #[test]
  fn patch_requires_extension(){
    let mut encoder = Encoder::new();
    let layout = encoder.encode(&Instruction::Imm { opcode: Opcode::Ret, imm: 1 }).unwrap();
    assert_eq!(
      encoder.patch_immediate(&layout, Format::Imm, 0x300),
      Err(EncodeError::MissingExtension(0))
    );
  }
}
