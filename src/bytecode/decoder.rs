/*!
  Decoding of instruction words.

  Decoding happens in two layers. `decode_word` classifies a single word into a prefix, a raw
  instruction, or an illegal operation. A raw instruction has 3-bit word-width registers and
  the truncated in-word immediate. `Decoder::fetch` drains a word source up to the next
  non-prefix word, folding any REX/IEX into it through a `PendingPrefixState` that lives only
  for that one fetch.

  Decoding never fails on bad words: they come back as `Decoded::Illegal`. Only the word source
  can produce an error.
*/

use thiserror::Error;

use super::instruction::Instruction;
use super::opcode::{Format, Opcode, IEX_HIGH_BIT};
use super::register::Register;

/// A pull-based source of instruction words.
pub trait WordSource {
  type Error;

  fn next_word(&mut self) -> Result<u16, Self::Error>;
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ReadError {
  #[error("no complete instruction word at offset {0}")]
  Exhausted(usize),
}

/// Reads big-endian words from a byte slice.
#[derive(Clone, Debug)]
pub struct SliceReader<'a> {
  bytes    : &'a [u8],
  position : usize
}

impl<'a> SliceReader<'a> {
  pub fn new(bytes: &'a [u8]) -> SliceReader<'a> {
    SliceReader { bytes, position: 0 }
  }

  pub fn at(bytes: &'a [u8], position: usize) -> SliceReader<'a> {
    SliceReader { bytes, position }
  }

  pub fn position(&self) -> usize {
    self.position
  }

  pub fn is_exhausted(&self) -> bool {
    self.position >= self.bytes.len()
  }
}

impl<'a> WordSource for SliceReader<'a> {
  type Error = ReadError;

  fn next_word(&mut self) -> Result<u16, ReadError> {
    match self.bytes.get(self.position..self.position + 2) {
      Some(pair) => {
        self.position += 2;
        Ok(u16::from_be_bytes([pair[0], pair[1]]))
      }
      None => Err(ReadError::Exhausted(self.position))
    }
  }
}

/// The four 3-bit fields of a REX prefix.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct RexFields {
  pub d : u16,
  pub c : u16,
  pub b : u16,
  pub a : u16
}

impl RexFields {
  pub fn from_payload(payload: u16) -> RexFields {
    RexFields {
      d: (payload >> 9) & 0b111,
      c: (payload >> 6) & 0b111,
      b: (payload >> 3) & 0b111,
      a: payload & 0b111
    }
  }

  pub fn payload(&self) -> u16 {
    (self.d << 9) | (self.c << 6) | (self.b << 3) | self.a
  }

  /// The field for a slot in order D, C, B, A.
  pub fn field(&self, slot: usize) -> u16 {
    match slot {
      0 => self.d,
      1 => self.c,
      2 => self.b,
      _ => self.a
    }
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
  Rex(RexFields),
  /// The 13 high immediate bits.
  Iex(u16),
}

impl Prefix {
  /// The encoded prefix word.
  pub fn word(&self) -> u16 {
    match self {
      Prefix::Rex(fields) => Opcode::Rex.base_word() | fields.payload(),
      Prefix::Iex(value)  => Opcode::Iex0.base_word() | (value & 0x1FFF)
    }
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Decoded {
  Prefix(Prefix),
  Instruction(Instruction),
  /// An undefined or reserved operation, holding the raw word.
  Illegal(u16),
}

/// The outcome of fetching one complete instruction.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Fetched {
  Instruction(Instruction),
  Illegal(u16),
}

/**
  Prefix effects waiting for the next non-prefix instruction. The state starts neutral,
  accepts at most one prefix of each kind, and is consumed by `apply`.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct PendingPrefixState {
  rex : Option<RexFields>,
  iex : Option<u16>
}

impl PendingPrefixState {
  pub fn new() -> PendingPrefixState {
    PendingPrefixState::default()
  }

  pub fn is_neutral(&self) -> bool {
    self.rex.is_none() && self.iex.is_none()
  }

  /// Records a prefix. A second prefix of the same kind is handed back.
  pub fn accept(&mut self, prefix: Prefix) -> Result<(), Prefix> {
    match prefix {
      Prefix::Rex(fields) if self.rex.is_none() => self.rex = Some(fields),
      Prefix::Iex(value)  if self.iex.is_none() => self.iex = Some(value),
      duplicate => return Err(duplicate)
    }
    Ok(())
  }

  /// Folds the pending prefixes into a raw instruction.
  pub fn apply(self, raw: Instruction) -> Instruction {
    let mut instruction = raw;

    if let (Some(high), Some(low)) = (self.iex, instruction.immediate()) {
      let bits = instruction.format().immediate_bits();
      instruction = instruction.with_immediate((((high as u32) << bits) | low as u32) as u16);
    }

    if let Some(fields) = self.rex {
      instruction = instruction.map_registers(
        |slot, register| Register::from_parts(register.low_bits(), fields.field(slot))
      );
    }

    instruction
  }
}

/// Classifies a single word.
pub fn decode_word(word: u16) -> Decoded {
  match word & 0x8000 {

    0 => {
      let payload = word & 0x01FF;
      let opcode = match Opcode::from_op0(word >> 9) {
        Some(Opcode::Reserved) | None => return Decoded::Illegal(word),
        Some(opcode) => opcode
      };
      let format = opcode.format();
      let imm = (payload & format.immediate_mask()) >> format.immediate_shift();
      let ra = Register::from_parts(payload, 0);
      let rb = Register::from_parts(payload >> 3, 0);
      let rc = Register::from_parts(payload >> 6, 0);

      let instruction = match format {
        Format::Imm       => Instruction::Imm { opcode, imm },
        Format::ImmReg    => Instruction::ImmReg { opcode, imm, ra },
        Format::ImmRegReg => Instruction::ImmRegReg { opcode, imm, rb, ra },
        Format::RegRegReg => Instruction::RegRegReg { opcode, rc, rb, ra },
        _                 => return Decoded::Illegal(word)
      };
      Decoded::Instruction(instruction)
    }

    _ => {
      let payload = word & 0x0FFF;
      match Opcode::from_op1(word >> 12) {
        Some(Opcode::Rex)  => Decoded::Prefix(Prefix::Rex(RexFields::from_payload(payload))),
        Some(Opcode::Iex0) => Decoded::Prefix(Prefix::Iex(payload)),
        Some(Opcode::Iex1) => Decoded::Prefix(Prefix::Iex(payload | IEX_HIGH_BIT)),
        Some(opcode) => {
          Decoded::Instruction(Instruction::RegRegRegReg {
            opcode,
            rd: Register::from_parts(payload >> 9, 0),
            rc: Register::from_parts(payload >> 6, 0),
            rb: Register::from_parts(payload >> 3, 0),
            ra: Register::from_parts(payload, 0),
          })
        }
        None => Decoded::Illegal(word)
      }
    }

  }
}

pub struct Decoder;

impl Decoder {
  /// Reads and classifies one word.
  pub fn decode<S: WordSource>(source: &mut S) -> Result<Decoded, S::Error> {
    Ok(decode_word(source.next_word()?))
  }

  /// Reads one complete instruction, including its prefixes.
  pub fn fetch<S: WordSource>(source: &mut S) -> Result<Fetched, S::Error> {
    let mut pending = PendingPrefixState::new();
    loop {
      match Decoder::decode(source)? {

        Decoded::Prefix(prefix) => {
          if let Err(duplicate) = pending.accept(prefix) {
            return Ok(Fetched::Illegal(duplicate.word()));
          }
        }

        Decoded::Instruction(raw) => return Ok(Fetched::Instruction(pending.apply(raw))),

        Decoded::Illegal(word) => return Ok(Fetched::Illegal(word)),

      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::register::Width;

  #[test]
  fn classify_words(){
    assert_eq!(
      decode_word(0x00FF),
      Decoded::Instruction(Instruction::ImmReg { opcode: Opcode::MovI, imm: 0x1F, ra: Register::word(7) })
    );
    assert_eq!(decode_word(0xE123), Decoded::Prefix(Prefix::Iex(0x0123)));
    assert_eq!(decode_word(0xF001), Decoded::Prefix(Prefix::Iex(0x1001)));
    assert_eq!(decode_word(63 << 9), Decoded::Illegal(63 << 9));
    assert_eq!(decode_word(62 << 9 | 5), Decoded::Illegal(62 << 9 | 5));
  }

  #[test]
  fn prefix_words_round_trip(){
    for word in &[0x8000u16, 0x8FFF, 0x8249, 0xE000, 0xEABC, 0xF000, 0xFFFF] {
      match decode_word(*word) {
        Decoded::Prefix(prefix) => assert_eq!(prefix.word(), *word),
        other => panic!("expected a prefix, got {:?}", other)
      }
    }
  }

  #[test]
  fn fold_prefixes(){
    // IEX 0x3FF, REX A = dword R9, then MOV.I %R1, 0x3E.
    let bytes = [0xE3, 0xFF, 0x80, 0x07, 0x01, 0xF1];
    let mut reader = SliceReader::new(&bytes);
    assert_eq!(
      Decoder::fetch(&mut reader),
      Ok(Fetched::Instruction(Instruction::ImmReg {
        opcode: Opcode::MovI, imm: 0xFFFE, ra: Register::new(9, Width::Dword)
      }))
    );
    assert!(reader.is_exhausted());
  }

  #[test]
  fn prefix_order_is_not_significant(){
    let iex_first = [0xE0, 0x01, 0x80, 0x01, 0x00, 0x09];
    let rex_first = [0x80, 0x01, 0xE0, 0x01, 0x00, 0x09];
    let a = Decoder::fetch(&mut SliceReader::new(&iex_first));
    let b = Decoder::fetch(&mut SliceReader::new(&rex_first));
    assert_eq!(a, b);
    assert_eq!(
      a,
      Ok(Fetched::Instruction(Instruction::ImmReg { opcode: Opcode::MovI, imm: 0x41, ra: Register::word(9) }))
    );
  }

  #[test]
  fn state_does_not_leak_between_fetches(){
    let bytes = [0xE0, 0x01, 0x00, 0x09, 0x00, 0x09];
    let mut reader = SliceReader::new(&bytes);
    let _ = Decoder::fetch(&mut reader);
    assert_eq!(
      Decoder::fetch(&mut reader),
      Ok(Fetched::Instruction(Instruction::ImmReg { opcode: Opcode::MovI, imm: 1, ra: Register::word(1) }))
    );
  }

  #[test]
  fn duplicate_prefix_is_illegal(){
    let bytes = [0xE0, 0x01, 0xE0, 0x02, 0x00, 0x09];
    let mut reader = SliceReader::new(&bytes);
    assert_eq!(Decoder::fetch(&mut reader), Ok(Fetched::Illegal(0xE002)));
    assert_eq!(reader.position(), 4);
  }

  #[test]
  fn dangling_prefix_exhausts_source(){
    let bytes = [0x80, 0x01];
    assert_eq!(Decoder::fetch(&mut SliceReader::new(&bytes)), Err(ReadError::Exhausted(2)));
    assert_eq!(Decoder::fetch(&mut SliceReader::new(&[0x01])), Err(ReadError::Exhausted(0)));
  }

  #[test]
  fn pending_state(){
    let mut pending = PendingPrefixState::new();
    assert!(pending.is_neutral());
    assert_eq!(pending.accept(Prefix::Iex(1)), Ok(()));
    assert_eq!(pending.accept(Prefix::Iex(2)), Err(Prefix::Iex(2)));
    assert!(!pending.is_neutral());
  }
}
