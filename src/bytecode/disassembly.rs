/*!
  Turns bytes back into assembly text, one line per instruction with prefixes folded in.
  Irregular words are printed as `??` and disassembly carries on with the next word.
*/

use std::fmt::{Display, Formatter};

use super::decoder::{decode_word, Decoded, PendingPrefixState, SliceReader, WordSource};
use super::instruction::MNEMONIC_COLUMN;
use crate::symboltable::SymbolTable;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DisassembledLine {
  /// Byte offset of the first word of the instruction, prefixes included.
  pub offset : usize,
  pub text   : String
}

impl Display for DisassembledLine {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "+{:04x}  {}", self.offset, self.text)
  }
}

fn illegal(word: u16) -> String {
  format!("{:<width$}??", format!("0x{:04x}", word), width = MNEMONIC_COLUMN)
}

pub struct Disassembler<'a> {
  bytes  : &'a [u8],
  reader : SliceReader<'a>
}

impl<'a> Disassembler<'a> {
  pub fn new(bytes: &'a [u8]) -> Disassembler<'a> {
    Disassembler { bytes, reader: SliceReader::new(bytes) }
  }
}

impl<'a> Iterator for Disassembler<'a> {
  type Item = DisassembledLine;

  fn next(&mut self) -> Option<DisassembledLine> {
    let offset = self.reader.position();
    if self.reader.is_exhausted() {
      return None;
    }

    let mut pending   = PendingPrefixState::new();
    let mut last_word = None;
    loop {
      let word = match self.reader.next_word() {
        Ok(word) => word,
        Err(_) => {
          // A trailing odd byte, or prefixes with nothing after them.
          let text = match last_word {
            Some(word) => illegal(word),
            None       => format!("{:<width$}??", format!("0x{:02x}", self.bytes[offset]), width = MNEMONIC_COLUMN)
          };
          self.reader = SliceReader::at(self.bytes, self.bytes.len());
          return Some(DisassembledLine { offset, text });
        }
      };
      last_word = Some(word);

      let text = match decode_word(word) {

        Decoded::Prefix(prefix) => match pending.accept(prefix) {
          Ok(())         => continue,
          Err(duplicate) => illegal(duplicate.word())
        },

        Decoded::Instruction(raw) => pending.apply(raw).to_string(),

        Decoded::Illegal(word) => illegal(word),

      };
      return Some(DisassembledLine { offset, text });
    }
  }
}

/**
  Produces a full listing. Addresses are `origin + offset`; when a symbol table is given, each
  label is printed on its own line before the instruction at its address.
*/
pub fn disassemble(bytes: &[u8], origin: u32, symbols: Option<&SymbolTable>) -> String {
  let mut listing = String::new();
  for line in Disassembler::new(bytes) {
    if let Some(symbols) = symbols {
      for label in symbols.labels_at(origin.wrapping_add(line.offset as u32)) {
        listing.push_str(&format!("{}:\n", label));
      }
    }
    listing.push_str(&format!("{}\n", line));
  }
  listing
}


#[cfg(test)]
mod tests {
  use super::*;
  use string_cache::DefaultAtom;

  fn texts(bytes: &[u8]) -> Vec<String> {
    Disassembler::new(bytes).map(|line| line.to_string()).collect()
  }

  #[test]
  fn folds_prefixes_into_one_line(){
    let bytes = [0xE3, 0xFF, 0x80, 0x07, 0x01, 0xF1, 0x02, 0x53];
    assert_eq!(
      texts(&bytes),
      vec![
        "+0000  MOV.I      %R9D, 0xfffe".to_string(),
        "+0006  ADD.R      %R3W, %R1W, %R2W".to_string()
      ]
    );
  }

  #[test]
  fn irregular_words(){
    let bytes = [0x7E, 0x00, 0xE0, 0x01, 0xE0, 0x02, 0x00, 0x09, 0x80, 0x01];
    assert_eq!(
      texts(&bytes),
      vec![
        "+0000  0x7e00     ??".to_string(),
        "+0002  0xe002     ??".to_string(),
        "+0006  MOV.I      %R1W, 0x1".to_string(),
        "+0008  0x8001     ??".to_string(),
      ]
    );
    assert_eq!(texts(&[0x00, 0x09, 0x42]).last().map(String::as_str), Some("+0002  0x42       ??"));
  }

  #[test]
  fn listing_with_labels(){
    let mut symbols = SymbolTable::new();
    symbols.insert(DefaultAtom::from("start"), 0x100).unwrap();
    let listing = disassemble(&[0x00, 0x09], 0x100, Some(&symbols));
    assert_eq!(listing, "start:\n+0000  MOV.I      %R1W, 0x1\n");
  }
}
