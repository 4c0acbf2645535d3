/*!

  Instructions are sequences of 16-bit words, stored most significant byte first. Bit 15 of a
  word selects its class:

    OP0   0ooo ooo? ???? ????   6-bit opcode, 9-bit payload
    OP1   1ooo ???? ???? ????   3-bit opcode, 12-bit payload

  The payload layout (`Format`) is a property of the opcode. Immediates are 16 bits wide, but
  a word only has room for the low 9, 6 or 3 of them. The rest travel in an IEX prefix word
  placed before the instruction. Likewise the instruction word only names `%R0`..`%R7` in
  word view; a REX prefix word supplies the high index bit and the width view of up to four
  register operands. An instruction is therefore one to three words:

    [IEX] [REX] opcode-word

  Opcodes are an enum whose discriminant is the class and opcode field. The instruction itself
  is a separate enum with one variant per payload format, so the encoder, the decoder, the
  disassembler and the CPU each consume it with a single `match`.

*/

mod binary;
mod decoder;
mod disassembly;
mod instruction;
mod opcode;
mod register;
mod syntax;
pub mod assembly;

pub use binary::{encode_instruction, EmitLayout, EncodeError, Encoder};
pub use decoder::{
  decode_word, Decoded, Decoder, Fetched, PendingPrefixState, Prefix, ReadError, RexFields,
  SliceReader, WordSource
};
pub use disassembly::{disassemble, DisassembledLine, Disassembler};
pub use instruction::Instruction;
pub use opcode::{Condition, Format, OpClass, Opcode};
pub use register::{Register, Width, BP_INDEX, REGISTER_COUNT, SP_INDEX};
