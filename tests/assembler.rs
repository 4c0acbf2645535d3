use wordcpu::bytecode::assembly::{assemble, Assembler, ErrorKind};
use wordcpu::bytecode::{encode_instruction, Decoder, Fetched, Instruction, Opcode, Register, SliceReader};
use wordcpu::disassemble;
use wordcpu::source::MemorySources;

fn assemble_ok(text: &str) -> Vec<u8> {
  match assemble(text) {
    Ok(bytes) => bytes,
    Err(error) => panic!("failed to assemble: {}", error)
  }
}

fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
  let mut reader = SliceReader::new(bytes);
  let mut instructions = Vec::new();
  while !reader.is_exhausted() {
    match Decoder::fetch(&mut reader) {
      Ok(Fetched::Instruction(instruction)) => instructions.push(instruction),
      other => panic!("unexpected fetch result {:?}", other)
    }
  }
  instructions
}

#[test]
fn backward_and_forward_references_agree() {
  let forward = assemble_ok(
    ".ORG 0x4000\n\
     top:    JABS.Z  %R0, bottom, %R0\n\
             ADD.I   %R10L, 2\n\
     bottom: JABS.Z  %R0, top, %R0\n"
  );
  let literal = assemble_ok(
    ".ORG 0x4000\n\
     JABS.Z  %R0, 0x4008, %R0\n\
     ADD.I   %R10L, 2\n\
     JABS.Z  %R0, 0x4000, %R0\n"
  );
  assert_eq!(forward, literal);

  let instructions = decode_all(&forward);
  assert_eq!(instructions.len(), 3);
  assert_eq!(instructions[0].immediate(), Some(0x4008));
  assert_eq!(instructions[2].immediate(), Some(0x4000));
}

#[test]
fn every_mnemonic_form_reassembles() {
  let text = "
    MOV.I    %R1, 5
    MOV.LO   %R2D, 0x1234
    MOV.HI   %R2D, 0xABCD
    RSUB.I   %R3, -1
    SAL.I    %R4, 3
    CMOV.I   %R5, 7, %R6
    CMOV.R   %R5, %R6, %R7
    PADD.B   %R1D, %R2D, %R3D
    ST.B     %R1L, 0x10, %BP
    LD.D     %R11D, -8, %BP
    DIV      %R1, %R2, %R3, %R4
    IMAC     %R1D, %R2D, %R3D, %R4D
    ENTER    16
    LDM.WS   %R1, %R2, %R9D
    PUSH.W   %R1, %R14
    POP.W    %R1, %R14
    RET      8
    RET
    LEAVE
  ";
  let bytes = assemble_ok(text);
  let instructions = decode_all(&bytes);
  assert_eq!(instructions.len(), 19);

  let mut reencoded = Vec::new();
  for instruction in &instructions {
    reencoded.extend(encode_instruction(instruction).unwrap());
  }
  assert_eq!(reencoded, bytes);

  assert_eq!(instructions[4].opcode(), Opcode::ShlI);
  assert_eq!(instructions[17], Instruction::Imm { opcode: Opcode::Ret, imm: 0 });
}

#[test]
fn listing_round_trip() {
  let mut assembler = Assembler::new();
  assembler.load_source("spin.asm", "entry: MOV.I %R1, 0xFFFF\nspin: JREL.Z %R0, -4\n");
  let bytes = assembler.assemble_all().unwrap();
  assert_eq!(bytes, vec![0xE3, 0xFF, 0x01, 0xF9, 0xE3, 0xFF, 0x23, 0xE0]);

  let listing = disassemble(&bytes, assembler.origin(), Some(assembler.symbols()));
  assert_eq!(
    listing,
    "entry:\n\
     +0000  MOV.I      %R1W, 0xffff\n\
     spin:\n\
     +0004  JREL.Z     %R0W, 0xfffc\n"
  );
}

#[test]
fn library_files() {
  let sources = MemorySources::new()
    .with_file("defs.inc", ".SET FRAME, 12\n.SET SCRATCH, %R7D\n")
    .with_file("prologue.inc", ".IMPORT defs.inc\nENTER FRAME\n");
  let mut assembler = Assembler::with_sources(sources);
  assembler.load_source(
    "main.asm",
    ".IMPORT defs.inc\n\
     .INCLUDE prologue.inc\n\
     MOV.I SCRATCH, FRAME\n\
     LEAVE\n"
  );
  let bytes = assembler.assemble_all().unwrap();
  assert_eq!(
    decode_all(&bytes),
    vec![
      Instruction::Imm { opcode: Opcode::Enter, imm: 12 },
      Instruction::ImmReg { opcode: Opcode::MovI, imm: 12, ra: Register::dword(7) },
      Instruction::Imm { opcode: Opcode::Leave, imm: 0 },
    ]
  );
}

#[test]
fn first_error_stops_assembly() {
  let error = assemble("start: LEAVE\nADD.I %R1, 1\nstart: LEAVE\nFROB\n").unwrap_err();
  assert_eq!(error.location.line, 3);
  assert_eq!(error.kind, ErrorKind::LabelRedefinition("start".to_string()));

  let error = assemble("SHL.I %R1, 40\nJABS.Z %R0, missing, %R0\n").unwrap_err();
  assert_eq!(error.location.line, 2);
  assert_eq!(error.kind, ErrorKind::UnresolvedSymbol("missing".to_string()));
}
