/*!
  The human readable textual form of bytecode is called assembly. The assembler reads it one
  logical line at a time, encoding each instruction immediately.

  A label used before it is defined cannot be encoded yet. The instruction is emitted with the
  all-ones placeholder immediate, which always produces an IEX prefix, and the emission layout
  is remembered in the patch table. Once every line has been read, each placeholder is
  overwritten in place with the label's address. No bytes are ever inserted, so addresses of
  later labels stay valid.

  Errors are fatal to the run and carry the file and line they were found on.
*/

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use string_cache::DefaultAtom;
use thiserror::Error;
use tracing::{debug, warn};

use super::binary::{EmitLayout, EncodeError, Encoder};
use super::instruction::Instruction;
use super::opcode::{Format, Opcode};
use super::register::{Register, Width};
use super::syntax::{
  is_identifier, logical_lines, parse_integer, split_label, split_statement, strip_comment,
  LogicalLine
};
use crate::source::{FileSystemSources, SourceProvider};
use crate::symboltable::SymbolTable;

/// Immediate encoded for a label that is not defined yet.
pub const PLACEHOLDER: u16 = 0xFFFF;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SourceLocation {
  pub file : DefaultAtom,
  pub line : usize
}

impl Display for SourceLocation {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.file, self.line)
  }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ErrorKind {
  #[error("unknown mnemonic `{0}`")]
  UnknownMnemonic(String),

  #[error("unknown directive `{0}`")]
  UnknownDirective(String),

  #[error("{mnemonic} expects {expected} operand(s) but was given {found}")]
  OperandCount {
    mnemonic : String,
    expected : usize,
    found    : usize
  },

  #[error("illegal register `{0}`")]
  IllegalRegister(String),

  #[error("{mnemonic} needs {expected:?} registers but was given `{register}`")]
  RegisterWidth {
    mnemonic : String,
    register : String,
    expected : Width
  },

  #[error("%R0 cannot be transferred")]
  ZeroRegisterInList,

  #[error("{0} needs at least one register")]
  EmptyRegisterList(String),

  #[error("illegal label name `{0}`")]
  IllegalLabel(String),

  #[error("label `{0}` is already defined")]
  LabelRedefinition(String),

  #[error("macro `{0}` is already defined")]
  MacroRedefinition(String),

  #[error("macro `{0}` expands into itself")]
  RecursiveMacro(String),

  #[error("illegal constant `{0}`")]
  IllegalConstant(String),

  #[error("{value} is outside {min}..={max}")]
  ConstantOutOfRange {
    value : i64,
    min   : i64,
    max   : i64
  },

  #[error("unresolved symbol `{0}`")]
  UnresolvedSymbol(String),

  #[error(".ZERO {target} is behind the current size {size}")]
  PaddingBehindCursor {
    target : usize,
    size   : usize
  },

  #[error(".ALIGN requires a positive alignment")]
  ZeroAlignment,

  #[error("cannot load `{path}`: {message}")]
  SourceUnavailable {
    path    : String,
    message : String
  },

  #[error(transparent)]
  Encode(#[from] EncodeError),
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{location}: {kind}")]
pub struct AssemblyError {
  pub location : SourceLocation,
  pub kind     : ErrorKind
}

enum Immediate {
  Value(u16),
  Forward(DefaultAtom)
}

/// A placeholder immediate waiting for its label.
#[derive(Clone, Debug)]
struct Patch {
  symbol   : DefaultAtom,
  layout   : EmitLayout,
  format   : Format,
  location : SourceLocation
}

fn check_range(value: i64, min: i64, max: i64) -> Result<i64, ErrorKind> {
  match value {
    value if value < min || value > max => Err(ErrorKind::ConstantOutOfRange { value, min, max }),
    value => Ok(value)
  }
}

fn expect_operands(mnemonic: &str, operands: &[&str], expected: usize) -> Result<(), ErrorKind> {
  match operands.len() == expected {
    true  => Ok(()),
    false => Err(ErrorKind::OperandCount { mnemonic: mnemonic.to_string(), expected, found: operands.len() })
  }
}

/// `LDM`/`STM` mnemonics: the opcode, the register view and whether the base is written back.
fn transfer_mnemonic(mnemonic: &str) -> Option<(Opcode, Width, bool)> {
  let (base, write_back) = match mnemonic.len() {
    6 if mnemonic.ends_with('S') => (&mnemonic[..5], true),
    5                            => (mnemonic, false),
    _                            => return None
  };
  let (opcode, width) = match base {
    "LDM.D" => (Opcode::LdmD, Width::Dword),
    "STM.D" => (Opcode::StmD, Width::Dword),
    "LDM.W" => (Opcode::LdmW, Width::Word),
    "STM.W" => (Opcode::StmW, Width::Word),
    "LDM.L" => (Opcode::LdmL, Width::LowByte),
    "STM.L" => (Opcode::StmL, Width::LowByte),
    "LDM.H" => (Opcode::LdmH, Width::HighByte),
    "STM.H" => (Opcode::StmH, Width::HighByte),
    _       => return None
  };
  Some((opcode, width, write_back))
}

pub struct Assembler {
  encoder  : Encoder,
  symbols  : SymbolTable,
  macros   : HashMap<String, String>,
  patches  : Vec<Patch>,
  origin   : u32,
  queue    : VecDeque<LogicalLine>,
  imported : HashSet<PathBuf>,
  sources  : Box<dyn SourceProvider>
}

impl Default for Assembler {
  fn default() -> Assembler {
    Assembler::new()
  }
}

impl Assembler {

  pub fn new() -> Assembler {
    Assembler::with_sources(FileSystemSources::new())
  }

  pub fn with_sources<P: SourceProvider + 'static>(sources: P) -> Assembler {
    Assembler {
      encoder  : Encoder::new(),
      symbols  : SymbolTable::new(),
      macros   : HashMap::new(),
      patches  : Vec::new(),
      origin   : 0,
      queue    : VecDeque::new(),
      imported : HashSet::new(),
      sources  : Box::new(sources)
    }
  }

  pub fn symbols(&self) -> &SymbolTable {
    &self.symbols
  }

  /// The address of the first byte of the output, as set by the latest `.ORG`.
  pub fn origin(&self) -> u32 {
    self.origin
  }

  /// Queues `text` in front of any pending lines.
  pub fn load_source(&mut self, name: &str, text: &str) {
    let lines = logical_lines(&DefaultAtom::from(name), text);
    for line in lines.into_iter().rev() {
      self.queue.push_front(line);
    }
  }

  /// Queues a file obtained from the source provider.
  pub fn load_file(&mut self, name: &str) -> Result<(), AssemblyError> {
    let location = SourceLocation { file: DefaultAtom::from(name), line: 0 };
    self.include(name, false).map_err(|kind| AssemblyError { location, kind })
  }

  /// Assembles every queued line and resolves forward references.
  pub fn assemble_all(&mut self) -> Result<Vec<u8>, AssemblyError> {
    while let Some(line) = self.queue.pop_front() {
      let location = SourceLocation { file: line.file.clone(), line: line.number };
      self.assemble_line(&line.text, &location)
          .map_err(|kind| AssemblyError { location, kind })?;
    }
    self.resolve_patches()?;
    Ok(std::mem::take(&mut self.encoder).into_bytes())
  }

  fn assemble_line(&mut self, text: &str, location: &SourceLocation) -> Result<(), ErrorKind> {
    let text = strip_comment(text);
    let (label, statement) = split_label(&text);
    if let Some(label) = label {
      self.define_label(label)?;
    }

    let (mnemonic, operands) = split_statement(statement);
    if mnemonic.is_empty() {
      return Ok(());
    }
    let mnemonic = mnemonic.to_uppercase();
    match mnemonic.starts_with('.') {
      true  => self.directive(&mnemonic, &operands),
      false => self.instruction(&mnemonic, &operands, location)
    }
  }

  fn define_label(&mut self, label: &str) -> Result<(), ErrorKind> {
    if !is_identifier(label) {
      return Err(ErrorKind::IllegalLabel(label.to_string()));
    }
    let address = self.origin.wrapping_add(self.encoder.len() as u32);
    self.symbols
        .insert(DefaultAtom::from(label), address)
        .map_err(|_| ErrorKind::LabelRedefinition(label.to_string()))
  }

  // region Operand interpretation

  /// Follows macro substitutions until the text is not a macro name.
  fn expand(&self, text: &str) -> Result<String, ErrorKind> {
    let mut current = text.trim().to_string();
    let mut steps = 0;
    while let Some(replacement) = self.macros.get(&current) {
      steps += 1;
      if steps > self.macros.len() {
        return Err(ErrorKind::RecursiveMacro(text.trim().to_string()));
      }
      current = replacement.trim().to_string();
    }
    Ok(current)
  }

  fn register(&self, text: &str) -> Result<Register, ErrorKind> {
    let expanded = self.expand(text)?;
    Register::parse(&expanded).ok_or(ErrorKind::IllegalRegister(expanded))
  }

  /// A literal or an already defined label; used by directives, which cannot be patched.
  fn constant(&self, text: &str, min: i64, max: i64) -> Result<i64, ErrorKind> {
    let expanded = self.expand(text)?;
    if let Some(value) = parse_integer(&expanded) {
      return check_range(value, min, max);
    }
    if !is_identifier(&expanded) {
      return Err(ErrorKind::IllegalConstant(expanded));
    }
    match self.symbols.get_address(&expanded) {
      Some(address) => check_range(address as i64, min, max),
      None          => Err(ErrorKind::UnresolvedSymbol(expanded))
    }
  }

  fn immediate(&self, text: &str) -> Result<Immediate, ErrorKind> {
    let expanded = self.expand(text)?;
    if let Some(value) = parse_integer(&expanded) {
      return check_range(value, -0x8000, 0xFFFF).map(|value| Immediate::Value(value as u16));
    }
    if !is_identifier(&expanded) {
      return Err(ErrorKind::IllegalConstant(expanded));
    }
    match self.symbols.get_address(&expanded) {
      Some(address) => check_range(address as i64, 0, 0xFFFF).map(|value| Immediate::Value(value as u16)),
      None          => Ok(Immediate::Forward(DefaultAtom::from(expanded.as_str())))
    }
  }

  /// Bits 1..15 select registers; every register must be of `width` and none may be `%R0`.
  fn register_mask(&self, mnemonic: &str, operands: &[&str], width: Width) -> Result<u16, ErrorKind> {
    if operands.is_empty() {
      return Err(ErrorKind::EmptyRegisterList(mnemonic.to_string()));
    }
    let mut mask = 0u16;
    for operand in operands {
      let register = self.register(operand)?;
      if register.index() == 0 {
        return Err(ErrorKind::ZeroRegisterInList);
      }
      if register.width() != width {
        return Err(ErrorKind::RegisterWidth {
          mnemonic : mnemonic.to_string(),
          register : operand.to_string(),
          expected : width
        });
      }
      mask |= 1 << register.index();
    }
    Ok(mask)
  }

  // endregion

  // region Directives

  fn directive(&mut self, directive: &str, operands: &[&str]) -> Result<(), ErrorKind> {
    match directive {

      ".SET" => {
        expect_operands(directive, operands, 2)?;
        let name = operands[0];
        if !is_identifier(name) {
          return Err(ErrorKind::IllegalLabel(name.to_string()));
        }
        if self.macros.contains_key(name) {
          return Err(ErrorKind::MacroRedefinition(name.to_string()));
        }
        debug!(name, value = operands[1], "defining macro");
        self.macros.insert(name.to_string(), operands[1].to_string());
      }

      ".UNSET" => {
        expect_operands(directive, operands, 1)?;
        self.macros.remove(operands[0]);
      }

      ".ORG" => {
        expect_operands(directive, operands, 1)?;
        self.origin = self.constant(operands[0], 0, u32::MAX as i64)? as u32;
        debug!(origin = self.origin, "setting origin");
      }

      ".ZERO" => {
        expect_operands(directive, operands, 1)?;
        let target = self.constant(operands[0], 0, i32::MAX as i64)? as usize;
        let size = self.encoder.len();
        if target < size {
          return Err(ErrorKind::PaddingBehindCursor { target, size });
        }
        self.encoder.emit_fill(0, target - size);
      }

      ".ALIGN" => {
        expect_operands(directive, operands, 1)?;
        let alignment = self.constant(operands[0], 0, i32::MAX as i64)? as usize;
        if alignment == 0 {
          return Err(ErrorKind::ZeroAlignment);
        }
        let padding = (alignment - self.encoder.len() % alignment) % alignment;
        self.encoder.emit_fill(0, padding);
      }

      ".EMIT" => {
        if operands.is_empty() {
          return Err(ErrorKind::OperandCount { mnemonic: directive.to_string(), expected: 1, found: 0 });
        }
        for operand in operands {
          let byte = self.constant(operand, -0x80, 0xFF)?;
          self.encoder.emit_byte(byte as u8);
        }
      }

      ".INCLUDE" | ".IMPORT" => {
        expect_operands(directive, operands, 1)?;
        let name = self.expand(operands[0])?;
        self.include(name.trim_matches('"'), directive == ".IMPORT")?;
      }

      _ => return Err(ErrorKind::UnknownDirective(directive.to_string()))

    }
    Ok(())
  }

  /// Splices a file's lines in front of the queue. With `once`, a file that was already
  /// imported is skipped. Plain includes are not recorded.
  fn include(&mut self, name: &str, once: bool) -> Result<(), ErrorKind> {
    let path = self.sources.resolve(name);
    if once && !self.imported.insert(path.clone()) {
      debug!(path = %path.display(), "skipping repeated import");
      return Ok(());
    }

    let text = self.sources.load(&path).map_err(|error| ErrorKind::SourceUnavailable {
      path    : path.display().to_string(),
      message : error.to_string()
    })?;
    debug!(path = %path.display(), "including source");
    self.load_source(&path.display().to_string(), &text);
    Ok(())
  }

  // endregion

  // region Instructions

  fn emit(&mut self, instruction: Instruction, forward: Option<DefaultAtom>, location: &SourceLocation)
    -> Result<(), ErrorKind>
  {
    let layout = self.encoder.encode(&instruction)?;
    if let Some(symbol) = forward {
      self.patches.push(Patch {
        symbol,
        layout,
        format   : instruction.opcode().format(),
        location : location.clone()
      });
    }
    Ok(())
  }

  fn split_immediate(immediate: Immediate) -> (u16, Option<DefaultAtom>) {
    match immediate {
      Immediate::Value(value)    => (value, None),
      Immediate::Forward(symbol) => (PLACEHOLDER, Some(symbol))
    }
  }

  fn instruction(&mut self, mnemonic: &str, operands: &[&str], location: &SourceLocation)
    -> Result<(), ErrorKind>
  {
    match mnemonic {
      "PUSH.D" | "PUSH.W" | "POP.D" | "POP.W" => {
        let (opcode, width, flag) = match mnemonic {
          "PUSH.D" => (Opcode::Push, Width::Dword, 1),
          "PUSH.W" => (Opcode::Push, Width::Word,  0),
          "POP.D"  => (Opcode::Pop,  Width::Dword, 1),
          _        => (Opcode::Pop,  Width::Word,  0)
        };
        let mask = self.register_mask(mnemonic, operands, width)? | flag;
        return self.emit(Instruction::Imm { opcode, imm: mask }, None, location);
      }

      "RET" if operands.is_empty() => {
        return self.emit(Instruction::Imm { opcode: Opcode::Ret, imm: 0 }, None, location);
      }

      _ => {}
    }

    if let Some((opcode, width, write_back)) = transfer_mnemonic(mnemonic) {
      if operands.len() < 2 {
        return Err(ErrorKind::OperandCount { mnemonic: mnemonic.to_string(), expected: 2, found: operands.len() });
      }
      let (list, base) = operands.split_at(operands.len() - 1);
      let mask = self.register_mask(mnemonic, list, width)? | write_back as u16;
      let ra = self.register(base[0])?;
      return self.emit(Instruction::ImmReg { opcode, imm: mask, ra }, None, location);
    }

    let opcode = match Opcode::from_str(mnemonic) {
      Ok(opcode) if !(opcode.is_prefix()
                      || opcode.is_transfer_multiple()
                      || matches!(opcode, Opcode::Reserved | Opcode::Push | Opcode::Pop)) => opcode,
      _ => return Err(ErrorKind::UnknownMnemonic(mnemonic.to_string()))
    };

    match opcode.format() {

      Format::Imm if opcode == Opcode::Leave => {
        expect_operands(mnemonic, operands, 0)?;
        self.emit(Instruction::Imm { opcode, imm: 0 }, None, location)
      }

      Format::Imm => {
        expect_operands(mnemonic, operands, 1)?;
        let (imm, forward) = Assembler::split_immediate(self.immediate(operands[0])?);
        self.emit(Instruction::Imm { opcode, imm }, forward, location)
      }

      Format::ImmReg => {
        expect_operands(mnemonic, operands, 2)?;
        let ra = self.register(operands[0])?;
        let (imm, forward) = Assembler::split_immediate(self.immediate(operands[1])?);
        if matches!(opcode, Opcode::ShlI | Opcode::ShrI | Opcode::SarI) && forward.is_none() && imm > 31 {
          warn!(%location, "{} by {} exceeds the register width", opcode, imm);
        }
        self.emit(Instruction::ImmReg { opcode, imm, ra }, forward, location)
      }

      Format::ImmRegReg => {
        expect_operands(mnemonic, operands, 3)?;
        let ra = self.register(operands[0])?;
        let (imm, forward) = Assembler::split_immediate(self.immediate(operands[1])?);
        let rb = self.register(operands[2])?;
        self.emit(Instruction::ImmRegReg { opcode, imm, rb, ra }, forward, location)
      }

      Format::RegRegReg => {
        expect_operands(mnemonic, operands, 3)?;
        let ra = self.register(operands[0])?;
        let rc = self.register(operands[1])?;
        let rb = self.register(operands[2])?;
        self.emit(Instruction::RegRegReg { opcode, rc, rb, ra }, None, location)
      }

      Format::RegRegRegReg => {
        expect_operands(mnemonic, operands, 4)?;
        let ra = self.register(operands[0])?;
        let rb = self.register(operands[1])?;
        let rd = self.register(operands[2])?;
        let rc = self.register(operands[3])?;
        self.emit(Instruction::RegRegRegReg { opcode, rd, rc, rb, ra }, None, location)
      }

      Format::Prefix | Format::Reserved => Err(ErrorKind::UnknownMnemonic(mnemonic.to_string()))

    }
  }

  // endregion

  fn resolve_patches(&mut self) -> Result<(), AssemblyError> {
    let patches = std::mem::take(&mut self.patches);
    for patch in patches {
      let fail = |kind| AssemblyError { location: patch.location.clone(), kind };

      let address = self.symbols
                        .get_address(&patch.symbol)
                        .ok_or_else(|| fail(ErrorKind::UnresolvedSymbol(patch.symbol.to_string())))?;
      let value = check_range(address as i64, 0, 0xFFFF).map_err(fail)? as u16;

      debug!(symbol = %patch.symbol, offset = patch.layout.start(), value, "patching forward reference");
      self.encoder
          .patch_immediate(&patch.layout, patch.format, value)
          .map_err(|error| fail(ErrorKind::Encode(error)))?;
    }
    Ok(())
  }
}

/// Assembles a single in-memory source text.
pub fn assemble(text: &str) -> Result<Vec<u8>, AssemblyError> {
  let mut assembler = Assembler::new();
  assembler.load_source("<input>", text);
  assembler.assemble_all()
}
