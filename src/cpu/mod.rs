/*!
  The process unit: registers, program counter, and the quanta scheduler, executing against an
  owned `MemoryUnit`.

  Every call to `step` fetches one complete instruction (prefixes included) and executes it,
  so prefix state never survives from one instruction to the next. Faults end the current
  run with an `ExecutionError`; the machine state stays inspectable afterwards.
*/

mod execute;
pub mod registers;
pub mod timing;

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};
use thiserror::Error;
#[cfg(feature = "trace_computation")]
use tracing::trace;

use crate::bytecode::{Decoder, Fetched, Instruction, Opcode, Register, WordSource, BP_INDEX, SP_INDEX};
use crate::config::{ConfigError, ProcessUnitConfig};
use crate::memory::{MemoryError, MemoryUnit};
use registers::RegisterFile;
use timing::QuantaBank;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ExecutionError {
  #[error("illegal operation 0x{word:04x} at 0x{address:08x}")]
  IllegalOpcode {
    word    : u16,
    address : u32
  },

  #[error("{opcode} at 0x{address:08x} has operands of the wrong format")]
  FormatMismatch {
    opcode  : Opcode,
    address : u32
  },

  #[error("division by zero at 0x{address:08x}")]
  DivisionByZero {
    address: u32
  },

  #[error(transparent)]
  Memory(#[from] MemoryError),
}

/// Reads instruction words out of a `MemoryUnit`.
pub struct MemoryReader<'a> {
  memory  : &'a MemoryUnit,
  address : u32
}

impl<'a> MemoryReader<'a> {
  pub fn new(memory: &'a MemoryUnit, address: u32) -> MemoryReader<'a> {
    MemoryReader { memory, address }
  }

  pub fn address(&self) -> u32 {
    self.address
  }
}

impl<'a> WordSource for MemoryReader<'a> {
  type Error = MemoryError;

  fn next_word(&mut self) -> Result<u16, MemoryError> {
    let word = self.memory.read_u16(self.address)?;
    self.address = self.address.wrapping_add(2);
    Ok(word)
  }
}

pub struct ProcessUnit {
  registers : RegisterFile,
  ip        : u32,
  bank      : QuantaBank,
  config    : ProcessUnitConfig,
  memory    : MemoryUnit
}

impl ProcessUnit {

  // region Construction and accessors

  pub fn new(memory: MemoryUnit) -> ProcessUnit {
    let config = ProcessUnitConfig::default();
    let mut unit = ProcessUnit {
      registers : RegisterFile::new(),
      ip        : 0,
      bank      : QuantaBank::new(config.quanta_refill),
      config,
      memory
    };
    unit.reset();
    unit
  }

  pub fn with_config(memory: MemoryUnit, config: ProcessUnitConfig)
    -> Result<ProcessUnit, ConfigError>
  {
    config.validate()?;
    let mut unit = ProcessUnit {
      registers : RegisterFile::new(),
      ip        : config.initial_ip,
      bank      : QuantaBank::new(config.quanta_refill),
      config,
      memory
    };
    unit.reset();
    Ok(unit)
  }

  /// Clears the registers and quanta and restores the configured start state.
  pub fn reset(&mut self) {
    self.registers.reset();
    self.registers.set(SP_INDEX, self.config.initial_sp);
    self.ip = self.config.initial_ip;
    self.bank.clear();
  }

  pub fn ip(&self) -> u32 {
    self.ip
  }

  pub fn set_ip(&mut self, ip: u32) {
    self.ip = ip;
  }

  pub fn quanta(&self) -> u32 {
    self.bank.balance()
  }

  pub fn registers(&self) -> &RegisterFile {
    &self.registers
  }

  pub fn registers_mut(&mut self) -> &mut RegisterFile {
    &mut self.registers
  }

  /// Full 32-bit contents of `%Rindex`.
  pub fn register(&self, index: u8) -> u32 {
    self.registers.get(index)
  }

  pub fn set_register(&mut self, index: u8, value: u32) {
    self.registers.set(index, value);
  }

  /// `register` read through its width view, zero-extended.
  pub fn register_view(&self, register: Register) -> u32 {
    self.registers.read_unsigned(register)
  }

  pub fn memory(&self) -> &MemoryUnit {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut MemoryUnit {
    &mut self.memory
  }

  fn sp(&self) -> u32 {
    self.registers.get(SP_INDEX)
  }

  fn set_sp(&mut self, value: u32) {
    self.registers.set(SP_INDEX, value);
  }

  pub fn push_dword(&mut self, value: u32) -> Result<(), ExecutionError> {
    let address = self.sp().wrapping_sub(4);
    self.memory.write_u32(address, value)?;
    self.set_sp(address);
    Ok(())
  }

  pub fn pop_dword(&mut self) -> Result<u32, ExecutionError> {
    let address = self.sp();
    let value = self.memory.read_u32(address)?;
    self.set_sp(address.wrapping_add(4));
    Ok(value)
  }

  // endregion

  // region Fetch, execute, schedule

  /// Reads the instruction at `ip` without changing any state. Returns it with the address
  /// following it.
  pub fn fetch(&self) -> Result<(Fetched, u32), ExecutionError> {
    let mut reader = MemoryReader::new(&self.memory, self.ip);
    let fetched = Decoder::fetch(&mut reader)?;
    Ok((fetched, reader.address()))
  }

  /// The cost of the next instruction. Illegal operations cost nothing so that they are
  /// always reached and reported.
  pub fn peek_cost(&self) -> Result<u32, ExecutionError> {
    match self.fetch()?.0 {
      Fetched::Instruction(instruction) => Ok(instruction.quanta()),
      Fetched::Illegal(_)               => Ok(0)
    }
  }

  fn dispatch(&mut self, fetched: Fetched, next_ip: u32) -> Result<(), ExecutionError> {
    let address = self.ip;
    self.ip = next_ip;
    match fetched {

      Fetched::Instruction(instruction) => {
        #[cfg(feature = "trace_computation")]
        trace!("0x{:08x}  {}", address, instruction);
        self.execute(instruction, address)
      }

      Fetched::Illegal(word) => Err(ExecutionError::IllegalOpcode { word, address }),

    }
  }

  /// Executes exactly one instruction, ignoring the quanta bank.
  pub fn step(&mut self) -> Result<(), ExecutionError> {
    let (fetched, next_ip) = self.fetch()?;
    self.dispatch(fetched, next_ip)
  }

  /// Executes instructions while the bank can pay for them. Returns how many ran.
  fn drain(&mut self) -> Result<usize, ExecutionError> {
    let mut executed = 0;
    loop {
      let (fetched, next_ip) = self.fetch()?;
      let cost = match fetched {
        Fetched::Instruction(instruction) => instruction.quanta(),
        Fetched::Illegal(_)               => 0
      };
      if !self.bank.try_spend(cost) {
        return Ok(executed);
      }
      self.dispatch(fetched, next_ip)?;
      executed += 1;
    }
  }

  /// One scheduler tick: refill the bank, then run until the next instruction is unaffordable.
  pub fn execute_next_quanta(&mut self) -> Result<usize, ExecutionError> {
    self.bank.refill();
    self.drain()
  }

  /// Adds an arbitrary budget and runs it down like a tick.
  pub fn run_quanta(&mut self, budget: u32) -> Result<usize, ExecutionError> {
    self.bank.deposit(budget);
    self.drain()
  }

  /// Executes a single already decoded instruction as if it were found at `ip`.
  pub fn execute_instruction(&mut self, instruction: Instruction) -> Result<(), ExecutionError> {
    let address = self.ip;
    self.execute(instruction, address)
  }

  // endregion

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for index in 0..16u8 {
      let name = match index {
        SP_INDEX => format!("%R{} (SP) =", index),
        BP_INDEX => format!("%R{} (BP) =", index),
        _        => format!("%R{} =", index)
      };
      table.add_row(row![r->name, format!("0x{:08x}", self.registers.get(index))]);
    }
    table
  }

  fn make_state_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"State", ubl->"Value"]);
    table.add_row(row![r->"IP =", format!("0x{:08x}", self.ip)]);
    table.add_row(row![r->"Quanta =", self.bank.balance()]);

    let next = match self.fetch() {
      Ok((Fetched::Instruction(instruction), _)) => instruction.to_string(),
      Ok((Fetched::Illegal(word), _))            => format!("0x{:04x} ??", word),
      Err(error)                                 => error.to_string()
    };
    table.add_row(row![r->"Next =", next]);
    table
  }

  // endregion
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for ProcessUnit {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let register_table = self.make_register_table();
    let state_table    = self.make_state_table();

    let mut combined_table = table!([register_table, state_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Machine"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "{}", combined_table)
  }
}
