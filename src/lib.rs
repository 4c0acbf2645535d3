/*!
  A 16-bit word instruction set: its binary encoding, an assembler and disassembler for it, and
  a process unit that executes it under a cooperative quanta budget.

  ```text
  source ──Assembler──▶ bytes ──MemoryUnit──▶ ProcessUnit::execute_next_quanta
                          └──────disassemble──▶ text
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod bytecode;
pub mod config;
pub mod cpu;
pub mod memory;
pub mod source;
pub mod symboltable;

pub use bytecode::assembly::{assemble, Assembler, AssemblyError};
pub use bytecode::disassemble;
pub use config::ProcessUnitConfig;
pub use cpu::{ExecutionError, ProcessUnit};
pub use memory::{GenericMemory, MemoryHandler, MemoryUnit};
