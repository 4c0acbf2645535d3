use tracing_subscriber::EnvFilter;

use wordcpu::{disassemble, Assembler, GenericMemory, MemoryUnit, ProcessUnit, ProcessUnitConfig};

const MEMORY_SIZE: u32 = 0x1000;
const TICKS: usize = 64;

/// Sums 1..=COUNT into %R2D, then spins.
const PROGRAM: &str = "
.SET COUNT, 10
.SET STACK_TOP, 0x1000

start:  MOV.I   %SP, STACK_TOP
        MOV.I   %R1D, COUNT
        CALL.Z  %R0, sum, %R0
halt:   JREL.Z  %R0, -4             ; jump onto itself

sum:    ENTER   0
        PUSH.D  %R3D
        MOV.I   %R2D, 0
        MOV.I   %R3D, 1
loop:   ADD.R   %R2D, %R2D, %R1D
        SUB.R   %R1D, %R1D, %R3D
        JABS.NZ %R1D, loop, %R0
        POP.D   %R3D
        LEAVE
        RET
";

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  #[cfg(feature = "trace_computation")]
  println!("Computation Tracing ENABLED");

  let mut assembler = Assembler::new();
  assembler.load_source("sum.asm", PROGRAM);
  let bytes = match assembler.assemble_all() {
    Ok(bytes) => bytes,
    Err(error) => {
      eprintln!("{}", error);
      return;
    }
  };

  println!("Program:\n{}", disassemble(&bytes, assembler.origin(), Some(assembler.symbols())));

  let mut memory = MemoryUnit::new();
  if let Err(error) = memory.map(0, GenericMemory::with_contents(MEMORY_SIZE, &bytes)) {
    eprintln!("{}", error);
    return;
  }
  let mut machine = match ProcessUnit::with_config(memory, ProcessUnitConfig::default()) {
    Ok(machine) => machine,
    Err(error) => {
      eprintln!("{}", error);
      return;
    }
  };

  for tick in 0..TICKS {
    if let Err(error) = machine.execute_next_quanta() {
      eprintln!("tick {}: {}", tick, error);
      break;
    }
  }

  println!("{}", machine);
}
