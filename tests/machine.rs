use wordcpu::bytecode::assembly::Assembler;
use wordcpu::memory::MemoryError;
use wordcpu::{ExecutionError, GenericMemory, MemoryUnit, ProcessUnit, ProcessUnitConfig};

const SUM: &str = "
.SET COUNT, 10
.SET STACK_TOP, 0x1000

start:  MOV.I   %SP, STACK_TOP
        MOV.I   %R1D, COUNT
        CALL.Z  %R0, sum, %R0
halt:   JREL.Z  %R0, -4

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

fn load(text: &str, config: ProcessUnitConfig) -> (ProcessUnit, Assembler) {
  let mut assembler = Assembler::new();
  assembler.load_source("test.asm", text);
  let bytes = assembler.assemble_all().unwrap();

  let mut memory = MemoryUnit::new();
  memory.map(0, GenericMemory::with_contents(0x1000, &bytes)).unwrap();
  (ProcessUnit::with_config(memory, config).unwrap(), assembler)
}

#[test]
fn subroutine_sums_a_series() {
  let (mut machine, assembler) = load(SUM, ProcessUnitConfig::default());
  let halt = assembler.symbols().get_address("halt").unwrap();

  for _ in 0..64 {
    machine.execute_next_quanta().unwrap();
  }

  assert_eq!(machine.ip(), halt);
  assert_eq!(machine.register(2), 55);
  assert_eq!(machine.register(1), 0);
  // Callee-saved register, frame pointer and stack are all restored.
  assert_eq!(machine.register(3), 0);
  assert_eq!(machine.register(9), 0);
  assert_eq!(machine.register(8), 0x1000);
}

#[test]
fn larger_refill_runs_further_per_tick() {
  let (mut slow, _) = load(SUM, ProcessUnitConfig::default());
  let config = ProcessUnitConfig { quanta_refill: 24, ..Default::default() };
  let (mut fast, _) = load(SUM, config);

  let slow_count = slow.execute_next_quanta().unwrap();
  let fast_count = fast.execute_next_quanta().unwrap();
  assert!(fast_count > slow_count);
}

#[test]
fn spinning_program_keeps_its_position() {
  let (mut machine, _) = load("MOV.I %R1, 0xFFFF\nJREL.Z %R0, -4\n", ProcessUnitConfig::default());

  assert_eq!(machine.execute_next_quanta(), Ok(1));
  assert_eq!(machine.register(1), 0x0000_FFFF);
  assert_eq!(machine.ip(), 4);
  assert_eq!(machine.quanta(), 5);

  for _ in 0..10 {
    assert_eq!(machine.execute_next_quanta(), Ok(1));
    assert_eq!(machine.ip(), 4);
  }
}

#[test]
fn stack_fault_is_reported() {
  // The stack pointer starts at zero, so the first push wraps below the mapped region.
  let (mut machine, _) = load("PUSH.D %R1D\n", ProcessUnitConfig::default());
  assert_eq!(
    machine.execute_next_quanta(),
    Err(ExecutionError::Memory(MemoryError::Unmapped(0xFFFF_FFFC)))
  );
}

#[test]
fn division_by_zero_is_reported() {
  let (mut machine, _) = load("MOV.I %R1, 9\nDIV %R2, %R3, %R1, %R4\n", ProcessUnitConfig::default());
  assert_eq!(machine.step(), Ok(()));
  assert_eq!(machine.step(), Err(ExecutionError::DivisionByZero { address: 2 }));
}

#[test]
fn reset_restores_configured_state() {
  let config = ProcessUnitConfig { initial_ip: 2, initial_sp: 0x800, ..Default::default() };
  let (mut machine, _) = load("LEAVE\nMOV.I %R1, 7\n", config);
  machine.step().unwrap();
  assert_eq!(machine.register(1), 7);

  machine.reset();
  assert_eq!(machine.ip(), 2);
  assert_eq!(machine.register(1), 0);
  assert_eq!(machine.register(8), 0x800);
  assert_eq!(machine.quanta(), 0);
}
