//! Instruction semantics. `ip` already points past the instruction when these run.

use crate::bytecode::{Instruction, Opcode, Register, Width, REGISTER_COUNT, SP_INDEX};
use super::{ExecutionError, ProcessUnit};

fn sign_extend(imm: u16) -> i32 {
  imm as i16 as i32
}

/// Lane-wise `op` over `lane_bits`-wide lanes. Carries do not cross lanes.
fn lanes(lhs: u32, rhs: u32, lane_bits: u32, op: fn(u32, u32) -> u32) -> u32 {
  let mask = (1u32 << lane_bits) - 1;
  (0..32u32).step_by(lane_bits as usize).fold(0u32, |result, shift| {
    let lane = op((lhs >> shift) & mask, (rhs >> shift) & mask) & mask;
    result | (lane << shift)
  })
}

/// Where the high half of a product starts for a destination of the given width.
fn high_split(width: Width) -> u32 {
  match width {
    Width::LowByte | Width::HighByte => 8,
    Width::Word                      => 16,
    Width::Dword                     => 32
  }
}

/// Transfer size in bytes and register view of the `LDM`/`STM` variants.
fn transfer_shape(opcode: Opcode) -> (u32, Width) {
  match opcode {
    Opcode::LdmD | Opcode::StmD => (4, Width::Dword),
    Opcode::LdmW | Opcode::StmW => (2, Width::Word),
    Opcode::LdmL | Opcode::StmL => (1, Width::LowByte),
    _                           => (1, Width::HighByte)
  }
}

impl ProcessUnit {

  pub(super) fn execute(&mut self, instruction: Instruction, address: u32)
    -> Result<(), ExecutionError>
  {
    let mismatch = ExecutionError::FormatMismatch { opcode: instruction.opcode(), address };

    match instruction {

      Instruction::Imm { opcode, imm } => {
        match opcode {
          Opcode::Push  => self.push_mask(imm),
          Opcode::Pop   => self.pop_mask(imm),
          Opcode::Ret   => {
            self.ip = self.pop_dword()?;
            let sp = self.sp().wrapping_add(sign_extend(imm) as u32);
            self.set_sp(sp);
            Ok(())
          }
          Opcode::Enter => {
            let bp = self.registers.get(Register::BP.index());
            self.push_dword(bp)?;
            let sp = self.sp();
            self.registers.set(Register::BP.index(), sp);
            self.set_sp(sp.wrapping_sub(sign_extend(imm) as u32));
            Ok(())
          }
          Opcode::Leave => {
            let bp = self.registers.get(Register::BP.index());
            self.set_sp(bp);
            let saved = self.pop_dword()?;
            self.registers.set(Register::BP.index(), saved);
            Ok(())
          }
          _ => Err(mismatch)
        }
      }

      Instruction::ImmReg { opcode, imm, ra } => {
        let value = sign_extend(imm);
        match opcode {
          Opcode::MovI  => self.registers.write(ra, value as u32),
          Opcode::AddI  => {
            let result = self.registers.read_signed(ra).wrapping_add(value);
            self.registers.write(ra, result as u32)
          }
          Opcode::SubI  => {
            let result = self.registers.read_signed(ra).wrapping_sub(value);
            self.registers.write(ra, result as u32)
          }
          Opcode::RsubI => {
            let result = value.wrapping_sub(self.registers.read_signed(ra));
            self.registers.write(ra, result as u32)
          }
          Opcode::ShlI  => {
            let result = self.registers.read_unsigned(ra).wrapping_shl(imm as u32);
            self.registers.write(ra, result)
          }
          Opcode::ShrI  => {
            let result = self.registers.read_unsigned(ra).wrapping_shr(imm as u32);
            self.registers.write(ra, result)
          }
          Opcode::SarI  => {
            let result = self.registers.read_signed(ra).wrapping_shr(imm as u32);
            self.registers.write(ra, result as u32)
          }
          Opcode::MovLo | Opcode::MovHi => self.move_half(opcode, imm, ra),

          Opcode::JrelZ | Opcode::JrelNz | Opcode::JrelGe
          | Opcode::JrelGt | Opcode::JrelLe | Opcode::JrelLt => {
            if self.condition_holds(opcode, ra) {
              self.ip = self.ip.wrapping_add(value as u32);
            }
          }

          opcode if opcode.is_transfer_multiple() => return self.transfer_multiple(opcode, imm, ra),

          _ => return Err(mismatch)
        }
        Ok(())
      }

      Instruction::ImmRegReg { opcode, imm, rb, ra } => {
        let value = sign_extend(imm);
        let effective = value.wrapping_add(self.registers.read_signed(rb)) as u32;
        match opcode {
          Opcode::JabsZ | Opcode::JabsNz | Opcode::JabsGe
          | Opcode::JabsGt | Opcode::JabsLe | Opcode::JabsLt => {
            if self.condition_holds(opcode, ra) {
              self.ip = effective;
            }
          }

          Opcode::CallZ | Opcode::CallNz | Opcode::CallGe
          | Opcode::CallGt | Opcode::CallLe | Opcode::CallLt => {
            if self.condition_holds(opcode, ra) {
              let return_address = self.ip;
              self.push_dword(return_address)?;
              self.ip = effective;
            }
          }

          Opcode::LdD => {
            let loaded = self.memory.read_u32(effective)?;
            self.registers.write(ra, loaded);
          }
          Opcode::LdW => {
            let loaded = self.memory.read_u16(effective)? as i16 as i32;
            self.registers.write(ra, loaded as u32);
          }
          Opcode::LdB => {
            let loaded = self.memory.read(effective)? as i8 as i32;
            self.registers.write(ra, loaded as u32);
          }
          Opcode::StD => {
            let stored = self.registers.read_signed(ra) as u32;
            self.memory.write_u32(effective, stored)?;
          }
          Opcode::StW => {
            let stored = self.registers.read_signed(ra) as u16;
            self.memory.write_u16(effective, stored)?;
          }
          Opcode::StB => {
            let stored = self.registers.read_signed(ra) as u8;
            self.memory.write(effective, stored)?;
          }

          Opcode::CmovI => {
            if self.registers.read_signed(rb) != 0 {
              self.registers.write(ra, value as u32);
            }
          }

          _ => return Err(mismatch)
        }
        Ok(())
      }

      Instruction::RegRegReg { opcode, rc, rb, ra } => {
        let result = match opcode {
          Opcode::AddR  => self.registers.read_signed(rc).wrapping_add(self.registers.read_signed(rb)) as u32,
          Opcode::SubR  => self.registers.read_signed(rc).wrapping_sub(self.registers.read_signed(rb)) as u32,
          Opcode::AndR  => self.registers.read_unsigned(rc) &  self.registers.read_unsigned(rb),
          Opcode::OrR   => self.registers.read_unsigned(rc) |  self.registers.read_unsigned(rb),
          Opcode::XorR  => self.registers.read_unsigned(rc) ^  self.registers.read_unsigned(rb),
          Opcode::AndnR => self.registers.read_unsigned(rc) & !self.registers.read_unsigned(rb),
          Opcode::OrnR  => self.registers.read_unsigned(rc) | !self.registers.read_unsigned(rb),

          Opcode::ShlR  => self.registers.read_unsigned(rc).wrapping_shl(self.registers.read_unsigned(rb)),
          Opcode::ShrR  => self.registers.read_unsigned(rc).wrapping_shr(self.registers.read_unsigned(rb)),
          Opcode::SarR  => self.registers.read_signed(rc).wrapping_shr(self.registers.read_unsigned(rb)) as u32,

          Opcode::CmovR => {
            let source = self.registers.read_signed(rc);
            if self.registers.read_signed(rb) == 0 {
              return Ok(());
            }
            source as u32
          }

          Opcode::PaddW | Opcode::PaddB | Opcode::PsubW | Opcode::PsubB => {
            let lhs = self.registers.read_unsigned(rc);
            let rhs = self.registers.read_unsigned(rb);
            match opcode {
              Opcode::PaddW => lanes(lhs, rhs, 16, u32::wrapping_add),
              Opcode::PaddB => lanes(lhs, rhs, 8,  u32::wrapping_add),
              Opcode::PsubW => lanes(lhs, rhs, 16, u32::wrapping_sub),
              _             => lanes(lhs, rhs, 8,  u32::wrapping_sub),
            }
          }

          _ => return Err(mismatch)
        };
        self.registers.write(ra, result);
        Ok(())
      }

      Instruction::RegRegRegReg { opcode, rd, rc, rb, ra } => {
        match opcode {
          Opcode::Imul | Opcode::Mul => {
            let product = match opcode {
              Opcode::Imul => {
                (self.registers.read_signed(rd) as i64 * self.registers.read_signed(rc) as i64) as u64
              }
              _ => self.registers.read_unsigned(rd) as u64 * self.registers.read_unsigned(rc) as u64
            };
            self.registers.write(rb, product as u32);
            self.registers.write(ra, (product >> high_split(ra.width())) as u32);
          }

          Opcode::Idiv => {
            let lhs = self.registers.read_signed(rd) as i64;
            let rhs = self.registers.read_signed(rc) as i64;
            if rhs == 0 {
              return Err(ExecutionError::DivisionByZero { address });
            }
            self.registers.write(rb, (lhs % rhs) as u32);
            self.registers.write(ra, (lhs / rhs) as u32);
          }

          Opcode::Div => {
            let lhs = self.registers.read_unsigned(rd);
            let rhs = self.registers.read_unsigned(rc);
            if rhs == 0 {
              return Err(ExecutionError::DivisionByZero { address });
            }
            self.registers.write(rb, lhs % rhs);
            self.registers.write(ra, lhs / rhs);
          }

          Opcode::Imac => {
            let result =
              self.registers.read_signed(rd)
                  .wrapping_mul(self.registers.read_signed(rc))
                  .wrapping_add(self.registers.read_signed(rb));
            self.registers.write(ra, result as u32);
          }

          _ => return Err(mismatch)
        }
        Ok(())
      }

    }
  }

  fn condition_holds(&self, opcode: Opcode, flag: Register) -> bool {
    match opcode.condition() {
      Some(condition) => condition.holds(self.registers.read_signed(flag)),
      None            => false
    }
  }

  /**
    `MOV.LO`/`MOV.HI`: replace one half of the view, keeping the other half. The result is
    written to the whole register, so bits outside the view are cleared.
  */
  fn move_half(&mut self, opcode: Opcode, imm: u16, register: Register) {
    let half  = register.width().bits() / 2;
    let field = (1u32 << half) - 1;
    let shift = match opcode {
      Opcode::MovHi => half,
      _             => 0
    };
    let offset = match register.width() {
      Width::HighByte => 8,
      _               => 0
    };
    let kept    = self.registers.read_unsigned(register) & !(field << shift);
    let updated = kept | ((imm as u32 & field) << shift);
    self.registers.set(register.index(), updated << offset);
  }

  /// Pushes the registers selected by bits 1..15 of `mask`, highest first. Bit 0 selects
  /// dword transfers.
  fn push_mask(&mut self, mask: u16) -> Result<(), ExecutionError> {
    let dword = mask & 1 != 0;
    let mut address = self.sp();
    for index in (1..REGISTER_COUNT).rev().filter(|index| mask & (1 << index) != 0) {
      let value = self.registers.get(index);
      if dword {
        address = address.wrapping_sub(4);
        self.memory.write_u32(address, value)?;
      } else {
        address = address.wrapping_sub(2);
        self.memory.write_u16(address, value as u16)?;
      }
    }
    if mask & (1 << SP_INDEX) == 0 {
      self.set_sp(address);
    }
    Ok(())
  }

  fn pop_mask(&mut self, mask: u16) -> Result<(), ExecutionError> {
    let dword = mask & 1 != 0;
    let mut address = self.sp();
    for index in (1..REGISTER_COUNT).filter(|index| mask & (1 << index) != 0) {
      if dword {
        let value = self.memory.read_u32(address)?;
        self.registers.set(index, value);
        address = address.wrapping_add(4);
      } else {
        let value = self.memory.read_u16(address)?;
        self.registers.write(Register::word(index), value as u32);
        address = address.wrapping_add(2);
      }
    }
    if mask & (1 << SP_INDEX) == 0 {
      self.set_sp(address);
    }
    Ok(())
  }

  /**
    `LDM`/`STM`. Loads walk upwards from the base address starting with `%R1`; stores walk
    downwards, decrementing before each transfer, starting with `%R15`. With mask bit 0 set the
    final address is written back to the base, unless the base itself was transferred.
  */
  fn transfer_multiple(&mut self, opcode: Opcode, mask: u16, base: Register)
    -> Result<(), ExecutionError>
  {
    let (size, width) = transfer_shape(opcode);
    let selected = |index: &u8| mask & (1 << index) != 0;
    let mut address = self.registers.read_unsigned(base);

    match opcode {
      Opcode::LdmD | Opcode::LdmW | Opcode::LdmL | Opcode::LdmH => {
        for index in (1..REGISTER_COUNT).filter(selected) {
          let value = match size {
            4 => self.memory.read_u32(address)?,
            2 => self.memory.read_u16(address)? as u32,
            _ => self.memory.read(address)? as u32
          };
          self.registers.write(Register::new(index, width), value);
          address = address.wrapping_add(size);
        }
      }
      _ => {
        for index in (1..REGISTER_COUNT).rev().filter(selected) {
          address = address.wrapping_sub(size);
          let value = self.registers.read_unsigned(Register::new(index, width));
          match size {
            4 => self.memory.write_u32(address, value)?,
            2 => self.memory.write_u16(address, value as u16)?,
            _ => self.memory.write(address, value as u8)?
          }
        }
      }
    }

    if mask & 1 != 0 && !selected(&base.index()) {
      self.registers.write(base, address);
    }
    Ok(())
  }
}
