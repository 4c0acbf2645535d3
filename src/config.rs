use thiserror::Error;

use crate::cpu::timing::MAX_INSTRUCTION_QUANTA;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ConfigError {
  #[error("a quanta refill of {refill} cannot pay for the most expensive instruction ({minimum})")]
  RefillTooSmall {
    refill  : u32,
    minimum : u32
  },
}

/// Start-up parameters of a `ProcessUnit`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProcessUnitConfig {
  /// Quanta granted by each tick.
  pub quanta_refill : u32,
  pub initial_ip    : u32,
  pub initial_sp    : u32
}

impl Default for ProcessUnitConfig {
  fn default() -> ProcessUnitConfig {
    ProcessUnitConfig {
      quanta_refill : MAX_INSTRUCTION_QUANTA,
      initial_ip    : 0,
      initial_sp    : 0
    }
  }
}

impl ProcessUnitConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.quanta_refill < MAX_INSTRUCTION_QUANTA {
      return Err(ConfigError::RefillTooSmall {
        refill  : self.quanta_refill,
        minimum : MAX_INSTRUCTION_QUANTA
      });
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn refill_must_cover_every_instruction(){
    assert_eq!(ProcessUnitConfig::default().validate(), Ok(()));
    let config = ProcessUnitConfig { quanta_refill: 5, ..Default::default() };
    assert_eq!(config.validate(), Err(ConfigError::RefillTooSmall { refill: 5, minimum: 6 }));
  }
}
