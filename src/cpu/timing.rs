//! The cooperative timing model. Each tick grants a fixed number of quanta; instructions are
//! paid for in full before they run and unspent quanta carry into the next tick.

/// The cost of the most expensive instruction.
pub const MAX_INSTRUCTION_QUANTA: u32 = 6;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QuantaBank {
  balance : u32,
  refill  : u32
}

impl QuantaBank {
  pub fn new(refill: u32) -> QuantaBank {
    QuantaBank { balance: 0, refill }
  }

  pub fn balance(&self) -> u32 {
    self.balance
  }

  /// Grants one tick. The carried balance is reduced modulo the refill so it stays bounded.
  pub fn refill(&mut self) {
    self.balance = (self.balance % self.refill) + self.refill;
  }

  pub fn deposit(&mut self, amount: u32) {
    self.balance = self.balance.saturating_add(amount);
  }

  /// Pays `cost` if the balance covers it.
  pub fn try_spend(&mut self, cost: u32) -> bool {
    match self.balance.checked_sub(cost) {
      Some(rest) => {
        self.balance = rest;
        true
      }
      None => false
    }
  }

  pub fn clear(&mut self) {
    self.balance = 0;
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn refill_carries_leftovers(){
    let mut bank = QuantaBank::new(6);
    bank.refill();
    assert_eq!(bank.balance(), 6);
    assert!(bank.try_spend(4));
    assert!(!bank.try_spend(4));
    bank.refill();
    assert_eq!(bank.balance(), 8);
    bank.deposit(3);
    assert_eq!(bank.balance(), 11);
  }
}
