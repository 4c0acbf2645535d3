use std::collections::HashMap;

use string_cache::DefaultAtom;

/**
  The assembler's symbol table maps labels to the address they were defined at. Several labels
  may share one address, but a label can only be defined once.
*/
#[derive(Clone, Debug, Default)]
pub struct SymbolTable{
  table: HashMap<DefaultAtom, u32>
}

impl SymbolTable{

  pub fn new() -> SymbolTable {
    SymbolTable{
      table: HashMap::new()
    }
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn get_address(&self, label: &str) -> Option<u32>{
    self.table.get(&DefaultAtom::from(label)).copied()
  }

  /// All labels defined at `address`, in lexical order.
  pub fn labels_at(&self, address: u32) -> Vec<DefaultAtom>{
    let mut labels: Vec<DefaultAtom> =
      self.table
          .iter()
          .filter(|(_, value)| **value == address)
          .map(|(label, _)| label.clone())
          .collect();
    labels.sort_by(|a, b| (**a).cmp(&**b));
    labels
  }

  /// Fails with the existing entry if `label` is already defined.
  pub fn insert(&mut self, label: DefaultAtom, address: u32)
    -> Result<(), (DefaultAtom, u32)>{
    match self.table.get(&label) {
      Some(existing) => Err((label, *existing)),
      None => {
        self.table.insert(label, address);
        Ok(())
      }
    }
  }

  /// Entries ordered by address, then label.
  pub fn entries(&self) -> Vec<(DefaultAtom, u32)>{
    let mut entries: Vec<(DefaultAtom, u32)> =
      self.table.iter().map(|(label, address)| (label.clone(), *address)).collect();
    entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| (*a.0).cmp(&*b.0)));
    entries
  }
}
