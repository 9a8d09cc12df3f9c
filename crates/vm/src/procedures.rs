//! The name-to-procedure table, extended by each loaded module.

use std::collections::HashMap;
use std::rc::Rc;

use opo_common::{ObjectFile, Procedure};
use tracing::debug;

use crate::error::RuntimeError;

/// All callable procedures. Lookup is case-insensitive and the first
/// procedure registered under a name wins.
#[derive(Debug, Default)]
pub struct ProcedureTable {
    procedures: Vec<Rc<Procedure>>,
    by_name: HashMap<String, usize>,
    modules: Vec<String>,
}

impl ProcedureTable {
    pub fn new(main: ObjectFile) -> Self {
        let mut table = Self::default();
        table.modules.push(main.header.source_filename.to_uppercase());
        table.extend(main.procedures);
        table
    }

    fn extend(&mut self, procedures: Vec<Procedure>) {
        for procedure in procedures {
            let index = self.procedures.len();
            self.by_name
                .entry(procedure.name.to_uppercase())
                .or_insert(index);
            self.procedures.push(Rc::new(procedure));
        }
    }

    /// Appends a module's procedures. Loading the same module name twice
    /// is an error.
    pub fn add_module(&mut self, name: &str, module: ObjectFile) -> Result<(), RuntimeError> {
        let key = name.to_uppercase();
        if self.modules.contains(&key) {
            return Err(RuntimeError::ModuleAlreadyLoaded {
                name: name.to_string(),
            });
        }
        debug!(module = name, procedures = module.procedures.len(), "module loaded");
        self.modules.push(key);
        self.extend(module.procedures);
        Ok(())
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.modules.contains(&name.to_uppercase())
    }

    /// Names compare case-insensitively, as OPL identifiers do.
    pub fn lookup(&self, name: &str) -> Option<Rc<Procedure>> {
        self.by_name
            .get(&name.to_uppercase())
            .map(|&i| Rc::clone(&self.procedures[i]))
    }

    /// The entry procedure: first in the main file's table.
    pub fn entry(&self) -> Option<Rc<Procedure>> {
        self.procedures.first().map(Rc::clone)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.iter().map(|p| p.as_ref())
    }
}
