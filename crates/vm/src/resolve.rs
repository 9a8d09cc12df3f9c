//! Resolution of EE references to heap addresses.
//!
//! A procedure names the globals it uses, not where they live. At run
//! time the name is looked up in the call stack from the outermost
//! activation inwards; the first procedure that declares it owns the
//! variable. Results are cached per activation.

use opo_common::Value;

use crate::activation::{Activation, CachedReference};
use crate::error::RuntimeError;
use crate::execute::Context;

/// The target of an EE reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolved {
    /// A variable in some activation's frame.
    Variable(CachedReference),
    /// A parameter value of the current activation.
    Parameter(Value),
}

impl Context<'_> {
    /// Resolves `ee` to a variable, or to a parameter value when
    /// `allow_parameter` is set.
    pub(crate) fn resolve(&mut self, ee: u16, allow_parameter: bool) -> Result<Resolved, RuntimeError> {
        if let Some(&cached) = self.activation.ee_cache.get(&ee) {
            return Ok(Resolved::Variable(cached));
        }

        let procedure = &self.activation.procedure;
        let name = procedure
            .global_by_ee(ee)
            .map(|g| g.name.clone())
            .or_else(|| procedure.global_reference_by_ee(ee).map(|r| r.name.clone()));

        if let Some(name) = name {
            self.activation.scans += 1;
            let found = find_declaring(self.outer, &*self.activation, &name);
            let Some(reference) = found else {
                return Err(self.unresolved(ee));
            };
            self.activation.ee_cache.insert(ee, reference);
            return Ok(Resolved::Variable(reference));
        }

        if allow_parameter {
            if let Some(index) = self.activation.procedure.parameter_index_by_ee(ee) {
                return Ok(Resolved::Parameter(self.activation.parameters[index].clone()));
            }
        }

        Err(self.unresolved(ee))
    }

    /// Resolves `ee` to a variable; parameters have no address.
    pub(crate) fn resolve_variable(&mut self, ee: u16) -> Result<CachedReference, RuntimeError> {
        match self.resolve(ee, false)? {
            Resolved::Variable(reference) => Ok(reference),
            Resolved::Parameter(_) => Err(self.unresolved(ee)),
        }
    }

    fn unresolved(&self, ee: u16) -> RuntimeError {
        RuntimeError::UnresolvedReference {
            procedure: self.activation.procedure.name.clone(),
            ee,
        }
    }
}

/// Scans from the bottom of the call stack (including the current
/// activation, which is topmost) for the first declaration of `name`.
fn find_declaring(outer: &[Activation], current: &Activation, name: &str) -> Option<CachedReference> {
    outer
        .iter()
        .chain(std::iter::once(current))
        .enumerate()
        .find_map(|(owner, a)| {
            a.procedure.global_named(name).map(|g| CachedReference {
                address: a.frame + g.offset as usize,
                owner,
            })
        })
}
