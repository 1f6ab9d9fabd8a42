//! The type access decision.
//!
//! Rules are applied in priority order and the first one that applies decides:
//!
//! 1. Types without a namespace (nested types, global types) are decided through their
//!    resolution scope: a nested type inherits its parent's decision, either wholesale when the
//!    parent is allowed with `All` or through the parent's `NestedTypes`. A global type is only
//!    allowed when its assembly is trusted wholesale.
//! 2. A namespace starting with a whitelisted prefix is allowed wholesale.
//! 3. A type of a wholesale trusted assembly is allowed.
//! 4. Otherwise the explicit `Types` table decides.
//!
//! Coarse grants hand out [`DEFAULT_ALL`].

use crate::sandbox::{
    config::{SandboxConfig, TypeConfig, DEFAULT_ALL},
    types::{MType, ResolutionScope, TypeReference},
};

impl SandboxConfig {
    /// Decide whether code may access `reference`, returning the policy that governs its
    /// members when it may.
    #[must_use]
    pub fn is_type_access_allowed(&self, reference: &TypeReference) -> Option<&TypeConfig> {
        let Some(namespace) = reference.namespace.as_deref() else {
            return self.no_namespace_access(reference);
        };

        if self
            .whitelisted_namespaces
            .iter()
            .any(|prefix| namespace.starts_with(prefix.as_str()))
        {
            return Some(&DEFAULT_ALL);
        }

        if self.is_wholesale(&reference.scope) {
            return Some(&DEFAULT_ALL);
        }

        self.type_config(namespace, &reference.name)
    }

    fn no_namespace_access(&self, reference: &TypeReference) -> Option<&TypeConfig> {
        match &reference.scope {
            ResolutionScope::Type(parent) => {
                let MType::Referenced(parent) = parent.as_ref() else {
                    return None;
                };

                let parent_config = self.is_type_access_allowed(parent)?;
                if parent_config.all {
                    return Some(&DEFAULT_ALL);
                }

                parent_config.nested_types.get(&reference.name)
            }
            scope if self.is_wholesale(scope) => Some(&DEFAULT_ALL),
            ResolutionScope::Assembly(_) => None,
        }
    }

    fn is_wholesale(&self, scope: &ResolutionScope) -> bool {
        matches!(scope, ResolutionScope::Assembly(name)
            if self.multi_assembly_wholesale_references.contains(name))
    }
}
