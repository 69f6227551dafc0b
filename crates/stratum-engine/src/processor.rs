//! Definition processor extension point
//!
//! Processors (scope, sync, persistence, ...) run once per declared type.
//! They may contribute synthetic "scope interfaces", which take part in
//! member and property resolution after everything else, and hidden body
//! members, which are searched right after the type's own body.

use crate::model::{Member, TypeNode};

/// A processor consulted when a type is declared
pub trait DefinitionProcessor: Send + Sync {
    /// Processor name, used in log output
    fn name(&self) -> &str;

    /// Check if the processor applies to a type
    fn applies_to(&self, _node: &TypeNode) -> bool {
        true
    }

    /// Qualified names of synthetic interfaces for the type
    fn scope_interfaces(&self, _node: &TypeNode) -> Vec<String> {
        Vec::new()
    }

    /// Members injected into the type's hidden body
    fn synthetic_members(&self, _node: &TypeNode) -> Vec<Member> {
        Vec::new()
    }
}
