//! Phase identities and ordering
//!
//! Built-in phases form a fixed chain. Custom phases declare `after` /
//! `before` relations and are slotted in by a topological sort performed
//! once, when the registry is built.

use crate::error::SchemaError;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Phase identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhaseId(Cow<'static, str>);

impl PhaseId {
    /// Construction; deferred callbacks bound here run first
    pub const CREATE: Self = Self::from_static("create");
    /// Owner resolution
    pub const OWNER: Self = Self::from_static("owner");
    /// Default filling
    pub const DEFAULT: Self = Self::from_static("default");
    /// Early class-level validation
    pub const EARLY_VALIDATE: Self = Self::from_static("early_validate");
    /// Post-apply hooks
    pub const APPLY: Self = Self::from_static("apply");
    /// Full validation
    pub const VALIDATE: Self = Self::from_static("validate");
    /// Threshold check over produced results
    pub const VERIFY: Self = Self::from_static("verify");
    /// Hooks run once the tree is complete
    pub const POST_TREE: Self = Self::from_static("post_tree");

    /// Built-in phases in execution order
    pub const BUILT_IN: [Self; 8] = [
        Self::CREATE,
        Self::OWNER,
        Self::DEFAULT,
        Self::EARLY_VALIDATE,
        Self::APPLY,
        Self::VALIDATE,
        Self::VERIFY,
        Self::POST_TREE,
    ];

    /// Phase id from a static name
    #[inline]
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Phase id from an owned name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Phase name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for PhaseId {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

/// Custom phase declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDecl {
    /// Phase identity
    pub id: PhaseId,

    /// Phases that must run before this one
    pub after: Vec<PhaseId>,

    /// Phases that must run after this one
    pub before: Vec<PhaseId>,
}

impl PhaseDecl {
    /// Declare a custom phase
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<PhaseId>) -> Self {
        Self {
            id: id.into(),
            after: Vec::new(),
            before: Vec::new(),
        }
    }

    /// Require running after `phase`
    #[inline]
    #[must_use]
    pub fn after(mut self, phase: PhaseId) -> Self {
        self.after.push(phase);
        self
    }

    /// Require running before `phase`
    #[inline]
    #[must_use]
    pub fn before(mut self, phase: PhaseId) -> Self {
        self.before.push(phase);
        self
    }
}

/// Resolve the total phase order
///
/// # Errors
/// - [`SchemaError::DuplicatePhase`] if a custom phase reuses a name
/// - [`SchemaError::UnknownPhase`] if a relation names an undeclared phase
/// - [`SchemaError::PhaseCycle`] if relations are contradictory
pub fn resolve_phase_order(custom: &[PhaseDecl]) -> Result<Vec<PhaseId>, SchemaError> {
    let mut graph: DiGraph<PhaseId, ()> = DiGraph::new();
    let mut nodes: HashMap<PhaseId, NodeIndex> = HashMap::new();

    let mut previous: Option<NodeIndex> = None;
    for phase in PhaseId::BUILT_IN {
        let idx = graph.add_node(phase.clone());
        nodes.insert(phase, idx);
        if let Some(prev) = previous {
            graph.add_edge(prev, idx, ());
        }
        previous = Some(idx);
    }

    for decl in custom {
        if nodes.contains_key(&decl.id) {
            return Err(SchemaError::DuplicatePhase(decl.id.to_string()));
        }
        let idx = graph.add_node(decl.id.clone());
        nodes.insert(decl.id.clone(), idx);
    }

    for decl in custom {
        let idx = nodes[&decl.id];
        let lookup = |other: &PhaseId| {
            nodes.get(other).copied().ok_or_else(|| SchemaError::UnknownPhase {
                phase: decl.id.to_string(),
                unknown: other.to_string(),
            })
        };
        for after in &decl.after {
            let from = lookup(after)?;
            graph.add_edge(from, idx, ());
        }
        for before in &decl.before {
            let to = lookup(before)?;
            graph.add_edge(idx, to, ());
        }
    }

    let order = toposort(&graph, None)
        .map_err(|cycle| SchemaError::PhaseCycle(graph[cycle.node_id()].to_string()))?;

    Ok(order.into_iter().map(|idx| graph[idx].clone()).collect())
}
