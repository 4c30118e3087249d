//! External collaborator: the control-graph / ownership model.
//!
//! Consumed via a query interface for scope enforcement and lock
//! derivation; graph extraction itself is out of scope.

use std::collections::BTreeSet;

use mycelium_core::scope::OwnershipIndex;

/// Read-only queries against a component/ownership/dependency graph.
pub trait GraphModel: Send + Sync {
    /// The file ownership index used for longest-prefix resolution.
    fn ownership_index(&self) -> &OwnershipIndex;

    /// Components reachable as write targets for `component`, used to
    /// derive write locks from manifest-declared components beyond the
    /// literally-named ones (e.g. a facade component that re-exports a
    /// sibling). Returns just `{component}` if there's no derivation.
    fn derived_write_components(&self, component: &str) -> BTreeSet<String>;
}

/// A `GraphModel` with no derived relationships — every component's
/// derived write set is itself. Suitable for projects with a flat
/// ownership index and no facade/re-export components.
pub struct FlatGraphModel {
    ownership: OwnershipIndex,
}

impl FlatGraphModel {
    #[must_use]
    pub fn new(ownership: OwnershipIndex) -> Self {
        Self { ownership }
    }
}

impl FlatGraphModel {
    /// Mutable access to the backing index, for callers building it up
    /// incrementally (config loading, test fixtures).
    pub fn ownership_index_mut(&mut self) -> &mut OwnershipIndex {
        &mut self.ownership
    }
}

impl GraphModel for FlatGraphModel {
    fn ownership_index(&self) -> &OwnershipIndex {
        &self.ownership
    }

    fn derived_write_components(&self, component: &str) -> BTreeSet<String> {
        [component.to_owned()].into_iter().collect()
    }
}
