//! Service registry and dependency resolution.
//!
//! Registration only checks identity uniqueness. Dependencies are resolved
//! once, by [`ServiceRegistry::resolve_start_order`], so services may be
//! registered in any order as long as everything is registered before the
//! orchestrator starts.
//!
//! # Resolution
//!
//! 1. Every declared dependency must name a registered service.
//! 2. Kahn's algorithm over dependency edges; among services that are ready
//!    at the same time, lower [`Priority`] rank first, then registration order.
//! 3. If some services never become ready, a depth-first walk over them (in
//!    registration order, dependencies in declaration order) reports the first
//!    cycle it closes.

use std::collections::{BTreeSet, HashMap};

use crate::error::LifecycleError;
use crate::service::ServiceDescriptor;
use crate::types::{Priority, ServiceId};

/// Owns every registered [`ServiceDescriptor`], in registration order.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    descriptors: Vec<ServiceDescriptor>,
    index: HashMap<ServiceId, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    OnStack,
    Done,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Fails with [`LifecycleError::DuplicateIdentity`] if
    /// the identity is taken; the registry is unchanged in that case.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<(), LifecycleError> {
        if self.index.contains_key(descriptor.id()) {
            return Err(LifecycleError::DuplicateIdentity(descriptor.id().clone()));
        }
        tracing::debug!(
            service = %descriptor.id(),
            category = %descriptor.category(),
            priority = %descriptor.priority(),
            dependencies = descriptor.dependencies().len(),
            "registered service",
        );
        self.index
            .insert(descriptor.id().clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn get(&self, id: &ServiceId) -> Option<&ServiceDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    /// Compute the start order, or the structural error that forbids starting.
    pub fn resolve_start_order(&self) -> Result<Vec<ServiceId>, LifecycleError> {
        self.validate_dependencies()?;

        let n = self.descriptors.len();
        let mut pending = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            for dep in descriptor.dependencies() {
                let j = self.index[dep];
                pending[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut ready: BTreeSet<(Priority, usize)> = (0..n)
            .filter(|&i| pending[i] == 0)
            .map(|i| (self.descriptors[i].priority(), i))
            .collect();
        let mut resolved = vec![false; n];
        let mut order = Vec::with_capacity(n);

        while let Some((_, i)) = ready.pop_first() {
            resolved[i] = true;
            order.push(self.descriptors[i].id().clone());
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert((self.descriptors[dependent].priority(), dependent));
                }
            }
        }

        if order.len() < n {
            return Err(LifecycleError::CyclicDependency {
                path: self.find_cycle(&resolved),
            });
        }
        Ok(order)
    }

    fn validate_dependencies(&self) -> Result<(), LifecycleError> {
        for descriptor in &self.descriptors {
            if let Some(missing) = descriptor
                .dependencies()
                .iter()
                .find(|dep| !self.index.contains_key(*dep))
            {
                return Err(LifecycleError::UnknownDependency {
                    service: descriptor.id().clone(),
                    missing: missing.clone(),
                });
            }
        }
        Ok(())
    }

    fn find_cycle(&self, resolved: &[bool]) -> Vec<ServiceId> {
        let mut visits = vec![Visit::Unvisited; self.descriptors.len()];
        let mut stack = Vec::new();
        for start in 0..self.descriptors.len() {
            if resolved[start] || visits[start] != Visit::Unvisited {
                continue;
            }
            if let Some(path) = self.visit(start, resolved, &mut visits, &mut stack) {
                return path;
            }
        }
        // Every unresolved node has an unresolved dependency, so the walk
        // above always closes a cycle.
        Vec::new()
    }

    fn visit(
        &self,
        node: usize,
        resolved: &[bool],
        visits: &mut [Visit],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<ServiceId>> {
        visits[node] = Visit::OnStack;
        stack.push(node);
        for dep in self.descriptors[node].dependencies() {
            let Some(&dep) = self.index.get(dep) else {
                continue;
            };
            if resolved[dep] {
                continue;
            }
            match visits[dep] {
                Visit::OnStack => {
                    let from = stack.iter().position(|&n| n == dep)?;
                    let mut path: Vec<ServiceId> = stack[from..]
                        .iter()
                        .map(|&i| self.descriptors[i].id().clone())
                        .collect();
                    path.push(self.descriptors[dep].id().clone());
                    return Some(path);
                }
                Visit::Unvisited => {
                    if let Some(path) = self.visit(dep, resolved, visits, stack) {
                        return Some(path);
                    }
                }
                Visit::Done => {}
            }
        }
        stack.pop();
        visits[node] = Visit::Done;
        None
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
