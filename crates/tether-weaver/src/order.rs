//! Dependency ordering
//!
//! Structs are processed after every struct they embed inline; classes after
//! their base classes. Both relations must be acyclic since native layouts
//! cannot be composed circularly. List elements are not ordering edges.

use crate::error::{WeaveError, WeaveResult};
use crate::model::ModuleBindings;
use rustc_hash::{FxHashMap, FxHashSet};
use tether_bytecode::TypeName;

/// Guards against processing a type twice
#[derive(Debug, Default)]
pub struct ProcessingLedger {
    processed: FxHashSet<TypeName>,
}

impl ProcessingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a type is being processed
    pub fn mark(&mut self, name: &TypeName) -> WeaveResult<()> {
        if !self.processed.insert(name.clone()) {
            return Err(WeaveError::DuplicateProcessing(name.full_name()));
        }
        Ok(())
    }

    pub fn is_processed(&self, name: &TypeName) -> bool {
        self.processed.contains(name)
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }
}

/// Order annotated structs so every struct follows the structs it embeds
pub fn order_structs(bindings: &ModuleBindings) -> WeaveResult<Vec<TypeName>> {
    let mut edges: FxHashMap<TypeName, Vec<TypeName>> = FxHashMap::default();
    let mut roots = Vec::new();
    for binding in bindings.structs() {
        let mut embedded = Vec::new();
        for member in &binding.members {
            if let Some(dep) = member.category.embedded_struct() {
                if bindings.find_struct(dep).is_some() && !embedded.contains(dep) {
                    embedded.push(dep.clone());
                }
            }
        }
        edges.insert(binding.name.clone(), embedded);
        roots.push(binding.name.clone());
    }

    let mut order = Vec::with_capacity(roots.len());
    let mut visited = FxHashSet::default();
    let mut rec_stack = FxHashSet::default();
    let mut path = Vec::new();
    for root in &roots {
        if !visited.contains(root) {
            visit_struct(
                root,
                &edges,
                &mut visited,
                &mut rec_stack,
                &mut path,
                &mut order,
            )?;
        }
    }
    Ok(order)
}

/// Depth-first post-order visit; embedded structs are emitted first
fn visit_struct(
    node: &TypeName,
    edges: &FxHashMap<TypeName, Vec<TypeName>>,
    visited: &mut FxHashSet<TypeName>,
    rec_stack: &mut FxHashSet<TypeName>,
    path: &mut Vec<TypeName>,
    order: &mut Vec<TypeName>,
) -> WeaveResult<()> {
    visited.insert(node.clone());
    rec_stack.insert(node.clone());
    path.push(node.clone());

    for dep in edges.get(node).map(Vec::as_slice).unwrap_or(&[]) {
        if rec_stack.contains(dep) {
            let start = path.iter().position(|p| p == dep).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(TypeName::full_name).collect();
            cycle.push(dep.full_name());
            return Err(WeaveError::DependencyCycle(cycle));
        }
        if !visited.contains(dep) {
            visit_struct(dep, edges, visited, rec_stack, path, order)?;
        }
    }

    path.pop();
    rec_stack.remove(node);
    order.push(node.clone());
    Ok(())
}

/// Order annotated classes base-to-derived
///
/// For each class the chain of not yet ordered annotated ancestors in this
/// module is collected on a stack and popped, so a base always precedes the
/// classes deriving from it.
pub fn order_classes(bindings: &ModuleBindings) -> WeaveResult<Vec<TypeName>> {
    let mut order = Vec::new();
    let mut ordered = FxHashSet::default();

    for class in bindings.classes() {
        if ordered.contains(&class.name) {
            continue;
        }
        let mut stack = vec![class.name.clone()];
        let mut current = class.base.clone();
        while let Some(base) = current {
            if ordered.contains(&base) {
                break;
            }
            let Some(binding) = bindings.find_class(&base) else {
                break;
            };
            if stack.contains(&base) {
                let mut cycle: Vec<String> = stack.iter().map(TypeName::full_name).collect();
                cycle.push(base.full_name());
                return Err(WeaveError::DependencyCycle(cycle));
            }
            stack.push(base);
            current = binding.base.clone();
        }
        while let Some(name) = stack.pop() {
            ordered.insert(name.clone());
            order.push(name);
        }
    }
    Ok(order)
}
