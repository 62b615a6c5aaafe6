//! Entity discovery, reference-cycle detection and translation order.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::NodeIndex;
use petgraph::{Directed, Graph};
use tracing::debug;

use super::extract::extract_members;
use crate::error::{ErrorKind, TranslationError};
use crate::metadata::{Model, TypeDecl, TypeRef, TypeShape};

/// Translation order: entities grouped into layers such that every entity
/// only references entities of earlier layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) layers: Vec<Vec<String>>,
}

/// Reference graph over entity names. An edge `a -> b` means `a` stores the
/// primary key of `b`.
struct ReferenceGraph {
    graph: Graph<String, (), Directed>,
    nodes: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    fn new() -> Self {
        Self {
            graph: Graph::new(),
            nodes: HashMap::new(),
        }
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.nodes.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        index
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        let a = self.node(from);
        let b = self.node(to);
        if !self.graph.contains_edge(a, b) {
            self.graph.add_edge(a, b, ());
        }
    }
}

/// Entity types a member type leads to.
#[derive(Default)]
struct Reach {
    /// Entities stored by reference in the owner's table.
    referenced: Vec<String>,
    /// Entities reachable only through relations.
    related: Vec<String>,
}

/// Discover the entities reachable from the roots, reject reference cycles
/// and order the entities for translation.
pub(crate) fn plan(model: &Model, roots: &[&str]) -> Result<Plan, TranslationError> {
    let mut graph = ReferenceGraph::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();

    for root in roots {
        let decl = model
            .get(root)
            .ok_or_else(|| TranslationError::new(*root, ErrorKind::UnknownType(root.to_string())))?;
        if !is_entity(decl) {
            return Err(TranslationError::new(
                *root,
                ErrorKind::NotAnEntity(root.to_string()),
            ));
        }
        if seen.insert(decl.name.clone()) {
            queue.push_back(decl.name.clone());
        }
    }

    while let Some(name) = queue.pop_front() {
        graph.node(&name);
        let Some(decl) = model.get(&name) else {
            continue;
        };
        let mut reach = Reach::default();
        let mut visited = Vec::new();
        walk_type(model, decl, &mut reach, &mut visited, false);

        for target in &reach.referenced {
            graph.add_edge(&name, target);
        }
        for target in reach.referenced.into_iter().chain(reach.related) {
            if seen.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }

    check_cycles(&graph)?;
    let layers = layers(&graph)?;
    debug!(
        entities = graph.graph.node_count(),
        layers = layers.len(),
        "translation order planned"
    );
    Ok(Plan { layers })
}

fn is_entity(decl: &TypeDecl) -> bool {
    matches!(decl.shape, TypeShape::Class) && !decl.is_abstract && decl.generic_params.is_empty()
}

/// Collect the entities the fields of a type lead to. Struct types are
/// walked through; `in_relation` marks everything found as related only.
fn walk_type<'m>(
    model: &'m Model,
    decl: &'m TypeDecl,
    reach: &mut Reach,
    visited: &mut Vec<&'m str>,
    in_relation: bool,
) {
    let members = extract_members(model, decl, 0).unwrap_or_default();
    for member in members {
        walk_ref(model, &member.ty, reach, visited, in_relation);
    }
}

fn walk_ref<'m>(
    model: &'m Model,
    ty: &'m TypeRef,
    reach: &mut Reach,
    visited: &mut Vec<&'m str>,
    in_relation: bool,
) {
    match ty {
        TypeRef::Nullable(inner) | TypeRef::Localized(inner) => {
            walk_ref(model, inner, reach, visited, in_relation)
        }
        TypeRef::Collection { element, .. } => walk_ref(model, element, reach, visited, true),
        TypeRef::Map { key, value } => {
            walk_ref(model, key, reach, visited, true);
            walk_ref(model, value, reach, visited, true);
        }
        TypeRef::Named(name) => {
            let Some(decl) = model.get(name) else {
                return;
            };
            match decl.shape {
                TypeShape::Class if is_entity(decl) => {
                    let list = if in_relation {
                        &mut reach.related
                    } else {
                        &mut reach.referenced
                    };
                    if !list.contains(name) {
                        list.push(name.clone());
                    }
                }
                TypeShape::Struct => {
                    if visited.contains(&decl.name.as_str()) {
                        return;
                    }
                    visited.push(&decl.name);
                    walk_type(model, decl, reach, visited, in_relation);
                }
                _ => {}
            }
        }
        _ => {}
    }
}

fn check_cycles(graph: &ReferenceGraph) -> Result<(), TranslationError> {
    let mut components = tarjan_scc(&graph.graph);
    for component in &mut components {
        component.sort_by(|a, b| graph.graph[*a].cmp(&graph.graph[*b]));
    }
    components.sort_by(|a, b| graph.graph[a[0]].cmp(&graph.graph[b[0]]));

    for component in components {
        let start = component[0];
        let cyclic = component.len() > 1 || graph.graph.contains_edge(start, start);
        if !cyclic {
            continue;
        }
        let path = cycle_path(graph, &component, start);
        let origin = graph.graph[start].clone();
        return Err(TranslationError::new(origin, ErrorKind::ReferenceCycle(path)));
    }
    Ok(())
}

/// Shortest cycle through `start` within one strongly-connected component.
fn cycle_path(graph: &ReferenceGraph, component: &[NodeIndex], start: NodeIndex) -> Vec<String> {
    let members: HashSet<NodeIndex> = component.iter().copied().collect();
    let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue = VecDeque::from([start]);
    let mut last = None;

    'search: while let Some(node) = queue.pop_front() {
        for next in graph.graph.neighbors(node) {
            if next == start {
                last = Some(node);
                break 'search;
            }
            if members.contains(&next) && !parent.contains_key(&next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }

    let mut path = vec![graph.graph[start].clone()];
    let mut current = last;
    while let Some(node) = current {
        if node == start {
            break;
        }
        path.push(graph.graph[node].clone());
        current = parent.get(&node).copied();
    }
    path.push(graph.graph[start].clone());
    let end = path.len() - 1;
    path[1..end].reverse();
    path
}

/// Group an acyclic reference graph into dependency layers.
fn layers(graph: &ReferenceGraph) -> Result<Vec<Vec<String>>, TranslationError> {
    let order = toposort(&graph.graph, None).map_err(|cycle| {
        let name = graph.graph[cycle.node_id()].clone();
        TranslationError::new(name.clone(), ErrorKind::ReferenceCycle(vec![name.clone(), name]))
    })?;

    let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
    for node in order.iter().rev() {
        let level = graph
            .graph
            .neighbors(*node)
            .filter_map(|next| depth.get(&next))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(*node, level);
    }

    let count = depth.values().copied().max().map_or(0, |d| d + 1);
    let mut layers: Vec<Vec<String>> = vec![Vec::new(); count];
    for (node, level) in depth {
        layers[level].push(graph.graph[node].clone());
    }
    for layer in &mut layers {
        layer.sort();
    }
    Ok(layers)
}
