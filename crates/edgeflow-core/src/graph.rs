//! Resource dependency graph
//!
//! Edges come from three places: a child's `parent`, explicit `depends_on`,
//! and every `ref` in the node's condition or properties. References are
//! checked against a symbol table of `node.field` entries (declared property
//! keys plus provider-assigned outputs) so a typo never silently becomes a
//! missing dependency.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::GraphError;
use crate::expr::Expr;
use crate::model::{ResourceDef, Template};

/// A resource plus its resolved dependency list.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub def: ResourceDef,
    /// Direct dependencies, deduplicated, in first-seen order
    pub dependencies: Vec<String>,
    /// Position in the template's resource list
    pub order: usize,
    /// Wave index (longest dependency chain below this node)
    pub wave: usize,
}

impl GraphNode {
    pub fn id(&self) -> &str {
        &self.def.id
    }
}

/// Directed acyclic graph of resources with a deterministic wave ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGraph {
    nodes: IndexMap<String, GraphNode>,
    waves: Vec<Vec<String>>,
}

impl ResourceGraph {
    /// Build the graph and its waves, rejecting invalid definitions.
    pub fn build(template: &Template) -> Result<Self, GraphError> {
        let mut nodes: IndexMap<String, GraphNode> = IndexMap::new();
        for (order, def) in template.resources.iter().enumerate() {
            if nodes.contains_key(&def.id) {
                return Err(GraphError::DuplicateNode(def.id.clone()));
            }
            nodes.insert(
                def.id.clone(),
                GraphNode {
                    def: def.clone(),
                    dependencies: Vec::new(),
                    order,
                    wave: 0,
                },
            );
        }

        let symbols = SymbolTable::new(&template.resources);
        for def in &template.resources {
            let dependencies = symbols.dependencies_of(def)?;
            if let Some(node) = nodes.get_mut(&def.id) {
                node.dependencies = dependencies;
            }
        }
        for (name, expr) in &template.outputs {
            symbols.check_references(&format!("output:{name}"), expr)?;
        }

        let topo = topological_order(&nodes)?;

        let mut waves: Vec<Vec<String>> = Vec::new();
        for id in &topo {
            let wave = nodes[id.as_str()]
                .dependencies
                .iter()
                .map(|dep| nodes[dep.as_str()].wave + 1)
                .max()
                .unwrap_or(0);
            if let Some(node) = nodes.get_mut(id.as_str()) {
                node.wave = wave;
            }
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(id.clone());
        }
        for wave in &mut waves {
            wave.sort_by_key(|id| nodes[id.as_str()].order);
        }

        debug!(nodes = nodes.len(), waves = waves.len(), "Resource graph built");
        Ok(Self { nodes, waves })
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Waves in execution order; inside a wave, declaration order.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Flattened wave order.
    pub fn topological_order(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }

    pub fn dependencies(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes that depend directly on `id`, in declaration order.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.dependencies.iter().any(|d| d == id))
            .map(GraphNode::id)
            .collect()
    }

    /// Every node reachable downstream of `id`, in topological order.
    pub fn downstream(&self, id: &str) -> Vec<&str> {
        let mut reached: HashSet<&str> = HashSet::from([id]);
        let mut out = Vec::new();
        for candidate in self.topological_order() {
            if candidate == id {
                continue;
            }
            if self
                .dependencies(candidate)
                .iter()
                .any(|d| reached.contains(d.as_str()))
            {
                reached.insert(candidate);
                out.push(candidate);
            }
        }
        out
    }
}

/// `node -> fields` other resources may read.
struct SymbolTable<'a> {
    fields: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> SymbolTable<'a> {
    fn new(resources: &'a [ResourceDef]) -> Self {
        let fields = resources
            .iter()
            .map(|def| {
                let exposed = def
                    .properties
                    .keys()
                    .map(String::as_str)
                    .chain(def.outputs.iter().map(String::as_str))
                    .collect();
                (def.id.as_str(), exposed)
            })
            .collect();
        Self { fields }
    }

    fn contains_node(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    fn dependencies_of(&self, def: &ResourceDef) -> Result<Vec<String>, GraphError> {
        let mut deps: Vec<String> = Vec::new();
        let mut push = |target: &str| {
            if !deps.iter().any(|d| d == target) {
                deps.push(target.to_string());
            }
        };

        let explicit = def.parent.iter().chain(def.depends_on.iter());
        for target in explicit {
            if target == &def.id {
                return Err(GraphError::SelfDependency(def.id.clone()));
            }
            if !self.contains_node(target) {
                return Err(GraphError::DanglingReference {
                    from: def.id.clone(),
                    target: target.clone(),
                });
            }
            push(target.as_str());
        }

        let expressions = def.condition.iter().chain(def.properties.values());
        for expr in expressions {
            let references = expr.references();
            if references.iter().any(|(target, _, _)| *target == def.id) {
                return Err(GraphError::SelfDependency(def.id.clone()));
            }
            self.check_references(&def.id, expr)?;
            for (target, _, _) in references {
                push(target);
            }
        }

        Ok(deps)
    }

    fn check_references(&self, from: &str, expr: &Expr) -> Result<(), GraphError> {
        for (target, field, _) in expr.references() {
            let Some(fields) = self.fields.get(target) else {
                return Err(GraphError::DanglingReference {
                    from: from.to_string(),
                    target: target.to_string(),
                });
            };
            if !fields.contains(field) {
                return Err(GraphError::UnknownField {
                    from: from.to_string(),
                    target: target.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first postorder (dependencies before dependents). Reports the first
/// cycle found as the path that closes it.
fn topological_order(nodes: &IndexMap<String, GraphNode>) -> Result<Vec<String>, GraphError> {
    let mut marks: HashMap<&str, Mark> = nodes.keys().map(|k| (k.as_str(), Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        id: &'a str,
        nodes: &'a IndexMap<String, GraphNode>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        match marks.get(id).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                path.push(id.to_string());
                return Err(GraphError::Cycle { path });
            }
            Mark::Unvisited => {}
        }

        marks.insert(id, Mark::InProgress);
        stack.push(id);
        if let Some(node) = nodes.get(id) {
            for dep in &node.dependencies {
                visit(dep, nodes, marks, stack, order)?;
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        order.push(id.to_string());
        Ok(())
    }

    for id in nodes.keys() {
        visit(id, nodes, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}
