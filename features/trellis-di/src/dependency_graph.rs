use std::fmt::Write;

use thiserror::Error;

use crate::{
    dependency::{Dependency, Selection},
    errors::DiError,
    hierarchy::TypeHierarchy,
    registry::{ProducerId, Registry},
    types::{Feature, TypeInfo, DEFAULT_FEATURE},
};

/// Graph of everything registered
/// Used to check dependencies before building and enables visualization of the registry
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<DependencyEdge>,
    /// `(child, parent)`: the parent provides a supertype with a subset of the child's features
    subsumptions: Vec<(ProducerId, ProducerId)>,
    /// Dependencies that could not be resolved while building the graph
    issues: Vec<DependencyGraphError>,
}

/// A registered producer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: ProducerId,
    pub name: Option<String>,
    pub label: String,
    pub provided_type: TypeInfo,
    pub features: Vec<Feature>,
    pub singleton: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Constructor,
    Setter,
    /// A constructor dependency delivered as a handle
    Handle,
}

/// A declared dependency and the producers it currently resolves to
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub from: ProducerId,
    pub argument: String,
    pub kind: EdgeKind,
    pub dependency: Dependency,
    pub targets: Vec<ProducerId>,
}

impl DependencyGraph {
    pub fn new(registry: &Registry) -> Self {
        let catalog = registry.snapshot();
        let preference = &registry.config().default_preference;
        let mut graph = Self {
            nodes: Vec::with_capacity(catalog.producers.len()),
            edges: Vec::new(),
            subsumptions: Vec::new(),
            issues: Vec::new(),
        };

        for (index, producer) in catalog.producers.iter().enumerate() {
            let id = ProducerId(index);
            let entry = &catalog.entries[index];
            graph.nodes.push(GraphNode {
                id,
                name: entry.name.clone(),
                label: catalog.describe(id),
                provided_type: producer.provided_type(),
                features: producer.provided_features().to_vec(),
                singleton: entry.singleton,
            });

            let constructor = producer.constructor_dependencies();
            let setter = producer.setter_dependencies(None);
            let declared = constructor
                .iter()
                .map(|(argument, dependency)| {
                    let kind = match dependency.is_handle() {
                        true => EdgeKind::Handle,
                        false => EdgeKind::Constructor,
                    };
                    (argument, dependency, kind)
                })
                .chain(
                    setter
                        .iter()
                        .map(|(argument, dependency)| (argument, dependency, EdgeKind::Setter)),
                );

            for (argument, dependency, kind) in declared {
                let targets = match dependency.select(&catalog.producers, &catalog.hierarchy, preference) {
                    Ok(Selection::Absent) => Vec::new(),
                    Ok(Selection::One(target)) => vec![ProducerId(target)],
                    Ok(Selection::Many(targets)) => targets.into_iter().map(ProducerId).collect(),
                    Err(error) => {
                        graph.issues.push(DependencyGraphError::unresolved(
                            catalog.describe(id),
                            argument,
                            error,
                        ));
                        Vec::new()
                    }
                };
                graph.edges.push(DependencyEdge {
                    from: id,
                    argument: argument.clone(),
                    kind,
                    dependency: dependency.clone(),
                    targets,
                });
            }
        }

        graph.subsumptions = subsumptions(&graph.nodes, &catalog.hierarchy);
        graph
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn subsumptions(&self) -> &[(ProducerId, ProducerId)] {
        &self.subsumptions
    }

    pub fn edges_from(&self, id: ProducerId) -> impl Iterator<Item = &DependencyEdge> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    /// Validate the graph
    ///
    /// Returns a list of all issues
    pub fn check(&self) -> Result<(), DependencyGraphErrors> {
        let mut errors = self.issues.clone();

        for edge in self.edges.iter().filter(|edge| edge.kind == EdgeKind::Handle) {
            for target in &edge.targets {
                if self.nodes[target.0].singleton {
                    errors.push(DependencyGraphError::SingletonHandle {
                        required_by: self.nodes[edge.from.0].label.clone(),
                        argument: edge.argument.clone(),
                        producer: self.nodes[target.0].label.clone(),
                    });
                }
            }
        }

        let mut visits = vec![Visit::New; self.nodes.len()];
        let mut chain = Vec::new();
        for node in &self.nodes {
            self.check_recurse(node.id, &mut visits, &mut chain, &mut errors);
        }

        if !errors.is_empty() {
            return Err(DependencyGraphErrors { errors });
        }
        Ok(())
    }

    /// Depth first walk along constructor and handle edges, setter edges never form a cycle
    fn check_recurse(
        &self,
        id: ProducerId,
        visits: &mut [Visit],
        chain: &mut Vec<ProducerId>,
        errors: &mut Vec<DependencyGraphError>,
    ) {
        match visits[id.0] {
            Visit::Done => return,
            Visit::Active => {
                let start = chain.iter().position(|entry| *entry == id).unwrap_or(0);
                let chain = chain[start..]
                    .iter()
                    .chain(std::iter::once(&id))
                    .map(|entry| self.nodes[entry.0].label.clone())
                    .collect();
                errors.push(DependencyGraphError::CircularDependency { chain });
                return;
            }
            Visit::New => {}
        }

        visits[id.0] = Visit::Active;
        chain.push(id);
        let edges = self
            .edges_from(id)
            .filter(|edge| edge.kind != EdgeKind::Setter);
        for edge in edges {
            for target in &edge.targets {
                self.check_recurse(*target, visits, chain, errors);
            }
        }
        chain.pop();
        visits[id.0] = Visit::Done;
    }

    /// Renders the graph in Graphviz DOT format
    ///
    /// Constructor dependencies are solid, setter dependencies dashed, handles dotted.
    /// Bold hollow arrows point from a producer to the most specific producer it can stand in for.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph dependencies {\n  node [shape=box];\n");

        for node in &self.nodes {
            let mut label = node.label.clone();
            if node.name.is_some() {
                let _ = write!(label, "\n{}", node.provided_type);
            }
            let features: Vec<&str> = node
                .features
                .iter()
                .filter(|feature| **feature != DEFAULT_FEATURE && Some(feature.as_str()) != node.name.as_deref())
                .map(Feature::as_str)
                .collect();
            if !features.is_empty() {
                let _ = write!(label, "\n[{}]", features.join(", "));
            }
            let shape = if node.singleton { "" } else { ", style=rounded" };
            let _ = writeln!(dot, "  p{} [label={:?}{shape}];", node.id.0, label);
        }

        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Constructor => "solid",
                EdgeKind::Setter => "dashed",
                EdgeKind::Handle => "dotted",
            };
            for target in &edge.targets {
                let _ = writeln!(
                    dot,
                    "  p{} -> p{} [label={:?}, style={style}];",
                    edge.from.0, target.0, edge.argument
                );
            }
        }

        for (child, parent) in &self.subsumptions {
            let _ = writeln!(
                dot,
                "  p{} -> p{} [style=bold, color=gray, arrowhead=empty];",
                child.0, parent.0
            );
        }

        dot.push_str("}\n");
        dot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// For each producer the closest other producer it could stand in for
fn subsumptions(nodes: &[GraphNode], hierarchy: &TypeHierarchy) -> Vec<(ProducerId, ProducerId)> {
    let less_than = |child: &GraphNode, parent: &GraphNode| {
        let same_features = child.features.len() == parent.features.len()
            && parent.features.iter().all(|feature| child.features.contains(feature));
        (child.provided_type != parent.provided_type || !same_features)
            && hierarchy.is_subtype(child.provided_type, parent.provided_type)
            && parent.features.iter().all(|feature| child.features.contains(feature))
    };

    let mut subsumptions = Vec::new();
    for node in nodes {
        let mut closest: Option<&GraphNode> = None;
        for parent in nodes {
            if parent.id == node.id || !less_than(node, parent) {
                continue;
            }
            if closest.map_or(true, |current| less_than(parent, current)) {
                closest = Some(parent);
            }
        }
        if let Some(parent) = closest {
            subsumptions.push((node.id, parent.id));
        }
    }
    subsumptions
}

#[derive(Error, Debug, Clone)]
pub enum DependencyGraphError {
    #[error("'{required_by}' needs '{argument}' ({dependency}) but nothing provides it")]
    MissingDependency {
        required_by: String,
        argument: String,
        dependency: String,
    },
    #[error("'{required_by}' needs '{argument}' ({dependency}) but {candidates:?} match equally")]
    AmbiguousDependency {
        required_by: String,
        argument: String,
        dependency: String,
        candidates: Vec<String>,
    },
    #[error("'{required_by}' takes '{argument}' as a handle but '{producer}' is a singleton")]
    SingletonHandle {
        required_by: String,
        argument: String,
        producer: String,
    },
    #[error("A circular constructor dependency exists through {chain:?} - Consider turning one of them into a setter dependency")]
    CircularDependency { chain: Vec<String> },
    #[error("'{required_by}' cannot resolve '{argument}': {reason}")]
    Unresolved {
        required_by: String,
        argument: String,
        reason: String,
    },
}

impl DependencyGraphError {
    fn unresolved(required_by: String, argument: &str, error: DiError) -> Self {
        let argument = argument.to_string();
        match error {
            DiError::DependencyNotFound { dependency } => DependencyGraphError::MissingDependency {
                required_by,
                argument,
                dependency,
            },
            DiError::AmbiguousDependency {
                dependency,
                candidates,
            } => DependencyGraphError::AmbiguousDependency {
                required_by,
                argument,
                dependency,
                candidates,
            },
            other => DependencyGraphError::Unresolved {
                required_by,
                argument,
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for DependencyGraphErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The dependency graph had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

#[derive(Error, Debug, Clone)]
pub struct DependencyGraphErrors {
    pub errors: Vec<DependencyGraphError>,
}
