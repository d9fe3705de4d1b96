//! Graph introspection.
//!
//! Converted graphs are trees of trait objects. [`NodeGraph`] flattens one
//! into a `petgraph` [`StableGraph`] of [`NodeInfo`] weights with labelled
//! child edges, for debugging tools and designers.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use serde::Serialize;

use wfexpr_core::id::NodeId;

use crate::nodes::{NodeInfo, NodeRef};

/// Edge from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildEdge {
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeGraph {
    graph: StableGraph<NodeInfo, ChildEdge, Directed, u32>,
    #[serde(skip)]
    by_id: HashMap<NodeId, NodeIndex<u32>>,
    root: NodeIndex<u32>,
}

impl NodeGraph {
    /// Walks `root` and everything below it. A node reachable along several
    /// paths appears once.
    pub fn build(root: &NodeRef) -> Self {
        let mut graph = StableGraph::new();
        let mut by_id = HashMap::new();
        let root_idx = graph.add_node(root.info().clone());
        by_id.insert(root.info().id, root_idx);

        let mut stack = vec![(root.clone(), root_idx)];
        while let Some((node, idx)) = stack.pop() {
            for child in node.children() {
                let id = child.node.info().id;
                let child_idx = match by_id.get(&id) {
                    Some(existing) => *existing,
                    None => {
                        let child_idx = graph.add_node(child.node.info().clone());
                        by_id.insert(id, child_idx);
                        stack.push((child.node.clone(), child_idx));
                        child_idx
                    }
                };
                graph.add_edge(idx, child_idx, ChildEdge { role: child.role });
            }
        }

        NodeGraph {
            graph,
            by_id,
            root: root_idx,
        }
    }

    pub fn graph(&self) -> &StableGraph<NodeInfo, ChildEdge, Directed, u32> {
        &self.graph
    }

    pub fn root(&self) -> &NodeInfo {
        &self.graph[self.root]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn find(&self, id: NodeId) -> Option<&NodeInfo> {
        self.by_id.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Children of `id` with their roles, in declaration order.
    pub fn children_of(&self, id: NodeId) -> Vec<(&str, &NodeInfo)> {
        let Some(idx) = self.by_id.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<_> = self
            .graph
            .edges(*idx)
            .map(|e| (e.weight().role.as_str(), &self.graph[e.target()], e.id()))
            .collect();
        // petgraph yields outgoing edges newest first
        children.sort_by_key(|(_, _, edge)| *edge);
        children.into_iter().map(|(role, info, _)| (role, info)).collect()
    }

    /// Nodes of the given kind.
    pub fn nodes_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a NodeInfo> + 'a {
        self.graph.node_weights().filter(move |info| info.kind == kind)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use wfexpr_core::type_id::TypeId;
    use wfexpr_core::value::Value;

    use crate::nodes::{Argument, ArgumentList, ArrayItemValue, Literal, ValueRef};

    fn literal(id: u32, value: Value, ty: TypeId) -> ValueRef {
        Arc::new(Literal::new(NodeInfo::new(NodeId(id), "Literal", ty), value))
    }

    #[test]
    fn flattens_children_with_roles() {
        let array_ty = TypeId(40);
        let node: ValueRef = Arc::new(ArrayItemValue::new(
            NodeInfo::new(NodeId(0), "ArrayItemValue", TypeId::I32),
            ArgumentList::new(vec![
                Argument::value(0, literal(1, Value::Null, array_ty)),
                Argument::value(1, literal(2, Value::I32(0), TypeId::I32)),
            ]),
        ));
        let graph = NodeGraph::build(&NodeRef::Value(node));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.root().kind, "ArrayItemValue");
        let children = graph.children_of(NodeId(0));
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0, "operand0");
        assert_eq!(children[1].1.id, NodeId(2));
        assert_eq!(graph.nodes_of_kind("Literal").count(), 2);
        assert!(graph.find(NodeId(9)).is_none());

        let json = graph.to_json().unwrap();
        assert!(json.contains("ArrayItemValue"));
    }
}
