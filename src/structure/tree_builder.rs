use crate::fdt_parser::{DecodeResult, FdtParser};
use crate::structure::visitor::FdtVisitor;

use log::warn;
use serde::Serialize;

/// Index of a node inside a [`DeviceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub properties: Vec<Property>,
}

impl Node {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// A device tree materialized from the decoder's events.
///
/// Nodes live in a flat arena and refer to each other by [`NodeId`]. Properties are kept per node
/// in declaration order. A blob normally has a single root node, but anything that closes
/// properly before the `FDT_END` token is kept as an additional root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceTree {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl DeviceTree {
    /// Decodes `parser`'s blob into a tree.
    ///
    /// On failure the tree holds everything decoded before the error, and nodes still open at
    /// that point are left without their remaining properties and children.
    pub fn from_parser(parser: &FdtParser) -> (DeviceTree, DecodeResult) {
        let mut builder = TreeBuilder::new();
        let result = parser.decode(&mut builder);
        (builder.finish(), result)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn root(&self) -> Option<&Node> {
        self.roots.first().and_then(|id| self.node(*id))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.node(id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(move |child| self.node(*child).map(|node| (*child, node)))
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&Property> {
        self.node(id)?.property(name)
    }

    /// Total number of nodes, at every depth.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walks the tree depth first, in declaration order, yielding each node with its depth.
    pub fn walk(&self) -> impl Iterator<Item = (usize, NodeId, &Node)> + '_ {
        let mut stack: Vec<(usize, NodeId)> = self.roots.iter().rev().map(|id| (0, *id)).collect();

        std::iter::from_fn(move || {
            let (depth, id) = stack.pop()?;
            let node = self.node(id)?;
            stack.extend(node.children.iter().rev().map(|child| (depth + 1, *child)));
            Some((depth, id, node))
        })
    }
}

/// Builds a [`DeviceTree`] from visitor callbacks.
///
/// Keeps its own stack of open node handles; the decoder only ever tracks depth.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    tree: DeviceTree,
    open: Vec<NodeId>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if every node that was begun has also been ended.
    pub fn is_balanced(&self) -> bool {
        self.open.is_empty()
    }

    pub fn finish(self) -> DeviceTree {
        if !self.open.is_empty() {
            warn!(
                "building a tree with {} node(s) left open, tree is incomplete",
                self.open.len()
            );
        }
        self.tree
    }
}

impl FdtVisitor for TreeBuilder {
    fn begin_node(&mut self, name: &[u8]) {
        let id = NodeId(self.tree.nodes.len());
        let parent = self.open.last().copied();

        self.tree.nodes.push(Node {
            name: String::from_utf8_lossy(name).into_owned(),
            parent,
            children: Vec::new(),
            properties: Vec::new(),
        });

        match parent {
            Some(parent) => self.tree.nodes[parent.0].children.push(id),
            None => self.tree.roots.push(id),
        }

        self.open.push(id);
    }

    fn end_node(&mut self) {
        if self.open.pop().is_none() {
            warn!("end of node without an open node, ignoring");
        }
    }

    fn insert_property(&mut self, name: &[u8], value: &[u8]) {
        let Some(current) = self.open.last() else {
            warn!("property outside of any node, ignoring");
            return;
        };

        self.tree.nodes[current.0].properties.push(Property {
            name: String::from_utf8_lossy(name).into_owned(),
            value: value.to_vec(),
        });
    }
}
