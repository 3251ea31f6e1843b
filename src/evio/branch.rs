//! Grouping of an event's top-level banks into per-crate branches

use super::EvioNode;

/// One crate's worth of banks, identified by the parent bank's (tag, num)
#[derive(Debug)]
pub struct Branch<'a, N> {
    tag: u16,
    num: u8,
    nodes: Vec<&'a N>,
}

impl<'a, N: EvioNode> Branch<'a, N> {
    pub fn new(tag: u16, num: u8) -> Self {
        Self {
            tag,
            num,
            nodes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: &'a N) {
        self.nodes.push(node);
    }

    /// Crate identifier (the parent bank tag)
    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn num(&self) -> u8 {
        self.num
    }

    pub fn nodes(&self) -> &[&'a N] {
        &self.nodes
    }

    /// Nodes with the given bank tag, in order
    pub fn nodes_with_tag(&self, tag: u16) -> impl Iterator<Item = &'a N> + '_ {
        self.nodes.iter().copied().filter(move |n| n.tag() == tag)
    }
}

/// Build one branch per top-level node that has children
///
/// Childless nodes are dropped.
pub fn build_branches<N: EvioNode>(top_level: &[N]) -> Vec<Branch<'_, N>> {
    top_level
        .iter()
        .filter(|node| !node.children().is_empty())
        .map(|node| {
            let mut branch = Branch::new(node.tag(), node.num());
            for child in node.children() {
                branch.add_node(child);
            }
            branch
        })
        .collect()
}

/// First branch with the given tag
pub fn find_branch<'b, 'a, N>(branches: &'b [Branch<'a, N>], tag: u16) -> Option<&'b Branch<'a, N>> {
    branches.iter().find(|b| b.tag == tag)
}
