//! Position lookup over a parsed file, for hover and completion.

use super::{File, Node};

/// Finds the node at or just before a `(line, column)` position
pub struct NodeFinder<'a> {
    file: &'a File,
}

impl<'a> NodeFinder<'a> {
    pub fn new(file: &'a File) -> NodeFinder<'a> {
        NodeFinder { file }
    }

    /// Innermost node whose source span contains or precedes the position.
    ///
    /// Siblings are sorted by position, so each level is a binary search.
    pub fn find_node(&self, line: usize, column: usize) -> Option<&'a Node> {
        find_in(&self.file.nodes, (line, column))
    }
}

fn find_in(nodes: &[Node], position: (usize, usize)) -> Option<&Node> {
    let index = nodes.partition_point(|node| {
        node.source_info
            .is_some_and(|info| info.position() <= position)
    });
    let candidate = nodes[..index].last()?;
    match candidate.children() {
        Some(children) => find_in(children, position).or(Some(candidate)),
        None => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::parse::{ParseOptions, parse};

    const SOURCE: &str = "%FSLAX26Y26*%\n%MOMM*%\n%ADD10C,0.1*%\n%ABD20*%\nD10*\nX0Y0D03*\n%AB*%\nD20*\nX5Y5D03*\n";

    #[test]
    fn finds_top_level_nodes() {
        let file = parse(SOURCE, &ParseOptions::default()).unwrap();
        let finder = NodeFinder::new(&file);
        assert!(matches!(finder.find_node(1, 1).map(|n| &n.kind), Some(NodeKind::Fs(_))));
        assert!(matches!(finder.find_node(2, 5).map(|n| &n.kind), Some(NodeKind::Mo(_))));
        assert!(matches!(finder.find_node(8, 1).map(|n| &n.kind), Some(NodeKind::Dnn(_))));
        assert!(matches!(finder.find_node(9, 3).map(|n| &n.kind), Some(NodeKind::D03(_))));
    }

    #[test]
    fn descends_into_blocks() {
        let file = parse(SOURCE, &ParseOptions::default()).unwrap();
        let finder = NodeFinder::new(&file);
        assert!(matches!(finder.find_node(5, 2).map(|n| &n.kind), Some(NodeKind::Dnn(_))));
        assert!(matches!(finder.find_node(6, 1).map(|n| &n.kind), Some(NodeKind::D03(_))));
        assert!(matches!(finder.find_node(4, 3).map(|n| &n.kind), Some(NodeKind::Ab(_))));
    }

    #[test]
    fn nothing_before_first_node() {
        let file = parse("\n\n%MOMM*%", &ParseOptions::default()).unwrap();
        assert!(NodeFinder::new(&file).find_node(1, 1).is_none());
    }
}
