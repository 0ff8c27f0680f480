use ultraviolet::Vec2;

/// Handle of an expression node in the material graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionId(pub u32);

/// Which components of a vector parameter its output exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorMask {
    All,
    Rgb,
    Rg,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ParameterKind {
    Scalar { default: f32 },
    Vector { default: [f32; 4], mask: VectorMask },
    TextureObject,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterNode {
    pub name: String,
    pub kind: ParameterKind,
    pub position: Vec2,
}

/// The material graph the fragment node lives in.
pub trait GraphEditor {
    fn create_parameter_node(&mut self, node: ParameterNode) -> Option<ExpressionId>;
    fn parameter_node(&self, id: ExpressionId) -> Option<&ParameterNode>;
    fn delete_nodes(&mut self, nodes: &[ExpressionId]);
    /// Position of another node, or of the fragment node itself for `None`.
    fn node_position(&self, node: Option<ExpressionId>) -> Vec2;
    fn connect(&mut self, output: ExpressionId, input_name: &str);
    /// Rebuilds the fragment node's pins after its inputs changed.
    fn reconstruct(&mut self);
    fn update_material(&mut self);
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use super::*;

    /// Keeps the graph in memory and records every edit.
    #[derive(Default)]
    pub struct RecordingEditor {
        pub position: Vec2,
        pub nodes: BTreeMap<ExpressionId, ParameterNode>,
        pub connections: Vec<(ExpressionId, String)>,
        pub deleted: Vec<ExpressionId>,
        pub reconstructions: usize,
        pub updates: usize,
        next_id: u32,
    }

    impl RecordingEditor {
        pub fn node_named(&self, name: &str) -> Option<(ExpressionId, &ParameterNode)> {
            self.nodes
                .iter()
                .find(|(_, node)| node.name == name)
                .map(|(id, node)| (*id, node))
        }

        pub fn count_kind(&self, matches: impl Fn(&ParameterKind) -> bool) -> usize {
            self.nodes.values().filter(|node| matches(&node.kind)).count()
        }
    }

    impl GraphEditor for RecordingEditor {
        fn create_parameter_node(&mut self, node: ParameterNode) -> Option<ExpressionId> {
            let id = ExpressionId(self.next_id);
            self.next_id += 1;
            self.nodes.insert(id, node);
            Some(id)
        }

        fn parameter_node(&self, id: ExpressionId) -> Option<&ParameterNode> {
            self.nodes.get(&id)
        }

        fn delete_nodes(&mut self, nodes: &[ExpressionId]) {
            for id in nodes {
                self.nodes.remove(id);
                self.connections.retain(|(output, _)| output != id);
                self.deleted.push(*id);
            }
        }

        fn node_position(&self, node: Option<ExpressionId>) -> Vec2 {
            node.and_then(|id| self.nodes.get(&id))
                .map_or(self.position, |node| node.position)
        }

        fn connect(&mut self, output: ExpressionId, input_name: &str) {
            self.connections.push((output, input_name.to_string()));
        }

        fn reconstruct(&mut self) {
            self.reconstructions += 1;
        }

        fn update_material(&mut self) {
            self.updates += 1;
        }
    }
}
