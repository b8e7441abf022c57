//! Explain-plan tree.

use serde::Serialize;

/// Role of a node in the explain tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionType {
    /// Produces records without a child stage.
    StreamSource,
    /// Wraps a child stage.
    StreamDecorator,
    /// An external store written to by a stage.
    Datastore,
}

/// One node of a pipeline's explain tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub node_id: String,
    pub function_name: String,
    pub implementing_type: String,
    pub expression_type: ExpressionType,
    pub expression: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Explanation>,
}

impl Explanation {
    /// This node followed by all descendants, depth first.
    pub fn walk(&self) -> Vec<&Explanation> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }
}
