use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::runtime::task::TaskId;

/// Output of a scheduler run, mirroring the input multi-task's caller-key
/// structure. Leaves and branches are distinct variants, so caller keys can
/// never be confused with internal task-id bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultTree {
    Leaf(Value),
    Branch(HashMap<String, ResultTree>),
}

impl ResultTree {
    /// Child of a branch node, by caller key.
    pub fn get(&self, key: &str) -> Option<&ResultTree> {
        match self {
            ResultTree::Branch(children) => children.get(key),
            ResultTree::Leaf(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            ResultTree::Leaf(value) => Some(value),
            ResultTree::Branch(_) => None,
        }
    }
}

/// One slot in the result skeleton.
///
/// `Pending` leaves hold the task id whose result the caller will observe.
/// `Resolved` leaves are settled early (a progression returned nothing).
/// Branches mirror nested multi-tasks and never hold task ids.
#[derive(Debug)]
pub(crate) enum SkeletonNode {
    Pending(TaskId),
    Resolved(Value),
    Branch(Vec<(String, usize)>),
}

/// Arena-backed result skeleton. Slots are addressed by index so the
/// scheduler can rewrite a sequence's slot across phases without holding
/// references into the tree.
#[derive(Debug)]
pub(crate) struct Skeleton {
    nodes: Vec<SkeletonNode>,
}

impl Skeleton {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub(crate) fn push(&mut self, node: SkeletonNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub(crate) fn set(&mut self, index: usize, node: SkeletonNode) {
        self.nodes[index] = node;
    }

    /// Walk the skeleton from `index`, substituting results for pending
    /// task ids. Read-only: resolving an already-assembled skeleton again
    /// yields the identical tree.
    pub(crate) fn resolve(&self, index: usize, lookup: &dyn Fn(TaskId) -> Value) -> ResultTree {
        match &self.nodes[index] {
            SkeletonNode::Pending(id) => ResultTree::Leaf(lookup(*id)),
            SkeletonNode::Resolved(value) => ResultTree::Leaf(value.clone()),
            SkeletonNode::Branch(children) => ResultTree::Branch(
                children
                    .iter()
                    .map(|(key, child)| (key.clone(), self.resolve(*child, lookup)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_is_idempotent() {
        let mut skeleton = Skeleton::new();
        let leaf = skeleton.push(SkeletonNode::Pending(TaskId(1)));
        let settled = skeleton.push(SkeletonNode::Resolved(Value::Null));
        let root = skeleton.push(SkeletonNode::Branch(vec![
            ("a".to_string(), leaf),
            ("b".to_string(), settled),
        ]));

        let lookup = |_id: TaskId| json!(42);
        let first = skeleton.resolve(root, &lookup);
        let second = skeleton.resolve(root, &lookup);

        assert_eq!(first, second);
        assert_eq!(first.get("a").and_then(ResultTree::value), Some(&json!(42)));
        assert_eq!(
            first.get("b").and_then(ResultTree::value),
            Some(&Value::Null)
        );
    }

    #[test]
    fn branches_mirror_nesting() {
        let mut skeleton = Skeleton::new();
        let inner_leaf = skeleton.push(SkeletonNode::Pending(TaskId(2)));
        let inner = skeleton.push(SkeletonNode::Branch(vec![("p".to_string(), inner_leaf)]));
        let outer_leaf = skeleton.push(SkeletonNode::Pending(TaskId(1)));
        let root = skeleton.push(SkeletonNode::Branch(vec![
            ("x".to_string(), outer_leaf),
            ("y".to_string(), inner),
        ]));

        let tree = skeleton.resolve(root, &|id| json!(id.0));
        assert_eq!(tree.get("x").and_then(ResultTree::value), Some(&json!(1)));
        assert_eq!(
            tree.get("y").and_then(|inner| inner.get("p")).and_then(ResultTree::value),
            Some(&json!(2))
        );
    }
}
