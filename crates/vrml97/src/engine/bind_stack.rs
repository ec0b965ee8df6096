use super::arena::NodeId;

/// Stack of bindable nodes of one kind; the top is the bound node.
#[derive(Debug, Default, Clone)]
pub struct BindStack {
    nodes: Vec<NodeId>,
}

impl BindStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Move `node` to the top. Returns the node that was bound before, or
    /// `None` if there was none or it was `node` itself.
    pub fn push(&mut self, node: NodeId) -> Option<NodeId> {
        let previous = self.top().filter(|top| *top != node);
        self.nodes.retain(|entry| *entry != node);
        self.nodes.push(node);
        previous
    }

    /// Take `node` off the stack. Returns whether it was bound.
    pub fn remove(&mut self, node: NodeId) -> bool {
        let was_top = self.top() == Some(node);
        self.nodes.retain(|entry| *entry != node);
        was_top
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> NodeId {
        NodeId { index, generation: 0 }
    }

    #[test]
    fn pushing_moves_a_node_to_the_top() {
        let mut stack = BindStack::new();
        assert_eq!(stack.push(id(1)), None);
        assert_eq!(stack.push(id(2)), Some(id(1)));
        assert_eq!(stack.push(id(2)), None);
        assert_eq!(stack.push(id(1)), Some(id(2)));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.top(), Some(id(1)));
    }

    #[test]
    fn removing_the_top_uncovers_the_previous_node() {
        let mut stack = BindStack::new();
        stack.push(id(1));
        stack.push(id(2));
        stack.push(id(3));
        assert!(!stack.remove(id(2)));
        assert_eq!(stack.top(), Some(id(3)));
        assert!(stack.remove(id(3)));
        assert_eq!(stack.top(), Some(id(1)));
        assert!(!stack.remove(id(9)));
    }
}
