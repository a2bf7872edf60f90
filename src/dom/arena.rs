//! Arena-based DOM for XHTML content documents.
//!
//! Every node lives in one contiguous vector and links to its relatives by
//! index, so the tree can be mutated through plain `NodeId` handles without
//! reference-counted parent/child cycles.

use html5ever::{LocalName, QualName, ns};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node payload.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root.
    Document,
    /// Element with name and attributes in source order.
    ///
    /// The name is boxed so its address stays stable while the arena grows;
    /// the tree builder holds on to name references between allocations.
    Element {
        name: Box<QualName>,
        attrs: Vec<Attribute>,
    },
    /// Text content.
    Text(String),
    /// Comment.
    Comment(String),
    /// Document type declaration.
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
}

/// Element attribute.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

impl Attribute {
    /// The attribute name as written in markup (`xml:lang`, `xlink:href`, `class`).
    pub fn qualified_name(&self) -> String {
        match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, self.name.local),
            None => self.name.local.to_string(),
        }
    }

    /// The namespace prefix. The tree builder records `xmlns` on foreign
    /// elements with an empty prefix, which is the same as none.
    fn prefix(&self) -> Option<&str> {
        self.name
            .prefix
            .as_ref()
            .map(|p| &**p)
            .filter(|p| !p.is_empty())
    }

    /// Whether this attribute is written as `qualified` in markup.
    pub fn matches(&self, qualified: &str) -> bool {
        match self.prefix() {
            Some(prefix) => qualified
                .split_once(':')
                .is_some_and(|(p, l)| p == prefix && l == self.name.local.as_ref()),
            None => self.name.local.as_ref() == qualified,
        }
    }
}

/// A node in the arena.
#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-based DOM tree.
pub struct ArenaDom {
    nodes: Vec<Node>,
    document: NodeId,
}

impl ArenaDom {
    /// Create a new empty DOM with a document root.
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
        };
        dom.document = dom.alloc(Node::new(NodeData::Document));
        dom
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get the document root ID.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    /// Get a mutable node by ID.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        self.alloc(Node::new(NodeData::Element {
            name: Box::new(name),
            attrs,
        }))
    }

    pub fn create_text(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text)))
    }

    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text)))
    }

    pub fn create_doctype(&mut self, name: String, public_id: String, system_id: String) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype {
            name,
            public_id,
            system_id,
        }))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if last_child.is_some()
            && let Some(last_node) = self.get_mut(last_child)
        {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a node before a sibling.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.get(sibling).map(|n| n.parent).unwrap_or(NodeId::NONE);
        let prev = self.get(sibling).map(|n| n.prev_sibling).unwrap_or(NodeId::NONE);

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Append text to an existing trailing text node, or create a new one.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(ref mut existing) = last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text.to_string());
        self.append(parent, text_node);
    }

    /// Unlink a node from its parent and siblings. The node stays in the arena.
    pub fn detach(&mut self, target: NodeId) {
        let (parent, prev, next) = match self.get(target) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(target) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Move every child of `node` to the end of `new_parent`.
    pub fn reparent_children(&mut self, node: NodeId, new_parent: NodeId) {
        let children: Vec<_> = self.children(node).collect();
        for child in children {
            self.detach(child);
            self.append(new_parent, child);
        }
    }

    /// Get the number of nodes, detached ones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the DOM only has its document root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self.get(parent).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        ChildrenIter {
            dom: self,
            current: first,
        }
    }

    /// Iterate over all nodes below `root` in document order (root excluded).
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let mut stack: Vec<_> = self.children(root).collect();
        stack.reverse();
        Descendants { dom: self, stack }
    }

    /// Find the first node matching a predicate (document order).
    pub fn find<F>(&self, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.descendants(self.document)
            .find(|&id| self.get(id).is_some_and(&predicate))
    }

    /// Find element by tag name (first match).
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.find(|node| match &node.data {
            NodeData::Element { name, .. } => name.local.as_ref() == tag,
            _ => false,
        })
    }
}

impl Default for ArenaDom {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    dom: &'a ArenaDom,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.dom.get(id).map(|n| n.next_sibling).unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Pre-order depth-first iterator.
pub struct Descendants<'a> {
    dom: &'a ArenaDom,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let first = self.stack.len();
        self.stack.extend(self.dom.children(id));
        self.stack[first..].reverse();
        Some(id)
    }
}

/// Element accessors and attribute mutation.
impl ArenaDom {
    /// Get element's local name (tag).
    pub fn element_name(&self, id: NodeId) -> Option<&LocalName> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(&name.local),
            _ => None,
        })
    }

    /// Get an attribute value by its qualified name.
    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.matches(attr_name))
                .map(|a| a.value.as_str()),
            _ => None,
        })
    }

    /// Get all attributes of an element.
    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Set an attribute, replacing the value in place when it already exists.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) {
        let Some(NodeData::Element { attrs, .. }) = self.get_mut(id).map(|n| &mut n.data) else {
            return;
        };

        if let Some(existing) = attrs.iter_mut().find(|a| a.matches(attr_name)) {
            existing.value = value.to_string();
            return;
        }

        attrs.push(Attribute {
            name: QualName::new(None, ns!(), LocalName::from(attr_name)),
            value: value.to_string(),
        });
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove_attr(&mut self, id: NodeId, attr_name: &str) -> bool {
        let Some(NodeData::Element { attrs, .. }) = self.get_mut(id).map(|n| &mut n.data) else {
            return false;
        };
        let before = attrs.len();
        attrs.retain(|a| !a.matches(attr_name));
        attrs.len() != before
    }

    /// Check if node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    /// Get text content of a text node.
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }
}
