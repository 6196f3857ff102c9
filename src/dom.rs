//! DOM node types. A node is owned by its parent's `children` list; `parent`
//! is a non-owning back-reference (a `Weak`, per the cyclic-reference design
//! note) so the tree can be dropped without manual teardown.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

pub type NodeRef = Rc<RefCell<Node>>;

pub struct Node {
    pub node_type: NodeType,
    pub children: Vec<NodeRef>,
    pub parent: Option<Weak<RefCell<Node>>>,
    pub style: BTreeMap<String, String>,
}

pub enum NodeType {
    Element(ElementData),
    Text(String),
}

pub struct ElementData {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub is_focus: bool,
    /// Set once an `<iframe>` element's child Frame has loaded; holds the
    /// child frame's id so paint/composite can find its display list.
    pub child_frame: Option<u64>,
}

impl Node {
    pub fn new_element(tag: String, attributes: BTreeMap<String, String>) -> NodeRef {
        Rc::new(RefCell::new(Node {
            node_type: NodeType::Element(ElementData {
                tag,
                attributes,
                is_focus: false,
                child_frame: None,
            }),
            children: Vec::new(),
            parent: None,
            style: BTreeMap::new(),
        }))
    }

    pub fn new_text(text: String) -> NodeRef {
        Rc::new(RefCell::new(Node {
            node_type: NodeType::Text(text),
            children: Vec::new(),
            parent: None,
            style: BTreeMap::new(),
        }))
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_element(&self) -> bool {
        matches!(self.node_type, NodeType::Element(_))
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.node_type {
            NodeType::Element(e) => Some(&e.tag),
            NodeType::Text(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match &self.node_type {
            NodeType::Element(e) => e.attributes.get(name).map(|s| s.as_str()),
            NodeType::Text(_) => None,
        }
    }
}

pub fn append_child(parent: &NodeRef, child: NodeRef) {
    child.borrow_mut().parent = Some(Rc::downgrade(parent));
    parent.borrow_mut().children.push(child);
}

/// Flattens a node tree into a pre-order list. Mirrors `tree_to_list` in the
/// original implementation's `dom/tree_utils.py`.
pub fn tree_to_list(tree: &NodeRef, out: &mut Vec<NodeRef>) {
    out.push(tree.clone());
    for child in tree.borrow().children.clone() {
        tree_to_list(&child, out);
    }
}
