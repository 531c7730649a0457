//! Host element abstraction.
//!
//! Everything in this crate is generic over [`HostElement`], the minimal view
//! of a DOM node that hydration needs. Browser builds use
//! [`WebElement`](crate::web::WebElement); headless hosts and tests use the
//! in-memory [`MemoryElement`] tree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// A DOM node as seen by the hydrator.
///
/// Implementations compare by identity: two handles are equal when they
/// refer to the same node.
pub trait HostElement: Clone + PartialEq + fmt::Debug + 'static {
	/// Returns the value of the named attribute.
	fn attribute(&self, name: &str) -> Option<String>;

	/// Returns all descendants (not `self`) carrying the named attribute, in
	/// document order.
	fn elements_with_attribute(&self, name: &str) -> Vec<Self>;

	/// Returns true if the element carries the named attribute.
	fn has_attribute(&self, name: &str) -> bool {
		self.attribute(name).is_some()
	}
}

#[derive(Debug)]
struct NodeData {
	tag: String,
	attributes: BTreeMap<String, String>,
	children: Vec<MemoryElement>,
	parent: Weak<RefCell<NodeData>>,
}

/// An element in an in-memory tree.
///
/// Cloning yields another handle to the same node.
#[derive(Clone)]
pub struct MemoryElement {
	node: Rc<RefCell<NodeData>>,
}

impl MemoryElement {
	/// Creates a detached element.
	pub fn new(tag: impl Into<String>) -> Self {
		Self {
			node: Rc::new(RefCell::new(NodeData {
				tag: tag.into(),
				attributes: BTreeMap::new(),
				children: Vec::new(),
				parent: Weak::new(),
			})),
		}
	}

	/// Sets an attribute, builder style.
	pub fn attr(self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.set_attribute(name, value);
		self
	}

	/// Appends a child, builder style.
	pub fn child(self, child: MemoryElement) -> Self {
		self.append_child(child);
		self
	}

	/// Returns the tag name.
	pub fn tag(&self) -> String {
		self.node.borrow().tag.clone()
	}

	/// Sets an attribute.
	pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
		self.node
			.borrow_mut()
			.attributes
			.insert(name.into(), value.into());
	}

	/// Removes an attribute.
	pub fn remove_attribute(&self, name: &str) {
		self.node.borrow_mut().attributes.remove(name);
	}

	/// Appends a child, detaching it from any previous parent.
	pub fn append_child(&self, child: MemoryElement) {
		if let Some(old_parent) = child.parent() {
			old_parent
				.node
				.borrow_mut()
				.children
				.retain(|c| c != &child);
		}
		child.node.borrow_mut().parent = Rc::downgrade(&self.node);
		self.node.borrow_mut().children.push(child);
	}

	/// Returns the parent element.
	pub fn parent(&self) -> Option<MemoryElement> {
		self.node
			.borrow()
			.parent
			.upgrade()
			.map(|node| MemoryElement { node })
	}

	/// Returns the direct children.
	pub fn children(&self) -> Vec<MemoryElement> {
		self.node.borrow().children.clone()
	}

	fn collect_with_attribute(&self, name: &str, out: &mut Vec<MemoryElement>) {
		for child in self.children() {
			if child.has_attribute(name) {
				out.push(child.clone());
			}
			child.collect_with_attribute(name, out);
		}
	}
}

impl PartialEq for MemoryElement {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.node, &other.node)
	}
}

impl Eq for MemoryElement {}

impl fmt::Debug for MemoryElement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let node = self.node.borrow();
		write!(f, "<{}", node.tag)?;
		for (name, value) in &node.attributes {
			write!(f, " {}=\"{}\"", name, value)?;
		}
		write!(f, ">")
	}
}

impl HostElement for MemoryElement {
	fn attribute(&self, name: &str) -> Option<String> {
		self.node.borrow().attributes.get(name).cloned()
	}

	fn elements_with_attribute(&self, name: &str) -> Vec<Self> {
		let mut found = Vec::new();
		self.collect_with_attribute(name, &mut found);
		found
	}
}
