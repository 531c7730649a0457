use std::cell::Cell;
use std::rc::Rc;

use super::{ListenerSlot, Monitor, MonitorListener, Subscription};

/// A monitor whose value is set by the host.
///
/// Useful for conditions only the application knows about (a logged-in flag,
/// a feature switch) and for driving monitors by hand in tests. Clones share
/// the same value and listener.
#[derive(Debug, Clone)]
pub struct Toggle {
	value: Rc<Cell<bool>>,
	slot: ListenerSlot,
}

impl Toggle {
	/// Creates a toggle with an initial value.
	pub fn new(initial: bool) -> Self {
		Self {
			value: Rc::new(Cell::new(initial)),
			slot: ListenerSlot::new(),
		}
	}

	/// Sets the value, notifying the listener if it changed.
	pub fn set(&self, value: bool) {
		if self.value.replace(value) != value {
			self.slot.notify(value);
		}
	}

	/// Returns the current value.
	pub fn get(&self) -> bool {
		self.value.get()
	}

	/// Returns true if a listener is attached.
	pub fn is_observed(&self) -> bool {
		self.slot.is_set()
	}
}

impl Monitor for Toggle {
	fn matches(&self) -> bool {
		self.get()
	}

	fn subscribe(&self, listener: MonitorListener) -> Subscription {
		self.slot.set(listener)
	}
}
