//! Condition monitors.
//!
//! A [`Monitor`] is a live boolean predicate (a media query, the visibility of
//! an element, a host-driven switch) that reports when its value flips. The
//! [`ContextMonitor`] combines one monitor per condition of a
//! [`ContextExpression`](crate::expression::ContextExpression) into a single
//! boolean.
//!
//! ## Architecture
//!
//! ```text
//! "@media (min-width:30em) and @visible true"
//!          │                        │
//!   MonitorRegistry["media"]  MonitorRegistry["visible"]
//!          │                        │
//!       Monitor ──────┐   ┌──── Monitor
//!                     ▼   ▼
//!                 ContextMonitor ── on_change(bool) ──▶ BoundModule
//! ```

mod context;
mod registry;
mod toggle;

pub use context::ContextMonitor;
pub use registry::{MonitorFactory, MonitorRegistry};
pub use toggle::Toggle;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Callback invoked with a monitor's new value.
pub type MonitorListener = Rc<dyn Fn(bool)>;

/// A live boolean condition.
///
/// Implementations update the value returned by [`matches`](Monitor::matches)
/// before notifying, and notify only when the value actually changes.
pub trait Monitor {
	/// Returns the current value.
	fn matches(&self) -> bool;

	/// Registers the change listener, replacing any previous one.
	fn subscribe(&self, listener: MonitorListener) -> Subscription;
}

/// Detaches a listener when cancelled or dropped.
#[must_use = "dropping a Subscription detaches the listener immediately"]
pub struct Subscription {
	cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	/// Creates a subscription that runs `cancel` once when detached.
	pub fn new(cancel: impl FnOnce() + 'static) -> Self {
		Self {
			cancel: Some(Box::new(cancel)),
		}
	}

	/// Creates a subscription with nothing to detach.
	pub fn empty() -> Self {
		Self { cancel: None }
	}

	/// Detaches the listener. Calling this more than once has no effect.
	pub fn cancel(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel();
		}
	}

	/// Returns true until the subscription has been cancelled.
	pub fn is_active(&self) -> bool {
		self.cancel.is_some()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.cancel();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.is_active())
			.finish()
	}
}

#[derive(Default)]
struct SlotState {
	generation: u64,
	listener: Option<MonitorListener>,
}

/// Holds the single listener of a monitor.
///
/// Subscribing bumps a generation counter, so cancelling a subscription that
/// has since been replaced leaves the newer listener in place.
#[derive(Clone, Default)]
pub struct ListenerSlot {
	state: Rc<RefCell<SlotState>>,
}

impl ListenerSlot {
	/// Creates an empty slot.
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores `listener`, replacing the previous one.
	pub fn set(&self, listener: MonitorListener) -> Subscription {
		let generation = {
			let mut state = self.state.borrow_mut();
			state.generation += 1;
			state.listener = Some(listener);
			state.generation
		};
		let weak: Weak<RefCell<SlotState>> = Rc::downgrade(&self.state);
		Subscription::new(move || {
			if let Some(state) = weak.upgrade() {
				let mut state = state.borrow_mut();
				if state.generation == generation {
					state.listener = None;
				}
			}
		})
	}

	/// Invokes the listener, if any, with `value`.
	pub fn notify(&self, value: bool) {
		let listener = self.state.borrow().listener.clone();
		if let Some(listener) = listener {
			listener(value);
		}
	}

	/// Returns true if a listener is attached.
	pub fn is_set(&self) -> bool {
		self.state.borrow().listener.is_some()
	}
}

impl fmt::Debug for ListenerSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerSlot")
			.field("is_set", &self.is_set())
			.finish()
	}
}
