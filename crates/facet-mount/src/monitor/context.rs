use std::fmt;
use std::rc::Rc;

use super::{Monitor, MonitorRegistry, Subscription};
use crate::error::ConfigurationError;
use crate::expression::ContextExpression;

/// The monitors of one context expression, combined with logical AND.
///
/// Each constituent monitor caches its own value. When one of them changes,
/// the combined value is recomputed from that monitor's new value and the
/// cached values of its peers; peers are not re-polled.
pub struct ContextMonitor {
	expression: ContextExpression,
	monitors: Rc<Vec<Box<dyn Monitor>>>,
	subscriptions: Vec<Subscription>,
	disposed: bool,
}

impl ContextMonitor {
	/// Creates one monitor per condition of `expression` for `element`.
	///
	/// Fails with [`ConfigurationError::UnknownMonitor`] if a condition names
	/// a monitor type missing from `registry`; monitors created before the
	/// failing one are dropped again.
	pub fn new<E>(
		expression: &ContextExpression,
		element: &E,
		registry: &MonitorRegistry<E>,
	) -> Result<Self, ConfigurationError> {
		let monitors = expression
			.conditions()
			.iter()
			.map(|condition| registry.create(&condition.monitor, element, &condition.query))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			expression: expression.clone(),
			monitors: Rc::new(monitors),
			subscriptions: Vec::new(),
			disposed: false,
		})
	}

	/// Returns the expression being monitored.
	pub fn expression(&self) -> &ContextExpression {
		&self.expression
	}

	/// Returns the AND of all monitors; true when there are none.
	pub fn matches(&self) -> bool {
		all_match(&self.monitors)
	}

	/// Registers the change callback, replacing any previous one.
	///
	/// `callback` runs every time a constituent monitor changes and receives
	/// the recomputed combined value. Has no effect once disposed.
	pub fn on_change(&mut self, callback: impl Fn(bool) + 'static) {
		self.subscriptions.clear();
		if self.disposed {
			return;
		}

		let callback: Rc<dyn Fn(bool)> = Rc::new(callback);
		for monitor in self.monitors.iter() {
			let peers = Rc::downgrade(&self.monitors);
			let callback = callback.clone();
			let subscription = monitor.subscribe(Rc::new(move |_| {
				let Some(peers) = peers.upgrade() else {
					return;
				};
				let combined = all_match(&peers);
				tracing::debug!(combined, "context monitor changed");
				callback(combined);
			}));
			self.subscriptions.push(subscription);
		}
	}

	/// Detaches every monitor listener. Idempotent.
	pub fn dispose(&mut self) {
		self.subscriptions.clear();
		self.disposed = true;
	}

	/// Returns true once [`dispose`](Self::dispose) has been called.
	pub fn is_disposed(&self) -> bool {
		self.disposed
	}

	/// Returns the number of constituent monitors.
	pub fn len(&self) -> usize {
		self.monitors.len()
	}

	/// Returns true if the expression had no conditions.
	pub fn is_empty(&self) -> bool {
		self.monitors.is_empty()
	}
}

impl Drop for ContextMonitor {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl fmt::Debug for ContextMonitor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContextMonitor")
			.field("expression", &self.expression.to_string())
			.field("matches", &self.matches())
			.field("disposed", &self.disposed)
			.finish()
	}
}

fn all_match(monitors: &[Box<dyn Monitor>]) -> bool {
	monitors.iter().all(|m| m.matches())
}
