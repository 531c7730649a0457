//! Headless monitor environment.
//!
//! Provides the built-in `media` and `visible` monitors for hosts without a
//! browser window. The host owns a [`Viewport`] and a [`VisibilityMap`] and
//! feeds them resize and visibility events; every monitor created from them
//! re-evaluates and notifies its listener when its own value flips.
//!
//! ```ignore
//! let env = HeadlessEnvironment::new(ViewportState::from_em(20.0, 40.0));
//! let mut conditioner = Conditioner::new(MountSettings::default());
//! conditioner.add_plugin(env.plugin());
//!
//! conditioner.hydrate(&root);
//! env.viewport().resize(ViewportState::from_em(40.0, 40.0));
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dom::HostElement;
use crate::error::ConfigurationError;
use crate::hooks::Plugin;
use crate::media::{MediaQueryList, ViewportState};
use crate::monitor::{ListenerSlot, Monitor, MonitorListener, MonitorRegistry, Subscription};

/// Monitor type name of the media monitor.
pub const MEDIA_MONITOR: &str = "media";
/// Monitor type name of the visibility monitor.
pub const VISIBLE_MONITOR: &str = "visible";

/// Shared value cache and listener of one monitor.
struct Observer<T> {
	query: T,
	matches: Cell<bool>,
	slot: ListenerSlot,
}

impl<T> Observer<T> {
	/// Caches `matches`, returning true if it changed.
	fn store(&self, matches: bool) -> bool {
		self.matches.replace(matches) != matches
	}

	fn notify(&self) {
		self.slot.notify(self.matches.get());
	}
}

struct ObservedMonitor<T> {
	observer: Rc<Observer<T>>,
}

impl<T> Monitor for ObservedMonitor<T> {
	fn matches(&self) -> bool {
		self.observer.matches.get()
	}

	fn subscribe(&self, listener: MonitorListener) -> Subscription {
		self.observer.slot.set(listener)
	}
}

/// Collects live observers, dropping dead ones, without holding the borrow.
fn live<T>(observers: &RefCell<Vec<Weak<Observer<T>>>>) -> Vec<Rc<Observer<T>>> {
	let mut observers = observers.borrow_mut();
	observers.retain(|w| w.strong_count() > 0);
	observers.iter().filter_map(Weak::upgrade).collect()
}

struct ViewportInner {
	state: Cell<ViewportState>,
	observers: RefCell<Vec<Weak<Observer<MediaQueryList>>>>,
}

/// A simulated browser viewport.
///
/// Clones share state.
#[derive(Clone)]
pub struct Viewport {
	inner: Rc<ViewportInner>,
}

impl Viewport {
	/// Creates a viewport with the given dimensions.
	pub fn new(state: ViewportState) -> Self {
		Self {
			inner: Rc::new(ViewportInner {
				state: Cell::new(state),
				observers: RefCell::new(Vec::new()),
			}),
		}
	}

	/// Returns the current dimensions.
	pub fn state(&self) -> ViewportState {
		self.inner.state.get()
	}

	/// Changes the dimensions and re-evaluates every media monitor.
	pub fn resize(&self, state: ViewportState) {
		tracing::debug!(width = state.width, height = state.height, "viewport resized");
		self.inner.state.set(state);
		// Every cache is current before the first listener runs.
		let changed: Vec<_> = live(&self.inner.observers)
			.into_iter()
			.filter(|observer| observer.store(observer.query.evaluate(&state)))
			.collect();
		for observer in changed {
			observer.notify();
		}
	}

	/// Creates a monitor for a media query list.
	pub fn monitor(&self, query: &str) -> Result<Box<dyn Monitor>, ConfigurationError> {
		let list = MediaQueryList::parse(query).map_err(|e| ConfigurationError::InvalidQuery {
			monitor: MEDIA_MONITOR.to_string(),
			query: query.to_string(),
			reason: e.to_string(),
		})?;
		let observer = Rc::new(Observer {
			matches: Cell::new(list.evaluate(&self.state())),
			query: list,
			slot: ListenerSlot::new(),
		});
		self.inner
			.observers
			.borrow_mut()
			.push(Rc::downgrade(&observer));
		Ok(Box::new(ObservedMonitor { observer }))
	}

	/// Returns the number of live media monitors.
	pub fn observer_count(&self) -> usize {
		live(&self.inner.observers).len()
	}
}

impl fmt::Debug for Viewport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Viewport")
			.field("state", &self.state())
			.finish()
	}
}

struct VisibilityEntry<E> {
	element: E,
	visible: bool,
	observers: Vec<Weak<Observer<bool>>>,
}

/// Visibility of elements as reported by the host.
///
/// Elements the host has not reported yet count as hidden. Clones share state.
pub struct VisibilityMap<E> {
	entries: Rc<RefCell<Vec<VisibilityEntry<E>>>>,
}

impl<E> Clone for VisibilityMap<E> {
	fn clone(&self) -> Self {
		Self {
			entries: self.entries.clone(),
		}
	}
}

impl<E> Default for VisibilityMap<E> {
	fn default() -> Self {
		Self {
			entries: Rc::new(RefCell::new(Vec::new())),
		}
	}
}

impl<E: HostElement> VisibilityMap<E> {
	/// Creates an empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns whether `element` is visible.
	pub fn is_visible(&self, element: &E) -> bool {
		self.entries
			.borrow()
			.iter()
			.find(|e| &e.element == element)
			.is_some_and(|e| e.visible)
	}

	/// Records the visibility of `element` and notifies its monitors.
	pub fn set_visible(&self, element: &E, visible: bool) {
		let observers = {
			let mut entries = self.entries.borrow_mut();
			let entry = Self::entry_mut(&mut entries, element);
			entry.visible = visible;
			let observers = entry
				.observers
				.iter()
				.filter_map(Weak::upgrade)
				.collect::<Vec<_>>();
			Self::prune(&mut entries);
			observers
		};
		tracing::debug!(element = ?element, visible, "visibility changed");
		let changed: Vec<_> = observers
			.into_iter()
			.filter(|observer| observer.store(observer.query == visible))
			.collect();
		for observer in changed {
			observer.notify();
		}
	}

	/// Creates a monitor that matches while `element` is visible (`true`, or
	/// an empty query) or hidden (`false`).
	pub fn monitor(&self, element: &E, query: &str) -> Result<Box<dyn Monitor>, ConfigurationError> {
		let wanted = parse_visibility_query(query)?;
		let mut entries = self.entries.borrow_mut();
		Self::prune(&mut entries);
		let entry = Self::entry_mut(&mut entries, element);
		let observer = Rc::new(Observer {
			query: wanted,
			matches: Cell::new(entry.visible == wanted),
			slot: ListenerSlot::new(),
		});
		entry.observers.push(Rc::downgrade(&observer));
		Ok(Box::new(ObservedMonitor { observer }))
	}

	/// Returns the number of elements currently tracked.
	pub fn tracked(&self) -> usize {
		self.entries.borrow().len()
	}

	/// Forgets elements that are hidden and no longer monitored.
	fn prune(entries: &mut Vec<VisibilityEntry<E>>) {
		entries.retain_mut(|entry| {
			entry.observers.retain(|w| w.strong_count() > 0);
			entry.visible || !entry.observers.is_empty()
		});
	}

	fn entry_mut<'a>(entries: &'a mut Vec<VisibilityEntry<E>>, element: &E) -> &'a mut VisibilityEntry<E> {
		match entries.iter().position(|e| &e.element == element) {
			Some(idx) => &mut entries[idx],
			None => {
				entries.push(VisibilityEntry {
					element: element.clone(),
					visible: false,
					observers: Vec::new(),
				});
				let last = entries.len() - 1;
				&mut entries[last]
			}
		}
	}
}

impl<E> fmt::Debug for VisibilityMap<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VisibilityMap")
			.field("elements", &self.entries.borrow().len())
			.finish()
	}
}

/// Parses the query of a `visible` condition.
pub fn parse_visibility_query(query: &str) -> Result<bool, ConfigurationError> {
	match query.trim() {
		"" | "true" => Ok(true),
		"false" => Ok(false),
		other => Err(ConfigurationError::InvalidQuery {
			monitor: VISIBLE_MONITOR.to_string(),
			query: other.to_string(),
			reason: "expected 'true' or 'false'".to_string(),
		}),
	}
}

/// Viewport and visibility state for headless hosts.
pub struct HeadlessEnvironment<E> {
	viewport: Viewport,
	visibility: VisibilityMap<E>,
}

impl<E> Clone for HeadlessEnvironment<E> {
	fn clone(&self) -> Self {
		Self {
			viewport: self.viewport.clone(),
			visibility: self.visibility.clone(),
		}
	}
}

impl<E: HostElement> HeadlessEnvironment<E> {
	/// Creates an environment with the given initial viewport.
	pub fn new(viewport: ViewportState) -> Self {
		Self {
			viewport: Viewport::new(viewport),
			visibility: VisibilityMap::new(),
		}
	}

	/// Returns the viewport.
	pub fn viewport(&self) -> &Viewport {
		&self.viewport
	}

	/// Returns the visibility map.
	pub fn visibility(&self) -> &VisibilityMap<E> {
		&self.visibility
	}

	/// Registers the `media` and `visible` monitors.
	pub fn install(&self, registry: &mut MonitorRegistry<E>) {
		let viewport = self.viewport.clone();
		registry.register(MEDIA_MONITOR, move |_element: &E, query: &str| {
			viewport.monitor(query)
		});
		let visibility = self.visibility.clone();
		registry.register(VISIBLE_MONITOR, move |element: &E, query: &str| {
			visibility.monitor(element, query)
		});
	}

	/// Returns a plugin that installs this environment's monitors.
	pub fn plugin(&self) -> Plugin<E> {
		let mut monitors = MonitorRegistry::new();
		self.install(&mut monitors);
		Plugin::new().monitors(monitors)
	}
}

impl<E> fmt::Debug for HeadlessEnvironment<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HeadlessEnvironment")
			.field("viewport", &self.viewport)
			.field("visibility", &self.visibility)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::MemoryElement;
	use rstest::rstest;

	fn recorder(monitor: &dyn Monitor) -> (Rc<RefCell<Vec<bool>>>, Subscription) {
		let seen = Rc::new(RefCell::new(Vec::new()));
		let log = seen.clone();
		let sub = monitor.subscribe(Rc::new(move |v| log.borrow_mut().push(v)));
		(seen, sub)
	}

	#[rstest]
	fn test_media_monitor_follows_resize() {
		let viewport = Viewport::new(ViewportState::from_em(20.0, 40.0));
		let monitor = viewport.monitor("(min-width:30em)").unwrap();
		let (seen, _sub) = recorder(monitor.as_ref());
		assert!(!monitor.matches());

		viewport.resize(ViewportState::from_em(25.0, 40.0));
		viewport.resize(ViewportState::from_em(40.0, 40.0));
		viewport.resize(ViewportState::from_em(50.0, 40.0));

		assert!(monitor.matches());
		assert_eq!(*seen.borrow(), vec![true]);
	}

	#[rstest]
	fn test_resize_updates_every_monitor_before_notifying() {
		let viewport = Viewport::new(ViewportState::from_em(20.0, 40.0));
		let wide = Rc::new(viewport.monitor("(min-width: 30em)").unwrap());
		let narrow = Rc::new(viewport.monitor("(max-width: 50em)").unwrap());
		let combined = Rc::new(RefCell::new(Vec::new()));

		let (peer, log) = (narrow.clone(), combined.clone());
		let _wide_sub = wide.subscribe(Rc::new(move |v| log.borrow_mut().push(v && peer.matches())));
		let (peer, log) = (wide.clone(), combined.clone());
		let _narrow_sub = narrow.subscribe(Rc::new(move |v| log.borrow_mut().push(v && peer.matches())));

		viewport.resize(ViewportState::from_em(60.0, 40.0));

		assert_eq!(*combined.borrow(), vec![false, false]);
	}

	#[rstest]
	fn test_media_monitor_rejects_bad_query() {
		let viewport = Viewport::new(ViewportState::default());
		let err = viewport.monitor("(colour)").err().unwrap();
		assert!(matches!(err, ConfigurationError::InvalidQuery { ref monitor, .. } if monitor == "media"));
	}

	#[rstest]
	fn test_dropped_media_monitor_is_released() {
		let viewport = Viewport::new(ViewportState::default());
		let monitor = viewport.monitor("(min-width:10em)").unwrap();
		assert_eq!(viewport.observer_count(), 1);
		drop(monitor);
		assert_eq!(viewport.observer_count(), 0);
	}

	#[rstest]
	#[case("true", true, true)]
	#[case("", true, true)]
	#[case("false", true, false)]
	#[case("false", false, true)]
	fn test_visibility_queries(#[case] query: &str, #[case] visible: bool, #[case] expected: bool) {
		let map = VisibilityMap::new();
		let element = MemoryElement::new("div");
		map.set_visible(&element, visible);
		let monitor = map.monitor(&element, query).unwrap();
		assert_eq!(monitor.matches(), expected);
	}

	#[rstest]
	fn test_visibility_is_per_element() {
		let map = VisibilityMap::new();
		let a = MemoryElement::new("div");
		let b = MemoryElement::new("div");
		let monitor_a = map.monitor(&a, "true").unwrap();
		let monitor_b = map.monitor(&b, "true").unwrap();
		let (seen_b, _sub) = recorder(monitor_b.as_ref());

		map.set_visible(&a, true);

		assert!(monitor_a.matches());
		assert!(!monitor_b.matches());
		assert!(seen_b.borrow().is_empty());
		assert!(map.is_visible(&a));
		assert!(!map.is_visible(&b));
	}

	#[rstest]
	fn test_hidden_unmonitored_elements_are_forgotten() {
		let map = VisibilityMap::new();
		let element = MemoryElement::new("div");
		let monitor = map.monitor(&element, "true").unwrap();
		assert_eq!(map.tracked(), 1);

		drop(monitor);
		map.set_visible(&element, false);
		assert_eq!(map.tracked(), 0);

		map.set_visible(&element, true);
		assert_eq!(map.tracked(), 1);
		assert!(map.is_visible(&element));

		map.set_visible(&element, false);
		assert_eq!(map.tracked(), 0);
	}

	#[rstest]
	fn test_monitoring_many_elements_does_not_accumulate() {
		let map = VisibilityMap::new();
		for _ in 0..5 {
			let element = MemoryElement::new("div");
			let monitor = map.monitor(&element, "true").unwrap();
			drop(monitor);
		}
		let last = map.monitor(&MemoryElement::new("div"), "true").unwrap();
		assert_eq!(map.tracked(), 1);
		drop(last);
	}

	#[rstest]
	fn test_invalid_visibility_query() {
		let map = VisibilityMap::new();
		let element = MemoryElement::new("div");
		assert!(map.monitor(&element, "sometimes").is_err());
	}

	#[rstest]
	fn test_install_registers_builtin_monitors() {
		let env: HeadlessEnvironment<MemoryElement> =
			HeadlessEnvironment::new(ViewportState::default());
		let mut registry = MonitorRegistry::new();
		env.install(&mut registry);
		assert_eq!(registry.names(), vec!["media".to_string(), "visible".to_string()]);
	}
}
