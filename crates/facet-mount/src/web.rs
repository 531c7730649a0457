//! Browser bindings.
//!
//! [`WebElement`] adapts `web_sys::Element` to [`HostElement`]. The `media`
//! monitor wraps `window.matchMedia` and the `visible` monitor wraps an
//! `IntersectionObserver` on the bound element. Both detach their JS
//! listeners when dropped.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
	Element, IntersectionObserver, IntersectionObserverEntry, MediaQueryList,
	MediaQueryListEvent,
};

use crate::conditioner::Conditioner;
use crate::dom::HostElement;
use crate::error::ConfigurationError;
use crate::headless::{MEDIA_MONITOR, VISIBLE_MONITOR, parse_visibility_query};
use crate::hooks::Plugin;
use crate::monitor::{ListenerSlot, Monitor, MonitorListener, MonitorRegistry, Subscription};
use crate::settings::MountSettings;

/// A DOM element.
#[derive(Clone, PartialEq, Eq)]
pub struct WebElement(Element);

impl WebElement {
	/// Wraps `element`.
	pub fn new(element: Element) -> Self {
		Self(element)
	}

	/// The wrapped element.
	pub fn element(&self) -> &Element {
		&self.0
	}

	/// The document's root element.
	pub fn document_root() -> Option<Self> {
		web_sys::window()?
			.document()?
			.document_element()
			.map(Self)
	}
}

impl From<Element> for WebElement {
	fn from(element: Element) -> Self {
		Self(element)
	}
}

impl fmt::Debug for WebElement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<{}>", self.0.tag_name().to_lowercase())
	}
}

impl HostElement for WebElement {
	fn attribute(&self, name: &str) -> Option<String> {
		self.0.get_attribute(name)
	}

	fn elements_with_attribute(&self, name: &str) -> Vec<Self> {
		let Ok(nodes) = self.0.query_selector_all(&format!("[{}]", name)) else {
			tracing::warn!(attribute = name, "invalid attribute selector");
			return Vec::new();
		};
		(0..nodes.length())
			.filter_map(|index| nodes.item(index))
			.filter_map(|node| node.dyn_into::<Element>().ok())
			.map(Self)
			.collect()
	}
}

fn invalid(monitor: &str, query: &str, reason: impl Into<String>) -> ConfigurationError {
	ConfigurationError::InvalidQuery {
		monitor: monitor.to_string(),
		query: query.to_string(),
		reason: reason.into(),
	}
}

fn describe(value: &JsValue) -> String {
	value
		.as_string()
		.unwrap_or_else(|| format!("{:?}", value))
}

struct MediaMonitor {
	list: MediaQueryList,
	slot: ListenerSlot,
	listener: Closure<dyn FnMut(MediaQueryListEvent)>,
}

impl MediaMonitor {
	fn create(query: &str) -> Result<Self, ConfigurationError> {
		let window =
			web_sys::window().ok_or_else(|| invalid(MEDIA_MONITOR, query, "no window available"))?;
		let list = window
			.match_media(query)
			.map_err(|e| invalid(MEDIA_MONITOR, query, describe(&e)))?
			.ok_or_else(|| invalid(MEDIA_MONITOR, query, "matchMedia returned nothing"))?;

		let slot = ListenerSlot::new();
		let notify = slot.clone();
		let listener = Closure::<dyn FnMut(MediaQueryListEvent)>::new(move |event: MediaQueryListEvent| {
			notify.notify(event.matches());
		});
		list.add_event_listener_with_callback("change", listener.as_ref().unchecked_ref())
			.map_err(|e| invalid(MEDIA_MONITOR, query, describe(&e)))?;

		Ok(Self { list, slot, listener })
	}
}

impl Monitor for MediaMonitor {
	fn matches(&self) -> bool {
		self.list.matches()
	}

	fn subscribe(&self, listener: MonitorListener) -> Subscription {
		self.slot.set(listener)
	}
}

impl Drop for MediaMonitor {
	fn drop(&mut self) {
		let _ = self
			.list
			.remove_event_listener_with_callback("change", self.listener.as_ref().unchecked_ref());
	}
}

struct VisibleMonitor {
	observer: IntersectionObserver,
	visible: Rc<Cell<bool>>,
	wanted: bool,
	slot: ListenerSlot,
	_callback: Closure<dyn FnMut(js_sys::Array, IntersectionObserver)>,
}

impl VisibleMonitor {
	fn create(element: &WebElement, query: &str) -> Result<Self, ConfigurationError> {
		let wanted = parse_visibility_query(query)?;
		let visible = Rc::new(Cell::new(false));
		let slot = ListenerSlot::new();

		let state = visible.clone();
		let notify = slot.clone();
		let callback = Closure::<dyn FnMut(js_sys::Array, IntersectionObserver)>::new(
			move |entries: js_sys::Array, _observer: IntersectionObserver| {
				let Some(entry) = entries
					.iter()
					.filter_map(|entry| entry.dyn_into::<IntersectionObserverEntry>().ok())
					.last()
				else {
					return;
				};
				let now = entry.is_intersecting();
				if state.replace(now) != now {
					notify.notify(now == wanted);
				}
			},
		);
		let observer = IntersectionObserver::new(callback.as_ref().unchecked_ref())
			.map_err(|e| invalid(VISIBLE_MONITOR, query, describe(&e)))?;
		observer.observe(element.element());

		Ok(Self {
			observer,
			visible,
			wanted,
			slot,
			_callback: callback,
		})
	}
}

impl Monitor for VisibleMonitor {
	fn matches(&self) -> bool {
		self.visible.get() == self.wanted
	}

	fn subscribe(&self, listener: MonitorListener) -> Subscription {
		self.slot.set(listener)
	}
}

impl Drop for VisibleMonitor {
	fn drop(&mut self) {
		self.observer.disconnect();
	}
}

/// Monitor factories backed by browser APIs.
pub fn monitors() -> MonitorRegistry<WebElement> {
	let mut registry = MonitorRegistry::new();
	registry.register(MEDIA_MONITOR, |_: &WebElement, query: &str| {
		Ok(Box::new(MediaMonitor::create(query)?) as Box<dyn Monitor>)
	});
	registry.register(VISIBLE_MONITOR, |element: &WebElement, query: &str| {
		Ok(Box::new(VisibleMonitor::create(element, query)?) as Box<dyn Monitor>)
	});
	registry
}

/// A plugin installing the browser monitors.
pub fn plugin() -> Plugin<WebElement> {
	Plugin::new().monitors(monitors())
}

impl Conditioner<WebElement> {
	/// Creates a conditioner with the browser monitors installed.
	pub fn browser(settings: MountSettings) -> Self {
		let mut conditioner = Self::new(settings);
		conditioner.add_plugin(plugin());
		conditioner
	}
}
