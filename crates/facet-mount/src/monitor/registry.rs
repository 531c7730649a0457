use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::Monitor;
use crate::error::ConfigurationError;

/// Creates a monitor for an element from a condition's query string.
pub type MonitorFactory<E> = Rc<dyn Fn(&E, &str) -> Result<Box<dyn Monitor>, ConfigurationError>>;

/// Monitor factories keyed by monitor type name.
pub struct MonitorRegistry<E> {
	factories: HashMap<String, MonitorFactory<E>>,
}

impl<E> Clone for MonitorRegistry<E> {
	fn clone(&self) -> Self {
		Self {
			factories: self.factories.clone(),
		}
	}
}

impl<E> Default for MonitorRegistry<E> {
	fn default() -> Self {
		Self {
			factories: HashMap::new(),
		}
	}
}

impl<E> fmt::Debug for MonitorRegistry<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MonitorRegistry")
			.field("names", &self.names())
			.finish()
	}
}

impl<E> MonitorRegistry<E> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `factory` under `name`, replacing any previous factory.
	pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
	where
		F: Fn(&E, &str) -> Result<Box<dyn Monitor>, ConfigurationError> + 'static,
	{
		self.factories.insert(name.into(), Rc::new(factory));
	}

	/// Registers an already shared factory.
	pub fn register_shared(&mut self, name: impl Into<String>, factory: MonitorFactory<E>) {
		self.factories.insert(name.into(), factory);
	}

	/// Creates a monitor of type `name` for `element`.
	pub fn create(
		&self,
		name: &str,
		element: &E,
		query: &str,
	) -> Result<Box<dyn Monitor>, ConfigurationError> {
		let factory = self
			.factories
			.get(name)
			.ok_or_else(|| ConfigurationError::UnknownMonitor(name.to_string()))?;
		factory(element, query)
	}

	/// Returns true if a factory is registered under `name`.
	pub fn contains(&self, name: &str) -> bool {
		self.factories.contains_key(name)
	}

	/// Returns the registered names, sorted.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.factories.keys().cloned().collect();
		names.sort();
		names
	}

	/// Copies every factory from `other`, replacing same-named ones.
	pub fn extend(&mut self, other: &MonitorRegistry<E>) {
		for (name, factory) in &other.factories {
			self.factories.insert(name.clone(), factory.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dom::MemoryElement;
	use crate::monitor::Toggle;
	use rstest::rstest;

	#[rstest]
	fn test_unknown_monitor() {
		let registry: MonitorRegistry<MemoryElement> = MonitorRegistry::new();
		let element = MemoryElement::new("div");
		let err = registry.create("scroll", &element, "past").err().unwrap();
		assert_eq!(err, ConfigurationError::UnknownMonitor("scroll".to_string()));
	}

	#[rstest]
	fn test_factory_receives_query() {
		let mut registry: MonitorRegistry<MemoryElement> = MonitorRegistry::new();
		registry.register("flag", |_el: &MemoryElement, query: &str| {
			Ok(Box::new(Toggle::new(query == "on")) as Box<dyn Monitor>)
		});
		let element = MemoryElement::new("div");

		assert!(registry.create("flag", &element, "on").unwrap().matches());
		assert!(!registry.create("flag", &element, "off").unwrap().matches());
	}

	#[rstest]
	fn test_extend_overrides_and_lists_names() {
		let mut base: MonitorRegistry<MemoryElement> = MonitorRegistry::new();
		base.register("a", |_: &MemoryElement, _: &str| {
			Ok(Box::new(Toggle::new(false)) as Box<dyn Monitor>)
		});
		let mut extra = MonitorRegistry::new();
		extra.register("a", |_: &MemoryElement, _: &str| {
			Ok(Box::new(Toggle::new(true)) as Box<dyn Monitor>)
		});
		extra.register("b", |_: &MemoryElement, _: &str| {
			Ok(Box::new(Toggle::new(true)) as Box<dyn Monitor>)
		});

		base.extend(&extra);

		assert_eq!(base.names(), vec!["a".to_string(), "b".to_string()]);
		let element = MemoryElement::new("div");
		assert!(base.create("a", &element, "").unwrap().matches());
	}
}
