//! Module catalog.
//!
//! The default import strategy. Modules are Rust values, so instead of fetching
//! code by URL the host defines every module it may mount up front, either
//! ready to construct or behind an async loader for code that is split into a
//! separate chunk. Lazily loaded modules are loaded once and cached.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{self, LocalBoxFuture};
use serde_json::Value;

use crate::error::{MountError, MountResult};
use crate::registry::to_absolute;

/// Tears a constructed module down again.
pub type Destructor = Box<dyn FnOnce()>;

/// Builds a module instance for an element from its constructor arguments.
pub type Constructor<E> = Rc<dyn Fn(&E, &Value) -> MountResult<Instance>>;

/// Loads a module asynchronously.
pub type ModuleLoader<E> = Rc<dyn Fn() -> LocalBoxFuture<'static, MountResult<Module<E>>>>;

/// A constructed module.
#[derive(Default)]
pub struct Instance {
	destructor: Option<Destructor>,
	handle: Option<Box<dyn Any>>,
}

impl Instance {
	/// Creates an instance with nothing to tear down.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates an instance torn down by `destructor`.
	pub fn with_destructor(destructor: impl FnOnce() + 'static) -> Self {
		Self {
			destructor: Some(Box::new(destructor)),
			handle: None,
		}
	}

	/// Attaches an opaque value the host may inspect later.
	pub fn handle<T: Any>(mut self, value: T) -> Self {
		self.handle = Some(Box::new(value));
		self
	}

	/// Returns the attached value if it has type `T`.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.handle.as_ref().and_then(|h| h.downcast_ref::<T>())
	}

	/// Takes the destructor, leaving `None` behind.
	pub fn take_destructor(&mut self) -> Option<Destructor> {
		self.destructor.take()
	}

	/// Returns true if the instance carries a destructor.
	pub fn has_destructor(&self) -> bool {
		self.destructor.is_some()
	}
}

impl fmt::Debug for Instance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("has_destructor", &self.destructor.is_some())
			.field("has_handle", &self.handle.is_some())
			.finish()
	}
}

/// An imported module: a default constructor plus named exports.
pub struct Module<E> {
	default: Option<Constructor<E>>,
	exports: HashMap<String, Constructor<E>>,
}

impl<E> Clone for Module<E> {
	fn clone(&self) -> Self {
		Self {
			default: self.default.clone(),
			exports: self.exports.clone(),
		}
	}
}

impl<E> fmt::Debug for Module<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut exports: Vec<_> = self.exports.keys().collect();
		exports.sort();
		f.debug_struct("Module")
			.field("has_default", &self.default.is_some())
			.field("exports", &exports)
			.finish()
	}
}

impl<E> Default for Module<E> {
	fn default() -> Self {
		Self {
			default: None,
			exports: HashMap::new(),
		}
	}
}

impl<E: 'static> Module<E> {
	/// Creates a module whose default export is `constructor`.
	pub fn new<F>(constructor: F) -> Self
	where
		F: Fn(&E, &Value) -> MountResult<Instance> + 'static,
	{
		Self {
			default: Some(Rc::new(constructor)),
			exports: HashMap::new(),
		}
	}

	/// Creates a module with no default export.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Adds a named export.
	pub fn export<F>(mut self, name: impl Into<String>, constructor: F) -> Self
	where
		F: Fn(&E, &Value) -> MountResult<Instance> + 'static,
	{
		self.exports.insert(name.into(), Rc::new(constructor));
		self
	}

	/// Returns the default constructor.
	pub fn default_constructor(&self) -> Option<Constructor<E>> {
		self.default.clone()
	}

	/// Returns a named export.
	pub fn named(&self, name: &str) -> Option<Constructor<E>> {
		self.exports.get(name).cloned()
	}
}

enum Entry<E> {
	Ready(Module<E>),
	Lazy {
		loader: ModuleLoader<E>,
		cache: Rc<RefCell<Option<Module<E>>>>,
	},
}

/// Modules available to the default import strategy, keyed by absolute path.
pub struct ModuleCatalog<E> {
	base_path: String,
	entries: HashMap<String, Entry<E>>,
}

impl<E> fmt::Debug for ModuleCatalog<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut paths: Vec<_> = self.entries.keys().collect();
		paths.sort();
		f.debug_struct("ModuleCatalog")
			.field("base_path", &self.base_path)
			.field("paths", &paths)
			.finish()
	}
}

impl<E: 'static> ModuleCatalog<E> {
	/// Creates an empty catalog resolving relative paths against `base_path`.
	pub fn new(base_path: impl Into<String>) -> Self {
		Self {
			base_path: base_path.into(),
			entries: HashMap::new(),
		}
	}

	/// Defines a ready module.
	pub fn define(&mut self, path: &str, module: Module<E>) {
		let key = to_absolute(&self.base_path, path);
		self.entries.insert(key, Entry::Ready(module));
	}

	/// Defines a module loaded on first import.
	pub fn define_lazy<F>(&mut self, path: &str, loader: F)
	where
		F: Fn() -> LocalBoxFuture<'static, MountResult<Module<E>>> + 'static,
	{
		let key = to_absolute(&self.base_path, path);
		self.entries.insert(
			key,
			Entry::Lazy {
				loader: Rc::new(loader),
				cache: Rc::new(RefCell::new(None)),
			},
		);
	}

	/// Returns true if `name` resolves to a defined module.
	pub fn contains(&self, name: &str) -> bool {
		self.entry(name).is_some()
	}

	/// Imports the module defined for `name`.
	pub fn import(&self, name: &str) -> LocalBoxFuture<'static, MountResult<Module<E>>> {
		match self.entry(name) {
			Some(Entry::Ready(module)) => future::ready(Ok(module.clone())).boxed_local(),
			Some(Entry::Lazy { loader, cache }) => {
				if let Some(module) = cache.borrow().as_ref() {
					return future::ready(Ok(module.clone())).boxed_local();
				}
				let pending = loader();
				let cache = cache.clone();
				async move {
					let module = pending.await?;
					*cache.borrow_mut() = Some(module.clone());
					Ok(module)
				}
				.boxed_local()
			}
			None => future::ready(Err(MountError::import(
				name,
				"no module is defined under this path",
			)))
			.boxed_local(),
		}
	}

	fn entry(&self, name: &str) -> Option<&Entry<E>> {
		self.entries
			.get(name)
			.or_else(|| self.entries.get(&to_absolute(&self.base_path, name)))
	}
}
