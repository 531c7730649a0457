//! Strategy hooks and plugins.
//!
//! Every step of hydration and of the mount lifecycle goes through a named
//! strategy function in [`Hooks`]. [`Hooks::defaults`] wires the built-in
//! behaviour (attribute accessors, the module catalog, registry options as
//! constructor arguments). A [`Plugin`] overrides any subset of them and may
//! contribute monitor factories; plugins are applied in order, later ones
//! winning.
//!
//! | Hook | Default |
//! |------|---------|
//! | `select_modules` | root and descendants carrying the module attribute |
//! | `get_name` | module attribute |
//! | `set_name` | registry redirect |
//! | `get_context` | context attribute |
//! | `import` | [`ModuleCatalog::import`] |
//! | `get_constructor` | default export |
//! | `get_destructor` | instance destructor |
//! | `constructor_arguments` | registry options merged with the options attribute |
//! | `will_*` / `did_*` / `mount_error` | no-op |
//! | `spawn` | `spawn_local` on wasm; elsewhere run inline if ready, else queue on [`PendingImports`] |
//!
//! On native targets an import that is not ready on its first poll waits in
//! [`Hooks::pending`] until the host calls
//! [`Conditioner::run_until_stalled`](crate::Conditioner::run_until_stalled).
//! Nothing blocks the calling thread, so hydration also works from inside an
//! async task.
//!
//! No monitor types are registered by default. Install them through a plugin
//! such as the headless environment or the browser plugin.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use serde_json::Value;

use crate::bound::BoundModule;
use crate::catalog::{Constructor, Destructor, Instance, Module, ModuleCatalog};
use crate::dom::HostElement;
use crate::error::{MountError, MountResult};
use crate::monitor::MonitorRegistry;
use crate::registry::ModuleRegistry;
use crate::settings::MountSettings;

/// Runs a future to completion on the current thread's executor.
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;
/// Imports a module by resolved name.
pub type ImportFn<E> = Rc<dyn Fn(&str) -> LocalBoxFuture<'static, MountResult<Module<E>>>>;
/// Selects the elements to bind below (and including) a root.
pub type SelectFn<E> = Rc<dyn Fn(&E) -> Vec<E>>;
/// Reads a string from an element.
pub type AccessorFn<E> = Rc<dyn Fn(&E) -> Option<String>>;
/// Maps a module alias to the name that is imported.
pub type NameFn = Rc<dyn Fn(&str) -> String>;
/// Picks the constructor out of an imported module.
pub type ConstructorFn<E> = Rc<dyn Fn(&Module<E>) -> Option<Constructor<E>>>;
/// Takes the destructor out of a constructed instance.
pub type DestructorFn = Rc<dyn Fn(&mut Instance) -> Option<Destructor>>;
/// Builds the arguments handed to a module constructor.
pub type ArgumentsFn<E> = Rc<dyn Fn(&BoundModule<E>) -> MountResult<Value>>;
/// Lifecycle notification.
pub type LifecycleHook<E> = Rc<dyn Fn(&BoundModule<E>)>;
/// Mount failure notification.
pub type MountErrorHook<E> = Rc<dyn Fn(&BoundModule<E>, &MountError)>;

/// The strategy functions used by hydration and the mount lifecycle.
pub struct Hooks<E> {
	/// Selects the elements to bind.
	pub select_modules: SelectFn<E>,
	/// Reads the module alias of an element.
	pub get_name: AccessorFn<E>,
	/// Resolves an alias to the module name to import.
	pub set_name: NameFn,
	/// Reads the context expression of an element.
	pub get_context: AccessorFn<E>,
	/// Imports a module.
	pub import: ImportFn<E>,
	/// Picks the constructor of an imported module.
	pub get_constructor: ConstructorFn<E>,
	/// Extracts the destructor of a constructed instance.
	pub get_destructor: DestructorFn,
	/// Builds constructor arguments.
	pub constructor_arguments: ArgumentsFn<E>,
	/// Before the import starts.
	pub will_mount: LifecycleHook<E>,
	/// After the instance is constructed.
	pub did_mount: LifecycleHook<E>,
	/// Before the destructor runs.
	pub will_unmount: LifecycleHook<E>,
	/// After the instance is discarded.
	pub did_unmount: LifecycleHook<E>,
	/// After an import or construction failure.
	pub mount_error: MountErrorHook<E>,
	/// Before a bound module is destroyed.
	pub will_destroy: LifecycleHook<E>,
	/// After a bound module is destroyed.
	pub did_destroy: LifecycleHook<E>,
	/// Drives pending imports.
	pub spawn: Spawner,
	/// Imports the default native spawner could not finish immediately.
	pub pending: PendingImports,
	/// Monitor factories by type name.
	pub monitors: MonitorRegistry<E>,
	/// Monitor type for context terms without an `@name` prefix.
	pub default_monitor: String,
}

impl<E> Clone for Hooks<E> {
	fn clone(&self) -> Self {
		Self {
			select_modules: self.select_modules.clone(),
			get_name: self.get_name.clone(),
			set_name: self.set_name.clone(),
			get_context: self.get_context.clone(),
			import: self.import.clone(),
			get_constructor: self.get_constructor.clone(),
			get_destructor: self.get_destructor.clone(),
			constructor_arguments: self.constructor_arguments.clone(),
			will_mount: self.will_mount.clone(),
			did_mount: self.did_mount.clone(),
			will_unmount: self.will_unmount.clone(),
			did_unmount: self.did_unmount.clone(),
			mount_error: self.mount_error.clone(),
			will_destroy: self.will_destroy.clone(),
			did_destroy: self.did_destroy.clone(),
			spawn: self.spawn.clone(),
			pending: self.pending.clone(),
			monitors: self.monitors.clone(),
			default_monitor: self.default_monitor.clone(),
		}
	}
}

impl<E> fmt::Debug for Hooks<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Hooks")
			.field("monitors", &self.monitors)
			.field("default_monitor", &self.default_monitor)
			.finish_non_exhaustive()
	}
}

impl<E: HostElement> Hooks<E> {
	/// Builds the default hooks over a shared registry and catalog.
	pub fn defaults(
		settings: &MountSettings,
		registry: Rc<RefCell<ModuleRegistry>>,
		catalog: Rc<RefCell<ModuleCatalog<E>>>,
	) -> Self {
		let module_attribute = settings.module_attribute.clone();
		let select_attribute = module_attribute.clone();
		let context_attribute = settings.context_attribute.clone();
		let options_attribute = settings.options_attribute.clone();
		let redirects = registry.clone();

		let noop: LifecycleHook<E> = Rc::new(|_: &BoundModule<E>| {});
		let pending = PendingImports::new();

		Self {
			select_modules: Rc::new(move |root: &E| {
				let mut selected = Vec::new();
				if root.has_attribute(&select_attribute) {
					selected.push(root.clone());
				}
				selected.extend(root.elements_with_attribute(&select_attribute));
				selected
			}),
			get_name: Rc::new(move |element: &E| element.attribute(&module_attribute)),
			set_name: Rc::new(move |alias: &str| redirects.borrow().resolve_redirect(alias)),
			get_context: Rc::new(move |element: &E| element.attribute(&context_attribute)),
			import: Rc::new(move |name: &str| catalog.borrow().import(name)),
			get_constructor: Rc::new(|module: &Module<E>| module.default_constructor()),
			get_destructor: Rc::new(|instance: &mut Instance| instance.take_destructor()),
			constructor_arguments: Rc::new(move |bound: &BoundModule<E>| {
				default_constructor_arguments(&registry.borrow(), &options_attribute, bound)
			}),
			will_mount: noop.clone(),
			did_mount: noop.clone(),
			will_unmount: noop.clone(),
			did_unmount: noop.clone(),
			mount_error: Rc::new(|_: &BoundModule<E>, _: &MountError| {}),
			will_destroy: noop.clone(),
			did_destroy: noop,
			spawn: default_spawner(&pending),
			pending,
			monitors: MonitorRegistry::new(),
			default_monitor: settings.default_monitor.clone(),
		}
	}

	/// Applies a plugin's overrides.
	pub fn apply(&mut self, plugin: Plugin<E>) {
		let Plugin {
			select_modules,
			get_name,
			set_name,
			get_context,
			import,
			get_constructor,
			get_destructor,
			constructor_arguments,
			will_mount,
			did_mount,
			will_unmount,
			did_unmount,
			mount_error,
			will_destroy,
			did_destroy,
			spawn,
			monitors,
		} = plugin;

		if let Some(hook) = select_modules {
			self.select_modules = hook;
		}
		if let Some(hook) = get_name {
			self.get_name = hook;
		}
		if let Some(hook) = set_name {
			self.set_name = hook;
		}
		if let Some(hook) = get_context {
			self.get_context = hook;
		}
		if let Some(hook) = import {
			self.import = hook;
		}
		if let Some(hook) = get_constructor {
			self.get_constructor = hook;
		}
		if let Some(hook) = get_destructor {
			self.get_destructor = hook;
		}
		if let Some(hook) = constructor_arguments {
			self.constructor_arguments = hook;
		}
		if let Some(hook) = will_mount {
			self.will_mount = hook;
		}
		if let Some(hook) = did_mount {
			self.did_mount = hook;
		}
		if let Some(hook) = will_unmount {
			self.will_unmount = hook;
		}
		if let Some(hook) = did_unmount {
			self.did_unmount = hook;
		}
		if let Some(hook) = mount_error {
			self.mount_error = hook;
		}
		if let Some(hook) = will_destroy {
			self.will_destroy = hook;
		}
		if let Some(hook) = did_destroy {
			self.did_destroy = hook;
		}
		if let Some(hook) = spawn {
			self.spawn = hook;
		}
		self.monitors.extend(&monitors);
	}
}

fn default_constructor_arguments<E: HostElement>(
	registry: &ModuleRegistry,
	options_attribute: &str,
	bound: &BoundModule<E>,
) -> MountResult<Value> {
	let registered = registry
		.lookup(bound.name())
		.ok()
		.flatten()
		.map(|spec| spec.options.clone())
		.unwrap_or(Value::Null);

	match bound.element().attribute(options_attribute) {
		Some(raw) => {
			let overrides: Value =
				serde_json::from_str(&raw).map_err(|e| MountError::InvalidOptions {
					module: bound.name().to_string(),
					message: e.to_string(),
				})?;
			Ok(merge_options(registered, overrides))
		}
		None => Ok(registered),
	}
}

/// Shallow-merges `overrides` into `base` when both are objects; otherwise
/// `overrides` wins.
pub fn merge_options(base: Value, overrides: Value) -> Value {
	match (base, overrides) {
		(Value::Object(mut base), Value::Object(overrides)) => {
			base.extend(overrides);
			Value::Object(base)
		}
		(base, Value::Null) => base,
		(_, overrides) => overrides,
	}
}

/// Queue of imports that were still pending when first polled.
///
/// Clones share the queue.
#[derive(Clone)]
pub struct PendingImports {
	pool: Rc<RefCell<LocalPool>>,
	spawner: LocalSpawner,
}

impl Default for PendingImports {
	fn default() -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self {
			pool: Rc::new(RefCell::new(pool)),
			spawner,
		}
	}
}

impl fmt::Debug for PendingImports {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingImports").finish_non_exhaustive()
	}
}

impl PendingImports {
	/// Creates an empty queue.
	pub fn new() -> Self {
		Self::default()
	}

	/// Polls `task` once and queues it if it is not finished.
	pub fn run_or_queue(&self, task: LocalBoxFuture<'static, ()>) {
		let mut task = task;
		if (&mut task).now_or_never().is_some() {
			return;
		}
		tracing::debug!("import pending, queued");
		if let Err(err) = self.spawner.spawn_local(task) {
			tracing::warn!(error = %err, "failed to queue pending import");
		}
	}

	/// Polls queued imports until none can make progress.
	///
	/// Calls made while the queue is already being driven return at once.
	/// Must not be called from inside another executor.
	pub fn run_until_stalled(&self) {
		match self.pool.try_borrow_mut() {
			Ok(mut pool) => pool.run_until_stalled(),
			Err(_) => tracing::debug!("pending imports already being driven"),
		}
	}
}

#[cfg(target_arch = "wasm32")]
fn default_spawner(_pending: &PendingImports) -> Spawner {
	Rc::new(|future: LocalBoxFuture<'static, ()>| {
		wasm_bindgen_futures::spawn_local(future)
	})
}

#[cfg(not(target_arch = "wasm32"))]
fn default_spawner(pending: &PendingImports) -> Spawner {
	let pending = pending.clone();
	Rc::new(move |future: LocalBoxFuture<'static, ()>| pending.run_or_queue(future))
}

/// A partial set of hook overrides.
///
/// ```ignore
/// let plugin = Plugin::new()
///     .did_mount(|bound: &BoundModule<WebElement>| {
///         tracing::info!(module = bound.name(), "mounted");
///     })
///     .monitor("online", |_el, _query| Ok(Box::new(online_toggle.clone())));
/// conditioner.add_plugin(plugin);
/// ```
pub struct Plugin<E> {
	select_modules: Option<SelectFn<E>>,
	get_name: Option<AccessorFn<E>>,
	set_name: Option<NameFn>,
	get_context: Option<AccessorFn<E>>,
	import: Option<ImportFn<E>>,
	get_constructor: Option<ConstructorFn<E>>,
	get_destructor: Option<DestructorFn>,
	constructor_arguments: Option<ArgumentsFn<E>>,
	will_mount: Option<LifecycleHook<E>>,
	did_mount: Option<LifecycleHook<E>>,
	will_unmount: Option<LifecycleHook<E>>,
	did_unmount: Option<LifecycleHook<E>>,
	mount_error: Option<MountErrorHook<E>>,
	will_destroy: Option<LifecycleHook<E>>,
	did_destroy: Option<LifecycleHook<E>>,
	spawn: Option<Spawner>,
	monitors: MonitorRegistry<E>,
}

impl<E> Default for Plugin<E> {
	fn default() -> Self {
		Self {
			select_modules: None,
			get_name: None,
			set_name: None,
			get_context: None,
			import: None,
			get_constructor: None,
			get_destructor: None,
			constructor_arguments: None,
			will_mount: None,
			did_mount: None,
			will_unmount: None,
			did_unmount: None,
			mount_error: None,
			will_destroy: None,
			did_destroy: None,
			spawn: None,
			monitors: MonitorRegistry::new(),
		}
	}
}

impl<E> fmt::Debug for Plugin<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Plugin")
			.field("monitors", &self.monitors)
			.finish_non_exhaustive()
	}
}

impl<E: HostElement> Plugin<E> {
	/// Creates a plugin that overrides nothing.
	pub fn new() -> Self {
		Self::default()
	}

	/// Overrides element selection.
	pub fn select_modules(mut self, f: impl Fn(&E) -> Vec<E> + 'static) -> Self {
		self.select_modules = Some(Rc::new(f));
		self
	}

	/// Overrides how the module alias is read.
	pub fn get_name(mut self, f: impl Fn(&E) -> Option<String> + 'static) -> Self {
		self.get_name = Some(Rc::new(f));
		self
	}

	/// Overrides how an alias becomes the imported name.
	pub fn set_name(mut self, f: impl Fn(&str) -> String + 'static) -> Self {
		self.set_name = Some(Rc::new(f));
		self
	}

	/// Overrides how the context expression is read.
	pub fn get_context(mut self, f: impl Fn(&E) -> Option<String> + 'static) -> Self {
		self.get_context = Some(Rc::new(f));
		self
	}

	/// Overrides module import.
	pub fn import(
		mut self,
		f: impl Fn(&str) -> LocalBoxFuture<'static, MountResult<Module<E>>> + 'static,
	) -> Self {
		self.import = Some(Rc::new(f));
		self
	}

	/// Overrides constructor extraction.
	pub fn get_constructor(
		mut self,
		f: impl Fn(&Module<E>) -> Option<Constructor<E>> + 'static,
	) -> Self {
		self.get_constructor = Some(Rc::new(f));
		self
	}

	/// Overrides destructor extraction.
	pub fn get_destructor(mut self, f: impl Fn(&mut Instance) -> Option<Destructor> + 'static) -> Self {
		self.get_destructor = Some(Rc::new(f));
		self
	}

	/// Overrides constructor arguments.
	pub fn constructor_arguments(
		mut self,
		f: impl Fn(&BoundModule<E>) -> MountResult<Value> + 'static,
	) -> Self {
		self.constructor_arguments = Some(Rc::new(f));
		self
	}

	/// Sets the will-mount notification.
	pub fn will_mount(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.will_mount = Some(Rc::new(f));
		self
	}

	/// Sets the did-mount notification.
	pub fn did_mount(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.did_mount = Some(Rc::new(f));
		self
	}

	/// Sets the will-unmount notification.
	pub fn will_unmount(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.will_unmount = Some(Rc::new(f));
		self
	}

	/// Sets the did-unmount notification.
	pub fn did_unmount(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.did_unmount = Some(Rc::new(f));
		self
	}

	/// Sets the mount-error notification.
	pub fn mount_error(mut self, f: impl Fn(&BoundModule<E>, &MountError) + 'static) -> Self {
		self.mount_error = Some(Rc::new(f));
		self
	}

	/// Sets the will-destroy notification.
	pub fn will_destroy(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.will_destroy = Some(Rc::new(f));
		self
	}

	/// Sets the did-destroy notification.
	pub fn did_destroy(mut self, f: impl Fn(&BoundModule<E>) + 'static) -> Self {
		self.did_destroy = Some(Rc::new(f));
		self
	}

	/// Overrides the executor used for pending imports.
	pub fn spawn(mut self, f: impl Fn(LocalBoxFuture<'static, ()>) + 'static) -> Self {
		self.spawn = Some(Rc::new(f));
		self
	}

	/// Adds a monitor factory.
	pub fn monitor<F>(mut self, name: impl Into<String>, factory: F) -> Self
	where
		F: Fn(&E, &str) -> Result<Box<dyn crate::monitor::Monitor>, crate::error::ConfigurationError>
			+ 'static,
	{
		self.monitors.register(name, factory);
		self
	}

	/// Adds every factory of `monitors`.
	pub fn monitors(mut self, monitors: MonitorRegistry<E>) -> Self {
		self.monitors.extend(&monitors);
		self
	}
}
