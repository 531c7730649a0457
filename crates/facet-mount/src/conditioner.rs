//! The hydration entry point.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde_json::Value;

use crate::bound::BoundModule;
use crate::catalog::{Module, ModuleCatalog};
use crate::dom::HostElement;
use crate::error::{ConfigurationError, MountResult};
use crate::expression::ContextExpression;
use crate::hooks::{Hooks, Plugin};
use crate::monitor::ContextMonitor;
use crate::registry::ModuleRegistry;
use crate::settings::MountSettings;

/// Discovers annotated elements and binds modules to them.
///
/// ```ignore
/// let env = HeadlessEnvironment::new(ViewportState::from_em(20.0, 40.0));
/// let mut conditioner = Conditioner::new(MountSettings::default());
/// conditioner.add_plugin(env.plugin());
/// conditioner.define("ui/map", Module::new(|el, options| Ok(Instance::new())));
///
/// let bound = conditioner.hydrate(&root);
/// env.viewport().resize(ViewportState::from_em(40.0, 40.0));
/// ```
pub struct Conditioner<E: HostElement> {
	settings: MountSettings,
	registry: Rc<RefCell<ModuleRegistry>>,
	catalog: Rc<RefCell<ModuleCatalog<E>>>,
	hooks: Rc<Hooks<E>>,
	modules: Vec<BoundModule<E>>,
}

impl<E: HostElement> std::fmt::Debug for Conditioner<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Conditioner")
			.field("settings", &self.settings)
			.field("registry", &self.registry.borrow())
			.field("modules", &self.modules.len())
			.finish_non_exhaustive()
	}
}

impl<E: HostElement> Default for Conditioner<E> {
	fn default() -> Self {
		Self::new(MountSettings::default())
	}
}

impl<E: HostElement> Conditioner<E> {
	/// Creates a conditioner with the default hooks.
	pub fn new(settings: MountSettings) -> Self {
		let registry = Rc::new(RefCell::new(ModuleRegistry::new(settings.base_path.clone())));
		let catalog = Rc::new(RefCell::new(ModuleCatalog::new(settings.base_path.clone())));
		let hooks = Rc::new(Hooks::defaults(&settings, registry.clone(), catalog.clone()));
		Self {
			settings,
			registry,
			catalog,
			hooks,
			modules: Vec::new(),
		}
	}

	/// The settings this conditioner was created with.
	pub fn settings(&self) -> &MountSettings {
		&self.settings
	}

	/// The hooks currently in effect.
	pub fn hooks(&self) -> &Hooks<E> {
		&self.hooks
	}

	/// Applies a plugin. Modules bound earlier keep the hooks they were bound
	/// with.
	pub fn add_plugin(&mut self, plugin: Plugin<E>) {
		tracing::debug!(?plugin, "adding plugin");
		Rc::make_mut(&mut self.hooks).apply(plugin);
	}

	/// Registers a module path with options and an optional alias.
	pub fn register(&self, path: &str, options: Value, alias: Option<&str>) {
		self.registry.borrow_mut().register(path, options, alias);
	}

	/// Read access to the module registry.
	pub fn registry(&self) -> Ref<'_, ModuleRegistry> {
		self.registry.borrow()
	}

	/// Defines a ready module for the default importer.
	pub fn define(&self, path: &str, module: Module<E>) {
		self.catalog.borrow_mut().define(path, module);
	}

	/// Defines a module loaded on first import.
	pub fn define_lazy<F>(&self, path: &str, loader: F)
	where
		F: Fn() -> LocalBoxFuture<'static, MountResult<Module<E>>> + 'static,
	{
		self.catalog.borrow_mut().define_lazy(path, loader);
	}

	/// Binds every selected element below `root` and returns the new
	/// bindings in document order.
	///
	/// Elements without a module name are skipped, as are element and alias
	/// pairs that are already bound. Configuration errors are reported per
	/// element and never abort the pass.
	pub fn hydrate(&mut self, root: &E) -> Vec<BoundModule<E>> {
		self.modules.retain(|bound| !bound.is_destroyed());

		let hooks = self.hooks.clone();
		let mut bound = Vec::new();
		for element in (hooks.select_modules)(root) {
			let Some(alias) = (hooks.get_name)(&element)
				.map(|alias| alias.trim().to_string())
				.filter(|alias| !alias.is_empty())
			else {
				continue;
			};
			if self
				.modules
				.iter()
				.any(|existing| existing.element() == &element && existing.alias() == alias)
			{
				tracing::debug!(alias = %alias, "element already bound, skipping");
				continue;
			}

			let name = (hooks.set_name)(&alias);
			let source = (hooks.get_context)(&element).unwrap_or_default();
			let context = ContextExpression::parse_with_default(&source, &hooks.default_monitor);
			let module = BoundModule::new(alias, name, element, context, hooks.clone());
			self.modules.push(module.clone());
			module.start();
			bound.push(module);
		}

		tracing::info!(count = bound.len(), total = self.modules.len(), "hydrated");
		bound
	}

	/// Drives imports that were still pending when their mount started.
	///
	/// Only needed with the default native spawner, and only for imports
	/// that await something. Must not be called from inside another
	/// executor.
	pub fn run_until_stalled(&self) {
		self.hooks.pending.run_until_stalled();
	}

	/// Creates a standalone context monitor for `element`.
	pub fn monitor(&self, context: &str, element: &E) -> Result<ContextMonitor, ConfigurationError> {
		let expression = ContextExpression::parse_with_default(context, &self.hooks.default_monitor)?;
		ContextMonitor::new(&expression, element, &self.hooks.monitors)
	}

	/// All live bindings, in the order they were bound.
	pub fn modules(&self) -> &[BoundModule<E>] {
		&self.modules
	}

	/// Bindings whose alias equals `name`, or whose module resolves to the
	/// same absolute path as `name`.
	pub fn find(&self, name: &str) -> Vec<BoundModule<E>> {
		let registry = self.registry.borrow();
		let resolved = registry.to_absolute(&registry.resolve_redirect(name));
		self.modules
			.iter()
			.filter(|bound| bound.alias() == name || registry.to_absolute(bound.name()) == resolved)
			.cloned()
			.collect()
	}

	/// Destroys every binding and forgets them.
	pub fn destroy_all(&mut self) {
		let modules = std::mem::take(&mut self.modules);
		tracing::info!(count = modules.len(), "destroying all modules");
		for bound in modules {
			bound.destroy();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::catalog::Instance;
	use crate::dom::MemoryElement;
	use crate::monitor::{Monitor, Toggle};
	use rstest::rstest;
	use serde_json::json;

	fn page() -> (MemoryElement, MemoryElement, MemoryElement) {
		let first = MemoryElement::new("div").attr("data-module", "ui/first");
		let second = MemoryElement::new("div")
			.attr("data-module", "ui/second")
			.attr("data-context", "@flag on");
		let root = MemoryElement::new("main")
			.child(first.clone())
			.child(MemoryElement::new("p").attr("data-module", "  "))
			.child(second.clone());
		(root, first, second)
	}

	fn noop_module() -> Module<MemoryElement> {
		Module::new(|_: &MemoryElement, _: &Value| Ok(Instance::new()))
	}

	fn conditioner(flag: &Toggle) -> Conditioner<MemoryElement> {
		let mut conditioner = Conditioner::default();
		let flag = flag.clone();
		conditioner.add_plugin(Plugin::new().monitor("flag", move |_: &MemoryElement, _: &str| {
			Ok(Box::new(flag.clone()) as Box<dyn Monitor>)
		}));
		conditioner.define("ui/first", noop_module());
		conditioner.define("ui/second", noop_module());
		conditioner
	}

	#[rstest]
	fn test_hydrate_binds_named_elements_in_order() {
		let flag = Toggle::new(false);
		let mut conditioner = conditioner(&flag);
		let (root, first, second) = page();

		let bound = conditioner.hydrate(&root);

		assert_eq!(bound.len(), 2);
		assert_eq!(bound[0].element(), &first);
		assert_eq!(bound[1].element(), &second);
		assert!(bound[0].is_mounted());
		assert!(!bound[1].is_mounted());

		flag.set(true);
		assert!(bound[1].is_mounted());
	}

	#[rstest]
	fn test_hydrate_twice_skips_bound_elements() {
		let flag = Toggle::new(false);
		let mut conditioner = conditioner(&flag);
		let (root, _, _) = page();

		assert_eq!(conditioner.hydrate(&root).len(), 2);
		assert!(conditioner.hydrate(&root).is_empty());
		assert_eq!(conditioner.modules().len(), 2);
	}

	#[rstest]
	fn test_find_by_alias_and_redirect() {
		let flag = Toggle::new(false);
		let mut conditioner = conditioner(&flag);
		conditioner.register("ui/first", json!({}), Some("first"));
		let element = MemoryElement::new("div").attr("data-module", "first");
		let root = MemoryElement::new("main").child(element);

		let bound = conditioner.hydrate(&root);
		assert_eq!(bound[0].name(), "/ui/first");
		assert_eq!(conditioner.find("first"), bound);
		assert_eq!(conditioner.find("ui/first"), bound);
		assert!(conditioner.find("ui/second").is_empty());
	}

	#[rstest]
	fn test_monitor_outside_hydration() {
		let flag = Toggle::new(true);
		let conditioner = conditioner(&flag);
		let element = MemoryElement::new("div");

		let monitor = conditioner.monitor("@flag on", &element).unwrap();
		assert!(monitor.matches());
		assert!(matches!(
			conditioner.monitor("@other x", &element),
			Err(ConfigurationError::UnknownMonitor(name)) if name == "other"
		));
	}

	#[rstest]
	fn test_destroy_all() {
		let flag = Toggle::new(true);
		let mut conditioner = conditioner(&flag);
		let (root, _, _) = page();
		let bound = conditioner.hydrate(&root);

		conditioner.destroy_all();

		assert!(conditioner.modules().is_empty());
		assert!(bound.iter().all(BoundModule::is_destroyed));
		assert_eq!(conditioner.hydrate(&root).len(), 2);
	}
}
