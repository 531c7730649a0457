//! The per-element mount lifecycle.
//!
//! A [`BoundModule`] ties one element to one module and a live context
//! monitor. It converges towards the latest desired state: the context
//! monitor (or an explicit [`BoundModule::mount`] / [`BoundModule::unmount`])
//! only records what is wanted, and every completed step checks whether the
//! wish changed in the meantime.
//!
//! ```text
//!              mount()                import ok + constructed
//!  Unmounted ───────────▶ Mounting ─────────────────────────▶ Mounted
//!      ▲                     │                                  │
//!      │   import / ctor err │                                  │ unmount()
//!      ├─────────────────────┘                                  │
//!      └────────────────────────────────────────────────────────┘
//!
//!  any state ── destroy() ──▶ Destroyed
//! ```
//!
//! Hooks and callbacks are always invoked without any internal borrow held,
//! so they may call back into the bound module.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use futures::FutureExt;

use crate::catalog::{Destructor, Instance, Module};
use crate::dom::HostElement;
use crate::error::{ConfigurationError, MountError, MountResult};
use crate::expression::ContextExpression;
use crate::hooks::{Hooks, LifecycleHook, MountErrorHook};
use crate::monitor::ContextMonitor;

/// Lifecycle state of a bound module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
	/// No instance exists.
	Unmounted,
	/// The module is being imported.
	Mounting,
	/// An instance is constructed and attached.
	Mounted,
	/// Terminal; the context monitor is disposed.
	Destroyed,
}

struct Callbacks<E> {
	on_mount: Option<LifecycleHook<E>>,
	on_unmount: Option<LifecycleHook<E>>,
	on_mount_error: Option<MountErrorHook<E>>,
	on_destroy: Option<LifecycleHook<E>>,
}

struct Mounted {
	instance: Instance,
	destructor: Option<Destructor>,
}

struct Inner<E> {
	alias: String,
	name: String,
	element: E,
	context: Result<ContextExpression, ConfigurationError>,
	hooks: Rc<Hooks<E>>,
	state: Cell<LifecycleState>,
	desired: Cell<bool>,
	attempt: Cell<u64>,
	mounted: RefCell<Option<Mounted>>,
	monitor: RefCell<Option<ContextMonitor>>,
	callbacks: RefCell<Callbacks<E>>,
}

/// A module bound to an element.
///
/// Cloning yields another handle to the same binding.
pub struct BoundModule<E> {
	inner: Rc<Inner<E>>,
}

impl<E> Clone for BoundModule<E> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<E> PartialEq for BoundModule<E> {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

impl<E> Eq for BoundModule<E> {}

impl<E: fmt::Debug> fmt::Debug for BoundModule<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BoundModule")
			.field("alias", &self.inner.alias)
			.field("name", &self.inner.name)
			.field("element", &self.inner.element)
			.field("state", &self.inner.state.get())
			.finish()
	}
}

impl<E: HostElement> BoundModule<E> {
	/// Creates an unmounted binding. Nothing is monitored until
	/// [`BoundModule::start`] runs.
	pub fn new(
		alias: impl Into<String>,
		name: impl Into<String>,
		element: E,
		context: Result<ContextExpression, ConfigurationError>,
		hooks: Rc<Hooks<E>>,
	) -> Self {
		Self {
			inner: Rc::new(Inner {
				alias: alias.into(),
				name: name.into(),
				element,
				context,
				hooks,
				state: Cell::new(LifecycleState::Unmounted),
				desired: Cell::new(false),
				attempt: Cell::new(0),
				mounted: RefCell::new(None),
				monitor: RefCell::new(None),
				callbacks: RefCell::new(Callbacks {
					on_mount: None,
					on_unmount: None,
					on_mount_error: None,
					on_destroy: None,
				}),
			}),
		}
	}

	/// The alias read from the element.
	pub fn alias(&self) -> &str {
		&self.inner.alias
	}

	/// The resolved module name that is imported.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// The element this module is bound to.
	pub fn element(&self) -> &E {
		&self.inner.element
	}

	/// The parsed context expression, if it parsed.
	pub fn context(&self) -> Option<&ContextExpression> {
		self.inner.context.as_ref().ok()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> LifecycleState {
		self.inner.state.get()
	}

	/// Whether an instance is currently constructed.
	pub fn is_mounted(&self) -> bool {
		self.state() == LifecycleState::Mounted
	}

	/// Whether the binding has been destroyed.
	pub fn is_destroyed(&self) -> bool {
		self.state() == LifecycleState::Destroyed
	}

	/// Whether the binding currently wants to be mounted.
	pub fn wants_mount(&self) -> bool {
		self.inner.desired.get()
	}

	/// Current value of the context monitor; `false` when not monitoring.
	pub fn matches(&self) -> bool {
		self.inner
			.monitor
			.borrow()
			.as_ref()
			.is_some_and(ContextMonitor::matches)
	}

	/// Runs `f` against the constructed instance, if any.
	pub fn with_instance<R>(&self, f: impl FnOnce(&Instance) -> R) -> Option<R> {
		self.inner
			.mounted
			.borrow()
			.as_ref()
			.map(|mounted| f(&mounted.instance))
	}

	/// Sets the callback run after this module mounts.
	pub fn on_mount(&self, f: impl Fn(&BoundModule<E>) + 'static) {
		self.inner.callbacks.borrow_mut().on_mount = Some(Rc::new(f));
	}

	/// Sets the callback run after this module unmounts.
	pub fn on_unmount(&self, f: impl Fn(&BoundModule<E>) + 'static) {
		self.inner.callbacks.borrow_mut().on_unmount = Some(Rc::new(f));
	}

	/// Sets the callback run when mounting this module fails.
	pub fn on_mount_error(&self, f: impl Fn(&BoundModule<E>, &MountError) + 'static) {
		self.inner.callbacks.borrow_mut().on_mount_error = Some(Rc::new(f));
	}

	/// Sets the callback run after this module is destroyed.
	pub fn on_destroy(&self, f: impl Fn(&BoundModule<E>) + 'static) {
		self.inner.callbacks.borrow_mut().on_destroy = Some(Rc::new(f));
	}

	/// Creates the context monitor and performs the first evaluation.
	///
	/// A context that failed to parse, or that names an unknown monitor, is
	/// reported through the mount-error hook and leaves the module unmounted
	/// for good.
	pub fn start(&self) {
		if self.is_destroyed() || self.inner.monitor.borrow().is_some() {
			return;
		}

		let created = match &self.inner.context {
			Ok(expression) => ContextMonitor::new(expression, &self.inner.element, &self.inner.hooks.monitors),
			Err(err) => Err(err.clone()),
		};
		let mut monitor = match created {
			Ok(monitor) => monitor,
			Err(err) => {
				tracing::warn!(module = %self.inner.name, error = %err, "context cannot be monitored");
				self.report_error(&MountError::Configuration(err));
				return;
			}
		};

		let weak: Weak<Inner<E>> = Rc::downgrade(&self.inner);
		monitor.on_change(move |matches| {
			if let Some(inner) = weak.upgrade() {
				let bound = BoundModule { inner };
				if matches {
					bound.mount();
				} else {
					bound.unmount();
				}
			}
		});
		let matches = monitor.matches();
		*self.inner.monitor.borrow_mut() = Some(monitor);

		tracing::debug!(module = %self.inner.name, matches, "context monitor started");
		if matches {
			self.mount();
		}
	}

	/// Requests the module be mounted.
	///
	/// Starts an import when unmounted; a no-op while mounting, mounted or
	/// destroyed.
	pub fn mount(&self) {
		let inner = &self.inner;
		match inner.state.get() {
			LifecycleState::Destroyed => return,
			LifecycleState::Mounting | LifecycleState::Mounted => {
				inner.desired.set(true);
				return;
			}
			LifecycleState::Unmounted => {}
		}

		inner.desired.set(true);
		inner.state.set(LifecycleState::Mounting);
		let attempt = inner.attempt.get() + 1;
		inner.attempt.set(attempt);
		tracing::debug!(module = %inner.name, attempt, "mounting");

		(inner.hooks.will_mount)(self);
		if inner.state.get() != LifecycleState::Mounting || inner.attempt.get() != attempt {
			return;
		}

		let import = (inner.hooks.import)(&inner.name);
		let this = self.clone();
		let task = async move {
			let result = import.await;
			this.complete_mount(attempt, result);
		};
		(inner.hooks.spawn)(task.boxed_local());
	}

	/// Requests the module be unmounted.
	///
	/// While an import is pending the request is remembered and applied once
	/// the instance exists. A no-op when already unmounted or destroyed.
	pub fn unmount(&self) {
		if self.is_destroyed() {
			return;
		}
		self.inner.desired.set(false);
		if self.is_mounted() {
			self.teardown();
		}
	}

	/// Unmounts, disposes the context monitor and enters the terminal state.
	pub fn destroy(&self) {
		let inner = &self.inner;
		if inner.state.get() == LifecycleState::Destroyed {
			return;
		}

		(inner.hooks.will_destroy)(self);
		inner.desired.set(false);
		if inner.state.get() == LifecycleState::Mounted {
			self.teardown();
		}

		let monitor = inner.monitor.borrow_mut().take();
		drop(monitor);
		inner.state.set(LifecycleState::Destroyed);
		tracing::debug!(module = %inner.name, "destroyed");

		(inner.hooks.did_destroy)(self);
		let callback = inner.callbacks.borrow().on_destroy.clone();
		if let Some(callback) = callback {
			callback(self);
		}
	}

	fn complete_mount(&self, attempt: u64, result: MountResult<Module<E>>) {
		let inner = &self.inner;
		if inner.state.get() != LifecycleState::Mounting || inner.attempt.get() != attempt {
			tracing::warn!(module = %inner.name, "import completed for an abandoned mount, discarding");
			return;
		}

		let mut instance = match self.construct(result) {
			Ok(instance) => instance,
			Err(err) => {
				inner.state.set(LifecycleState::Unmounted);
				tracing::warn!(module = %inner.name, error = %err, "mount failed");
				self.report_error(&err);
				return;
			}
		};

		let destructor = (inner.hooks.get_destructor)(&mut instance);
		*inner.mounted.borrow_mut() = Some(Mounted {
			instance,
			destructor,
		});
		inner.state.set(LifecycleState::Mounted);
		tracing::debug!(module = %inner.name, alias = %inner.alias, "mounted");

		(inner.hooks.did_mount)(self);
		let callback = inner.callbacks.borrow().on_mount.clone();
		if let Some(callback) = callback {
			callback(self);
		}

		if !inner.desired.get() {
			self.teardown();
		}
	}

	fn construct(&self, result: MountResult<Module<E>>) -> MountResult<Instance> {
		let hooks = &self.inner.hooks;
		let module = result?;
		let constructor = (hooks.get_constructor)(&module)
			.ok_or_else(|| MountError::MissingConstructor(self.inner.name.clone()))?;
		let arguments = (hooks.constructor_arguments)(self)?;
		constructor(&self.inner.element, &arguments)
	}

	fn teardown(&self) {
		let inner = &self.inner;
		if inner.state.get() != LifecycleState::Mounted {
			return;
		}

		(inner.hooks.will_unmount)(self);
		if inner.state.get() != LifecycleState::Mounted {
			return;
		}

		let mounted = inner.mounted.borrow_mut().take();
		if let Some(Mounted { instance, destructor }) = mounted {
			if let Some(destructor) = destructor {
				destructor();
			}
			drop(instance);
		}
		inner.state.set(LifecycleState::Unmounted);
		tracing::debug!(module = %inner.name, alias = %inner.alias, "unmounted");

		(inner.hooks.did_unmount)(self);
		let callback = inner.callbacks.borrow().on_unmount.clone();
		if let Some(callback) = callback {
			callback(self);
		}

		if inner.desired.get() && inner.state.get() == LifecycleState::Unmounted {
			self.mount();
		}
	}

	fn report_error(&self, err: &MountError) {
		(self.inner.hooks.mount_error)(self, err);
		let callback = self.inner.callbacks.borrow().on_mount_error.clone();
		if let Some(callback) = callback {
			callback(self, err);
		}
	}
}
