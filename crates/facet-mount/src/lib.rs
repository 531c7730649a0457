//! Facet Mount - declarative module mounting
//!
//! Elements carry a module name and, optionally, a context expression:
//!
//! ```html
//! <div data-module="ui/map" data-context="@media (min-width: 40em) and @visible"></div>
//! ```
//!
//! [`Conditioner::hydrate`] discovers such elements, binds one
//! [`BoundModule`] to each, and keeps it mounted exactly while every term of
//! its context holds.
//!
//! # Architecture
//!
//! ```text
//! Conditioner ──hydrate──▶ BoundModule ◀──on_change── ContextMonitor
//!     │                         │                          │
//!     │ Hooks / Plugin          │ import + construct       │ AND of
//!     ▼                         ▼                          ▼
//! ModuleRegistry          ModuleCatalog             Monitor (media, visible, ...)
//! ```
//!
//! # Environments
//!
//! - On `wasm32`, [`web`] adapts `web_sys::Element` and installs `matchMedia`
//!   and `IntersectionObserver` backed monitors.
//! - Elsewhere, [`headless::HeadlessEnvironment`] provides a scriptable
//!   viewport and visibility map over [`dom::MemoryElement`] trees.
//!
//! # Quick Start
//!
//! ```ignore
//! use facet_mount::prelude::*;
//!
//! let env = HeadlessEnvironment::new(ViewportState::from_em(20.0, 40.0));
//! let mut conditioner = Conditioner::new(MountSettings::default());
//! conditioner.add_plugin(env.plugin());
//! conditioner.define("ui/map", Module::new(|_el, _options| Ok(Instance::new())));
//!
//! let root = MemoryElement::new("main").child(
//!     MemoryElement::new("div")
//!         .attr("data-module", "ui/map")
//!         .attr("data-context", "@media (min-width: 30em)"),
//! );
//! let bound = conditioner.hydrate(&root);
//! assert!(!bound[0].is_mounted());
//!
//! env.viewport().resize(ViewportState::from_em(40.0, 40.0));
//! assert!(bound[0].is_mounted());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bound;
pub mod catalog;
pub mod conditioner;
pub mod dom;
pub mod error;
pub mod expression;
pub mod headless;
pub mod hooks;
pub mod media;
pub mod monitor;
pub mod registry;
pub mod settings;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use bound::{BoundModule, LifecycleState};
pub use catalog::{Constructor, Destructor, Instance, Module, ModuleCatalog};
pub use conditioner::Conditioner;
pub use dom::{HostElement, MemoryElement};
pub use error::{ConfigurationError, MountError, MountResult, RegistryError, SettingsError};
pub use expression::{Condition, ContextExpression};
pub use hooks::{Hooks, PendingImports, Plugin};
pub use monitor::{ContextMonitor, Monitor, MonitorRegistry, Subscription, Toggle};
pub use registry::{LoaderConfig, ModuleRegistry, ModuleSpec};
pub use settings::MountSettings;

/// Re-export commonly used types.
pub mod prelude {
	pub use crate::bound::{BoundModule, LifecycleState};
	pub use crate::catalog::{Instance, Module};
	pub use crate::conditioner::Conditioner;
	pub use crate::dom::{HostElement, MemoryElement};
	pub use crate::error::{ConfigurationError, MountError, MountResult};
	pub use crate::expression::ContextExpression;
	pub use crate::headless::{HeadlessEnvironment, Viewport, VisibilityMap};
	pub use crate::hooks::Plugin;
	pub use crate::media::ViewportState;
	pub use crate::monitor::{Monitor, Toggle};
	pub use crate::settings::MountSettings;

	#[cfg(target_arch = "wasm32")]
	pub use crate::web::WebElement;
}
