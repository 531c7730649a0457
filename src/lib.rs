//! # Facet
//!
//! Declarative, context-conditioned module mounting for the web.
//!
//! Markup names the module an element wants and the conditions under which
//! it should exist. Facet discovers those elements, loads the modules, and
//! mounts or unmounts them as media queries, visibility, or any custom
//! monitor change.
//!
//! ```html
//! <nav data-module="ui/menu" data-context="@media (max-width: 40em)"></nav>
//! ```
//!
//! ## Crates
//!
//! - [`mount`]: the registry, context monitors, mount lifecycle and hydrator
//!
//! ## Example
//!
//! ```rust,ignore
//! use facet::prelude::*;
//!
//! let env = HeadlessEnvironment::new(ViewportState::from_em(30.0, 40.0));
//! let mut conditioner = Conditioner::new(MountSettings::default());
//! conditioner.add_plugin(env.plugin());
//! conditioner.define("ui/menu", Module::new(|_el, _options| Ok(Instance::new())));
//! conditioner.hydrate(&root);
//! ```

pub mod mount;

/// Re-export commonly used types.
pub mod prelude {
	pub use facet_mount::prelude::*;
}
