//! Mount settings.
//!
//! Settings name the element attributes the default hooks read and the
//! defaults used when resolving context expressions and module paths. They can
//! be built in code, loaded from a TOML file shipped with the application, or
//! read from JSON embedded in the page.
//!
//! ```toml
//! module_attribute = "data-module"
//! context_attribute = "data-context"
//! base_path = "/static/js"
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Default attribute naming the module to bind.
pub const DEFAULT_MODULE_ATTRIBUTE: &str = "data-module";
/// Default attribute holding the context expression.
pub const DEFAULT_CONTEXT_ATTRIBUTE: &str = "data-context";
/// Default attribute holding per-element JSON options.
pub const DEFAULT_OPTIONS_ATTRIBUTE: &str = "data-options";
/// Monitor type used for terms without an `@name` prefix.
pub const DEFAULT_MONITOR: &str = "media";

/// Settings consumed by [`Conditioner`](crate::Conditioner) and its default hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountSettings {
	/// Attribute naming the module bound to an element.
	pub module_attribute: String,
	/// Attribute holding the element's context expression.
	pub context_attribute: String,
	/// Attribute holding JSON options merged over registered module options.
	pub options_attribute: String,
	/// Monitor type for terms that do not start with `@`.
	pub default_monitor: String,
	/// Base against which relative module paths are made absolute.
	pub base_path: String,
}

impl Default for MountSettings {
	fn default() -> Self {
		Self {
			module_attribute: DEFAULT_MODULE_ATTRIBUTE.to_string(),
			context_attribute: DEFAULT_CONTEXT_ATTRIBUTE.to_string(),
			options_attribute: DEFAULT_OPTIONS_ATTRIBUTE.to_string(),
			default_monitor: DEFAULT_MONITOR.to_string(),
			base_path: "/".to_string(),
		}
	}
}

impl MountSettings {
	/// Parses settings from a TOML document. Missing keys keep their defaults.
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(source)?;
		settings.validated()
	}

	/// Parses settings from a JSON object. Missing keys keep their defaults.
	pub fn from_json_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Self = serde_json::from_str(source)?;
		settings.validated()
	}

	/// Sets the module attribute.
	pub fn with_module_attribute(mut self, name: impl Into<String>) -> Self {
		self.module_attribute = name.into();
		self
	}

	/// Sets the context attribute.
	pub fn with_context_attribute(mut self, name: impl Into<String>) -> Self {
		self.context_attribute = name.into();
		self
	}

	/// Sets the base path.
	pub fn with_base_path(mut self, base: impl Into<String>) -> Self {
		self.base_path = base.into();
		self
	}

	fn validated(self) -> Result<Self, SettingsError> {
		for (key, value) in [
			("module_attribute", &self.module_attribute),
			("context_attribute", &self.context_attribute),
			("options_attribute", &self.options_attribute),
			("default_monitor", &self.default_monitor),
		] {
			if value.trim().is_empty() {
				return Err(SettingsError::Invalid {
					key,
					reason: "must not be empty".to_string(),
				});
			}
		}
		if self.default_monitor.contains(char::is_whitespace) {
			return Err(SettingsError::Invalid {
				key: "default_monitor",
				reason: format!("'{}' contains whitespace", self.default_monitor),
			});
		}
		Ok(self)
	}
}
