//! Error types for module mounting.
//!
//! Failures are scoped as narrowly as possible: a [`RegistryError`] only fails
//! the lookup that raised it, a [`ConfigurationError`] only fails the element
//! whose context expression named an unusable monitor, and a [`MountError`] is
//! reported through the mount-error hook of the bound module it belongs to.

use thiserror::Error;

/// Result type for mount operations.
pub type MountResult<T> = Result<T, MountError>;

/// Errors raised by the module registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RegistryError {
	/// A required lookup key was empty.
	#[error("invalid argument: {0}")]
	InvalidArgument(&'static str),
}

/// Errors raised while turning a context expression into live monitors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
	/// No monitor factory is registered under this name.
	#[error("unknown monitor type: {0}")]
	UnknownMonitor(String),

	/// A term could not be split into monitor type and query.
	#[error("malformed context term '{term}': {reason}")]
	MalformedTerm {
		/// The offending term text.
		term: String,
		/// What was wrong with it.
		reason: String,
	},

	/// The monitor understood its name but not its query.
	#[error("monitor '{monitor}' cannot evaluate query '{query}': {reason}")]
	InvalidQuery {
		/// Monitor type name.
		monitor: String,
		/// Query string handed to the monitor.
		query: String,
		/// Why the query was rejected.
		reason: String,
	},
}

/// Errors raised while mounting a bound module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MountError {
	/// The element's context expression could not be monitored.
	#[error("configuration error: {0}")]
	Configuration(#[from] ConfigurationError),

	/// The module could not be imported.
	#[error("failed to import module '{module}': {message}")]
	Import {
		/// Resolved module name.
		module: String,
		/// Loader message.
		message: String,
	},

	/// The module constructor failed.
	#[error("failed to construct module '{module}': {message}")]
	Construction {
		/// Resolved module name.
		module: String,
		/// Constructor message.
		message: String,
	},

	/// The imported module exposes nothing to construct.
	#[error("module '{0}' has no constructor")]
	MissingConstructor(String),

	/// The element's options attribute is not valid JSON.
	#[error("invalid options for module '{module}': {message}")]
	InvalidOptions {
		/// Resolved module name.
		module: String,
		/// Parser message.
		message: String,
	},
}

impl MountError {
	/// Creates an import error.
	pub fn import(module: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Import {
			module: module.into(),
			message: message.into(),
		}
	}

	/// Creates a construction error.
	pub fn construction(module: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Construction {
			module: module.into(),
			message: message.into(),
		}
	}
}

/// Errors raised while loading [`MountSettings`](crate::settings::MountSettings).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SettingsError {
	/// TOML parsing error.
	#[error("TOML parse error: {0}")]
	TomlParse(String),

	/// JSON parsing error.
	#[error("JSON parse error: {0}")]
	JsonParse(#[from] serde_json::Error),

	/// A setting has an unusable value.
	#[error("invalid setting '{key}': {reason}")]
	Invalid {
		/// Setting name.
		key: &'static str,
		/// Why it was rejected.
		reason: String,
	},
}

impl From<toml::de::Error> for SettingsError {
	fn from(err: toml::de::Error) -> Self {
		Self::TomlParse(err.to_string())
	}
}
