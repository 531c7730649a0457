//! Module registry.
//!
//! Maps canonical module paths to the options they were registered with and
//! keeps alias redirects. Registration is expected to happen while the
//! application is being set up, before the first call to
//! [`Conditioner::hydrate`](crate::Conditioner::hydrate); the registry is not
//! synchronised against registrations made while modules are mounting.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::RegistryError;

/// Options registered for one module path.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleSpec {
	/// Canonical absolute path.
	pub path: String,
	/// Opaque configuration record.
	pub options: Value,
}

/// Receives module options as they are registered.
///
/// This is where a host forwards configuration to whatever actually loads
/// module code (a chunk loader, a script tag injector, ...).
pub trait LoaderConfig {
	/// Called once per registration with the absolute path and its options.
	fn configure(&mut self, path: &str, options: &Value);
}

/// Registry of module options and alias redirects.
pub struct ModuleRegistry {
	base_path: String,
	specs: HashMap<String, Rc<ModuleSpec>>,
	redirects: HashMap<String, String>,
	loader: Option<Box<dyn LoaderConfig>>,
}

impl std::fmt::Debug for ModuleRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModuleRegistry")
			.field("base_path", &self.base_path)
			.field("specs", &self.specs.len())
			.field("redirects", &self.redirects)
			.field("has_loader", &self.loader.is_some())
			.finish()
	}
}

impl Default for ModuleRegistry {
	fn default() -> Self {
		Self::new("/")
	}
}

impl ModuleRegistry {
	/// Creates an empty registry resolving relative paths against `base_path`.
	pub fn new(base_path: impl Into<String>) -> Self {
		Self {
			base_path: base_path.into(),
			specs: HashMap::new(),
			redirects: HashMap::new(),
			loader: None,
		}
	}

	/// Installs the collaborator that receives forwarded options.
	pub fn with_loader(mut self, loader: impl LoaderConfig + 'static) -> Self {
		self.loader = Some(Box::new(loader));
		self
	}

	/// Returns the base path.
	pub fn base_path(&self) -> &str {
		&self.base_path
	}

	/// Stores `options` under the absolute form of `path`.
	///
	/// When `alias` is given it redirects to that absolute path. Registering a
	/// path or alias again replaces the earlier entry.
	pub fn register(&mut self, path: &str, options: Value, alias: Option<&str>) {
		let absolute = self.to_absolute(path);
		tracing::debug!(path = %absolute, alias = ?alias, "registering module");

		if let Some(loader) = self.loader.as_mut() {
			loader.configure(&absolute, &options);
		}
		if let Some(alias) = alias {
			self.redirects.insert(alias.to_string(), absolute.clone());
		}
		self.specs.insert(
			absolute.clone(),
			Rc::new(ModuleSpec {
				path: absolute,
				options,
			}),
		);
	}

	/// Returns the path `name` redirects to, or `name` itself.
	pub fn resolve_redirect(&self, name: &str) -> String {
		self.redirects
			.get(name)
			.cloned()
			.unwrap_or_else(|| name.to_string())
	}

	/// Looks up the spec for `path`, trying it verbatim and then in absolute form.
	pub fn lookup(&self, path: &str) -> Result<Option<Rc<ModuleSpec>>, RegistryError> {
		if path.is_empty() {
			return Err(RegistryError::InvalidArgument("path must not be empty"));
		}
		if let Some(spec) = self.specs.get(path) {
			return Ok(Some(spec.clone()));
		}
		Ok(self.specs.get(&self.to_absolute(path)).cloned())
	}

	/// Returns the number of registered paths.
	pub fn len(&self) -> usize {
		self.specs.len()
	}

	/// Returns true if nothing has been registered.
	pub fn is_empty(&self) -> bool {
		self.specs.is_empty()
	}

	/// Resolves `path` against the base path.
	pub fn to_absolute(&self, path: &str) -> String {
		to_absolute(&self.base_path, path)
	}
}

/// Resolves `path` against `base`, normalising `.` and `..` segments.
///
/// Paths that already start with `/` or carry a URL scheme are only
/// normalised. `..` never climbs above the root.
pub fn to_absolute(base: &str, path: &str) -> String {
	if let Some(idx) = path.find("://") {
		let (scheme, rest) = path.split_at(idx + 3);
		let (host, tail) = match rest.find('/') {
			Some(slash) => rest.split_at(slash),
			None => (rest, ""),
		};
		let normalised = normalise(tail);
		return if tail.is_empty() {
			format!("{}{}", scheme, host)
		} else {
			format!("{}{}{}", scheme, host, normalised)
		};
	}
	if path.starts_with('/') {
		return normalise(path);
	}
	if base.contains("://") {
		let joined = format!("{}/{}", base.trim_end_matches('/'), path);
		return to_absolute("/", &joined);
	}
	normalise(&format!("{}/{}", base, path))
}

fn normalise(path: &str) -> String {
	let mut segments: Vec<&str> = Vec::new();
	for segment in path.split('/') {
		match segment {
			"" | "." => {}
			".." => {
				segments.pop();
			}
			other => segments.push(other),
		}
	}
	format!("/{}", segments.join("/"))
}
