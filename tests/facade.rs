//! Facade re-export tests.

use facet::prelude::*;
use rstest::rstest;
use serde_json::Value;

#[rstest]
fn test_prelude_hydrates_through_facade() {
	let env = HeadlessEnvironment::new(ViewportState::from_em(30.0, 40.0));
	let mut conditioner = Conditioner::new(MountSettings::default());
	conditioner.add_plugin(env.plugin());
	conditioner.define("ui/menu", Module::new(|_: &MemoryElement, _: &Value| Ok(Instance::new())));

	let root = MemoryElement::new("main").child(
		MemoryElement::new("nav")
			.attr("data-module", "ui/menu")
			.attr("data-context", "@media (max-width: 40em)"),
	);
	let bound = conditioner.hydrate(&root);

	assert_eq!(bound.len(), 1);
	assert!(bound[0].is_mounted());
}

#[rstest]
fn test_mount_module_reexports_registry() {
	let mut registry = facet::mount::ModuleRegistry::new("/js");
	registry.register("ui/menu", Value::Null, Some("menu"));
	assert_eq!(registry.resolve_redirect("menu"), "/js/ui/menu");
}
