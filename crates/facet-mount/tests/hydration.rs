//! End-to-end hydration tests against the headless environment.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use facet_mount::prelude::*;
use futures::FutureExt;
use futures::channel::oneshot;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

type Log = Rc<RefCell<Vec<String>>>;

struct Page {
	env: HeadlessEnvironment<MemoryElement>,
	conditioner: Conditioner<MemoryElement>,
	log: Log,
}

impl Page {
	fn entries(&self) -> Vec<String> {
		self.log.borrow().clone()
	}

	fn count(&self, entry: &str) -> usize {
		self.log.borrow().iter().filter(|e| *e == entry).count()
	}
}

fn recording(log: &Log, name: &'static str) -> Module<MemoryElement> {
	let log = log.clone();
	Module::new(move |_: &MemoryElement, _: &Value| {
		log.borrow_mut().push(format!("construct {}", name));
		let log = log.clone();
		Ok(Instance::with_destructor(move || {
			log.borrow_mut().push(format!("destruct {}", name));
		}))
	})
}

#[fixture]
fn page() -> Page {
	let env = HeadlessEnvironment::new(ViewportState::from_em(20.0, 40.0));
	let log: Log = Rc::new(RefCell::new(Vec::new()));
	let mut conditioner = Conditioner::new(MountSettings::default());
	conditioner.add_plugin(env.plugin());

	let (mounted, errors) = (log.clone(), log.clone());
	conditioner.add_plugin(
		Plugin::new()
			.did_mount(move |bound| mounted.borrow_mut().push(format!("did_mount {}", bound.alias())))
			.mount_error(move |bound, _| errors.borrow_mut().push(format!("error {}", bound.alias()))),
	);
	conditioner.define("ui/map", recording(&log, "map"));
	conditioner.define("ui/menu", recording(&log, "menu"));

	Page {
		env,
		conditioner,
		log,
	}
}

#[rstest]
fn test_mounts_once_when_viewport_grows(mut page: Page) {
	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@media (min-width: 30em)");
	let root = MemoryElement::new("main").child(element);

	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound[0].state(), LifecycleState::Unmounted);

	page.env.viewport().resize(ViewportState::from_em(40.0, 40.0));
	assert_eq!(bound[0].state(), LifecycleState::Mounted);

	page.env.viewport().resize(ViewportState::from_em(50.0, 40.0));
	assert_eq!(page.count("did_mount ui/map"), 1);

	page.env.viewport().resize(ViewportState::from_em(20.0, 40.0));
	assert_eq!(bound[0].state(), LifecycleState::Unmounted);
	assert_eq!(page.count("destruct map"), 1);
}

#[rstest]
fn test_unprefixed_context_uses_media(mut page: Page) {
	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "(max-width: 30em)");
	let root = MemoryElement::new("main").child(element);

	let bound = page.conditioner.hydrate(&root);
	assert!(bound[0].is_mounted());
}

#[rstest]
fn test_all_terms_must_hold(mut page: Page) {
	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@media (min-width: 10em) and @visible true");
	let root = MemoryElement::new("main").child(element.clone());

	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound[0].state(), LifecycleState::Unmounted);
	assert!(page.entries().is_empty());

	page.env.visibility().set_visible(&element, true);
	assert!(bound[0].is_mounted());

	page.env.viewport().resize(ViewportState::from_em(5.0, 40.0));
	assert!(!bound[0].is_mounted());
}

#[rstest]
fn test_without_context_mounts_immediately(mut page: Page) {
	let root = MemoryElement::new("main").child(MemoryElement::new("nav").attr("data-module", "ui/menu"));

	let bound = page.conditioner.hydrate(&root);
	assert!(bound[0].is_mounted());
	assert_eq!(page.entries(), vec!["construct menu", "did_mount ui/menu"]);
}

#[rstest]
fn test_unknown_monitor_does_not_affect_siblings(mut page: Page) {
	let broken = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@scroll 100");
	let fine = MemoryElement::new("nav").attr("data-module", "ui/menu");
	let root = MemoryElement::new("main").child(broken).child(fine);

	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound.len(), 2);
	assert!(!bound[0].is_mounted());
	assert!(bound[1].is_mounted());
	assert_eq!(page.count("error ui/map"), 1);
}

#[rstest]
fn test_malformed_context_is_reported(mut page: Page) {
	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@Media (min-width: 1em)");
	let root = MemoryElement::new("main").child(element);

	let bound = page.conditioner.hydrate(&root);
	assert!(bound[0].context().is_none());
	assert_eq!(page.count("error ui/map"), 1);
}

#[rstest]
fn test_alias_resolves_with_merged_options(mut page: Page) {
	let received = Rc::new(RefCell::new(Value::Null));
	let sink = received.clone();
	page.conditioner.define(
		"ui/map",
		Module::new(move |_: &MemoryElement, options: &Value| {
			*sink.borrow_mut() = options.clone();
			Ok(Instance::new())
		}),
	);
	page.conditioner
		.register("ui/map", json!({"zoom": 3, "lat": 0}), Some("map"));

	let element = MemoryElement::new("div")
		.attr("data-module", "map")
		.attr("data-options", r#"{"lat": 52}"#);
	let root = MemoryElement::new("main").child(element);

	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound[0].alias(), "map");
	assert_eq!(bound[0].name(), "/ui/map");
	assert_eq!(*received.borrow(), json!({"zoom": 3, "lat": 52}));
	assert_eq!(page.conditioner.find("map"), bound);
}

#[rstest]
fn test_instance_handle_is_reachable(mut page: Page) {
	page.conditioner.define(
		"ui/counter",
		Module::new(|_: &MemoryElement, _: &Value| Ok(Instance::new().handle(Cell::new(7_u32)))),
	);
	let root = MemoryElement::new("main").child(MemoryElement::new("div").attr("data-module", "ui/counter"));

	let bound = page.conditioner.hydrate(&root);
	let value = bound[0].with_instance(|instance| instance.downcast_ref::<Cell<u32>>().map(Cell::get));
	assert_eq!(value, Some(Some(7)));
}

#[rstest]
fn test_pending_import_converges_to_latest_context(mut page: Page) {
	let pool = Rc::new(RefCell::new(LocalPool::new()));
	let spawner = pool.borrow().spawner();
	let (sender, receiver) = oneshot::channel::<Module<MemoryElement>>();
	let receiver = RefCell::new(Some(receiver));
	page.conditioner.add_plugin(
		Plugin::new()
			.spawn(move |task| spawner.spawn_local(task).expect("pool accepts tasks"))
			.import(move |name: &str| {
				let name = name.to_string();
				let receiver = receiver.borrow_mut().take();
				async move {
					match receiver {
						Some(receiver) => receiver.await.map_err(|_| MountError::import(name, "cancelled")),
						None => Err(MountError::import(name, "imported twice")),
					}
				}
				.boxed_local()
			}),
	);

	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@media (min-width: 30em)");
	let root = MemoryElement::new("main").child(element);
	let bound = page.conditioner.hydrate(&root);

	page.env.viewport().resize(ViewportState::from_em(40.0, 40.0));
	pool.borrow_mut().run_until_stalled();
	assert_eq!(bound[0].state(), LifecycleState::Mounting);

	page.env.viewport().resize(ViewportState::from_em(20.0, 40.0));
	sender
		.send(recording(&page.log, "map"))
		.unwrap_or_else(|_| panic!("receiver dropped"));
	pool.borrow_mut().run_until_stalled();

	assert_eq!(bound[0].state(), LifecycleState::Unmounted);
	assert_eq!(
		page.entries(),
		vec!["construct map", "did_mount ui/map", "destruct map"]
	);
}

#[rstest]
fn test_destroy_during_import_never_constructs(mut page: Page) {
	let pool = Rc::new(RefCell::new(LocalPool::new()));
	let spawner = pool.borrow().spawner();
	page.conditioner
		.add_plugin(Plugin::new().spawn(move |task| spawner.spawn_local(task).expect("pool accepts tasks")));

	let root = MemoryElement::new("main").child(MemoryElement::new("div").attr("data-module", "ui/map"));
	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound[0].state(), LifecycleState::Mounting);

	page.conditioner.destroy_all();
	pool.borrow_mut().run_until_stalled();

	assert!(bound[0].is_destroyed());
	assert_eq!(page.count("construct map"), 0);
	assert_eq!(page.count("destruct map"), 0);
}

#[rstest]
fn test_lazy_module_loads_once(mut page: Page) {
	let loads = Rc::new(Cell::new(0));
	let counter = loads.clone();
	let log = page.log.clone();
	page.conditioner.define_lazy("ui/chart", move || {
		counter.set(counter.get() + 1);
		let module = recording(&log, "chart");
		async move { Ok(module) }.boxed_local()
	});

	let first = MemoryElement::new("div").attr("data-module", "ui/chart");
	let second = MemoryElement::new("div").attr("data-module", "ui/chart");
	let root = MemoryElement::new("main").child(first).child(second);

	let bound = page.conditioner.hydrate(&root);
	assert!(bound.iter().all(BoundModule::is_mounted));
	assert_eq!(loads.get(), 1);
	assert_eq!(page.count("construct chart"), 2);
}

#[rstest]
fn test_custom_attributes_from_toml() {
	let settings = MountSettings::from_toml_str(
		r#"
module_attribute = "data-component"
context_attribute = "data-when"
"#,
	)
	.unwrap();
	let env = HeadlessEnvironment::new(ViewportState::from_em(40.0, 40.0));
	let mut conditioner = Conditioner::new(settings);
	conditioner.add_plugin(env.plugin());
	conditioner.define("ui/map", Module::new(|_: &MemoryElement, _: &Value| Ok(Instance::new())));

	let root = MemoryElement::new("main")
		.child(
			MemoryElement::new("div")
				.attr("data-component", "ui/map")
				.attr("data-when", "(min-width: 30em)"),
		)
		.child(MemoryElement::new("div").attr("data-module", "ui/map"));

	let bound = conditioner.hydrate(&root);
	assert_eq!(bound.len(), 1);
	assert!(bound[0].is_mounted());
}

#[rstest]
fn test_single_resize_past_both_bounds_never_mounts(mut page: Page) {
	let element = MemoryElement::new("div")
		.attr("data-module", "ui/map")
		.attr("data-context", "@media (min-width: 30em) and @media (max-width: 50em)");
	let root = MemoryElement::new("main").child(element);

	let bound = page.conditioner.hydrate(&root);
	page.env.viewport().resize(ViewportState::from_em(60.0, 40.0));

	assert_eq!(bound[0].state(), LifecycleState::Unmounted);
	assert!(page.entries().is_empty());

	page.env.viewport().resize(ViewportState::from_em(40.0, 40.0));
	assert!(bound[0].is_mounted());
}

#[rstest]
fn test_hydrate_inside_async_task(page: Page) {
	let Page {
		env: _env,
		mut conditioner,
		log,
	} = page;
	let root = MemoryElement::new("main").child(MemoryElement::new("nav").attr("data-module", "ui/menu"));

	let mounted = futures::executor::block_on(async move {
		let bound = conditioner.hydrate(&root);
		bound.iter().filter(|b| b.is_mounted()).count()
	});

	assert_eq!(mounted, 1);
	assert_eq!(log.borrow().clone(), vec!["construct menu", "did_mount ui/menu"]);
}

#[rstest]
fn test_waiting_loader_does_not_block_hydration(mut page: Page) {
	let (sender, receiver) = oneshot::channel::<Module<MemoryElement>>();
	let receiver = Rc::new(RefCell::new(Some(receiver)));
	page.conditioner.define_lazy("ui/chart", move || {
		let receiver = receiver.borrow_mut().take();
		async move {
			match receiver {
				Some(receiver) => receiver
					.await
					.map_err(|_| MountError::import("ui/chart", "loader dropped")),
				None => Err(MountError::import("ui/chart", "loaded twice")),
			}
		}
		.boxed_local()
	});
	let root = MemoryElement::new("main").child(MemoryElement::new("div").attr("data-module", "ui/chart"));

	let bound = page.conditioner.hydrate(&root);
	assert_eq!(bound[0].state(), LifecycleState::Mounting);

	page.conditioner.run_until_stalled();
	assert_eq!(bound[0].state(), LifecycleState::Mounting);

	sender
		.send(recording(&page.log, "chart"))
		.unwrap_or_else(|_| panic!("receiver dropped"));
	page.conditioner.run_until_stalled();

	assert!(bound[0].is_mounted());
	assert_eq!(page.entries(), vec!["construct chart", "did_mount ui/chart"]);
}
