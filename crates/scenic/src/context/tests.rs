//! Tests for the scenario context store and teardown hooks.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};

use super::*;
use crate::failure::StepResult;
use crate::scope::DependencyRegistry;
use crate::step::Step;

#[fixture]
fn scope() -> DependencyScope {
    let mut registry = DependencyRegistry::new();
    registry.register(Arc::new(String::from("postgres://fixture")));
    registry.freeze()
}

#[derive(Debug)]
struct Noop;

impl Step for Noop {
    fn description(&self) -> std::borrow::Cow<'_, str> {
        "noop".into()
    }

    fn execute(&self, _ctx: &mut ScenarioContext<'_>) -> StepResult {
        Ok(())
    }
}

impl BackgroundStep for Noop {}

#[rstest]
fn set_then_get_returns_value(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("event_name", String::from("Tech Conference"));
    assert_eq!(
        ctx.get::<String>("event_name").map(String::as_str).ok(),
        Some("Tech Conference")
    );
}

#[rstest]
fn later_write_overwrites_in_place(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("first", 1_u32);
    ctx.set("second", 2_u32);
    ctx.set("first", 10_u32);

    assert_eq!(ctx.get::<u32>("first").ok(), Some(&10));
    assert_eq!(ctx.keys().collect::<Vec<_>>(), ["first", "second"]);
}

#[rstest]
fn overwrite_may_change_type(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("value", 1_u32);
    ctx.set("value", "text");
    assert!(ctx.get::<u32>("value").is_err());
    assert_eq!(ctx.get::<&str>("value").ok(), Some(&"text"));
}

#[rstest]
#[case::absent("never_set")]
#[case::wrong_type("number")]
fn missing_or_mistyped_values_fail(scope: DependencyScope, #[case] key: &str) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("number", 5_i64);

    let Err(failure) = ctx.get::<String>(key) else {
        panic!("lookup of '{key}' as String should fail");
    };
    match failure {
        StepFailure::MissingContextValue {
            key: reported,
            expected_type,
        } => {
            assert_eq!(reported, key);
            assert!(expected_type.contains("String"));
        }
        other => panic!("unexpected failure: {other}"),
    }
}

#[rstest]
fn get_mut_allows_in_place_updates(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("ids", vec![1_i64]);
    let Ok(ids) = ctx.get_mut::<Vec<i64>>("ids") else {
        panic!("ids should be present");
    };
    ids.push(2);
    assert_eq!(ctx.get::<Vec<i64>>("ids").ok(), Some(&vec![1, 2]));
}

#[rstest]
fn take_removes_only_matching_type(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("value", 3_u8);

    assert!(ctx.take::<String>("value").is_err());
    assert!(ctx.contains("value"));
    assert_eq!(ctx.take::<u8>("value").ok(), Some(3));
    assert!(!ctx.contains("value"));
}

#[rstest]
fn typed_keys_share_the_string_namespace(scope: DependencyScope) {
    const STATUS: ContextKey<u16> = ContextKey::new("status");

    let mut ctx = ScenarioContext::new(&scope);
    ctx.put(STATUS, 409);
    assert_eq!(ctx.get::<u16>("status").ok(), Some(&409));
    assert_eq!(ctx.fetch(STATUS).ok(), Some(&409));
    assert_eq!(STATUS.name(), "status");
}

#[rstest]
fn resolve_delegates_to_scope(scope: DependencyScope) {
    let ctx = ScenarioContext::new(&scope);
    let url = ctx.resolve::<Arc<String>>().ok();
    assert_eq!(url.as_deref().map(String::as_str), Some("postgres://fixture"));
    assert!(matches!(
        ctx.resolve::<Arc<u64>>(),
        Err(StepFailure::DependencyNotRegistered { .. })
    ));
}

#[rstest]
fn builder_keeps_background_in_call_order(scope: DependencyScope) {
    let shared: Arc<dyn BackgroundStep> = Arc::new(Noop);
    let ctx = ScenarioContext::builder(&scope)
        .background(Noop)
        .background_shared(Arc::clone(&shared))
        .isolation_key("tenant-a")
        .build();

    assert_eq!(ctx.background_steps().len(), 2);
    let Some(second) = ctx.background_steps().get(1) else {
        panic!("second background step should exist");
    };
    assert!(Arc::ptr_eq(second, &shared));
    assert_eq!(ctx.isolation_key().as_str(), "tenant-a");
}

#[rstest]
fn contexts_get_distinct_isolation_keys(scope: DependencyScope) {
    let first = ScenarioContext::new(&scope);
    let second = ScenarioContext::new(&scope);
    assert_ne!(first.isolation_key(), second.isolation_key());
}

#[rstest]
fn teardown_hooks_run_in_reverse_order(scope: DependencyScope) {
    let order = Mutex::new(Vec::new());
    {
        let mut ctx = ScenarioContext::new(&scope);
        ctx.on_teardown(|| order.lock().unwrap_or_else(|e| e.into_inner()).push("first"));
        ctx.on_teardown(|| order.lock().unwrap_or_else(|e| e.into_inner()).push("second"));
    }
    let recorded = order.into_inner().unwrap_or_else(|e| e.into_inner());
    assert_eq!(recorded, ["second", "first"]);
}

#[rstest]
fn teardown_continues_after_a_hook_panics(scope: DependencyScope) {
    let ran = Mutex::new(false);
    {
        let mut ctx = ScenarioContext::new(&scope);
        ctx.on_teardown(|| *ran.lock().unwrap_or_else(|e| e.into_inner()) = true);
        ctx.on_teardown(|| panic!("hook failure"));
    }
    assert!(*ran.lock().unwrap_or_else(|e| e.into_inner()));
}

#[rstest]
fn teardown_runs_while_unwinding(scope: DependencyScope) {
    let released = Mutex::new(false);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut ctx = ScenarioContext::new(&scope);
        ctx.on_teardown(|| *released.lock().unwrap_or_else(|e| e.into_inner()) = true);
        panic!("scenario cancelled");
    }));
    assert!(outcome.is_err());
    assert!(*released.lock().unwrap_or_else(|e| e.into_inner()));
}

#[rstest]
fn debug_lists_keys_and_types(scope: DependencyScope) {
    let mut ctx = ScenarioContext::new(&scope);
    ctx.set("status", 201_u16);
    let rendered = format!("{ctx:?}");
    assert!(rendered.contains("status"));
    assert!(rendered.contains("u16"));
}
