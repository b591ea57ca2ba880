//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use zyme::capability::{ZyDesignCandidate, ZyDesignRequest, ZyGenerator};
use zyme::orbit::*;
use zyme::{Result, ZyError};

#[derive(Debug, Default)]
struct CountingGenerator {
    loads: AtomicUsize,
    activations: AtomicUsize,
    deactivations: AtomicUsize,
    unloads: AtomicUsize,
}

impl ZyPluginHooks for CountingGenerator {
    fn on_load(&self) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_activate(&self) -> Result<()> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_deactivate(&self) -> Result<()> {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_unload(&self) -> Result<()> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ZyGenerator for CountingGenerator {
    fn generate(&self, request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>> {
        Ok((0..request.count)
            .map(|_| ZyDesignCandidate::new("MKV", 0.9))
            .collect())
    }
}

#[derive(Debug)]
struct FailingActivation;

impl ZyPluginHooks for FailingActivation {
    fn on_activate(&self) -> Result<()> {
        Err(ZyError::validation("model weights missing"))
    }
}

impl ZyGenerator for FailingActivation {
    fn generate(&self, _request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>> {
        Ok(Vec::new())
    }
}

fn generator_factory() -> Result<ZyPluginInstance> {
    Ok(ZyPluginInstance::Generator(Arc::new(CountingGenerator::default())))
}

fn failing_factory() -> Result<ZyPluginInstance> {
    Err(ZyError::validation("cannot open model"))
}

fn panicking_factory() -> Result<ZyPluginInstance> {
    panic!("factory exploded")
}

fn high(name: &str) -> ZyPluginDescriptor {
    ZyPluginDescriptor::generator(name).with_priority(ZyPluginPriority::High)
}

#[test]
fn test_unload_dependency_then_get_dependent_fails() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register(
            high("A"),
            ZyPluginInstance::Generator(Arc::new(CountingGenerator::default())),
        )
        .unwrap();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("B")
                .with_priority(ZyPluginPriority::Low)
                .with_dependency(ZyPluginDependency::required("A")),
            generator_factory,
        )
        .unwrap();

    assert_eq!(registry.names(), vec!["A", "B"]);

    registry.unload("A").unwrap();
    assert_eq!(registry.state("A"), Some(ZyPluginState::Unloaded));

    match registry.get("B") {
        Err(ZyError::DependencyMissing { plugin, missing }) => {
            assert_eq!(plugin, "B");
            assert_eq!(missing, vec!["A".to_string()]);
        }
        other => panic!("expected DependencyMissing, got {:?}", other),
    }
    assert_eq!(registry.state("B"), Some(ZyPluginState::Error));
}

#[test]
fn test_dependency_ordering_overrides_priority() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register_factory(
            high("dependent").with_dependency(ZyPluginDependency::required("base")),
            generator_factory,
        )
        .unwrap();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("base").with_priority(ZyPluginPriority::Lowest),
            generator_factory,
        )
        .unwrap();
    registry
        .register_factory(ZyPluginDescriptor::generator("middle"), generator_factory)
        .unwrap();

    assert_eq!(registry.names(), vec!["middle", "base", "dependent"]);
}

#[test]
fn test_missing_dependency_is_local_to_dependent() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("x")
                .with_dependency(ZyPluginDependency::required("y"))
                .with_dependency(ZyPluginDependency::required("z"))
                .with_dependency(ZyPluginDependency::optional("maybe")),
            generator_factory,
        )
        .unwrap();
    registry
        .register_factory(ZyPluginDescriptor::generator("unrelated"), generator_factory)
        .unwrap();

    let report = registry.validate_plugin_dependencies();
    assert_eq!(report.len(), 1);
    assert_eq!(report["x"], vec!["y".to_string(), "z".to_string()]);

    match registry.get("x") {
        Err(ZyError::DependencyMissing { missing, .. }) => {
            assert_eq!(missing, vec!["y".to_string(), "z".to_string()]);
        }
        other => panic!("expected DependencyMissing, got {:?}", other),
    }
    assert_eq!(registry.state("x"), Some(ZyPluginState::Error));
    assert!(registry.last_error("x").unwrap().contains("y"));

    // Fails fast from ERROR without consulting dependencies again.
    assert!(matches!(registry.get("x"), Err(ZyError::PluginLoad { .. })));

    assert!(registry.get("unrelated").is_ok());
    assert_eq!(registry.state("unrelated"), Some(ZyPluginState::Loaded));
}

#[test]
fn test_version_constraint_must_match() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("base")
                .with_version(ZyPluginVersion::parse("1.2.0").unwrap()),
            generator_factory,
        )
        .unwrap();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("needs_two").with_dependency(
                ZyPluginDependency::required("base")
                    .with_constraint(">=2.0.0")
                    .unwrap(),
            ),
            generator_factory,
        )
        .unwrap();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("needs_one").with_dependency(
                ZyPluginDependency::required("base")
                    .with_constraint(">=1.0.0")
                    .unwrap(),
            ),
            generator_factory,
        )
        .unwrap();

    assert!(matches!(
        registry.get("needs_two"),
        Err(ZyError::DependencyMissing { .. })
    ));
    assert!(registry.get("needs_one").is_ok());
    // The dependency was constructed on behalf of its dependent.
    assert_eq!(registry.state("base"), Some(ZyPluginState::Loaded));
}

#[test]
fn test_lifecycle_transitions_run_hooks_once() {
    let generator = Arc::new(CountingGenerator::default());
    let mut registry = ZyPluginRegistry::new();
    registry
        .register(
            ZyPluginDescriptor::generator("g"),
            ZyPluginInstance::Generator(generator.clone()),
        )
        .unwrap();
    assert_eq!(generator.loads.load(Ordering::SeqCst), 1);

    registry.activate("g").unwrap();
    registry.activate("g").unwrap();
    assert_eq!(registry.state("g"), Some(ZyPluginState::Active));
    assert_eq!(generator.activations.load(Ordering::SeqCst), 1);

    registry.deactivate("g").unwrap();
    assert!(matches!(
        registry.deactivate("g"),
        Err(ZyError::InvalidTransition { .. })
    ));

    registry.activate("g").unwrap();
    registry.unload("g").unwrap();
    assert_eq!(registry.state("g"), Some(ZyPluginState::Unloaded));
    assert_eq!(generator.deactivations.load(Ordering::SeqCst), 2);
    assert_eq!(generator.unloads.load(Ordering::SeqCst), 1);

    assert!(matches!(
        registry.unload("g"),
        Err(ZyError::InvalidTransition { .. })
    ));
    assert!(matches!(
        registry.activate("g"),
        Err(ZyError::InvalidTransition { .. })
    ));
}

#[test]
fn test_unload_refused_while_constructed_dependent_exists() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register_factory(ZyPluginDescriptor::generator("base"), generator_factory)
        .unwrap();
    registry
        .register_factory(
            ZyPluginDescriptor::generator("top").with_dependency(ZyPluginDependency::required("base")),
            generator_factory,
        )
        .unwrap();

    registry.get("top").unwrap();
    assert!(matches!(
        registry.unload("base"),
        Err(ZyError::Validation { .. })
    ));
    assert_eq!(registry.state("base"), Some(ZyPluginState::Loaded));

    registry.unload("top").unwrap();
    registry.unload("base").unwrap();
    // A direct request reloads a factory-backed plugin.
    assert!(registry.get("base").is_ok());
}

#[test]
fn test_failing_hook_and_factories_move_to_error() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register(
            ZyPluginDescriptor::generator("flaky"),
            ZyPluginInstance::Generator(Arc::new(FailingActivation)),
        )
        .unwrap();
    registry
        .register_factory(ZyPluginDescriptor::generator("broken"), failing_factory)
        .unwrap();
    registry
        .register_factory(ZyPluginDescriptor::generator("panicky"), panicking_factory)
        .unwrap();

    assert!(matches!(
        registry.activate("flaky"),
        Err(ZyError::PluginLoad { .. })
    ));
    assert_eq!(registry.state("flaky"), Some(ZyPluginState::Error));

    assert!(matches!(
        registry.get("broken"),
        Err(ZyError::PluginLoad { .. })
    ));
    assert_eq!(registry.state("broken"), Some(ZyPluginState::Error));

    match registry.get("panicky") {
        Err(ZyError::PluginLoad { message, .. }) => assert!(message.contains("factory exploded")),
        other => panic!("expected PluginLoad, got {:?}", other),
    }
    assert_eq!(registry.len(), 3);
}

#[test]
fn test_observers_see_every_transition_and_are_isolated() {
    let seen: Arc<Mutex<Vec<(String, ZyPluginState)>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ZyPluginRegistry::new();

    registry.add_lifecycle_hook(|_, _| panic!("observer bug"));
    registry.add_lifecycle_hook(|_, _| Err(ZyError::internal("observer refused")));
    let sink = Arc::clone(&seen);
    registry.add_lifecycle_hook(move |name, state| {
        sink.lock().unwrap().push((name.to_string(), state));
        Ok(())
    });

    registry
        .register_factory(ZyPluginDescriptor::generator("g"), generator_factory)
        .unwrap();
    registry.get("g").unwrap();
    registry.activate("g").unwrap();
    registry.unload("g").unwrap();

    let states: Vec<ZyPluginState> = seen.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(
        states,
        vec![
            ZyPluginState::Unloaded,
            ZyPluginState::Loaded,
            ZyPluginState::Active,
            ZyPluginState::Loaded,
            ZyPluginState::Unloaded,
        ]
    );
    assert!(seen.lock().unwrap().iter().all(|(n, _)| n == "g"));
}

#[test]
fn test_typed_lookup_checks_kind() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register_factory(ZyPluginDescriptor::generator("g"), generator_factory)
        .unwrap();

    assert!(registry.generator("g").is_ok());
    assert!(matches!(
        registry.optimizer("g"),
        Err(ZyError::Validation { .. })
    ));
    match registry.get("nope") {
        Err(ZyError::PluginNotFound { name, available }) => {
            assert_eq!(name, "nope");
            assert_eq!(available, vec!["g".to_string()]);
        }
        other => panic!("expected PluginNotFound, got {:?}", other),
    }
}

fn priority() -> impl Strategy<Value = ZyPluginPriority> {
    prop::sample::select(vec![
        ZyPluginPriority::Lowest,
        ZyPluginPriority::Low,
        ZyPluginPriority::Normal,
        ZyPluginPriority::High,
        ZyPluginPriority::Highest,
    ])
}

proptest! {
    #[test]
    fn prop_names_follow_priority_without_dependencies(
        priorities in prop::collection::vec(priority(), 1..12)
    ) {
        let mut registry = ZyPluginRegistry::new();
        for (i, p) in priorities.iter().enumerate() {
            registry
                .register_factory(
                    ZyPluginDescriptor::generator(format!("p{}", i)).with_priority(*p),
                    generator_factory,
                )
                .unwrap();
        }

        let names = registry.names();
        prop_assert_eq!(names.len(), priorities.len());
        for pair in names.windows(2) {
            let a: usize = pair[0][1..].parse().unwrap();
            let b: usize = pair[1][1..].parse().unwrap();
            prop_assert!(priorities[a] > priorities[b] || (priorities[a] == priorities[b] && a < b));
        }
    }
}
