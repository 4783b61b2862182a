//! 并发访问下的单例创建、早期引用与跨线程循环等待

use aop_abstractions::Pointcut;
use aop_impl::{AspectBuilder, Proxy, ProxySupport};
use di_abstractions::{ComponentContainer, ComponentDefinition, ComponentResolver, SingletonRegistry};
use di_impl::{DefaultComponentContainer, DefaultSingletonRegistry};
use infrastructure_common::{
    same_instance, ComponentState, ComponentType, DependencyError, Instance, MethodSignature,
};
use infrastructure_composition::ComponentContext;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;

#[derive(Default)]
struct Slow;

fn slow_definition(key: &str, created: Arc<AtomicUsize>) -> ComponentDefinition {
    ComponentDefinition::of::<Slow, _>(
        key,
        ComponentType::of::<Slow>()
            .with_method(MethodSignature::new("work"))
            .proxyable::<Slow>(),
        move |_| {
            created.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Slow)
        },
    )
}

fn resolve_from_all_threads<F>(lookup: F) -> Vec<Instance>
where
    F: Fn() -> Instance + Sync,
{
    let start = Barrier::new(THREADS);
    thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    lookup()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}

#[test]
fn test_singleton_factory_runs_once_under_contention() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = DefaultComponentContainer::new();
    container.register_definition(slow_definition("shared", created.clone()));

    let instances = resolve_from_all_threads(|| container.get_component("shared").unwrap());

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances
        .windows(2)
        .all(|pair| same_instance(&pair[0], &pair[1])));
}

#[test]
fn test_proxied_singleton_is_shared_across_threads() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("trace")
                .around("wrap", Pointcut::True, |pjp| pjp.proceed())
                .build(),
        )
        .register(slow_definition("shared", created.clone()))
        .build()?;

    let instances = resolve_from_all_threads(|| context.get("shared").unwrap());

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| instance.is::<Proxy<Slow>>()));
    assert!(instances
        .windows(2)
        .all(|pair| same_instance(&pair[0], &pair[1])));
    assert_eq!(context.auto_proxy().proxy_count(), 1);
    Ok(())
}

#[test]
fn test_waiting_threads_retry_after_creation_failure() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let container = DefaultComponentContainer::new();
    let counter = attempts.clone();
    container.register_definition(ComponentDefinition::of::<Slow, _>(
        "flaky",
        ComponentType::of::<Slow>(),
        move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            if attempt == 0 {
                return Err(DependencyError::creation_failed("flaky", "首次连接失败"));
            }
            Ok(Slow)
        },
    ));

    let start = Barrier::new(THREADS);
    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    container.get_component("flaky")
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let failures = results.iter().filter(|result| result.is_err()).count();
    assert_eq!(failures, 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        container.registry().state_of("flaky"),
        ComponentState::Created
    );
}

#[test]
fn test_concurrent_early_reference_is_produced_once() {
    const READERS: usize = 6;

    let registry = DefaultSingletonRegistry::new();
    let produced = Arc::new(AtomicUsize::new(0));
    let raw: Instance = Arc::new("原始实例".to_string());
    let exposed = Barrier::new(READERS + 1);
    let read = Barrier::new(READERS + 1);

    let (finished, early) = thread::scope(|scope| {
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                scope.spawn(|| {
                    exposed.wait();
                    let early = registry.get_early_reference("shared");
                    read.wait();
                    early
                })
            })
            .collect();

        let finished = registry.get_or_create(
            "shared",
            Box::new(|| {
                let produced = produced.clone();
                let early_raw = raw.clone();
                registry.register_pending_factory(
                    "shared",
                    Box::new(move || {
                        produced.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(5));
                        Ok(early_raw.clone())
                    }),
                );
                exposed.wait();
                read.wait();
                Ok(raw.clone())
            }),
        );

        let early: Vec<_> = readers
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        (finished, early)
    });

    assert_eq!(produced.load(Ordering::SeqCst), 1);
    let finished = finished.unwrap();
    assert!(same_instance(&finished, &raw));
    for reference in early {
        let reference = reference.unwrap().unwrap();
        assert!(same_instance(&reference, &raw));
    }
    assert_eq!(registry.state_of("shared"), ComponentState::Created);
}

#[test]
fn test_cross_thread_constructor_cycle_fails_instead_of_hanging() {
    let container = DefaultComponentContainer::new();
    let rendezvous = Arc::new(Barrier::new(2));

    for (key, peer) in [("a", "b"), ("b", "a")] {
        let rendezvous = rendezvous.clone();
        let first_call = AtomicBool::new(true);
        container.register_definition(ComponentDefinition::of::<Slow, _>(
            key,
            ComponentType::of::<Slow>(),
            move |resolver| {
                // 只在第一次构造时汇合，保证两个线程各自持有一个键
                if first_call.swap(false, Ordering::SeqCst) {
                    rendezvous.wait();
                }
                resolver.get_component(peer)?;
                Ok(Slow)
            },
        ));
    }

    let (from_a, from_b) = thread::scope(|scope| {
        let a = scope.spawn(|| container.get_component("a"));
        let b = scope.spawn(|| container.get_component("b"));
        (a.join().unwrap(), b.join().unwrap())
    });

    let errors = [from_a.unwrap_err(), from_b.unwrap_err()];
    assert!(errors.iter().all(DependencyError::is_circular));
    for key in ["a", "b"] {
        assert_eq!(container.registry().state_of(key), ComponentState::Absent);
    }
}
