//! 循环引用的解决与拒绝、依赖声明以及销毁顺序

use aop_abstractions::Pointcut;
use aop_impl::{AspectBuilder, Proxy, ProxySupport};
use di_abstractions::{ComponentDefinition, ComponentResolver, SingletonRegistry};
use infrastructure_common::{
    same_instance, BoxError, ComponentState, ComponentType, DependencyError,
    InfrastructureError, Instance, MethodSignature,
};
use infrastructure_composition::ComponentContext;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Node {
    peer: Mutex<Option<Instance>>,
}

fn node_type() -> ComponentType {
    ComponentType::of::<Node>()
        .with_method(MethodSignature::new("visit"))
        .proxyable::<Node>()
}

fn setter_node(key: &str, peer: &'static str) -> ComponentDefinition {
    ComponentDefinition::of::<Node, _>(key, node_type(), |_| Ok(Node::default()))
        .with_populate::<Node, _>(move |node, resolver| {
            *node.peer.lock() = Some(resolver.get_component(peer)?);
            Ok(())
        })
}

fn constructor_node(key: &str, peer: &'static str) -> ComponentDefinition {
    ComponentDefinition::of::<Node, _>(key, node_type(), move |resolver| {
        let peer = resolver.get_component(peer)?;
        Ok(Node {
            peer: Mutex::new(Some(peer)),
        })
    })
}

fn peer_of(context: &ComponentContext, key: &str) -> anyhow::Result<Instance> {
    let proxy = context.get_concrete::<Proxy<Node>>(key)?;
    let node = proxy
        .static_target()
        .ok_or_else(|| anyhow::anyhow!("{key} 没有静态目标"))?;
    let peer = node.peer.lock().clone();
    peer.ok_or_else(|| anyhow::anyhow!("{key} 没有注入对端"))
}

#[test]
fn test_setter_cycle_sees_final_proxies() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("trace")
                .around("wrap", Pointcut::component_named("node*")?, |pjp| pjp.proceed())
                .build(),
        )
        .register(setter_node("nodeA", "nodeB"))
        .register(setter_node("nodeB", "nodeA"))
        .build()?;
    context.refresh()?;

    let a = context.get("nodeA")?;
    let b = context.get("nodeB")?;
    assert!(a.is::<Proxy<Node>>());
    assert!(b.is::<Proxy<Node>>());

    // nodeB 在 nodeA 创建过程中拿到的早期引用必须就是最终缓存的代理
    assert!(same_instance(&peer_of(&context, "nodeB")?, &a));
    assert!(same_instance(&peer_of(&context, "nodeA")?, &b));
    assert_eq!(context.auto_proxy().proxy_count(), 2);

    let registry = context.container().registry();
    assert_eq!(registry.state_of("nodeA"), ComponentState::Created);
    assert!(registry.peek_early_reference("nodeA").is_some());
    Ok(())
}

#[test]
fn test_constructor_cycle_reports_full_chain() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .register(constructor_node("a", "b"))
        .register(constructor_node("b", "c"))
        .register(constructor_node("c", "a"))
        .build()?;

    let error = context.container().get_component("a").unwrap_err();
    assert_eq!(error.cycle().unwrap(), ["a", "b", "c", "a"]);

    let registry = context.container().registry();
    for key in ["a", "b", "c"] {
        assert_eq!(registry.state_of(key), ComponentState::Absent);
        assert!(!registry.is_currently_in_creation(key));
    }
    Ok(())
}

#[test]
fn test_mixed_cycle_resolves_when_setter_side_is_entered_first() -> anyhow::Result<()> {
    // a 通过属性填充引用 b，b 通过构造器引用 a：从 a 开始时 b 拿到 a 的早期引用
    let context = ComponentContext::builder()
        .register(setter_node("a", "b"))
        .register(constructor_node("b", "a"))
        .build()?;

    let a = context.get("a")?;
    let b = context.get_concrete::<Node>("b")?;
    let seen = b.peer.lock().clone().unwrap();
    assert!(same_instance(&seen, &a));
    Ok(())
}

#[test]
fn test_mixed_cycle_fails_when_constructor_side_is_entered_first() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .register(setter_node("a", "b"))
        .register(constructor_node("b", "a"))
        .build()?;

    let error = context.get("b").unwrap_err();
    assert!(matches!(
        error,
        InfrastructureError::DependencyError {
            source: DependencyError::CircularDependency { ref cycle }
        } if cycle == &["b", "a", "b"]
    ));
    Ok(())
}

/// 带销毁回调的服务
struct Service {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    _dependency: Option<Instance>,
}

impl Service {
    fn close(&self) -> Result<(), BoxError> {
        self.log.lock().push(format!("close:{}", self.name));
        Ok(())
    }
}

fn service(
    key: &'static str,
    dependency: Option<&'static str>,
    log: &Arc<Mutex<Vec<String>>>,
) -> ComponentDefinition {
    let log = log.clone();
    ComponentDefinition::of::<Service, _>(
        key,
        ComponentType::of::<Service>().with_lifecycle_method::<Service>("close", Service::close),
        move |resolver| {
            let dependency = match dependency {
                Some(dependency) => Some(resolver.get_component(dependency)?),
                None => None,
            };
            log.lock().push(format!("create:{key}"));
            Ok(Service {
                name: key,
                log: log.clone(),
                _dependency: dependency,
            })
        },
    )
    .configure(|descriptor| descriptor.with_destroy_method("close"))
}

#[test]
fn test_depends_on_orders_creation_and_destruction() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let context = ComponentContext::builder()
        .register(service("db", None, &log))
        .register(service("repo", Some("db"), &log))
        .register(service("cache", None, &log).configure(|d| d.depends_on("db")))
        .build()?;

    context.get("cache")?;
    context.get("repo")?;
    assert_eq!(*log.lock(), ["create:db", "create:cache", "create:repo"]);

    let registry = context.container().registry();
    let mut dependents = registry.dependents_of("db");
    dependents.sort();
    assert_eq!(dependents, ["cache", "repo"]);

    log.lock().clear();
    let report = context.close();
    assert!(report.is_clean());
    assert_eq!(report.destroyed.len(), 3);

    let closed = log.lock().clone();
    let position = |entry: &str| closed.iter().position(|e| e == entry).unwrap();
    assert!(position("close:repo") < position("close:db"));
    assert!(position("close:cache") < position("close:db"));
    assert_eq!(registry.state_of("db"), ComponentState::Destroyed);
    Ok(())
}
