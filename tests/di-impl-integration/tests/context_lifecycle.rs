//! 组件上下文的配置加载、启动与关闭

use aop_abstractions::Pointcut;
use aop_impl::{AspectBuilder, Proxy, ProxySupport};
use di_abstractions::ComponentDefinition;
use infrastructure_common::{
    BoxError, ComponentType, InfrastructureError, LifecycleError, MethodSignature,
};
use infrastructure_composition::{ComponentContext, ContextStatus};
use std::io::Write;
use std::sync::{Arc, Weak};
use tempfile::NamedTempFile;

#[derive(Default)]
struct Repository;

impl Repository {
    fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// 关闭时总是失败的组件
#[derive(Default)]
struct LeakyPool;

impl LeakyPool {
    fn close(&self) -> Result<(), BoxError> {
        Err("连接仍在使用".into())
    }
}

fn repository(key: &str) -> ComponentDefinition {
    ComponentDefinition::of::<Repository, _>(
        key,
        ComponentType::of::<Repository>()
            .with_method(MethodSignature::new("find"))
            .with_lifecycle_method::<Repository>("close", Repository::close)
            .proxyable::<Repository>(),
        |_| Ok(Repository),
    )
    .configure(|descriptor| descriptor.with_destroy_method("close"))
}

fn settings_file(content: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn advisor_names(context: &ComponentContext, key: &str) -> anyhow::Result<Vec<String>> {
    let proxy = context.get_concrete::<Proxy<Repository>>(key)?;
    Ok(proxy
        .advised()
        .advisors()
        .iter()
        .map(|advisor| advisor.qualified_name())
        .collect())
}

#[tokio::test]
async fn test_settings_file_drives_proxy_policy() -> anyhow::Result<()> {
    let file = settings_file(
        r#"
[container]
pre_instantiate_singletons = true

[proxy]
skip_components = ["internal*"]
common_advisors = ["metrics.count"]
apply_common_advisors_first = false
"#,
    )?;

    let context = Arc::new(
        ComponentContext::builder()
            .with_settings_file(file.path())?
            .add_aspect(
                AspectBuilder::new("metrics")
                    .before("count", Pointcut::True, |_| Ok(()))
                    .build(),
            )
            .add_aspect(
                AspectBuilder::new("audit")
                    .before("logCall", Pointcut::component_named("orders")?, |_| Ok(()))
                    .build(),
            )
            .register(repository("orders"))
            .register(repository("reports"))
            .register(repository("internalCache"))
            .build()?,
    );
    assert_eq!(context.settings().proxy.skip_components, ["internal*"]);
    assert!(!context.settings().proxy.apply_common_advisors_first);

    assert_eq!(context.start().await?, 3);
    assert_eq!(context.status(), ContextStatus::Running);

    // 公共通知器排在组件专属通知器之后
    assert_eq!(
        advisor_names(&context, "orders")?,
        ["audit.logCall", "metrics.count"]
    );
    // 只有公共通知器匹配时不创建代理
    assert!(context.get("reports")?.is::<Repository>());
    // 被排除的组件不参与自动代理
    assert!(context.get("internalCache")?.is::<Repository>());
    assert_eq!(context.metrics().proxies_created, 1);

    let report = context.stop().await?;
    assert!(report.is_clean());
    assert_eq!(report.destroyed.len(), 3);
    assert_eq!(context.status(), ContextStatus::Stopped);
    assert!(context.metrics().uptime().is_some());
    Ok(())
}

#[tokio::test]
async fn test_lazy_context_creates_on_first_lookup() -> anyhow::Result<()> {
    let file = settings_file(
        r#"
[container]
pre_instantiate_singletons = false
"#,
    )?;
    let context = Arc::new(
        ComponentContext::builder()
            .with_settings_file(file.path())?
            .register(repository("orders"))
            .build()?,
    );

    assert_eq!(context.start().await?, 0);
    assert_eq!(context.metrics().container.active_singletons, 0);

    context.get("orders")?;
    assert_eq!(context.metrics().container.active_singletons, 1);

    // 运行中的上下文不能再次刷新
    assert!(matches!(
        context.start().await,
        Err(InfrastructureError::LifecycleError {
            source: LifecycleError::InvalidState { .. }
        })
    ));
    context.stop().await?;
    Ok(())
}

#[test]
fn test_invalid_settings_file_fails_build() -> anyhow::Result<()> {
    let file = settings_file("[container]\nmax_resolution_depth = \"深\"\n")?;
    let result = ComponentContext::builder()
        .with_settings_file(file.path())?
        .build();
    assert!(matches!(
        result,
        Err(InfrastructureError::ConfigError { .. })
    ));
    Ok(())
}

#[test]
fn test_close_reports_destruction_failures_and_continues() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .register(repository("orders"))
        .register(
            ComponentDefinition::of::<LeakyPool, _>(
                "pool",
                ComponentType::of::<LeakyPool>()
                    .with_lifecycle_method::<LeakyPool>("close", LeakyPool::close),
                |_| Ok(LeakyPool),
            )
            .configure(|descriptor| descriptor.with_destroy_method("close")),
        )
        .build()?;
    context.refresh()?;

    let report = context.close();
    assert_eq!(report.destroyed, ["orders"]);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        LifecycleError::DestructionFailed { key, .. } if key == "pool"
    ));

    let metrics = context.metrics();
    assert_eq!(metrics.destroyed, 1);
    assert_eq!(metrics.destruction_failures, 1);
    assert_eq!(context.status(), ContextStatus::Stopped);

    // 重复关闭不做任何事
    assert!(context.close().is_clean());
    Ok(())
}

#[test]
fn test_close_releases_proxied_components() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("trace")
                .around("wrap", Pointcut::True, |pjp| pjp.proceed())
                .build(),
        )
        .register(repository("conn"))
        .build()?;
    context.refresh()?;

    let raw: Weak<Repository> = {
        let proxy = context.get_concrete::<Proxy<Repository>>("conn")?;
        let target = proxy
            .static_target()
            .ok_or_else(|| anyhow::anyhow!("conn 没有静态目标"))?;
        Arc::downgrade(target)
    };
    assert_eq!(context.auto_proxy().proxy_count(), 1);

    assert!(context.close().is_clean());
    assert_eq!(context.auto_proxy().proxy_count(), 0);
    assert_eq!(context.metrics().proxies_created, 1);
    // 销毁后代理与原始实例都不再被容器持有
    assert!(raw.upgrade().is_none());
    Ok(())
}
