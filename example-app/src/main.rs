//! # 示例应用程序
//!
//! 演示组件容器的单例创建、按名称自动代理与循环依赖解析

use anyhow::Context as _;
use aop_abstractions::Pointcut;
use aop_impl::{AspectBuilder, Proxy, ProxySupport};
use clap::Parser;
use di_abstractions::{ComponentDefinition, ComponentResolver};
use infrastructure_common::{
    same_instance, AopResult, ComponentType, Instance, MethodSignature,
};
use infrastructure_composition::{parse_level, ComponentContext, LoggingConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "Lorn ADSP 组件容器示例应用")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 环境变量前缀
    #[arg(long, default_value = "CONTAINER")]
    env_prefix: String,

    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    json_logs: bool,
}

/// 订单服务契约
trait OrderService: Send + Sync {
    fn place(&self, item: &str) -> AopResult<u64>;
}

/// 订单服务实现
#[derive(Default)]
struct OrderServiceImpl {
    next_id: AtomicU64,
}

impl OrderService for OrderServiceImpl {
    fn place(&self, item: &str) -> AopResult<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        info!("下单: {} -> #{}", item, id);
        Ok(id)
    }
}

impl OrderService for Proxy<OrderServiceImpl> {
    fn place(&self, item: &str) -> AopResult<u64> {
        self.invoke("place", &[&item], |target| target.place(item))
    }
}

fn order_service_type() -> ComponentType {
    ComponentType::of::<OrderServiceImpl>()
        .with_method(
            MethodSignature::new("place")
                .with_params(["&str"])
                .returning("u64"),
        )
        .exposes::<OrderServiceImpl, dyn OrderService>("OrderService", |s| {
            s as Arc<dyn OrderService>
        })
        .proxied_as::<OrderServiceImpl, dyn OrderService>("OrderService", |p| {
            p as Arc<dyn OrderService>
        })
}

/// 互相持有对方引用的组件
#[derive(Default)]
struct Peer {
    other: Mutex<Option<Instance>>,
}

fn peer_definition(key: &str, other: &'static str) -> ComponentDefinition {
    ComponentDefinition::of::<Peer, _>(
        key,
        ComponentType::of::<Peer>()
            .with_method(MethodSignature::new("ping"))
            .proxyable::<Peer>(),
        |_| Ok(Peer::default()),
    )
    .with_populate::<Peer, _>(move |peer, resolver| {
        *peer.other.lock() = Some(resolver.get_component(other)?);
        Ok(())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logging = LoggingConfig {
        json_format: args.json_logs,
        ..LoggingConfig::default()
    }
    .with_level(parse_level(&args.log_level)?);

    let context = Arc::new(build_context(&args, logging)?);
    info!("启动 Lorn ADSP 示例应用: {}", context.id());
    let created = context.start().await?;
    info!("预先创建了 {} 个单例", created);

    demonstrate_named_proxy(&context)?;
    demonstrate_cycle(&context)?;

    let metrics = context.metrics();
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    let report = context.stop().await?;
    info!("应用已关闭, 销毁 {} 个组件", report.destroyed.len());
    Ok(())
}

/// 构建组件上下文
fn build_context(args: &Args, logging: LoggingConfig) -> anyhow::Result<ComponentContext> {
    let audit_calls = Arc::new(AtomicU64::new(0));

    let mut builder = ComponentContext::builder()
        .with_logging(logging)
        .with_env_prefix(args.env_prefix.clone());
    if let Some(path) = &args.config {
        builder = builder
            .with_settings_file(path)
            .with_context(|| format!("无法加载配置文件: {path}"))?;
    }

    let context = builder
        .add_aspect(
            AspectBuilder::new("audit")
                .before(
                    "logCall",
                    Pointcut::component_named("auditedSvc")?,
                    move |join_point| {
                        let count = audit_calls.fetch_add(1, Ordering::SeqCst) + 1;
                        info!("审计 #{}: {}", count, join_point.short_description());
                        Ok(())
                    },
                )
                .build(),
        )
        .add_aspect(
            AspectBuilder::new("trace")
                .around(
                    "timePeer",
                    Pointcut::component_named("peer*")?,
                    |pjp| pjp.proceed(),
                )
                .build(),
        )
        .register(ComponentDefinition::of::<OrderServiceImpl, _>(
            "svc",
            order_service_type(),
            |_| Ok(OrderServiceImpl::default()),
        ))
        .register(ComponentDefinition::of::<OrderServiceImpl, _>(
            "auditedSvc",
            order_service_type(),
            |_| Ok(OrderServiceImpl::default()),
        ))
        .register(peer_definition("peerA", "peerB"))
        .register(peer_definition("peerB", "peerA"))
        .build()?;
    Ok(context)
}

/// 同一类型的两个组件，只有按名称匹配的那个被代理
fn demonstrate_named_proxy(context: &ComponentContext) -> anyhow::Result<()> {
    let plain = context.get_as::<dyn OrderService>("svc")?;
    let audited = context.get_as::<dyn OrderService>("auditedSvc")?;

    plain.place("键盘")?;
    audited.place("显示器")?;

    let audited_raw = context.get("auditedSvc")?;
    info!(
        "svc 是代理: {}, auditedSvc 是代理: {}",
        context.get("svc")?.is::<Proxy<OrderServiceImpl>>(),
        audited_raw.is::<Proxy<OrderServiceImpl>>()
    );
    Ok(())
}

/// setter 注入循环中拿到的早期引用就是最终缓存的代理
fn demonstrate_cycle(context: &ComponentContext) -> anyhow::Result<()> {
    let a = context.get("peerA")?;
    let b = context
        .get_concrete::<Proxy<Peer>>("peerB")
        .context("peerB 应当是代理")?;
    let seen_by_b = b
        .static_target()
        .and_then(|peer| peer.other.lock().clone())
        .context("peerB 没有拿到 peerA")?;

    info!(
        "peerB 持有的 peerA 与最终的 peerA 是同一个实例: {}",
        same_instance(&seen_by_b, &a)
    );
    info!("peerA 已注册: {}", context.container().contains_component("peerA"));
    Ok(())
}
