//! 通知在容器组件上的应用：按名称选择代理、通知执行顺序、返回后与异常后通知互斥

use aop_abstractions::{AdviceKind, Pointcut};
use aop_impl::{AspectBuilder, Proxy, ProxySupport};
use di_abstractions::ComponentDefinition;
use infrastructure_common::{AopError, AopResult, ComponentType, MethodSignature};
use infrastructure_composition::ComponentContext;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Calculator: Send + Sync {
    fn divide(&self, dividend: i64, divisor: i64) -> AopResult<i64>;
    fn describe(&self) -> AopResult<String>;
}

#[derive(Debug)]
struct DivisionByZero;

impl fmt::Display for DivisionByZero {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "除数为零")
    }
}

impl std::error::Error for DivisionByZero {}

#[derive(Default)]
struct CalculatorImpl {
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl Calculator for CalculatorImpl {
    fn divide(&self, dividend: i64, divisor: i64) -> AopResult<i64> {
        if let Some(log) = &self.log {
            log.lock().push("target".to_string());
        }
        if divisor == 0 {
            return Err(AopError::target(DivisionByZero));
        }
        Ok(dividend / divisor)
    }

    fn describe(&self) -> AopResult<String> {
        Ok("计算器".to_string())
    }
}

impl Calculator for Proxy<CalculatorImpl> {
    fn divide(&self, dividend: i64, divisor: i64) -> AopResult<i64> {
        self.invoke("divide", &[&dividend, &divisor], |target| {
            target.divide(dividend, divisor)
        })
    }

    fn describe(&self) -> AopResult<String> {
        self.invoke("describe", &[], CalculatorImpl::describe)
    }
}

fn calculator_type() -> ComponentType {
    ComponentType::of::<CalculatorImpl>()
        .with_method(
            MethodSignature::new("divide")
                .with_params(["i64", "i64"])
                .returning("i64")
                .with_annotation("Audited"),
        )
        .with_method(MethodSignature::new("describe").returning("String"))
        .exposes::<CalculatorImpl, dyn Calculator>("Calculator", |c| c as Arc<dyn Calculator>)
        .proxied_as::<CalculatorImpl, dyn Calculator>("Calculator", |p| {
            p as Arc<dyn Calculator>
        })
}

fn calculator(key: &str, log: Option<Arc<Mutex<Vec<String>>>>) -> ComponentDefinition {
    ComponentDefinition::of::<CalculatorImpl, _>(key, calculator_type(), move |_| {
        Ok(CalculatorImpl { log: log.clone() })
    })
}

fn push(log: &Arc<Mutex<Vec<String>>>, entry: &str) {
    log.lock().push(entry.to_string());
}

#[test]
fn test_only_named_component_is_proxied() -> anyhow::Result<()> {
    let audited = Arc::new(AtomicUsize::new(0));
    let calls = audited.clone();
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("audit")
                .before(
                    "logCall",
                    Pointcut::component_named("auditedSvc")?,
                    move |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                )
                .build(),
        )
        .register(calculator("svc", None))
        .register(calculator("auditedSvc", None))
        .build()?;
    context.refresh()?;

    let plain = context.get("svc")?;
    let proxied = context.get("auditedSvc")?;
    assert!(plain.is::<CalculatorImpl>());
    assert!(proxied.is::<Proxy<CalculatorImpl>>());

    context.get_as::<dyn Calculator>("svc")?.divide(6, 3)?;
    assert_eq!(audited.load(Ordering::SeqCst), 0);

    let calculator = context.get_as::<dyn Calculator>("auditedSvc")?;
    assert_eq!(calculator.divide(6, 3)?, 2);
    assert_eq!(calculator.describe()?, "计算器");
    assert_eq!(audited.load(Ordering::SeqCst), 2);
    assert_eq!(context.metrics().proxies_created, 1);
    Ok(())
}

#[test]
fn test_around_before_after_nesting() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (around_log, before_log, after_log) = (log.clone(), log.clone(), log.clone());

    // 声明顺序与执行顺序无关，排序只看通知种类
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("trace")
                .after("after", Pointcut::True, move |_| {
                    push(&after_log, "after");
                    Ok(())
                })
                .before("before", Pointcut::True, move |_| {
                    push(&before_log, "before");
                    Ok(())
                })
                .around("around", Pointcut::True, move |pjp| {
                    push(&around_log, "around:enter");
                    let outcome = pjp.proceed();
                    push(&around_log, "around:exit");
                    outcome
                })
                .build(),
        )
        .register(calculator("calc", Some(log.clone())))
        .build()?;

    let calculator = context.get_as::<dyn Calculator>("calc")?;
    assert_eq!(calculator.divide(9, 3)?, 3);
    assert_eq!(
        *log.lock(),
        ["around:enter", "before", "target", "after", "around:exit"]
    );

    let proxy = context.get_concrete::<Proxy<CalculatorImpl>>("calc")?;
    let kinds: Vec<AdviceKind> = proxy
        .advised()
        .chain_for("divide")
        .advisors()
        .iter()
        .map(|advisor| advisor.kind())
        .collect();
    assert_eq!(kinds, [AdviceKind::Around, AdviceKind::Before, AdviceKind::After]);
    Ok(())
}

#[test]
fn test_explicit_order_wins_within_the_same_kind() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first, second, unordered) = (log.clone(), log.clone(), log.clone());

    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("metrics")
                .with_order(20)
                .before("count", Pointcut::True, move |_| {
                    push(&second, "metrics");
                    Ok(())
                })
                .build(),
        )
        .add_aspect(
            AspectBuilder::new("security")
                .with_order(10)
                .before("check", Pointcut::True, move |_| {
                    push(&first, "security");
                    Ok(())
                })
                .build(),
        )
        .add_aspect(
            AspectBuilder::new("logging")
                .before("log", Pointcut::True, move |_| {
                    push(&unordered, "logging");
                    Ok(())
                })
                .build(),
        )
        .register(calculator("calc", None))
        .build()?;

    context.get_as::<dyn Calculator>("calc")?.describe()?;
    assert_eq!(*log.lock(), ["security", "metrics", "logging"]);
    Ok(())
}

#[test]
fn test_after_returning_and_after_throwing_are_exclusive() -> anyhow::Result<()> {
    let returned = Arc::new(Mutex::new(Vec::new()));
    let thrown = Arc::new(AtomicUsize::new(0));
    let finally = Arc::new(AtomicUsize::new(0));
    let (returned_sink, thrown_count, finally_count) =
        (returned.clone(), thrown.clone(), finally.clone());

    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("outcome")
                .after_returning(
                    "recordResult",
                    Pointcut::method_annotated("Audited"),
                    move |_, value| {
                        if let Some(value) = value.downcast_ref::<i64>() {
                            returned_sink.lock().push(*value);
                        }
                        Ok(())
                    },
                )
                .after_throwing(
                    "recordFailure",
                    Pointcut::method_annotated("Audited"),
                    move |_, error| {
                        assert!(error.is_target());
                        thrown_count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    },
                )
                .after("always", Pointcut::method_annotated("Audited"), move |_| {
                    finally_count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .build(),
        )
        .register(calculator("calc", None))
        .build()?;

    let calculator = context.get_as::<dyn Calculator>("calc")?;
    assert_eq!(calculator.divide(10, 2)?, 5);
    assert_eq!(*returned.lock(), [5]);
    assert_eq!(thrown.load(Ordering::SeqCst), 0);

    let error = calculator.divide(1, 0).unwrap_err();
    assert!(error.is_target());
    assert_eq!(*returned.lock(), [5]);
    assert_eq!(thrown.load(Ordering::SeqCst), 1);
    assert_eq!(finally.load(Ordering::SeqCst), 2);

    // 未标注的方法不经过这些通知
    calculator.describe()?;
    assert_eq!(finally.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_failing_before_advice_skips_target() -> anyhow::Result<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("guard")
                .before("deny", Pointcut::method_annotated("Audited"), |_| {
                    Err("拒绝访问".into())
                })
                .build(),
        )
        .register(calculator("calc", Some(log.clone())))
        .build()?;

    let error = context
        .get_as::<dyn Calculator>("calc")?
        .divide(4, 2)
        .unwrap_err();
    assert!(matches!(
        error,
        AopError::AdviceInvocation { ref advisor, .. } if advisor == "guard.deny"
    ));
    assert!(log.lock().is_empty());
    Ok(())
}

#[test]
fn test_no_matching_advisors_leaves_component_raw() -> anyhow::Result<()> {
    let context = ComponentContext::builder()
        .add_aspect(
            AspectBuilder::new("audit")
                .before("logCall", Pointcut::component_named("other*")?, |_| Ok(()))
                .build(),
        )
        .register(calculator("calc", None))
        .build()?;

    assert!(context.get("calc")?.is::<CalculatorImpl>());
    assert_eq!(context.metrics().proxies_created, 0);
    Ok(())
}
