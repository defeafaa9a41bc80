//! weft-aop 演示程序
//!
//! 构建一个订单服务切面类（业务方法与通知方法同在一个原型上），
//! 用声明式配置引导织入器，演示五种通知类型与拆除流程。

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing_subscriber::{fmt, EnvFilter};
use weft_aop::prelude::*;
use weft_aop::{AdviceKind, AopValue, ClassDescriptor, MethodDescriptor};

// ==================== 目标模块定义 ====================

type Log = Mutex<Vec<String>>;

fn push(target: &Target, entry: impl Into<String>) {
    if let Some(log) = target.state::<Log>() {
        log.lock().unwrap().push(entry.into());
    }
}

/// 订单服务：place / total 是业务方法，log* / time* 是通知方法
fn order_service_class() -> Arc<ClassDescriptor> {
    ClassDescriptor::builder("OrderService")
        .parent("Service")
        .meta_text("id", "orderService")
        .method(
            MethodDescriptor::from_fn("place", |t, args| {
                let item = args
                    .first()
                    .and_then(|v| v.downcast_ref::<String>())
                    .cloned()
                    .unwrap_or_default();
                push(t, format!("placed:{}", item));
                println!("   🛒 placing order for '{}'", item);
                Ok(AopValue::new(format!("order-{}", item)))
            })
            .with_param_names(["item"])
            .with_param_types(["String"]),
        )
        .method(
            MethodDescriptor::from_fn("total", |_t, args| {
                let a = args[0].downcast_ref::<i32>().copied().unwrap_or(0);
                let b = args[1].downcast_ref::<i32>().copied().unwrap_or(0);
                Ok(AopValue::new(a + b))
            })
            .with_param_names(["a", "b"])
            .with_param_types(["i32", "i32"]),
        )
        .method(MethodDescriptor::from_fn("reject", |_t, _a| {
            Err(AopError::Advice("out of stock".to_string()))
        }))
        .method(
            MethodDescriptor::from_fn("logEntry", |_t, args| {
                let jp = args[0].downcast_ref::<JoinPoint>().unwrap();
                tracing::info!("→ Entering: {}", jp);
                Ok(AopValue::unit())
            })
            .with_meta_text("argNames", "joinPoint"),
        )
        .method(
            MethodDescriptor::from_fn("logResult", |_t, args| {
                let result = args[1].downcast_ref::<i32>().copied().unwrap_or(0);
                tracing::info!("← Returned: {}", result);
                Ok(AopValue::unit())
            })
            .with_meta_text("argNames", "joinPoint,result"),
        )
        .method(
            MethodDescriptor::from_fn("logFailure", |_t, args| {
                let info = args[1].downcast_ref::<ErrorInfo>().unwrap();
                tracing::error!("❌ Exception: {}", info.message);
                Ok(AopValue::unit())
            })
            .with_meta_text("argNames", "joinPoint,error"),
        )
        .method(
            MethodDescriptor::from_fn("timed", |_t, args| {
                let proceed = args.last().and_then(|v| v.downcast_ref::<Proceed>()).unwrap();
                let start = Instant::now();
                let out = proceed.call()?;
                tracing::info!("⏱ took {:?}", start.elapsed());
                Ok(out)
            })
            .with_meta_text("argNames", "joinPoint"),
        )
        .build()
}

// ==================== 配置定义 ====================

fn demo_config() -> AopConfig {
    let advice = |kind: AdviceKind, method: &str, pointcut: &str| AdviceConfig {
        kind,
        method: method.to_string(),
        pointcut: Some(pointcut.to_string()),
        pointcut_ref: None,
        returning: None,
        throwing: None,
        arg_names: None,
    };

    AopConfig {
        pointcuts: vec![PointcutConfig {
            id: "orderCalls".to_string(),
            expression: "execution(* OrderService.place(..))".to_string(),
        }],
        aspects: vec![AspectConfig {
            id: "orderAspect".to_string(),
            module_ref: "demo.orderService".to_string(),
            order: 0,
            pointcuts: Vec::new(),
            advices: vec![
                AdviceConfig {
                    kind: AdviceKind::Before,
                    method: "logEntry".to_string(),
                    pointcut: None,
                    pointcut_ref: Some("orderCalls".to_string()),
                    returning: None,
                    throwing: None,
                    arg_names: None,
                },
                advice(
                    AdviceKind::AfterReturning,
                    "logResult",
                    "execution(* OrderService.total(..))",
                ),
                advice(
                    AdviceKind::AfterThrowing,
                    "logFailure",
                    "execution(* OrderService.reject(..))",
                ),
                advice(
                    AdviceKind::Around,
                    "timed",
                    "execution(* OrderService.total(..))",
                ),
            ],
        }],
        advisors: Vec::new(),
        proxy_target_class: false,
        use_aspect_j: false,
        frozen: false,
        expose_proxy: false,
    }
}

// ==================== 入口 ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    println!("🔷 weft-aop demo starting\n");

    // 注册目标模块并引导织入器
    let weaver = Weaver::new();
    weaver.modules().register_fn("demo.orderService", || async {
        Ok(Arc::new(Target::new(
            order_service_class(),
            Log::new(Vec::new()),
        )))
    });
    weaver.boot(demo_config()).await?;

    let proxy = weaver
        .proxy_of("orderAspect")
        .expect("aspect was just woven");

    // 前置通知
    println!("— before advice —");
    let order = proxy.invoke("place", &[AopValue::new("tea".to_string())])?;
    println!("   order id: {}\n", order.downcast_ref::<String>().unwrap());

    // 返回后通知 + 环绕通知
    println!("— afterReturning + around advice —");
    let total = proxy.invoke("total", &[AopValue::new(19_i32), AopValue::new(23_i32)])?;
    println!("   total: {}\n", total.downcast_ref::<i32>().unwrap());

    // 异常通知：观察后继续传播
    println!("— afterThrowing advice —");
    match proxy.invoke("reject", &[]) {
        Err(e) => println!("   caller still sees the error: {}\n", e),
        Ok(_) => unreachable!("reject always fails"),
    }

    // 拆除：代理撤销
    weaver.dispose().await?;
    match proxy.invoke("place", &[AopValue::new("x".to_string())]) {
        Err(e) => println!("— after dispose —\n   {}", e),
        Ok(_) => unreachable!("proxy was revoked"),
    }

    println!("\n🔷 weft-aop demo complete");
    Ok(())
}
