//! MeshRPC Integration Tests
//!
//! End-to-end scenarios through the facade crate: real servers and clients
//! on 127.0.0.1, discovery through a shared in-process registry.

use meshrpc::client::{ClientConfig, ClientEndpoint};
use meshrpc::common::transport::FrameCodec;
use meshrpc::{
    Bootstrap, CallContext, Extensions, ProtocolConfig, Provider, ReferenceConfig, Request, RpcError,
    ServiceConfig, ServiceStub, Url,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

const INTERFACE: &str = "demo.Greeter";

fn ephemeral(interface: &str) -> ServiceConfig {
    ServiceConfig {
        protocols: vec![ProtocolConfig {
            port: 0,
            ..ProtocolConfig::default()
        }],
        ..ServiceConfig::new(interface)
    }
}

async fn export(extensions: &Extensions, provider: Provider) -> Bootstrap {
    let bootstrap = Bootstrap::new(extensions.clone());
    bootstrap
        .export(&provider, &ephemeral(provider.interface_name()))
        .await
        .unwrap();
    bootstrap
}

fn greeter(hits: Arc<AtomicUsize>) -> Provider {
    Provider::builder(INTERFACE)
        .method("greet", move |args| {
            hits.fetch_add(1, Ordering::SeqCst);
            let name = args.first().and_then(|v| v.as_str()).unwrap_or("stranger");
            Ok(json!(format!("hello, {}", name)))
        })
        .method("echo", |args| Ok(args.into_iter().next().unwrap_or_default()))
        .method("whoami", |_| {
            let context = CallContext::current().ok_or_else(|| anyhow::anyhow!("no call context"))?;
            Ok(json!({
                "method": context.method_name,
                "group": context.attachments.get("group"),
                "remote": context.remote_addr.is_some(),
            }))
        })
        .build()
}

/// Same interface, none of the methods: every call is a framework error.
fn hollow() -> Provider {
    Provider::builder(INTERFACE).build()
}

async fn refer(bootstrap: &Bootstrap, config: ReferenceConfig) -> ServiceStub {
    bootstrap.refer(&config).await.unwrap()
}

#[tokio::test]
async fn test_round_trip_through_stub() {
    let extensions = Extensions::with_defaults();
    let hits = Arc::new(AtomicUsize::new(0));
    let provider = export(&extensions, greeter(hits.clone())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(&consumer, ReferenceConfig::new(INTERFACE)).await;

    assert_eq!(stub.call("greet", vec![json!("mesh")]).await, Ok(json!("hello, mesh")));
    let greeting: String = stub.call_as("greet", vec![]).await.unwrap();
    assert_eq!(greeting, "hello, stranger");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    stub.destroy().await;
    provider.shutdown().await;
}

#[tokio::test]
async fn test_call_context_reaches_provider() {
    let extensions = Extensions::with_defaults();
    let provider = export(&extensions, greeter(Arc::default())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(&consumer, ReferenceConfig::new(INTERFACE)).await;

    assert_eq!(
        stub.call("whoami", vec![]).await,
        Ok(json!({"method": "whoami", "group": "default", "remote": true}))
    );

    stub.destroy().await;
    provider.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_correlate() {
    let extensions = Extensions::with_defaults();
    let provider = export(&extensions, greeter(Arc::default())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = Arc::new(refer(&consumer, ReferenceConfig::new(INTERFACE)).await);

    let calls = (0..50).map(|i| {
        let stub = stub.clone();
        tokio::spawn(async move { (i, stub.call("echo", vec![json!(i)]).await) })
    });
    for call in futures::future::join_all(calls).await {
        let (i, result) = call.unwrap();
        assert_eq!(result, Ok(json!(i)));
    }

    stub.destroy().await;
    provider.shutdown().await;
}

#[tokio::test]
async fn test_oneway_is_delivered() {
    let extensions = Extensions::with_defaults();
    let hits = Arc::new(AtomicUsize::new(0));
    let provider = export(&extensions, greeter(hits.clone())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(&consumer, ReferenceConfig::new(INTERFACE)).await;
    stub.call_oneway("greet", vec![json!("nobody")]).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while hits.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "oneway call never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    stub.destroy().await;
    provider.shutdown().await;
}

#[tokio::test]
async fn test_failover_skips_failing_provider() {
    let extensions = Extensions::with_defaults();
    let hits = Arc::new(AtomicUsize::new(0));
    let a = export(&extensions, hollow()).await;
    let b = export(&extensions, greeter(hits.clone())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(
        &consumer,
        ReferenceConfig {
            load_balance: Some("roundrobin".into()),
            ha_strategy: Some("failover".into()),
            retries: Some(1),
            ..ReferenceConfig::new(INTERFACE)
        },
    )
    .await;

    for _ in 0..6 {
        assert_eq!(stub.call("greet", vec![json!("b")]).await, Ok(json!("hello, b")));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 6);

    stub.destroy().await;
    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_failfast_surfaces_first_failure() {
    let extensions = Extensions::with_defaults();
    let hits = Arc::new(AtomicUsize::new(0));
    let a = export(&extensions, hollow()).await;
    let b = export(&extensions, greeter(hits.clone())).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(
        &consumer,
        ReferenceConfig {
            load_balance: Some("roundrobin".into()),
            ha_strategy: Some("failfast".into()),
            retries: Some(3),
            ..ReferenceConfig::new(INTERFACE)
        },
    )
    .await;

    let mut failures = 0;
    for _ in 0..6 {
        match stub.call("greet", vec![]).await {
            Ok(_) => {}
            Err(RpcError::Framework(_)) => failures += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(failures, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    stub.destroy().await;
    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_business_error_reaches_caller_once() {
    let extensions = Extensions::with_defaults();
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let provider = Provider::builder(INTERFACE)
        .method("withdraw", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("insufficient funds")
        })
        .build();
    let server = export(&extensions, provider).await;

    let consumer = Bootstrap::new(extensions.clone());
    let stub = refer(
        &consumer,
        ReferenceConfig {
            ha_strategy: Some("failover".into()),
            retries: Some(5),
            ..ReferenceConfig::new(INTERFACE)
        },
    )
    .await;

    assert_eq!(
        stub.call("withdraw", vec![json!(100)]).await,
        Err(RpcError::Business("insufficient funds".into()))
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    stub.destroy().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_silent_server_times_out_and_clears_pending() {
    // accepts and reads, never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
            });
        }
    });

    let url = Url::new("meshrpc", "127.0.0.1", addr.port(), INTERFACE);
    let config = ClientConfig {
        request_timeout: Duration::from_millis(100),
        sweep_interval: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    let endpoint = ClientEndpoint::new(url, config, FrameCodec::json());
    endpoint.open().await.unwrap();

    let started = Instant::now();
    let result = endpoint
        .invoke_sync(&Request::new(INTERFACE, "greet", vec![]))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result.unwrap_err(), RpcError::Timeout(100));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed <= Duration::from_millis(150 + 100), "took {:?}", elapsed);
    assert_eq!(endpoint.pending_count(), 0);

    endpoint.close().await;
}
