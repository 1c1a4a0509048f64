//! Services and gateway as separate processes, wired over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use gridline_core::EntityKind;
use gridline_server::app::{AppConfig, GatewayProcess, ServiceProcess};
use gridline_server::lifecycle::HealthState;
use gridline_server::rpc::RpcConfig;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn http(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let status = response[9..12].parse().unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

async fn events_consumed(addr: SocketAddr) -> u64 {
    let (status, body) = http(addr, "GET", "/health", "").await;
    assert_eq!(status, 200);
    let health: Value = serde_json::from_str(&body).unwrap();
    health["events_consumed"].as_u64().unwrap()
}

/// Repeats a search until the gateway sees its event, so the kind's relay
/// is known to be subscribed. Each search gets its own wait, which leaves
/// no event in flight when this returns.
async fn wait_for_stream(addr: SocketAddr, path: &str) {
    for _ in 0..50 {
        let before = events_consumed(addr).await;
        http(addr, "GET", path, "").await;
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if events_consumed(addr).await > before {
                return;
            }
        }
    }
    panic!("no audit events relayed for {path}");
}

fn stoppable<F>(
    run: impl FnOnce(oneshot::Receiver<()>) -> F,
) -> (oneshot::Sender<()>, JoinHandle<anyhow::Result<()>>)
where
    F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    (tx, tokio::spawn(run(rx)))
}

#[tokio::test]
async fn gateway_consumes_events_published_by_remote_services() {
    let mut config = AppConfig::default();
    config.drivers_rpc = RpcConfig::default();
    config.riders_rpc = RpcConfig::default();
    config.gateway.host = "127.0.0.1".into();
    config.gateway.port = 0;

    let drivers = ServiceProcess::start(EntityKind::Driver, config.clone()).await.unwrap();
    let riders = ServiceProcess::start(EntityKind::Rider, config.clone()).await.unwrap();
    config.drivers_pool.endpoint = drivers.rpc_addr().to_string();
    config.riders_pool.endpoint = riders.rpc_addr().to_string();
    let (driver_bus, rider_bus) = (drivers.bus(), riders.bus());

    let gateway = GatewayProcess::start(config).await.unwrap();
    let addr = gateway.gateway_addr();
    let lifecycle = gateway.lifecycle();

    let (stop_drivers, drivers) = stoppable(|rx| {
        drivers.run(async move {
            let _ = rx.await;
        })
    });
    let (stop_riders, riders) = stoppable(|rx| {
        riders.run(async move {
            let _ = rx.await;
        })
    });
    let (stop_gateway, gateway) = stoppable(|rx| {
        gateway.run(async move {
            let _ = rx.await;
        })
    });

    for _ in 0..100 {
        if lifecycle.health_state() == HealthState::Ready {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    wait_for_stream(addr, "/f1").await;
    wait_for_stream(addr, "/motogp").await;

    let consumed = events_consumed(addr).await;
    let published = driver_bus.published_count() + rider_bus.published_count();

    let body = r#"{"name":"Oscar","team":"McLaren"}"#;
    let (status, created) = http(addr, "POST", "/f1/add", body).await;
    assert_eq!(status, 200);
    let id = serde_json::from_str::<Value>(&created).unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = http(addr, "GET", &format!("/motogp/{id}"), "").await;
    assert_eq!(status, 404);
    let (status, _) = http(addr, "DELETE", &format!("/f1/{id}"), "").await;
    assert_eq!(status, 204);

    let mut seen = consumed;
    for _ in 0..100 {
        seen = events_consumed(addr).await;
        if seen >= consumed + 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(seen, consumed + 3);
    assert_eq!(
        driver_bus.published_count() + rider_bus.published_count(),
        published + 3
    );

    stop_gateway.send(()).unwrap();
    stop_drivers.send(()).unwrap();
    stop_riders.send(()).unwrap();
    for task in [gateway, drivers, riders] {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("process should stop")
            .unwrap()
            .unwrap();
    }
    assert!(driver_bus.is_closed());
    assert!(rider_bus.is_closed());
}
