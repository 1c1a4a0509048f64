//! Gateway to RPC to domain service, over real TCP listeners.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use gridline_core::EntityKind;
use gridline_server::app::{AllInOne, AppConfig};
use gridline_server::events::EventBus;
use gridline_server::gateway::{GatewayClients, GatewayConfig, GatewayModule};
use gridline_server::lifecycle::{HealthState, Lifecycle};
use gridline_server::rpc::{ClientPoolConfig, RpcClientPool, RpcConfig, RpcServer};
use gridline_server::service::{DomainService, ServiceConfig};
use gridline_server::storage::MemoryStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::oneshot;
use tower::ServiceExt;

struct Stack {
    router: Router,
    bus: Arc<EventBus>,
    stops: Vec<oneshot::Sender<()>>,
}

async fn spawn_rpc(
    kind: EntityKind,
    bus: &Arc<EventBus>,
    lifecycle: &Arc<Lifecycle>,
) -> (SocketAddr, oneshot::Sender<()>) {
    let service = DomainService::new(
        Arc::new(MemoryStore::new(kind)),
        Arc::clone(bus) as Arc<dyn gridline_server::EventEmitter>,
        ServiceConfig::default(),
    );
    let mut server = RpcServer::new(
        Arc::new(service),
        RpcConfig::default(),
        Arc::clone(lifecycle),
    );
    let addr = server.start().await.unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.serve(async {
        let _ = rx.await;
    }));
    (addr, tx)
}

async fn stack() -> Stack {
    let bus = Arc::new(EventBus::new());
    let lifecycle = Arc::new(Lifecycle::new());
    let (drivers_addr, drivers_stop) = spawn_rpc(EntityKind::Driver, &bus, &lifecycle).await;
    let (riders_addr, riders_stop) = spawn_rpc(EntityKind::Rider, &bus, &lifecycle).await;

    let pool = |kind, addr: SocketAddr| -> Arc<dyn gridline_server::EntityClient> {
        let config = ClientPoolConfig::for_kind(kind).with_endpoint(addr.to_string());
        Arc::new(RpcClientPool::new(kind, &config))
    };
    let clients = GatewayClients {
        drivers: pool(EntityKind::Driver, drivers_addr),
        riders: pool(EntityKind::Rider, riders_addr),
    };
    let gateway = GatewayModule::new(GatewayConfig::default(), clients, lifecycle);

    Stack {
        router: gateway.build_router(),
        bus,
        stops: vec![drivers_stop, riders_stop],
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn driver_lifecycle_over_rest_and_graphql() {
    let stack = stack().await;
    let mut audit = stack.bus.subscribe(&[EntityKind::Driver.channel()]);

    let (status, created) = send(
        &stack.router,
        json_request("POST", "/f1/add", &json!({ "name": "Max", "team": "RedBull" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["name"], "Max");

    let (status, listed) = send(&stack.router, get("/f1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([{ "id": id, "name": "Max", "team": "RedBull" }]));

    let query = json!({ "query": format!(r#"{{ formula1Driver(id: "{id}") {{ name team }} }}"#) });
    let (status, body) = send(&stack.router, json_request("POST", "/graphql", &query)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["formula1Driver"], json!({ "name": "Max", "team": "RedBull" }));

    let (status, updated) = send(
        &stack.router,
        json_request("PUT", &format!("/f1/{id}"), &json!({ "name": "Max", "team": "Ferrari" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["team"], "Ferrari");

    let request = Request::delete(format!("/f1/{id}")).body(Body::empty()).unwrap();
    let (status, _) = send(&stack.router, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&stack.router, get(&format!("/f1/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let mut texts = Vec::new();
    for _ in 0..6 {
        let event = tokio::time::timeout(Duration::from_secs(1), audit.recv())
            .await
            .unwrap()
            .unwrap();
        texts.push(event.text);
    }
    assert!(texts[0].contains("\"name\":\"Max\""));
    assert_eq!(texts[1], "Searched for Drivers");
    assert_eq!(texts[2], format!("Searched for driver ID: {id}"));
    assert_eq!(texts[3], format!("Updated driver ID: {id}"));
    assert_eq!(texts[4], format!("Deleted driver ID: {id}"));
    assert_eq!(texts[5], format!("Searched for driver ID: {id}"));
    assert!(audit.try_recv().is_none());

    for stop in stack.stops {
        let _ = stop.send(());
    }
}

#[tokio::test]
async fn kinds_are_isolated() {
    let stack = stack().await;

    send(
        &stack.router,
        json_request("POST", "/motogp/add", &json!({ "name": "Pecco", "team": "Ducati" })),
    )
    .await;

    let (_, drivers) = send(&stack.router, get("/f1")).await;
    let (_, riders) = send(&stack.router, get("/motogp")).await;
    assert_eq!(drivers, json!([]));
    assert_eq!(riders.as_array().unwrap().len(), 1);

    let rider_id = riders[0]["id"].as_str().unwrap();
    let (status, _) = send(&stack.router, get(&format!("/f1/{rider_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_rejected_without_reaching_the_service() {
    let stack = stack().await;
    let mut audit = stack.bus.subscribe(&[]);

    let request = Request::post("/f1/add")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&stack.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");
    assert!(audit.try_recv().is_none());
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn all_in_one_serves_and_shuts_down_in_order() {
    let mut config = AppConfig::default();
    config.gateway.host = "127.0.0.1".into();
    config.gateway.port = 0;
    config.drivers_rpc = RpcConfig::default();
    config.riders_rpc = RpcConfig::default();

    let app = AllInOne::start(config).await.unwrap();
    let addr = app.gateway_addr();
    assert!(app.rpc_addr(EntityKind::Driver).is_some());
    let lifecycle = app.lifecycle();
    let bus = app.bus();

    let (tx, rx) = oneshot::channel::<()>();
    let running = tokio::spawn(app.run(async {
        let _ = rx.await;
    }));

    let mut ready = false;
    for _ in 0..100 {
        if lifecycle.health_state() == HealthState::Ready {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready);

    let response = http_get(addr, "/health/live").await;
    assert!(response.starts_with("HTTP/1.1 200"), "got {response}");
    let response = http_get(addr, "/motogp").await;
    assert!(response.starts_with("HTTP/1.1 200"), "got {response}");
    assert!(response.ends_with("[]"));

    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("shutdown should finish")
        .unwrap()
        .unwrap();

    assert_eq!(lifecycle.health_state(), HealthState::Stopped);
    assert!(bus.is_closed());
    assert_eq!(bus.published_count(), 1);
}
