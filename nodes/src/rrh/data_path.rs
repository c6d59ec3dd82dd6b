//! UE-facing HTTP data path of the proxy

use super::RrhProxy;
use crate::NodeError;
use axum::extract::{ConnectInfo, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

/// Router relaying any GET to the UE's vBBU
pub fn router(proxy: Arc<RrhProxy>) -> Router {
    Router::new()
        .route("/", get(relay))
        .route("/{*path}", get(relay))
        .with_state(proxy)
}

async fn relay(
    State(proxy): State<Arc<RrhProxy>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Response {
    let ue_ip = match peer.ip() {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    };
    let Some(ue_ip) = ue_ip else {
        return (StatusCode::FORBIDDEN, format!("Unknown client {}", peer.ip())).into_response();
    };

    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

    match proxy.forward(ue_ip, path_and_query).await {
        Ok((status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, body).into_response()
        }
        Err(NodeError::UnknownClient(ip)) => {
            warn!("Unknown client {}", ip);
            (StatusCode::FORBIDDEN, format!("Unknown client {}", ip)).into_response()
        }
        Err(e) => {
            warn!("Failed forwarding {}: {}", ue_ip, e);
            (StatusCode::BAD_GATEWAY, format!("Forwarding failed: {}", e)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rrh::tests::test_config;
    use axum::extract::Query;
    use common::types::Endpoint;
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn spawn_vbbu_stub(tag: &'static str) -> Endpoint {
        let app = Router::new().route(
            "/",
            get(move |Query(params): Query<HashMap<String, String>>| async move {
                match params.get("value") {
                    Some(value) => (StatusCode::OK, format!("{}:{}", tag, value)),
                    None => (StatusCode::SERVICE_UNAVAILABLE, String::new()),
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Endpoint::from(addr)
    }

    async fn spawn_proxy(proxy: Arc<RrhProxy>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router(proxy).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_relay_status_and_body() {
        let primary = spawn_vbbu_stub("primary").await;
        let proxy = Arc::new(RrhProxy::new(&test_config(primary)).unwrap());
        let base = spawn_proxy(proxy).await;

        let ok = reqwest::get(format!("{}/?ue_id=1&value=7", base)).await.unwrap();
        assert_eq!(ok.status(), reqwest::StatusCode::OK);
        assert_eq!(ok.text().await.unwrap(), "primary:7");

        let unavailable = reqwest::get(format!("{}/?ue_id=1", base)).await.unwrap();
        assert_eq!(unavailable.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_redirect_reaches_new_vbbu() {
        let primary = spawn_vbbu_stub("primary").await;
        let secondary = spawn_vbbu_stub("secondary").await;
        let proxy = Arc::new(RrhProxy::new(&test_config(primary)).unwrap());
        proxy.set_redirect(primary, secondary);
        let base = spawn_proxy(proxy.clone()).await;

        let body = reqwest::get(format!("{}/?value=1", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "secondary:1");
        assert_eq!(proxy.routes()[&"127.0.0.1".parse().unwrap()], secondary);
    }

    #[tokio::test]
    async fn test_gateway_failure_and_unknown_client() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = Endpoint::from(listener.local_addr().unwrap());
        drop(listener);

        let proxy = Arc::new(RrhProxy::new(&test_config(dead)).unwrap());
        let base = spawn_proxy(proxy).await;

        let response = reqwest::get(format!("{}/?value=1", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        assert!(response.text().await.unwrap().starts_with("Forwarding failed"));

        let mut config = test_config(dead);
        config.ue_count = 0;
        let empty = Arc::new(RrhProxy::new(&config).unwrap());
        let base = spawn_proxy(empty).await;

        let response = reqwest::get(format!("{}/", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
        assert_eq!(response.text().await.unwrap(), "Unknown client 127.0.0.1");
    }
}
