//! Integration tests for the web service HTTP surface.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use broker::{Consumer, InMemoryBroker, MessageEnvelope, MessageKind, Producer};
use common::queues;
use domain::{
    InMemoryCustomerRepository, InMemorySubscriptionRepository, StaticRateService,
    SubscriptionRepository, SubscriptionStatus,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CustomerCreationHandler, CustomerCreationSaga};
use server::{WebState, runtime};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    subscriptions: Arc<InMemorySubscriptionRepository>,
    broker: Arc<InMemoryBroker>,
    rates: StaticRateService,
    saga: Arc<CustomerCreationSaga<InMemorySubscriptionRepository, InMemoryBroker>>,
}

fn setup() -> TestApp {
    let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
    let broker = Arc::new(InMemoryBroker::new());
    let rates = StaticRateService::new(27.5);
    let saga = Arc::new(CustomerCreationSaga::new(
        Arc::clone(&subscriptions),
        Producer::new(Arc::clone(&broker)),
    ));
    let state = Arc::new(WebState {
        saga: Arc::clone(&saga),
        rates: Arc::new(rates.clone()),
    });
    TestApp {
        app: server::create_web_app(state, get_metrics_handle()),
        subscriptions,
        broker,
        rates,
        saga,
    }
}

fn subscribe_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/subscribe")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let TestApp { app, .. } = setup();

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "web");
}

#[tokio::test]
async fn test_ops_app_health_names_service() {
    let app = server::create_ops_app("mailer", get_metrics_handle());

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["service"], "mailer");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let TestApp { app, .. } = setup();

    metrics::counter!("api_test_marker_total").increment(1);
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert!(body_text(response).await.contains("api_test_marker_total"));
}

mod rate {
    use super::*;

    #[tokio::test]
    async fn test_returns_plain_text_rate() {
        let TestApp { app, rates, .. } = setup();
        rates.set_rate(41.234567).await;

        let response = app.oneshot(get_request("/rate")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "41.234567");
    }

    #[tokio::test]
    async fn test_pads_to_six_decimals() {
        let TestApp { app, .. } = setup();

        let response = app.oneshot(get_request("/rate")).await.unwrap();
        assert_eq!(body_text(response).await, "27.500000");
    }

    #[tokio::test]
    async fn test_source_failure_is_server_error() {
        let TestApp { app, rates, .. } = setup();
        rates.set_failure("all sources down").await;

        let response = app.oneshot(get_request("/rate")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(json["error"].is_string());
    }
}

mod subscribe {
    use super::*;

    #[tokio::test]
    async fn test_accepts_and_publishes_request() {
        let TestApp {
            app,
            subscriptions,
            broker,
            ..
        } = setup();

        let response = app.oneshot(subscribe_request("email=a%40x.com")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.is_empty());

        let row = subscriptions.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(row.status, SubscriptionStatus::Pending);

        let published = broker.published(queues::CREATE_CUSTOMER_REQUEST).await;
        assert_eq!(published.len(), 1);
        let envelope = MessageEnvelope::decode(&published[0]).unwrap();
        assert_eq!(envelope.kind(), MessageKind::CreateCustomerRequest);
    }

    #[tokio::test]
    async fn test_malformed_email_is_unprocessable() {
        let TestApp {
            app, subscriptions, ..
        } = setup();

        let response = app.oneshot(subscribe_request("email=not-an-email")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(subscriptions.count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_email_is_unprocessable() {
        let TestApp { app, .. } = setup();

        let response = app.oneshot(subscribe_request("")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let TestApp { app, broker, .. } = setup();

        let first = app
            .clone()
            .oneshot(subscribe_request("email=a%40x.com"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(subscribe_request("email=a%40x.com")).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        assert_eq!(
            broker.published(queues::CREATE_CUSTOMER_REQUEST).await.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_server_error() {
        let TestApp {
            app, subscriptions, ..
        } = setup();
        subscriptions.set_fail_on_create(true);

        let response = app.oneshot(subscribe_request("email=a%40x.com")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_publish_failure_leaves_no_row() {
        let TestApp {
            app,
            subscriptions,
            broker,
            ..
        } = setup();
        broker.set_fail_on_publish(true);

        let response = app.oneshot(subscribe_request("email=a%40x.com")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(subscriptions.count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_bad_request() {
        let TestApp { app, .. } = setup();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/subscribe")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"email":"a@x.com"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_subscription_confirmed_after_customer_created() {
    let TestApp {
        app,
        subscriptions,
        broker,
        saga,
        ..
    } = setup();

    let customers = Arc::new(InMemoryCustomerRepository::new());
    let handler = Arc::new(CustomerCreationHandler::new(
        Arc::clone(&customers),
        Producer::new(Arc::clone(&broker)),
    ));
    let customer_side = Consumer::new(Arc::clone(&broker), queues::CREATE_CUSTOMER_REQUEST)
        .handler(MessageKind::CreateCustomerRequest, handler)
        .start_listening()
        .await
        .unwrap();
    let web_side = Consumer::new(Arc::clone(&broker), queues::CREATE_CUSTOMER_RESPONSE)
        .handler(MessageKind::CreateCustomerResponse, saga)
        .start_listening()
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(subscribe_request("email=a%40x.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let row = subscriptions.find_by_email("a@x.com").await.unwrap();
            if row.is_some_and(|s| s.status == SubscriptionStatus::Confirmed) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscription was not confirmed");
    assert_eq!(customers.count().await, 1);

    let again = app.oneshot(subscribe_request("email=a%40x.com")).await.unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);

    runtime::stop_consumers(
        broker.as_ref(),
        vec![customer_side, web_side],
        Duration::from_secs(2),
    )
    .await;
}
