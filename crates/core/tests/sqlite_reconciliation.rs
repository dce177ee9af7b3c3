//! End-to-end reconciliation: SQLite store, HTTP accrual client, real time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal_macros::dec;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gophermart_core::{
    AccrualConfig, AccrualReconciler, AccrualService, HttpAccrualClient, OrderStatus, OrderStore,
    ReconcilerConfig, SqliteOrderStore,
};

async fn wait_for_status(
    store: &SqliteOrderStore,
    number: &str,
    expected: OrderStatus,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Ok(Some(order)) = store.get_order(number).await {
            if order.status == expected {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_orders_reconciled_against_http_service() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = Arc::new(
        SqliteOrderStore::new(&temp_dir.path().join("orders.db")).expect("Failed to open store"),
    );
    store.add_order("alice", "9278923470").await.unwrap();
    store.add_order("bob", "12345678903").await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/9278923470"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "9278923470",
            "status": "PROCESSED",
            "accrual": 729.98
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/12345678903"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": "12345678903",
            "status": "INVALID"
        })))
        .mount(&server)
        .await;

    let accrual = HttpAccrualClient::new(AccrualConfig::new(server.uri())).unwrap();
    let reconciler = AccrualReconciler::new(
        ReconcilerConfig {
            poll_interval_ms: 50,
            ..Default::default()
        },
        Arc::clone(&store) as Arc<dyn OrderStore>,
        Arc::new(accrual) as Arc<dyn AccrualService>,
    )
    .unwrap();
    let handle = reconciler.start();

    assert!(
        wait_for_status(&store, "9278923470", OrderStatus::Processed, Duration::from_secs(5))
            .await
    );
    assert!(
        wait_for_status(&store, "12345678903", OrderStatus::Invalid, Duration::from_secs(5)).await
    );
    handle.stop().await.unwrap();

    let processed = store.get_order("9278923470").await.unwrap().unwrap();
    assert_eq!(processed.accrual, dec!(729.98));

    let invalid = store.get_order("12345678903").await.unwrap().unwrap();
    assert_eq!(invalid.accrual, dec!(0));

    // Both orders are final; discovery has nothing left to do.
    assert!(store.get_not_processed_orders().await.unwrap().is_empty());
    assert_eq!(reconciler.status().await.results_written, 2);
}
