use super::*;
use crate::flow::FlowKey;
use crate::timeline::Position;

fn make_update(key: FlowKey, checkpoint: u64) -> ViewUpdate {
    ViewUpdate {
        key,
        checkpoint: Some(Position(checkpoint)),
        state: serde_json::json!({ "checkpoint": checkpoint }),
    }
}

#[test]
fn test_view_type_matches_exact() {
    assert!(view_type_matches("orders", "orders"));
    assert!(!view_type_matches("orders", "inventory"));
}

#[test]
fn test_view_type_matches_wildcard() {
    assert!(view_type_matches("orders", "#"));
    assert!(view_type_matches("anything", "#"));
}

#[test]
fn test_view_type_matches_hierarchical() {
    assert!(view_type_matches("orders.summary", "orders"));
    assert!(view_type_matches("orders.summary.daily", "orders"));
    assert!(!view_type_matches("orders", "orders.summary"));
    assert!(!view_type_matches("ordersextra", "orders")); // No dot separator
}

#[tokio::test]
async fn test_push_without_subscribers_succeeds() {
    let exchange = ChannelExchange::new();

    let result = exchange
        .push_update(make_update(FlowKey::singleton("orders"), 1))
        .await;

    assert!(result.is_ok());
    assert_eq!(exchange.subscriber_count(), 0);
}

#[tokio::test]
async fn test_subscriber_receives_update() {
    let exchange = ChannelExchange::new();
    let mut subscription = exchange.subscribe_all();

    exchange
        .push_update(make_update(FlowKey::singleton("orders"), 3))
        .await
        .unwrap();

    let update = subscription.recv().await.unwrap();
    assert_eq!(update.key, FlowKey::singleton("orders"));
    assert_eq!(update.checkpoint, Some(Position(3)));
}

#[tokio::test]
async fn test_subscriber_filters_by_view_type() {
    let exchange = ChannelExchange::new();
    let mut subscription = exchange.subscribe("orders");

    exchange
        .push_update(make_update(FlowKey::singleton("inventory"), 1))
        .await
        .unwrap();
    exchange
        .push_update(make_update(FlowKey::instance("orders.detail", "9"), 2))
        .await
        .unwrap();

    let update = subscription.recv().await.unwrap();
    assert_eq!(update.key, FlowKey::instance("orders.detail", "9"));
}

#[tokio::test]
async fn test_lagged_subscriber_skips_to_retained_updates() {
    let exchange = ChannelExchange::with_capacity(2);
    let mut subscription = exchange.subscribe_all();

    for checkpoint in 1..=4 {
        exchange
            .push_update(make_update(FlowKey::singleton("orders"), checkpoint))
            .await
            .unwrap();
    }

    let update = subscription.recv().await.unwrap();
    assert_eq!(update.checkpoint, Some(Position(3)));
}

#[tokio::test]
async fn test_recv_returns_none_when_exchange_dropped() {
    let exchange = ChannelExchange::new();
    let mut subscription = exchange.subscribe_all();
    drop(exchange);

    assert!(subscription.recv().await.is_none());
}
