//! Connection lifecycle across two viewers sharing one store

use document_store::{Collection, DocumentStore, MemoryStore, Patch, StoreError};
use graph_service::{
    ConnectionGraph, ConnectionStatus, EdgeStatus, GraphConfig, GraphError, RelationAction,
};
use identity_core::{SessionIdentity, UserId, Viewer};
use serde_json::json;
use std::sync::Arc;

fn uid(s: &str) -> UserId {
    UserId::new(s).unwrap()
}

struct Pair {
    store: Arc<MemoryStore>,
    u1: ConnectionGraph,
    u2: ConnectionGraph,
}

fn graph_for(store: &Arc<MemoryStore>, viewer: &str, config: GraphConfig) -> ConnectionGraph {
    let identity = SessionIdentity::signed_in(Viewer::new(uid(viewer), viewer));
    ConnectionGraph::new(store.clone(), Arc::new(identity), config)
}

fn pair(config: GraphConfig) -> Pair {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(MemoryStore::new());
    Pair {
        u1: graph_for(&store, "u1", config.clone()),
        u2: graph_for(&store, "u2", config),
        store,
    }
}

impl Pair {
    async fn sync(&self) {
        self.u1.refresh().await.unwrap();
        self.u2.refresh().await.unwrap();
    }
}

#[tokio::test]
async fn test_request_accept_remove_lifecycle() {
    let p = pair(GraphConfig::default());

    p.u1.send_request(&uid("u2")).await.unwrap();
    p.sync().await;
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::PendingSent);
    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::PendingReceived);

    p.u2.accept_request(&uid("u1")).await.unwrap();
    p.sync().await;
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::Connected);
    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::Connected);

    p.u1.remove_connection(&uid("u2")).await.unwrap();
    p.sync().await;
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::NotConnected);
    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::NotConnected);
    assert_eq!(p.store.len(Collection::Connections).await, 0);
}

#[tokio::test]
async fn test_third_user_sees_nothing() {
    let p = pair(GraphConfig::default());
    let u3 = graph_for(&p.store, "u3", GraphConfig::default());

    p.u1.send_request(&uid("u2")).await.unwrap();
    u3.refresh().await.unwrap();

    assert_eq!(u3.status(&uid("u1")), ConnectionStatus::NotConnected);
    assert_eq!(u3.status(&uid("u2")), ConnectionStatus::NotConnected);
}

#[tokio::test]
async fn test_stored_edge_shape() {
    let p = pair(GraphConfig::default());
    p.u2.send_request(&uid("u1")).await.unwrap();

    let doc = p
        .store
        .get(Collection::Connections, "u1_u2")
        .await
        .unwrap()
        .expect("edge stored under canonical id");

    assert_eq!(doc.get_str("requesterId"), Some("u2"));
    assert_eq!(doc.get_str("status"), Some("pending"));
    assert!(doc.get_str("createdAt").is_some());
    assert!(doc.get_str("updatedAt").is_some());
}

#[tokio::test]
async fn test_decline_and_remove_are_idempotent() {
    let p = pair(GraphConfig::default());
    p.u1.send_request(&uid("u2")).await.unwrap();
    p.sync().await;

    p.u2.decline_request(&uid("u1")).await.unwrap();
    p.u2.decline_request(&uid("u1")).await.unwrap();
    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::NotConnected);

    p.sync().await;
    p.u1.remove_connection(&uid("u2")).await.unwrap();
    p.u1.remove_connection(&uid("u2")).await.unwrap();
    p.u1.refresh().await.unwrap();
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::NotConnected);
}

/// Where the u1/u2 pair starts before u1 deletes the edge
#[derive(Debug, Clone, Copy)]
enum Start {
    NoEdge,
    SentByViewer,
    ReceivedByViewer,
    Connected,
    /// Connected in the store, still pending in u1's snapshot
    StaleSnapshot,
}

async fn seed_edge(p: &Pair, requester: &str, status: &str) {
    let patch = Patch::new()
        .set("users", json!(["u1", "u2"]))
        .set("requesterId", requester)
        .set("status", status)
        .server_timestamp("createdAt")
        .server_timestamp("updatedAt");
    p.store
        .set(Collection::Connections, "u1_u2", patch)
        .await
        .unwrap();
}

async fn delete(
    graph: &ConnectionGraph,
    target: &UserId,
    action: RelationAction,
) -> Result<(), GraphError> {
    match action {
        RelationAction::Decline => graph.decline_request(target).await,
        RelationAction::Cancel => graph.cancel_request(target).await,
        RelationAction::Remove => graph.remove_connection(target).await,
        other => panic!("{other} is not a delete"),
    }
}

#[tokio::test]
async fn test_deletes_succeed_from_every_state() {
    let starts = [
        Start::NoEdge,
        Start::SentByViewer,
        Start::ReceivedByViewer,
        Start::Connected,
        Start::StaleSnapshot,
    ];
    let actions = [
        RelationAction::Decline,
        RelationAction::Cancel,
        RelationAction::Remove,
    ];

    for config in [GraphConfig::default(), GraphConfig::permissive()] {
        for start in starts {
            for action in actions {
                let p = pair(config.clone());
                match start {
                    Start::NoEdge => {}
                    Start::SentByViewer | Start::StaleSnapshot => {
                        seed_edge(&p, "u1", "pending").await
                    }
                    Start::ReceivedByViewer => seed_edge(&p, "u2", "pending").await,
                    Start::Connected => seed_edge(&p, "u2", "connected").await,
                }
                p.sync().await;
                if let Start::StaleSnapshot = start {
                    seed_edge(&p, "u2", "connected").await;
                }

                for attempt in 0..2 {
                    if let Err(e) = delete(&p.u1, &uid("u2"), action).await {
                        panic!("{action} from {start:?}, attempt {attempt}: {e}");
                    }
                }

                assert_eq!(
                    p.store.len(Collection::Connections).await,
                    0,
                    "{action} from {start:?} left the edge stored"
                );
                p.sync().await;
                assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::NotConnected);
                assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::NotConnected);
            }
        }
    }
}

#[tokio::test]
async fn test_deletes_still_require_viewer_and_other_user() {
    let p = pair(GraphConfig::default());
    p.u1.send_request(&uid("u2")).await.unwrap();

    for action in [
        RelationAction::Decline,
        RelationAction::Cancel,
        RelationAction::Remove,
    ] {
        assert!(matches!(
            delete(&p.u1, &uid("u1"), action).await,
            Err(GraphError::SelfConnection)
        ));
    }
    assert_eq!(p.store.len(Collection::Connections).await, 1);
}

#[tokio::test]
async fn test_requester_can_cancel() {
    let p = pair(GraphConfig::default());
    p.u1.send_request(&uid("u2")).await.unwrap();

    p.u1.cancel_request(&uid("u2")).await.unwrap();
    p.sync().await;

    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::NotConnected);
    assert!(p.u2.incoming_requests().is_empty());
}

#[tokio::test]
async fn test_unauthenticated_fails_fast() {
    let store = Arc::new(MemoryStore::new());
    let graph = ConnectionGraph::new(
        store.clone(),
        Arc::new(SessionIdentity::default()),
        GraphConfig::default(),
    );

    assert!(matches!(
        graph.send_request(&uid("u2")).await,
        Err(GraphError::Unauthenticated)
    ));
    assert!(matches!(
        graph.accept_request(&uid("u2")).await,
        Err(GraphError::Unauthenticated)
    ));
    assert!(matches!(
        graph.decline_request(&uid("u2")).await,
        Err(GraphError::Unauthenticated)
    ));
    assert!(matches!(
        graph.remove_connection(&uid("u2")).await,
        Err(GraphError::Unauthenticated)
    ));
    assert_eq!(store.len(Collection::Connections).await, 0);
}

#[tokio::test]
async fn test_self_request_rejected() {
    let p = pair(GraphConfig::permissive());
    assert!(matches!(
        p.u1.send_request(&uid("u1")).await,
        Err(GraphError::SelfConnection)
    ));
}

#[tokio::test]
async fn test_strict_rejects_accepting_own_request() {
    let p = pair(GraphConfig::default());
    p.u1.send_request(&uid("u2")).await.unwrap();

    let err = p.u1.accept_request(&uid("u2")).await.unwrap_err();
    match err {
        GraphError::InvalidTransition(e) => assert_eq!(e.action, RelationAction::Accept),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::PendingSent);
}

#[tokio::test]
async fn test_strict_rejects_request_over_connected_edge() {
    let p = pair(GraphConfig::default());
    p.u1.send_request(&uid("u2")).await.unwrap();
    p.sync().await;
    p.u2.accept_request(&uid("u1")).await.unwrap();
    p.sync().await;

    assert!(matches!(
        p.u2.send_request(&uid("u1")).await,
        Err(GraphError::InvalidTransition(_))
    ));
    assert!(matches!(
        p.u1.accept_request(&uid("u2")).await,
        Err(GraphError::InvalidTransition(_))
    ));
}

#[tokio::test]
async fn test_permissive_request_overwrites_connected_edge() {
    let p = pair(GraphConfig::permissive());
    p.u1.send_request(&uid("u2")).await.unwrap();
    p.u2.accept_request(&uid("u1")).await.unwrap();
    p.sync().await;
    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::Connected);

    // Clobbers the connected edge into a fresh pending one
    let edge = p.u2.send_request(&uid("u1")).await.unwrap();
    assert_eq!(edge.status, EdgeStatus::Pending);
    p.sync().await;

    assert_eq!(p.u1.status(&uid("u2")), ConnectionStatus::PendingReceived);
    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::PendingSent);
}

#[tokio::test]
async fn test_permissive_accept_own_request_flips_status() {
    let p = pair(GraphConfig::permissive());
    p.u1.send_request(&uid("u2")).await.unwrap();

    p.u1.accept_request(&uid("u2")).await.unwrap();
    p.sync().await;

    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_permissive_accept_without_edge_is_storage_not_found() {
    let p = pair(GraphConfig::permissive());

    let err = p.u2.accept_request(&uid("u1")).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::Storage(StoreError::NotFound { .. })
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_live_subscription_keeps_snapshot_fresh() {
    use std::time::Duration;

    let p = pair(GraphConfig::default());
    let mut live = p
        .store
        .subscribe(ConnectionGraph::watch_query(&uid("u2")))
        .await
        .unwrap();
    let initial = live.next().await.unwrap();
    p.u2.apply_snapshot(&initial);

    p.u1.send_request(&uid("u2")).await.unwrap();

    let pushed = tokio::time::timeout(Duration::from_secs(1), live.next())
        .await
        .unwrap()
        .unwrap();
    p.u2.apply_snapshot(&pushed);

    assert_eq!(p.u2.status(&uid("u1")), ConnectionStatus::PendingReceived);
}
