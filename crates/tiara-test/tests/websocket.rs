//! WebSocket transport against the loopback pose service

use std::time::Duration;

use tiara_capture::TestPattern;
use tiara_core::{ChannelAlert, ChannelState, CloseCode};
use tiara_runtime::{Pipeline, PipelineConfig};
use tiara_test::{eventually, wait_for_status, FakeEstimator, PoseServer};
use tiara_transport::{BackoffPolicy, ChannelConfig, ChannelManager, WsConnector};

const WAIT: Duration = Duration::from_secs(10);

fn quick_backoff(endpoint: String, max_attempts: u32) -> ChannelConfig {
    let mut config = ChannelConfig::new(endpoint);
    config.backoff = BackoffPolicy {
        base_delay: Duration::from_millis(20),
        factor: 2.0,
        max_attempts,
    };
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_frames_round_trip_over_websocket() {
    let server = PoseServer::bind(FakeEstimator::new(11)).await.unwrap();
    let manager = ChannelManager::spawn(WsConnector::new(), ChannelConfig::new(server.endpoint()))
        .unwrap();
    manager.connect();
    wait_for_status(&manager.handle(), WAIT, |s| s.state == ChannelState::Open)
        .await
        .expect("websocket did not open");

    let mut config = PipelineConfig::default();
    config.channel.endpoint = server.endpoint();
    let pipeline = Pipeline::new(config, TestPattern::new(640, 480), manager.handle())
        .unwrap()
        .start()
        .unwrap();

    assert!(eventually(WAIT, || pipeline.transform().visible).await);
    assert!(eventually(WAIT, || pipeline.stats().messages_applied >= 3).await);

    let stats = pipeline.stats();
    assert!(server.frames_received() >= 3);
    assert_eq!(stats.malformed_messages, 0);
    assert_eq!(stats.encode_failures, 0);
    assert!(pipeline.transform().position.z >= 0.0);

    pipeline.stop().await;
    manager.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_normal_close_does_not_reconnect() {
    let server = PoseServer::bind(FakeEstimator::new(1)).await.unwrap();
    let manager = ChannelManager::spawn(WsConnector::new(), quick_backoff(server.endpoint(), 5))
        .unwrap();
    let channel = manager.handle();
    channel.connect();
    wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();

    server.close_connections(1000);
    let status = wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Closed)
        .await
        .unwrap();
    assert_eq!(status.last_close, Some(CloseCode::NORMAL));
    assert_eq!(status.alert, None);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(channel.state(), ChannelState::Closed);

    manager.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_going_away_triggers_reconnect() {
    let server = PoseServer::bind(FakeEstimator::new(2)).await.unwrap();
    let manager = ChannelManager::spawn(WsConnector::new(), quick_backoff(server.endpoint(), 5))
        .unwrap();
    let channel = manager.handle();
    channel.connect();
    wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();

    server.close_connections(1001);
    assert!(eventually(WAIT, || server.connections() == 2).await);
    let status = wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();
    assert_eq!(status.attempts, 0);
    assert_eq!(status.last_close, Some(CloseCode(1001)));

    manager.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_connection_is_abnormal() {
    let server = PoseServer::bind(FakeEstimator::new(3)).await.unwrap();
    let manager = ChannelManager::spawn(WsConnector::new(), quick_backoff(server.endpoint(), 5))
        .unwrap();
    let channel = manager.handle();
    channel.connect();
    wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();

    server.drop_connections();
    assert!(eventually(WAIT, || server.connections() == 2).await);
    let status = wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();
    assert_eq!(status.last_close, Some(CloseCode::ABNORMAL));

    manager.shutdown().await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_service_gives_up() {
    // Bind then release a port so nothing is listening on it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let manager =
        ChannelManager::spawn(WsConnector::new(), quick_backoff(format!("ws://{}/ws", addr), 2))
            .unwrap();
    let channel = manager.handle();
    channel.connect();

    let status = wait_for_status(&channel, WAIT, |s| s.is_terminal())
        .await
        .expect("channel never gave up");
    assert_eq!(status.alert, Some(ChannelAlert::Exhausted { attempts: 2 }));
    assert_eq!(manager.handle().stats().link_attempts, 3);

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_local_disconnect_closes_cleanly() {
    let server = PoseServer::bind(FakeEstimator::new(4)).await.unwrap();
    let manager = ChannelManager::spawn(WsConnector::new(), quick_backoff(server.endpoint(), 5))
        .unwrap();
    let channel = manager.handle();
    channel.connect();
    wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Open)
        .await
        .unwrap();

    channel.disconnect();
    let status = wait_for_status(&channel, WAIT, |s| s.state == ChannelState::Closed)
        .await
        .unwrap();
    assert_eq!(status.last_close, Some(CloseCode::NORMAL));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);

    manager.shutdown().await;
    server.shutdown().await;
}
