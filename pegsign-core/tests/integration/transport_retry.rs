use crate::fixtures::{protocol_with_attempts, simulator, TEST_BTC_REMOTE_KEY_ID};
use pegsign_core::foundation::{BridgeError, ProtocolVersion};
use pegsign_core::infrastructure::signer::codes::{CODE_DEVICE_NOT_READY, CODE_KEY_REJECTED};
use pegsign_core::infrastructure::signer::commands::{CMD_GET_PUBKEY, CMD_VERSION, FIELD_KEY_ID, FIELD_PUBKEY};
use pegsign_core::infrastructure::signer::{command, ConnectionPool, SignerProtocol, TcpConnectionPool};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_protocol_when_device_unreachable_then_every_attempt_leases_and_returns_one_connection() {
    let sim = simulator(ProtocolVersion::V3);
    sim.set_unreachable(true);
    let protocol = protocol_with_attempts(&sim, 4);

    let err = protocol.get_version().await.expect_err("unreachable");
    assert!(matches!(err, BridgeError::SignerUnreachable { attempts: 4, .. }), "{}", err);
    assert!(err.is_irrecoverable());

    let stats = sim.stats();
    assert_eq!(stats.acquires.load(Ordering::SeqCst), 4);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 4);
    assert_eq!(stats.connect_failures.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_protocol_when_device_recovers_within_budget_then_request_succeeds() {
    let sim = simulator(ProtocolVersion::V3);
    sim.script_response(CMD_VERSION, CODE_DEVICE_NOT_READY);
    sim.script_response(CMD_VERSION, CODE_DEVICE_NOT_READY);
    let protocol = protocol_with_attempts(&sim, 3);

    let version = protocol.negotiate().await.expect("negotiate");
    assert_eq!(version, ProtocolVersion::V3);
    assert_eq!(protocol.version(), Some(ProtocolVersion::V3));
    assert_eq!(sim.requests_for(CMD_VERSION).len(), 3);
    assert_eq!(sim.stats().acquires.load(Ordering::SeqCst), 3);
    assert_eq!(sim.stats().releases.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_protocol_when_device_stays_busy_then_budget_is_exhausted() {
    let sim = simulator(ProtocolVersion::V3);
    for _ in 0..3 {
        sim.script_response(CMD_VERSION, CODE_DEVICE_NOT_READY);
    }
    let protocol = protocol_with_attempts(&sim, 2);
    let err = protocol.get_version().await.expect_err("busy device");
    assert!(matches!(err, BridgeError::SignerUnreachable { attempts: 2, .. }));
    assert_eq!(sim.requests_for(CMD_VERSION).len(), 2);
}

#[tokio::test]
async fn test_protocol_when_device_rejects_request_then_no_retry() {
    let sim = simulator(ProtocolVersion::V3);
    sim.script_response(CMD_GET_PUBKEY, CODE_KEY_REJECTED);
    let protocol = protocol_with_attempts(&sim, 5);

    let mut request = command(CMD_GET_PUBKEY);
    request[FIELD_KEY_ID] = json!(TEST_BTC_REMOTE_KEY_ID);
    let err = protocol.execute(request, &[FIELD_PUBKEY]).await.expect_err("rejected");
    assert!(matches!(err, BridgeError::Signer { code: CODE_KEY_REJECTED, .. }));
    assert_eq!(sim.stats().exchanges.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_protocol_when_version_negotiated_then_requests_are_stamped_except_probe() {
    let sim = simulator(ProtocolVersion::V4);
    let protocol = protocol_with_attempts(&sim, 1);
    protocol.negotiate().await.expect("negotiate");

    let mut request = command(CMD_GET_PUBKEY);
    request[FIELD_KEY_ID] = json!(TEST_BTC_REMOTE_KEY_ID);
    protocol.execute(request, &[FIELD_PUBKEY]).await.expect("public key");
    protocol.get_version().await.expect("probe");

    let pubkey_requests = sim.requests_for(CMD_GET_PUBKEY);
    assert_eq!(pubkey_requests[0]["version"], 4);
    for probe in sim.requests_for(CMD_VERSION) {
        assert!(probe.get("version").is_none(), "version probe must not carry a version: {}", probe);
    }
}

/// Echoes each request's command; the very first reply is held back by `first_delay`.
async fn echo_server(first_delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr").to_string();
    let delayed = Arc::new(AtomicBool::new(false));
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let delayed = delayed.clone();
            tokio::spawn(async move {
                let mut stream = BufReader::new(socket);
                let mut line = String::new();
                while matches!(stream.read_line(&mut line).await, Ok(n) if n > 0) {
                    let request: Value = serde_json::from_str(line.trim_end()).expect("json request");
                    if !delayed.swap(true, Ordering::SeqCst) {
                        tokio::time::sleep(first_delay).await;
                    }
                    let reply = json!({"errorcode": 0, "echo": request["command"]});
                    if stream.get_mut().write_all(format!("{}\n", reply).as_bytes()).await.is_err() {
                        break;
                    }
                    line.clear();
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_protocol_when_exchange_cancelled_then_next_request_gets_its_own_reply() {
    let addr = echo_server(Duration::from_millis(100)).await;
    let pool: Arc<dyn ConnectionPool> = Arc::new(TcpConnectionPool::new(addr, Duration::from_secs(2), 1));
    let protocol = SignerProtocol::new(pool, 1, Duration::from_millis(1));

    let cancelled = tokio::time::timeout(Duration::from_millis(20), protocol.send(command("sign"))).await;
    assert!(cancelled.is_err(), "first exchange should still be waiting on its reply");

    let response = protocol.send(command("blockchainState")).await.expect("second request");
    assert_eq!(response["echo"], "blockchainState");
}
