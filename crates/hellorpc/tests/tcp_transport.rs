//! Integration tests for the TCP transport.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpSocket;
use tokio::net::TcpStream;

use hellorpc::Address;
use hellorpc::Caller;
use hellorpc::FailureReason;
use hellorpc::RequestState;
use hellorpc::Rpc;
use hellorpc::RpcHandler;
use hellorpc::Transport;
use hellorpc::Value;
use hellorpc::transport::tcp;
use hellorpc::transport::tcp::Frame;
use hellorpc::transport::tcp::MAX_FRAME_LEN;
use hellorpc::transport::tcp::TcpTransport;

/// Replies with its first argument after `delay_ms` (second argument) milliseconds.
struct SlowEcho;

impl RpcHandler for SlowEcho {
    fn handle_rpc(&self, rpc: &Rpc, caller: &Caller, _method: &str, mut args: Vec<Value>, request: RequestState) {
        let delay = match args.get(1) {
            Some(Value::Int(ms)) => *ms as u64,
            _ => 0,
        };
        let payload = if args.is_empty() { Value::Null } else { args.remove(0) };
        let tagged = Value::List(vec![payload, Value::Str(caller.to_string())]);

        if delay == 0 {
            rpc.send_result(&request, tagged).unwrap();
            return;
        }

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            request.send_result(tagged).unwrap();
        });
    }
}

/// Starts a server node and returns its address and endpoint.
async fn start_server() -> (Address, std::net::SocketAddr) {
    let address = Address::random();
    let rpc = Arc::new(Rpc::new(address, Arc::new(TcpTransport::new(address))));
    rpc.add_handler("Echo", Arc::new(SlowEcho)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, rpc));
    (address, endpoint)
}

fn client_for(server: Address, endpoint: std::net::SocketAddr) -> (Address, TcpTransport) {
    let me = Address::random();
    let transport = TcpTransport::new(me);
    transport.add_route(server, endpoint);
    (me, transport)
}

// --- Test 1: Frame layout ---

#[test]
fn test_frame_is_one_line_of_json() {
    let frame = Frame::Call {
        seq: 9,
        from: Address::from_bytes([1; 20]),
        method: "HwRpc.Test".into(),
        args: vec![Value::Str("line\nbreak".into())],
    };
    let bytes = frame.encode().unwrap();
    assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    assert_eq!(*bytes.last().unwrap(), b'\n');

    let text = std::str::from_utf8(&bytes).unwrap().trim_end();
    assert_eq!(Frame::decode(text).unwrap(), frame);
}

// --- Test 2: Round trip with caller address ---

#[tokio::test]
async fn test_tcp_call_carries_caller_address() {
    let (server, endpoint) = start_server().await;
    let (me, transport) = client_for(server, endpoint);

    let reply = transport
        .call(&server, "Echo.Test", vec![Value::Bytes(b"hello".to_vec())])
        .await;

    assert_eq!(
        reply,
        Ok(Value::List(vec![Value::Bytes(b"hello".to_vec()), Value::Str(me.to_string())]))
    );
}

// --- Test 3: Dispatch errors travel back ---

#[tokio::test]
async fn test_tcp_unknown_prefix_is_reported() {
    let (server, endpoint) = start_server().await;
    let (_, transport) = client_for(server, endpoint);

    let reply = transport.call(&server, "Missing.Test", vec![]).await;
    assert_eq!(reply, Err(FailureReason::NoSuchHandler("Missing".into())));
}

// --- Test 4: Out-of-order replies on one link ---

#[tokio::test]
async fn test_tcp_replies_correlate_by_sequence() {
    let (server, endpoint) = start_server().await;
    let (_, transport) = client_for(server, endpoint);
    let transport = Arc::new(transport);

    let mut tasks = Vec::new();
    for (i, delay) in [60i64, 5, 30].into_iter().enumerate() {
        let transport = transport.clone();
        tasks.push(tokio::spawn(async move {
            let args = vec![Value::Int(i as i64), Value::Int(delay)];
            transport.call(&server, "Echo.Test", args).await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let reply = task.await.unwrap().unwrap();
        let Value::List(items) = reply else { panic!("expected list") };
        assert_eq!(items[0], Value::Int(i as i64));
    }
}

// --- Test 5: No route / nobody listening ---

#[tokio::test]
async fn test_tcp_unreachable_destinations() {
    let transport = TcpTransport::new(Address::random());

    let unknown = Address::random();
    assert!(!transport.has_route(&unknown));
    let reply = transport.call(&unknown, "Echo.Test", vec![]).await;
    assert!(matches!(reply, Err(FailureReason::Unreachable(_))));

    // grab a free port, then close it again
    let endpoint = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let dead = Address::random();
    transport.add_route(dead, endpoint);
    assert!(transport.has_route(&dead));
    let reply = transport.call(&dead, "Echo.Test", vec![]).await;
    assert!(matches!(reply, Err(FailureReason::Unreachable(_))));
}

// --- Test 6: Full path through Rpc::invoke ---

#[tokio::test]
async fn test_rpc_invoke_over_tcp() {
    let (server, endpoint) = start_server().await;
    let me = Address::random();
    let transport = TcpTransport::new(me);
    transport.add_route(server, endpoint);
    let rpc = Rpc::new(me, Arc::new(transport));

    let reply = rpc.call(server, "Echo.Test", vec![Value::Bytes(vec![9])]).await;
    assert_eq!(
        reply,
        Ok(Value::List(vec![Value::Bytes(vec![9]), Value::Str(me.to_string())]))
    );
}

// --- Test 7: Timed-out calls leave nothing pending ---

/// Keeps every request and never answers.
#[derive(Default)]
struct Hoarder {
    kept: Mutex<Vec<RequestState>>,
}

impl RpcHandler for Hoarder {
    fn handle_rpc(&self, _rpc: &Rpc, _caller: &Caller, _method: &str, _args: Vec<Value>, request: RequestState) {
        self.kept.lock().unwrap().push(request);
    }
}

#[tokio::test]
async fn test_timed_out_calls_are_forgotten_by_the_link() {
    let server = Address::random();
    let server_rpc = Arc::new(Rpc::new(server, Arc::new(TcpTransport::new(server))));
    let hoarder = Arc::new(Hoarder::default());
    server_rpc.add_handler("Hold", hoarder.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap();
    tokio::spawn(tcp::serve(listener, server_rpc));

    let (me, transport) = client_for(server, endpoint);
    let transport = Arc::new(transport);
    let rpc = Rpc::with_timeout(me, transport.clone(), Duration::from_millis(20));

    for _ in 0..50 {
        let reply = rpc.call(server, "Hold.Forever", vec![]).await;
        assert_eq!(reply, Err(FailureReason::Timeout));
    }

    assert_eq!(transport.pending_calls(), 0);
    assert_eq!(hoarder.kept.lock().unwrap().len(), 50);
}

// --- Test 8: A stalled connect does not hold up other destinations ---

#[tokio::test]
async fn test_stalled_destination_does_not_block_others() {
    let (healthy, healthy_endpoint) = start_server().await;

    // a listener that never accepts, with its backlog already full
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let stalled_listener = socket.listen(1).unwrap();
    let stalled_endpoint = stalled_listener.local_addr().unwrap();
    let mut fillers = Vec::new();
    for _ in 0..4 {
        if let Ok(Ok(stream)) = tokio::time::timeout(Duration::from_millis(100), TcpStream::connect(stalled_endpoint)).await {
            fillers.push(stream);
        }
    }

    let stalled = Address::random();
    let transport = Arc::new(TcpTransport::new(Address::random()));
    transport.add_route(healthy, healthy_endpoint);
    transport.add_route(stalled, stalled_endpoint);

    let slow = {
        let transport = transport.clone();
        tokio::spawn(async move { transport.call(&stalled, "Echo.Test", vec![]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    let reply = tokio::time::timeout(
        Duration::from_millis(500),
        transport.call(&healthy, "Echo.Test", vec![Value::Int(1)]),
    )
    .await
    .expect("healthy destination waited on the stalled one");
    assert!(reply.is_ok(), "got {:?}", reply);
    assert!(started.elapsed() < Duration::from_millis(500));

    slow.abort();
    drop(fillers);
    drop(stalled_listener);
}

// --- Test 9: Oversized frames end the connection ---

#[tokio::test]
async fn test_server_drops_connection_on_oversized_frame() {
    let (_, endpoint) = start_server().await;
    let mut stream = TcpStream::connect(endpoint).await.unwrap();

    let junk = vec![b'a'; MAX_FRAME_LEN + 16];
    let _ = stream.write_all(&junk).await;

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server kept an oversized frame open");
    assert!(matches!(read, Ok(0) | Err(_)), "got {:?}", read);
}
