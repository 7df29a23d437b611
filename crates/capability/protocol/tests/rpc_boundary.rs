use domain::{ConnectionParams, UnitKind, UnitRange, VirtualParams, VirtualUnit};
use ems_protocol::{
    AdapterFactory, AdapterHandle, AdapterHost, ConnectError, ProtocolAdapter, ReadError,
    RpcAdapter, RpcClientConfig, VirtualDeviceRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn start_host(registry: Arc<VirtualDeviceRegistry>) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let host = AdapterHost::new(
        AdapterFactory::new().with_virtual_devices(registry),
        ems_protocol::rpc::DEFAULT_MAX_FRAME_BYTES,
    );
    let token = CancellationToken::new();
    let serve_token = token.clone();
    tokio::spawn(async move {
        let _ = host.serve(listener, serve_token).await;
    });
    (addr, token)
}

fn virtual_params(device: &str, value: u16) -> ConnectionParams {
    ConnectionParams::Virtual(VirtualParams {
        device: device.to_string(),
        units: vec![VirtualUnit {
            kind: UnitKind::HoldingRegister,
            address: 0xA5,
            value,
        }],
    })
}

fn client(addr: &str) -> RpcAdapter {
    RpcAdapter::new(
        addr,
        RpcClientConfig {
            connect_timeout: Duration::from_millis(500),
            call_timeout: Duration::from_millis(500),
            max_frame_bytes: ems_protocol::rpc::DEFAULT_MAX_FRAME_BYTES,
        },
    )
}

#[tokio::test]
async fn remote_adapter_reads_through_host() {
    let registry = Arc::new(VirtualDeviceRegistry::new());
    let (addr, token) = start_host(Arc::clone(&registry)).await;
    let adapter = client(&addr);

    assert!(adapter.probe().await);
    let handle = adapter
        .connect(&virtual_params("remote-1", 0xA5))
        .await
        .expect("connect");
    let ranges = [UnitRange::new(UnitKind::HoldingRegister, 0xA5, 2)];
    let buffer = adapter.read_units(handle, &ranges).await.expect("read");
    assert_eq!(buffer.get(UnitKind::HoldingRegister, 0xA5), Some(0xA5));
    assert_eq!(buffer.get(UnitKind::HoldingRegister, 0xA6), Some(0));

    registry.get("remote-1").expect("device").set_register(0xA5, 0x5A);
    let buffer = adapter.read_units(handle, &ranges).await.expect("read");
    assert_eq!(buffer.get(UnitKind::HoldingRegister, 0xA5), Some(0x5A));

    adapter.close(handle).await;
    adapter.close(handle).await;
    let err = adapter
        .read_units(handle, &ranges)
        .await
        .expect_err("closed handle");
    assert!(matches!(err, ReadError::UnknownHandle(_)));
    token.cancel();
}

#[tokio::test]
async fn remote_errors_keep_the_taxonomy() {
    let registry = Arc::new(VirtualDeviceRegistry::new());
    let (addr, token) = start_host(Arc::clone(&registry)).await;
    let adapter = client(&addr);

    registry.get_or_create("remote-2").refuse_connections(true);
    let err = adapter
        .connect(&virtual_params("remote-2", 1))
        .await
        .expect_err("refused");
    assert!(matches!(err, ConnectError::Refused(_)));

    registry.get_or_create("remote-2").refuse_connections(false);
    let handle = adapter
        .connect(&virtual_params("remote-2", 1))
        .await
        .expect("connect");
    registry.get_or_create("remote-2").fail_reads(true);
    let err = adapter
        .read_units(handle, &[UnitRange::new(UnitKind::HoldingRegister, 0, 1)])
        .await
        .expect_err("read failure");
    assert!(matches!(err, ReadError::Disconnected(_)));

    let err = adapter
        .read_units(AdapterHandle(999), &[])
        .await
        .expect_err("unknown");
    assert_eq!(err, ReadError::UnknownHandle(999));
    token.cancel();
}

#[tokio::test]
async fn host_shutdown_surfaces_as_disconnect() {
    let registry = Arc::new(VirtualDeviceRegistry::new());
    let (addr, token) = start_host(Arc::clone(&registry)).await;
    let adapter = client(&addr);
    let handle = adapter
        .connect(&virtual_params("remote-3", 1))
        .await
        .expect("connect");

    token.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = adapter
        .read_units(handle, &[UnitRange::new(UnitKind::HoldingRegister, 0, 1)])
        .await
        .expect_err("host gone");
    assert!(matches!(
        err,
        ReadError::Disconnected(_) | ReadError::Timeout(_)
    ));
}
