use super::*;

#[tokio::test]
async fn bind_reports_local_addr() {
    let process = ReceiveProcess::bind("127.0.0.1:0").await.expect("bind should succeed on an ephemeral port");
    let addr = process.local_addr().expect("bound listener has a local address");
    assert_eq!(addr.ip().to_string(), "127.0.0.1");
    assert_ne!(addr.port(), 0);
}
