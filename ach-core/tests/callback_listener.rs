use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use ach_core::callback::CallbackListener;
use ach_core::error::AchError;
use serial_test::serial;

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
#[serial]
async fn port_in_use_is_reported() {
    let port = free_port();
    let _squatter = StdTcpListener::bind(("127.0.0.1", port)).unwrap();

    match CallbackListener::bind(port).await {
        Err(AchError::PortUnavailable { port: reported, .. }) => assert_eq!(reported, port),
        Err(other) => panic!("expected PortUnavailable, got {other:?}"),
        Ok(_) => panic!("bind should fail on a taken port"),
    }
}

#[tokio::test]
#[serial]
async fn first_redirect_resolves_with_full_url() {
    let port = free_port();
    let listener = CallbackListener::bind(port).await.unwrap();
    assert_eq!(listener.port(), port);
    assert_eq!(listener.redirect_uri(), format!("http://localhost:{port}/do_access"));

    let hit = tokio::spawn(async move {
        reqwest::get(format!("http://127.0.0.1:{port}/do_access?code=abc&state=xyz"))
            .await
            .map(|r| r.status())
    });

    let url = listener
        .wait(Some(Duration::from_secs(10)))
        .await
        .expect("callback should arrive");
    assert_eq!(url, format!("http://localhost:{port}/do_access?code=abc&state=xyz"));

    let status = hit.await.unwrap().expect("request should be answered");
    assert!(status.is_success());
}

#[tokio::test]
#[serial]
async fn listener_stops_serving_after_the_first_redirect() {
    let port = free_port();
    let listener = CallbackListener::bind(port).await.unwrap();

    tokio::spawn(async move {
        let _ = reqwest::get(format!("http://127.0.0.1:{port}/do_access?code=one")).await;
    });
    listener.wait(Some(Duration::from_secs(10))).await.unwrap();

    let second = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/do_access?code=two"))
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(second.is_err(), "nobody should be listening any more");
}

#[tokio::test]
#[serial]
async fn unrelated_paths_do_not_complete_the_wait() {
    let port = free_port();
    let listener = CallbackListener::bind(port).await.unwrap();

    let status = reqwest::get(format!("http://127.0.0.1:{port}/favicon.ico"))
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 404);

    let err = listener
        .wait(Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, AchError::ConsentTimeout(_)));
}

#[tokio::test]
#[serial]
async fn close_releases_the_port() {
    let port = free_port();
    let listener = CallbackListener::bind(port).await.unwrap();
    listener.close().await;

    let again = CallbackListener::bind(port).await.expect("port should be free");
    again.close().await;
}
