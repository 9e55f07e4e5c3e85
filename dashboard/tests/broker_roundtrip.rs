mod common;

use axum::http::{Method, StatusCode};
use common::FakeBroker;
use dashboard::config::Settings;
use dashboard::directory::{Directory, DiscoveryFilter, ResourceType};
use dashboard::errors::Error;
use dashboard::registration::register;
use serde_json::json;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn discover_sends_filters_and_headers() {
    let broker = FakeBroker::start().await;
    broker.on_get(
        "/cse-in",
        "fu=1&ty=2&lbl=sensor",
        StatusCode::OK,
        json!({ "m2m:uril": ["cse-in/sensorA", "cse-in/sensorB"] }),
    );
    let client = broker.client(TIMEOUT);

    let filter = DiscoveryFilter::at("cse-in")
        .of_type(ResourceType::ApplicationEntity)
        .label("sensor");
    assert_eq!(
        client.discover(&filter).await,
        vec!["cse-in/sensorA", "cse-in/sensorB"]
    );

    let request = &broker.requests()[0];
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.query["fu"], "1");
    assert_eq!(request.header("x-m2m-origin"), "CDashboard");
    assert_eq!(request.header("x-m2m-rvi"), "3");
    assert!(!request.header("x-m2m-ri").is_empty());
}

#[tokio::test]
async fn request_ids_are_unique() {
    let broker = FakeBroker::start().await;
    let client = broker.client(TIMEOUT);
    client.discover(&DiscoveryFilter::at("cse-in")).await;
    client.discover(&DiscoveryFilter::at("cse-in")).await;

    let requests = broker.requests();
    assert_ne!(requests[0].header("x-m2m-ri"), requests[1].header("x-m2m-ri"));
}

#[tokio::test]
async fn discover_tolerates_bad_replies() {
    let broker = FakeBroker::start().await;
    broker.on_get_raw("/cse-in", "fu=1&lbl=sensor", StatusCode::OK, "{\"m2m:uril\"".into());
    broker.on_get("/cse-in", "fu=1&lbl=actuator", StatusCode::OK, json!({}));
    let client = broker.client(TIMEOUT);

    assert!(client
        .discover(&DiscoveryFilter::at("cse-in").label("sensor"))
        .await
        .is_empty());
    assert!(client
        .discover(&DiscoveryFilter::at("cse-in").label("actuator"))
        .await
        .is_empty());
    // unscripted path answers 404
    assert!(client
        .discover(&DiscoveryFilter::at("cse-in").label("camera"))
        .await
        .is_empty());
}

#[tokio::test]
async fn read_latest_and_series() {
    let broker = FakeBroker::start().await;
    broker.on_get(
        "/cse-in/sensorA/Battery/la",
        "",
        StatusCode::OK,
        json!({ "m2m:cin": { "con": "91", "ct": "20211118T153012" } }),
    );
    broker.on_get(
        "/cse-in/sensorA/Humidity",
        "rcn=4",
        StatusCode::OK,
        json!({ "m2m:cnt": { "m2m:cin": [
            { "con": "40", "ct": "20211118T150000" },
            { "con": "oops", "ct": "20211118T150100" },
            { "con": "42.5", "ct": "20211118T150200" }
        ]}}),
    );
    let client = broker.client(TIMEOUT);

    assert_eq!(
        client.read_latest("cse-in/sensorA/Battery/la").await,
        ("91".to_string(), "2021-11-18T11:30:12".to_string())
    );
    let series = client.read_series("cse-in/sensorA/Humidity").await;
    assert_eq!(series.values, vec![40.0, 42.5]);
    assert_eq!(
        series.timestamps,
        vec!["2021-11-18T11:00:00", "2021-11-18T11:02:00"]
    );
    assert_eq!(
        client.read_latest("cse-in/sensorA/Missing/la").await,
        (String::new(), String::new())
    );
}

#[tokio::test]
async fn write_value_posts_labelled_instance() {
    let broker = FakeBroker::start().await;
    let client = broker.client(TIMEOUT);

    client.write_value("cse-in/valve1/actuatorState", "ON").await;

    let posts = broker.posts_to("/cse-in/valve1/actuatorState");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].header("content-type"), "application/json;ty=4");
    assert_eq!(posts[0].body["m2m:cin"]["con"], "ON");
    assert_eq!(posts[0].body["m2m:cin"]["lbl"], json!(["valve1/actuatorState"]));
}

#[tokio::test]
async fn write_failure_is_swallowed() {
    let broker = FakeBroker::start().await;
    broker.on_post(
        "/cse-in/valve1/actuatorState",
        StatusCode::FORBIDDEN,
        json!({ "m2m:dbg": "access denied" }),
    );
    let client = broker.client(TIMEOUT);

    client.write_value("cse-in/valve1/actuatorState", "OFF").await;
    assert_eq!(broker.posts_to("/cse-in/valve1/actuatorState").len(), 1);
}

#[tokio::test]
async fn slow_broker_times_out() {
    let broker = FakeBroker::start().await;
    broker.on_get(
        "/cse-in/slow/la",
        "",
        StatusCode::OK,
        json!({ "m2m:cin": { "con": "1", "ct": "20211118T153012" } }),
    );
    broker.delay("/cse-in/slow/la", Duration::from_secs(2));
    let client = broker.client(Duration::from_millis(200));

    assert_eq!(
        client.read_latest("cse-in/slow/la").await,
        (String::new(), String::new())
    );
    assert!(matches!(
        client.try_retrieve("cse-in/slow/la", &[]).await,
        Err(Error::Timeout { .. })
    ));
}

#[tokio::test]
async fn unreachable_broker_yields_empty() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = dashboard::directory::DirectoryClient::new(
        &format!("http://{}", addr),
        "CDashboard".to_string(),
        "3".to_string(),
        TIMEOUT,
        chrono::FixedOffset::east_opt(0).unwrap(),
    )
    .unwrap();
    assert!(client.discover(&DiscoveryFilter::at("cse-in")).await.is_empty());
    assert!(client.read_labels("cse-in/sensorA").await.is_empty());
    assert!(client.read_series("cse-in/sensorA/Humidity").await.is_empty());
}

fn settings_for(broker: &FakeBroker) -> Settings {
    Settings {
        cse_url: broker.url(),
        app_ip: "10.0.0.5".to_string(),
        app_port: 9050,
        ..Settings::default()
    }
}

#[tokio::test]
async fn register_creates_missing_resources() {
    let broker = FakeBroker::start().await;
    broker.on_get("/id-in", "fu=1&ty=1&rn=DashboardACP", StatusCode::OK, json!({}));
    broker.on_get("/id-in", "fu=1&ty=2&rn=Dashboard", StatusCode::OK, json!({}));
    let settings = settings_for(&broker);
    let client = dashboard::directory::DirectoryClient::from_settings(&settings).unwrap();

    tokio_test::assert_ok!(register(&client, &settings).await);

    let posts = broker.posts_to("/id-in");
    assert_eq!(posts.len(), 3);

    assert_eq!(posts[0].header("content-type"), "application/json;ty=1");
    assert_eq!(posts[0].header("x-m2m-origin"), "CAdmin");
    assert_eq!(posts[0].body["m2m:acp"]["rn"], "DashboardACP");

    assert_eq!(posts[1].header("content-type"), "application/json;ty=2");
    assert_eq!(posts[1].header("x-m2m-origin"), "CDashboard");
    assert_eq!(posts[1].body["m2m:ae"]["poa"], json!(["http://10.0.0.5:9050"]));
    assert_eq!(posts[1].body["m2m:ae"]["acpi"], json!(["cse-in/DashboardACP"]));

    assert_eq!(posts[2].header("content-type"), "application/json;ty=23");
    assert_eq!(posts[2].body["m2m:sub"]["enc"]["net"], json!([3, 4]));
    assert_eq!(posts[2].body["m2m:sub"]["nu"], json!(["CDashboard"]));
}

#[tokio::test]
async fn register_skips_existing_resources() {
    let broker = FakeBroker::start().await;
    broker.on_get(
        "/id-in",
        "fu=1&ty=1&rn=DashboardACP",
        StatusCode::OK,
        json!({ "m2m:uril": ["cse-in/DashboardACP"] }),
    );
    broker.on_get(
        "/id-in",
        "fu=1&ty=2&rn=Dashboard",
        StatusCode::OK,
        json!({ "m2m:uril": ["cse-in/Dashboard"] }),
    );
    broker.on_post("/id-in", StatusCode::CONFLICT, json!({ "m2m:dbg": "exists" }));
    let settings = settings_for(&broker);
    let client = dashboard::directory::DirectoryClient::from_settings(&settings).unwrap();

    tokio_test::assert_ok!(register(&client, &settings).await);
    // only the subscription is attempted, and its conflict is accepted
    assert_eq!(broker.posts_to("/id-in").len(), 1);
}

#[tokio::test]
async fn register_fails_without_broker() {
    let broker = FakeBroker::start().await;
    // discovery answers 404 because nothing is scripted
    let settings = settings_for(&broker);
    let client = dashboard::directory::DirectoryClient::from_settings(&settings).unwrap();

    assert!(matches!(
        register(&client, &settings).await,
        Err(Error::Status { status: 404, .. })
    ));
}
