use chrono::{TimeZone, Utc};
use landau::config::Config;
use landau::coordinator::{CoordinatorCommand, RefreshCoordinator};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOGGLE_PAYLOAD: [u8; 8] = [5, 19, 100, 100, 4, 0, 0, 0];

fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.api.email = "owner@example.com".to_string();
    config.api.password = "secret".to_string();
    config.api.base_url = base_url.to_string();
    config
}

fn coordinator(server: &MockServer) -> RefreshCoordinator {
    let (_tx, rx) = mpsc::unbounded_channel::<CoordinatorCommand>();
    RefreshCoordinator::new(test_config(&server.uri()), rx).unwrap()
}

async fn mount_happy_api(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"customerID": "123", "token": "tok-1"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customers/123/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"vehicles": [{"chassisNumber": "CH123", "asset": "A1"}]})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/can/A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"levels3": {"x": 1}})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn send_command_posts_payload_and_refreshes() {
    let server = MockServer::start().await;
    mount_happy_api(&server).await;
    Mock::given(method("POST"))
        .and(path("/can/A1/11"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(body_json(json!([5, 19, 100, 100, 4, 0, 0, 0])))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut coordinator = coordinator(&server);
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    coordinator.refresh_at(now).await.unwrap();
    assert_eq!(coordinator.counters().calls_total, 1);

    let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap();
    coordinator
        .send_can_command_at(11, &TOGGLE_PAYLOAD, later)
        .await;

    // The command always triggers a follow-up refresh
    let counters = coordinator.counters();
    assert_eq!(counters.calls_total, 2);
    assert_eq!(counters.can_calls_total, 2);
}

#[tokio::test]
async fn send_command_without_session_is_a_noop() {
    let server = MockServer::start().await;
    mount_happy_api(&server).await;
    Mock::given(method("POST"))
        .and(path("/can/A1/11"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut coordinator = coordinator(&server);

    // No refresh has run, so there is no token and no asset id
    coordinator.send_can_command(11, &TOGGLE_PAYLOAD).await;

    let counters = coordinator.counters();
    assert_eq!(counters.calls_total, 0);
    assert_eq!(counters.can_calls_total, 0);
}

#[tokio::test]
async fn send_command_failure_is_logged_not_retried() {
    let server = MockServer::start().await;
    mount_happy_api(&server).await;
    Mock::given(method("POST"))
        .and(path("/can/A1/11"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut coordinator = coordinator(&server);
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    coordinator.refresh_at(now).await.unwrap();

    let later = Utc.with_ymd_and_hms(2024, 5, 1, 12, 5, 0).unwrap();
    coordinator
        .send_can_command_at(11, &TOGGLE_PAYLOAD, later)
        .await;

    // The failed post is not retried, and the follow-up refresh still runs
    assert_eq!(coordinator.counters().calls_total, 2);
}
