use std::sync::Arc;
use std::time::Duration;

use tado_bridge::{
    BridgeConfig, DataStore, Error, PollScheduler, RateLimitStatus, SyncEngine, SyncMode,
    TadoBridge,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bridge_for(server: &MockServer, dir: &std::path::Path) -> Arc<TadoBridge> {
    Arc::new(
        TadoBridge::builder(dir)
            .api_base(format!("{}/api/v2", server.uri()))
            .auth_base(format!("{}/oauth2", server.uri()))
            .client_id("test-client")
            .timeout(Duration::from_secs(5))
            .build(),
    )
}

fn seed_config(dir: &std::path::Path) {
    DataStore::new(dir)
        .save_config(&BridgeConfig {
            home_id: Some("123".into()),
            refresh_token: Some("rt-1".into()),
        })
        .unwrap();
}

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-1",
            "token_type": "bearer",
            "expires_in": 600,
            "refresh_token": "rt-1",
        })))
        .mount(server)
        .await;
}

fn zone_states_body() -> serde_json::Value {
    serde_json::json!({
        "zoneStates": {
            "1": {
                "tadoMode": "HOME",
                "overlayType": "MANUAL",
                "setting": {
                    "type": "HEATING",
                    "power": "ON",
                    "temperature": { "celsius": 21.0, "fahrenheit": 69.8 }
                },
                "overlay": {
                    "type": "MANUAL",
                    "termination": { "type": "MANUAL" }
                },
                "nextScheduleChange": {
                    "start": "2026-08-06T18:00:00Z",
                    "setting": { "type": "HEATING", "power": "ON", "temperature": { "celsius": 19.0 } }
                },
                "activityDataPoints": {
                    "heatingPower": { "percentage": 32.0 }
                },
                "sensorDataPoints": {
                    "insideTemperature": { "celsius": 20.4 },
                    "humidity": { "percentage": 48.2 }
                }
            },
            "0": {
                "tadoMode": "HOME",
                "setting": { "type": "HOT_WATER", "power": "OFF" }
            }
        }
    })
}

fn weather_body() -> serde_json::Value {
    serde_json::json!({
        "outsideTemperature": { "celsius": 14.2 },
        "solarIntensity": { "percentage": 61.0 },
        "weatherState": { "value": "CLOUDY" }
    })
}

fn zones_info_body() -> serde_json::Value {
    serde_json::json!([
        {
            "id": 1,
            "name": "Living Room",
            "type": "HEATING",
            "earlyStart": { "enabled": true },
            "devices": [{
                "deviceType": "VA02",
                "shortSerialNo": "VA1234567890",
                "currentFwVersion": "54.20",
                "connectionState": { "value": true },
                "batteryState": "NORMAL",
                "childLockEnabled": false
            }]
        },
        {
            "id": 0,
            "name": "Hot Water",
            "type": "HOT_WATER",
            "devices": []
        }
    ])
}

fn mobile_devices_body() -> serde_json::Value {
    serde_json::json!([
        {
            "id": 42,
            "name": "Joe's phone",
            "location": { "atHome": true, "stale": false },
            "settings": { "geoTrackingEnabled": true }
        }
    ])
}

fn ratelimited(template: ResponseTemplate) -> ResponseTemplate {
    template
        .insert_header("ratelimit-policy", "\"perday\";q=5000;w=86400")
        .insert_header("ratelimit", "\"perday\";r=4321;t=7200")
}

async fn mount_home_endpoint(
    server: &MockServer,
    endpoint: &str,
    body: serde_json::Value,
    expected: u64,
) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v2/homes/123/{endpoint}")))
        .respond_with(ratelimited(ResponseTemplate::new(200).set_body_json(body)))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn quick_cycle_fetches_exactly_two_documents() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 1).await;
    mount_home_endpoint(&server, "weather", weather_body(), 1).await;
    mount_home_endpoint(&server, "zones", zones_info_body(), 0).await;
    mount_home_endpoint(&server, "mobileDevices", mobile_devices_body(), 0).await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Quick).await.unwrap();

    let store = DataStore::new(dir.path());
    let zones = store.load_zone_states().unwrap();
    assert_eq!(zones.zone_states.len(), 2);
    let living_room = &zones.zone_states["1"];
    assert_eq!(
        living_room
            .sensor_data_points
            .as_ref()
            .and_then(|s| s.inside_temperature.as_ref())
            .and_then(|t| t.celsius),
        Some(20.4)
    );
    assert!(store.load_weather().is_some());
    assert!(store.load_zones_info().is_none());
    assert!(store.load_mobile_devices().is_none());
}

#[tokio::test]
async fn full_cycle_fetches_and_overwrites_all_four_documents() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 1).await;
    mount_home_endpoint(&server, "weather", weather_body(), 1).await;
    mount_home_endpoint(&server, "zones", zones_info_body(), 1).await;
    mount_home_endpoint(&server, "mobileDevices", mobile_devices_body(), 1).await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Full).await.unwrap();

    let store = DataStore::new(dir.path());
    assert!(store.load_zone_states().is_some());
    assert!(store.load_weather().is_some());

    let zones_info = store.load_zones_info().unwrap();
    assert_eq!(zones_info.len(), 2);
    assert_eq!(zones_info[0].name, "Living Room");
    assert_eq!(
        zones_info[0].devices[0].short_serial_no.as_deref(),
        Some("VA1234567890")
    );

    let mobile = store.load_mobile_devices().unwrap();
    assert_eq!(mobile[0].location.as_ref().unwrap().at_home, Some(true));
}

#[tokio::test]
async fn quick_cycle_leaves_metadata_documents_untouched() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 1).await;
    mount_home_endpoint(&server, "weather", weather_body(), 1).await;

    // Pre-existing metadata from an earlier full sync.
    let store = DataStore::new(dir.path());
    let seeded: Vec<tado_bridge::ZoneInfo> =
        serde_json::from_value(zones_info_body()).unwrap();
    store
        .write(tado_bridge::ZONES_INFO_FILE, &seeded)
        .unwrap();

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Quick).await.unwrap();

    assert_eq!(store.load_zones_info().unwrap(), seeded);
}

#[tokio::test]
async fn every_cycle_writes_a_ratelimit_snapshot() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 1).await;
    mount_home_endpoint(&server, "weather", weather_body(), 1).await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Quick).await.unwrap();

    // Round-trip: the written snapshot reads back with identical values.
    let snapshot = DataStore::new(dir.path()).load_ratelimit().unwrap();
    assert_eq!(snapshot.limit, Some(5000));
    assert_eq!(snapshot.remaining, Some(4321));
    assert_eq!(snapshot.status, RateLimitStatus::Ok);
    assert_eq!(snapshot.reset_seconds, Some(7200));
}

#[tokio::test]
async fn rate_limited_cycle_aborts_remaining_calls() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/homes/123/zoneStates"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("ratelimit-policy", "\"perday\";q=5000;w=86400")
                .insert_header("ratelimit", "\"perday\";r=0"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_home_endpoint(&server, "weather", weather_body(), 0).await;
    mount_home_endpoint(&server, "zones", zones_info_body(), 0).await;
    mount_home_endpoint(&server, "mobileDevices", mobile_devices_body(), 0).await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    let err = engine.run_cycle(SyncMode::Full).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited), "got {err:?}");

    let snapshot = DataStore::new(dir.path()).load_ratelimit().unwrap();
    assert_eq!(snapshot.status, RateLimitStatus::RateLimited);
    assert_eq!(snapshot.remaining, Some(0));
}

#[tokio::test]
async fn failed_cycle_still_writes_error_snapshot() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/homes/123/zoneStates"))
        .respond_with(ResponseTemplate::new(500).set_body_string("server exploded"))
        .mount(&server)
        .await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    let err = engine.run_cycle(SyncMode::Quick).await.unwrap_err();
    assert!(matches!(err, Error::Http { status: 500, .. }), "got {err:?}");

    let snapshot = DataStore::new(dir.path()).load_ratelimit().unwrap();
    assert_eq!(snapshot.status, RateLimitStatus::Error);
    assert!(snapshot.error.as_deref().unwrap().contains("500"));
}

#[tokio::test]
async fn partial_failure_keeps_documents_fetched_earlier() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());
    mount_token_endpoint(&server).await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/homes/123/weather"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Quick).await.unwrap_err();

    let store = DataStore::new(dir.path());
    assert!(store.load_zone_states().is_some());
    assert!(store.load_weather().is_none());
}

#[tokio::test]
async fn home_id_resolved_via_me_and_persisted() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    DataStore::new(dir.path())
        .save_config(&BridgeConfig {
            home_id: None,
            refresh_token: Some("rt-1".into()),
        })
        .unwrap();
    mount_token_endpoint(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v2/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "homes": [{ "id": 123, "name": "Home Sweet Home" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_home_endpoint(&server, "zoneStates", zone_states_body(), 2).await;
    mount_home_endpoint(&server, "weather", weather_body(), 2).await;

    let bridge = bridge_for(&server, dir.path());
    let engine = SyncEngine::new(Arc::clone(&bridge));
    engine.run_cycle(SyncMode::Quick).await.unwrap();

    let config = DataStore::new(dir.path()).load_config();
    assert_eq!(config.home_id.as_deref(), Some("123"));

    // Second cycle uses the persisted id; /me is not fetched again.
    engine.run_cycle(SyncMode::Quick).await.unwrap();
}

#[tokio::test]
async fn scheduler_owns_a_single_timer() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    seed_config(dir.path());

    let bridge = bridge_for(&server, dir.path());
    let scheduler = PollScheduler::new(SyncEngine::new(bridge));

    // No ratelimit document yet: the conservative default interval applies,
    // so the armed timer just sleeps for the duration of this test.
    Arc::clone(&scheduler).reschedule();
    assert!(scheduler.is_armed());
    Arc::clone(&scheduler).reschedule();
    assert!(scheduler.is_armed());

    scheduler.shutdown().await;
    assert!(!scheduler.is_armed());
}
