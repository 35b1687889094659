//! Configuration server source and refresh against a mock server.

use onboard::config::{
    ConfigContext, ConfigServerSource, ConfigSource, ConfigStore, ConfigValue, RULES_GROUP,
    SOR_CODES_GROUP,
};
use onboard::refresh::{RefreshPhase, RefreshTrigger};
use onboard::OnboardError;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn environment(label: &str, greeting: &str) -> String {
    json!({
        "name": "app",
        "profiles": ["default"],
        "label": label,
        "propertySources": [
            {
                "name": format!("git:{label}:app.yml"),
                "source": {
                    "example.greeting": greeting,
                    "sor-codes.Acct[0]": "ACC1"
                }
            },
            {
                "name": format!("git:{label}:application.yml"),
                "source": {
                    "example.greeting": "shadowed",
                    "example.greeting1": "App greeting",
                    "rules.Inv_ref_id_rccRule.PRIME": "R-100",
                    "sor-codes.DEAL": "DL1,DL2"
                }
            }
        ]
    })
    .to_string()
}

fn source(url: &str) -> Arc<dyn ConfigSource> {
    Arc::new(ConfigServerSource::new(url, Duration::from_secs(2)).unwrap())
}

#[tokio::test]
async fn test_fetch_folds_property_sources() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/app/default/main")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(environment("main", "Hello from main"))
        .create_async()
        .await;

    let groups = source(&server.url())
        .fetch(&ConfigContext::new("app", "default", "main"))
        .await
        .unwrap();
    mock.assert_async().await;

    let example = &groups["example"];
    assert_eq!(example["greeting"], ConfigValue::Text("Hello from main".into()));
    assert_eq!(example["greeting1"], ConfigValue::Text("App greeting".into()));

    let codes = &groups[SOR_CODES_GROUP];
    assert_eq!(codes["Acct"], ConfigValue::List(vec!["ACC1".into()]));
    assert_eq!(
        codes["DEAL"],
        ConfigValue::List(vec!["DL1".into(), "DL2".into()])
    );

    match &groups[RULES_GROUP]["Inv_ref_id_rccRule"] {
        ConfigValue::Map(m) => assert_eq!(m["PRIME"], "R-100"),
        other => panic!("expected map, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slash_in_label_is_escaped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/app/default/feature(_)x")
        .with_status(200)
        .with_body(environment("feature/x", "Hi"))
        .create_async()
        .await;

    source(&server.url())
        .fetch(&ConfigContext::new("app", "default", "feature/x"))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_response_without_name_is_accepted() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/app/default/main")
        .with_status(200)
        .with_body(
            json!({
                "propertySources": [
                    {"name": "inline", "source": {"example.greeting": "bare"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let groups = source(&server.url())
        .fetch(&ConfigContext::new("app", "default", "main"))
        .await
        .unwrap();
    assert_eq!(groups["example"]["greeting"], ConfigValue::Text("bare".into()));
}

#[tokio::test]
async fn test_unknown_label_is_transport_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/app/default/nope")
        .with_status(404)
        .create_async()
        .await;

    let err = source(&server.url())
        .fetch(&ConfigContext::new("app", "default", "nope"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        OnboardError::transport("configuration server has no label 'nope'")
    );
}

#[tokio::test]
async fn test_refresh_switches_between_labels() {
    let mut server = mockito::Server::new_async().await;
    let _main = server
        .mock("GET", "/app/default/main")
        .with_status(200)
        .with_body(environment("main", "Hello from main"))
        .create_async()
        .await;
    let _release = server
        .mock("GET", "/app/default/release")
        .with_status(200)
        .with_body(environment("release", "Hello from release"))
        .create_async()
        .await;

    let store = Arc::new(ConfigStore::new(source(&server.url())));
    let trigger = Arc::new(RefreshTrigger::new(
        Arc::clone(&store),
        ConfigContext::new("app", "default", "main"),
    ));
    trigger.load_current().await.unwrap();
    assert_eq!(
        store.lookup("example", "greeting").as_deref(),
        Some("Hello from main")
    );

    let handle = trigger.change_label("release").unwrap();
    let record = handle.wait().await.unwrap();
    assert_eq!(record.phase, RefreshPhase::Succeeded);
    assert_eq!(record.applied_label.as_deref(), Some("release"));

    let snapshot = store.snapshot();
    assert_eq!(snapshot.label.as_deref(), Some("release"));
    assert_eq!(snapshot.text("example", "greeting"), Some("Hello from release"));
}

#[tokio::test]
async fn test_server_down_keeps_previous_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let _main = server
        .mock("GET", "/app/default/main")
        .with_status(200)
        .with_body(environment("main", "Hello from main"))
        .create_async()
        .await;
    let _broken = server
        .mock("GET", "/app/default/release")
        .with_status(500)
        .create_async()
        .await;

    let store = Arc::new(ConfigStore::new(source(&server.url())));
    let trigger = Arc::new(RefreshTrigger::new(
        Arc::clone(&store),
        ConfigContext::new("app", "default", "main"),
    ));
    trigger.load_current().await.unwrap();

    let record = trigger.change_label("release").unwrap().wait().await.unwrap();
    assert_eq!(record.phase, RefreshPhase::Failed);
    assert!(record.error.unwrap().contains("500"));

    assert_eq!(trigger.context().label, "release");
    assert_eq!(
        store.snapshot().text("example", "greeting"),
        Some("Hello from main")
    );
}
