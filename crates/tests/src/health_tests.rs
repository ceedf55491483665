use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn health_reports_provider_readiness() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["mode"], "memory");
    assert_eq!(json["providers"]["asr"], true);
    assert_eq!(json["providers"]["llm"], true);
    assert_eq!(json["providers"]["embedding"], true);
    assert_eq!(json["providers"]["vector"], true);
}
