use crate::fixtures::mocks::LlmStep;
use crate::fixtures::test_app::TestApp;
use reqwest::multipart;
use serde_json::Value;

#[tokio::test]
async fn transient_llm_failure_retries_once_then_succeeds() {
    // One injected timeout, then the scripted success.
    let app = TestApp::spawn_with(
        vec![
            LlmStep::Timeout,
            LlmStep::Text("# 会议纪要\n\n恢复成功".into()),
        ],
        None,
    )
    .await;

    let form = multipart::Form::new()
        .text("text_content", "今天讨论了产品迭代")
        // Keep auto-history out of the call count.
        .text("history_mode", "summary");
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "success");
    assert!(json["html_content"].as_str().unwrap().contains("恢复成功"));
    assert_eq!(app.llm.call_count(), 2);
}

#[tokio::test]
async fn transient_failures_are_bounded_to_three_calls() {
    let app = TestApp::spawn_with(
        vec![LlmStep::Timeout, LlmStep::Timeout, LlmStep::Timeout],
        None,
    )
    .await;

    let form = multipart::Form::new()
        .text("text_content", "内容")
        .text("history_mode", "summary");
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 504);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "UPSTREAM_TIMEOUT");
    // Three provider calls, never a fourth.
    assert_eq!(app.llm.call_count(), 3);
}
