use crate::fixtures::test_app::TestApp;
use reqwest::multipart;
use serde_json::{json, Value};

fn minutes_markdown() -> String {
    let mut md = String::from("# 数据中台评审会\n\n");
    for i in 0..32 {
        md.push_str(&format!(
            "第{}项讨论围绕数据中台的接口改造展开，双方确认了里程碑与验收标准，并同意在下一个迭代中完成联调。",
            i
        ));
    }
    md.push_str("\n\n## 决策事项\n\n");
    for i in 0..20 {
        md.push_str(&format!("决议{}：采用新的发布流程并由平台组负责回滚预案。", i));
    }
    md
}

#[tokio::test]
async fn archive_chunks_a_long_minute() {
    let app = TestApp::spawn().await;

    let md = minutes_markdown();
    assert!(md.chars().count() >= 2000);

    let resp = app
        .client
        .post(app.url("/archive"))
        .json(&json!({
            "minutes_id": 101,
            "markdown_content": md,
            "user_id": "u42",
            "meeting_date": "2026-07-30",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "success");
    let chunks = json["chunks_count"].as_u64().unwrap();
    assert!((3..=6).contains(&chunks), "got {} chunks", chunks);
}

#[tokio::test]
async fn archive_is_idempotent_per_minutes_id() {
    let app = TestApp::spawn().await;
    let md = minutes_markdown();

    let mut counts = Vec::new();
    for _ in 0..2 {
        let resp = app
            .client
            .post(app.url("/archive"))
            .json(&json!({ "minutes_id": 7, "markdown_content": md }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let json: Value = resp.json().await.unwrap();
        counts.push(json["chunks_count"].as_u64().unwrap());
    }
    assert_eq!(counts[0], counts[1]);
}

#[tokio::test]
async fn empty_markdown_is_rejected() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/archive"))
        .json(&json!({ "minutes_id": 1, "markdown_content": "  " }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "BAD_INPUT");
}

#[tokio::test]
async fn retrieval_after_archive_surfaces_history() {
    let app = TestApp::spawn().await;

    // Archive a minute, then process an overlapping transcript with
    // retrieval mode pointed at it.
    let resp = app
        .client
        .post(app.url("/archive"))
        .json(&json!({ "minutes_id": 55, "markdown_content": minutes_markdown() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let form = multipart::Form::new()
        .text(
            "text_content",
            "继续讨论数据中台的接口改造与里程碑验收标准",
        )
        .text("history_meeting_ids", "55")
        .text("history_mode", "retrieval");
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
    assert_eq!(json["need_rag"], true);
}
