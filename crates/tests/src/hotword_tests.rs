use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn reload_picks_up_added_words() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/hotwords"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let baseline: Value = resp.json().await.unwrap();
    let total_before = baseline["total"].as_u64().unwrap();
    assert!(total_before > 0);
    assert!(baseline["hotwords"].as_str().unwrap().contains(' '));

    // Rewrite the backing file with three extra words.
    let content = serde_json::json!({
        "人名": ["张三", "李四", "王五"],
        "项目名": ["智能办公", "数据中台"],
        "技术词汇": ["机器学习", "深度学习", "大语言模型", "向量检索", "语音识别", "说话人分离"],
    });
    std::fs::write(
        &app.settings.hotwords.file,
        serde_json::to_string_pretty(&content).unwrap(),
    )
    .unwrap();

    let resp = app
        .client
        .post(app.url("/hotwords/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let reloaded: Value = resp.json().await.unwrap();
    assert_eq!(reloaded["total"].as_u64().unwrap(), total_before + 3);
    assert!(reloaded["hotwords"]
        .as_str()
        .unwrap()
        .contains("向量检索"));
}

#[tokio::test]
async fn listing_reports_categories_and_stats() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/hotwords"))
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();

    let categories = json["categories"].as_array().unwrap();
    assert!(!categories.is_empty());
    let stats = json["stats"].as_object().unwrap();
    assert_eq!(stats.len(), categories.len());
}
