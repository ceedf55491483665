use crate::fixtures::mocks::MockSpeakerEmbedder;
use crate::fixtures::test_app::TestApp;
use reqwest::multipart;
use serde_json::Value;

fn voiceprint_vector() -> Vec<f32> {
    (0..192).map(|i| (i as f32 * 0.013).sin()).collect()
}

async fn register_zhangsan(app: &TestApp) -> Value {
    let clip = TestApp::wav_clip(5.0);
    let form = multipart::Form::new()
        .part("file", multipart::Part::bytes(clip).file_name("张三.wav"))
        .text("name", "张三")
        .text("employee_id", "EMP001");
    let resp = app
        .client
        .post(app.url("/voice/register"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    resp.json().await.unwrap()
}

#[tokio::test]
async fn registration_returns_the_vector_dimension() {
    let app = TestApp::spawn_with(
        Vec::new(),
        Some(MockSpeakerEmbedder::matching(voiceprint_vector())),
    )
    .await;

    let json = register_zhangsan(&app).await;
    assert_eq!(json["code"], 200);
    assert_eq!(json["data"]["employee_id"], "EMP001");
    assert_eq!(json["data"]["name"], "张三");
    assert_eq!(json["data"]["vector_dim"], 192);
}

#[tokio::test]
async fn too_short_clip_is_rejected_with_400() {
    let app = TestApp::spawn_with(
        Vec::new(),
        Some(MockSpeakerEmbedder::matching(voiceprint_vector())),
    )
    .await;

    let clip = TestApp::wav_clip(0.3);
    let form = multipart::Form::new()
        .part("file", multipart::Part::bytes(clip).file_name("short.wav"))
        .text("name", "李四")
        .text("employee_id", "EMP002");
    let resp = app
        .client
        .post(app.url("/voice/register"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn unconfigured_embedder_reports_500() {
    let app = TestApp::spawn().await;

    let clip = TestApp::wav_clip(5.0);
    let form = multipart::Form::new()
        .part("file", multipart::Part::bytes(clip).file_name("a.wav"))
        .text("name", "张三")
        .text("employee_id", "EMP001");
    let resp = app
        .client
        .post(app.url("/voice/register"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 500);
}

#[tokio::test]
async fn processing_identifies_a_registered_speaker() {
    // The mock embedder returns the same vector at registration and match
    // time, so the registered identity must clear the 0.75 threshold.
    let app = TestApp::spawn_with(
        Vec::new(),
        Some(MockSpeakerEmbedder::matching(voiceprint_vector())),
    )
    .await;

    let json = register_zhangsan(&app).await;
    assert_eq!(json["code"], 200);

    let clip = TestApp::wav_clip(30.0);
    let form = multipart::Form::new()
        .part("files", multipart::Part::bytes(clip).file_name("meeting.wav"));
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    let transcript = json["transcript"].as_array().unwrap();

    let named: Vec<&Value> = transcript
        .iter()
        .filter(|s| s["speaker_name"] == "张三")
        .collect();
    assert!(!named.is_empty(), "expected at least one identified segment");
    for segment in named {
        assert_eq!(segment["employee_id"], "EMP001");
        assert!(segment["voice_similarity"].as_f64().unwrap() >= 0.75);
    }
}
