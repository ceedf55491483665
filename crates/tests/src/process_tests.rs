use crate::fixtures::test_app::TestApp;
use reqwest::multipart;
use serde_json::Value;

#[tokio::test]
async fn text_only_request_succeeds() {
    let app = TestApp::spawn().await;

    let form = multipart::Form::new()
        .text("text_content", "今天讨论了产品迭代")
        .text("template", "default");
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
    assert_eq!(json["transcript"].as_array().unwrap().len(), 0);
    assert_eq!(json["raw_text"], "今天讨论了产品迭代");
    assert!(json["html_content"].as_str().unwrap().contains("<h1>"));
    assert!(json["need_rag"].is_boolean());
    assert!(json["usage_tokens"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn zero_inputs_is_bad_input() {
    let app = TestApp::spawn().await;

    let form = multipart::Form::new().text("template", "default");
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "BAD_INPUT");
}

#[tokio::test]
async fn multiple_input_kinds_are_rejected() {
    let app = TestApp::spawn().await;

    let form = multipart::Form::new()
        .text("text_content", "文本")
        .text("audio_urls", "http://example.com/a.wav");
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "BAD_INPUT");
}

#[tokio::test]
async fn empty_upload_is_bad_input() {
    let app = TestApp::spawn().await;

    let part = multipart::Part::bytes(Vec::new()).file_name("empty.wav");
    let form = multipart::Form::new().part("files", part);
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn diarized_audio_has_dense_speakers_and_monotone_timeline() {
    let app = TestApp::spawn().await;

    let clip = TestApp::wav_clip(30.0);
    let part = multipart::Part::bytes(clip).file_name("meeting.wav");
    let form = multipart::Form::new().part("files", part);
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
    assert!(transcript.len() >= 2);

    let mut speaker_ids: Vec<u64> = transcript
        .iter()
        .map(|s| s["speaker_id"].as_u64().unwrap())
        .collect();
    speaker_ids.sort_unstable();
    speaker_ids.dedup();
    assert_eq!(speaker_ids, vec![0, 1]);
    assert_eq!(transcript[0]["speaker_id"], 0);

    let mut previous_start = -1.0f64;
    for segment in transcript {
        let start = segment["start_s"].as_f64().unwrap();
        let end = segment["end_s"].as_f64().unwrap();
        assert!(end >= start && start >= 0.0);
        assert!(end <= 30.0);
        assert!(start >= previous_start);
        previous_start = start;
    }

    let raw_text = json["raw_text"].as_str().unwrap();
    assert!(raw_text.contains("评审"));
    assert!(raw_text.contains("数据中台"));
}

#[tokio::test]
async fn unknown_llm_model_is_rejected() {
    let app = TestApp::spawn().await;

    let form = multipart::Form::new()
        .text("text_content", "内容")
        .text("llm_model", "gpt9");
    let resp = app
        .client
        .post(app.url("/process"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}
