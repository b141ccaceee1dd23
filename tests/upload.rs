//! Upload endpoint integration tests
//!
//! Covers multipart image uploads, MIME and size rejection, the per-request
//! file cap, static serving of stored files, and the round trip from upload
//! URL to inlined image in the upstream chat payload.

mod common;

use std::io::Cursor;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::{mock_chat_completions, spawn_app, sse_body};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40u8, 40u8]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn image_part(name: &str, bytes: Vec<u8>) -> Part {
    Part::bytes(bytes).file_name(name).mime_type("image/png")
}

#[tokio::test]
async fn upload_stores_file_and_serves_it_back() {
    let app = spawn_app().await;

    let form = MultipartForm::new().add_part("images", image_part("photo.png", png_bytes(8, 8)));
    let response = app.server.post("/upload").multipart(form).await;
    response.assert_status_ok();

    let body: Value = response.json();
    let urls = body["urls"].as_array().unwrap();
    assert_eq!(urls.len(), 1);

    let url = urls[0].as_str().unwrap();
    assert!(url.starts_with("http://localhost:3001/uploads/"));
    assert!(url.ends_with(".png"));

    // The stored file is publicly fetchable under /uploads/
    let filename = url.rsplit('/').next().unwrap();
    let served = app.server.get(&format!("/uploads/{}", filename)).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().to_vec(), png_bytes(8, 8));
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = spawn_app().await;

    let form = MultipartForm::new().add_part(
        "images",
        Part::bytes(b"#!/bin/sh".to_vec())
            .file_name("script.sh")
            .mime_type("text/x-shellscript"),
    );
    let response = app.server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Only image files are accepted");
}

#[tokio::test]
async fn eleven_files_are_truncated_to_ten() {
    let app = spawn_app().await;

    let bytes = png_bytes(4, 4);
    let mut form = MultipartForm::new();
    for i in 0..11 {
        form = form.add_part(
            "images",
            image_part(&format!("img-{}.png", i), bytes.clone()),
        );
    }

    let response = app.server.post("/upload").multipart(form).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["urls"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn oversize_file_is_rejected() {
    let app = spawn_app().await;

    // Valid MIME type but over the 5 MB per-file limit
    let form = MultipartForm::new().add_part(
        "images",
        Part::bytes(vec![0u8; 6 * 1024 * 1024])
            .file_name("huge.png")
            .mime_type("image/png"),
    );
    let response = app.server.post("/upload").multipart(form).await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn uploaded_image_is_inlined_into_the_chat_payload() {
    let app = spawn_app().await;
    mock_chat_completions(&app.upstream, sse_body(&["I see it"])).await;

    // Upload an image large enough to trigger the resize path
    let form =
        MultipartForm::new().add_part("images", image_part("big.png", png_bytes(2000, 1000)));
    let upload: Value = app.server.post("/upload").multipart(form).await.json();
    let url = upload["urls"][0].as_str().unwrap().to_string();

    let response = app
        .server
        .post("/chat")
        .json(&json!({
            "messages": [{"role": "user", "content": "what is this?"}],
            "images": [url],
        }))
        .await;
    response.assert_status_ok();

    let requests = app.upstream.received_requests().await.unwrap();
    let payload: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let last = payload["messages"].as_array().unwrap().last().unwrap();

    assert_eq!(last["role"], "user");
    let parts = last["content"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["type"], "text");
    assert_eq!(parts[0]["text"], "what is this?");
    assert_eq!(parts[1]["type"], "image_url");
    assert!(parts[1]["image_url"]["url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}
