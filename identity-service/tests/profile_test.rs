mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn test_patient_profile_patch_keeps_missing_fields() {
    let app = TestApp::spawn().await;
    let session = app.signed_in("maya@example.com", "patient").await;

    let (status, body) = app
        .get_auth("/users/me/profile/patient", &session.access_token)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .send(
            Method::PATCH,
            "/users/me/profile/patient",
            Some(json!({
                "date_of_birth": "1990-04-12",
                "gender": "female",
                "medical_history": { "allergies": ["penicillin"] },
            })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .send(
            Method::PATCH,
            "/users/me/profile/patient",
            Some(json!({ "address": "12 Harbour Road" })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], "12 Harbour Road");
    assert_eq!(body["date_of_birth"], "1990-04-12");
    assert_eq!(body["medical_history"]["allergies"][0], "penicillin");

    app.wait_for_audit("patient_profile_updated", 2).await;
}

#[tokio::test]
async fn test_patient_profile_rejects_bad_values() {
    let app = TestApp::spawn().await;
    let session = app.signed_in("maya@example.com", "patient").await;

    let (status, body) = app
        .send(
            Method::PATCH,
            "/users/me/profile/patient",
            Some(json!({ "medical_history": ["not", "an", "object"], "date_of_birth": "2999-01-01" })),
            Some(&session.access_token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["medical_history"].is_array());
    assert!(body["fields"]["date_of_birth"].is_array());
}

#[tokio::test]
async fn test_profiles_are_role_scoped() {
    let app = TestApp::spawn().await;
    let patient = app.signed_in("maya@example.com", "patient").await;
    let doctor = app.signed_in("ade@example.com", "doctor").await;

    let (status, _) = app
        .get_auth("/users/me/profile/doctor", &patient.access_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .get_auth("/users/me/profile/patient", &doctor.access_token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_is_created_once() {
    let app = TestApp::spawn().await;
    let session = app.signed_in("maya@example.com", "patient").await;

    // Registration already created it.
    let (status, body) = app
        .post_auth("/users/me/profile", json!({}), &session.access_token)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_doctor_license_must_be_unique() {
    let app = TestApp::spawn().await;
    let first = app.signed_in("ade@example.com", "doctor").await;
    let second = app.signed_in("bola@example.com", "doctor").await;

    let patch = |token: &str| {
        let token = token.to_string();
        let app = &app;
        async move {
            app.send(
                Method::PATCH,
                "/users/me/profile/doctor",
                Some(json!({ "license_number": "MD-9001", "years_experience": 12 })),
                Some(&token),
            )
            .await
        }
    };

    let (status, body) = patch(&first.access_token).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["years_experience"], 12);

    let (status, body) = patch(&second.access_token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_phone_numbers_keep_a_single_primary() {
    let app = TestApp::spawn().await;
    let session = app.signed_in("maya@example.com", "patient").await;
    let token = session.access_token.as_str();

    let (status, first) = app
        .post_auth(
            "/users/me/phones",
            json!({ "number": "+1 555-123-4567", "is_primary": true }),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    assert_eq!(first["phone_kind"], "mobile");

    let (status, second) = app
        .post_auth(
            "/users/me/phones",
            json!({ "number": "+44 20 7946 0958", "phone_kind": "work", "is_primary": true }),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, phones) = app.get_auth("/users/me/phones", token).await;
    let primaries: Vec<_> = phones
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["is_primary"] == true)
        .collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0]["phone_id"], second["phone_id"]);

    let (status, body) = app
        .post_auth(
            &format!(
                "/users/me/phones/{}/primary",
                first["phone_id"].as_str().unwrap()
            ),
            json!({}),
            token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_primary"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_primary_changes_leave_one_primary() {
    let app = TestApp::spawn().await;
    let session = app.signed_in("maya@example.com", "patient").await;
    let token = session.access_token.as_str();

    let mut ids = Vec::new();
    for number in ["+1 555-000-0001", "+1 555-000-0002", "+1 555-000-0003"] {
        let (_, phone) = app
            .post_auth("/users/me/phones", json!({ "number": number }), token)
            .await;
        ids.push(phone["phone_id"].as_str().unwrap().to_string());
    }

    let uris: Vec<String> = ids
        .iter()
        .map(|id| format!("/users/me/phones/{}/primary", id))
        .collect();
    let (a, b, c) = tokio::join!(
        app.post_auth(&uris[0], json!({}), token),
        app.post_auth(&uris[1], json!({}), token),
        app.post_auth(&uris[2], json!({}), token),
    );
    assert!([a.0, b.0, c.0].iter().all(|s| *s == StatusCode::OK));

    let (_, phones) = app.get_auth("/users/me/phones", token).await;
    let primaries = phones
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["is_primary"] == true)
        .count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
async fn test_phone_validation_and_ownership() {
    let app = TestApp::spawn().await;
    let maya = app.signed_in("maya@example.com", "patient").await;
    let other = app.signed_in("other@example.com", "patient").await;

    let (status, body) = app
        .post_auth(
            "/users/me/phones",
            json!({ "number": "call me" }),
            &maya.access_token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["number"].is_array());

    let (_, phone) = app
        .post_auth(
            "/users/me/phones",
            json!({ "number": "+1 555-123-4567" }),
            &maya.access_token,
        )
        .await;
    let uri = format!("/users/me/phones/{}", phone["phone_id"].as_str().unwrap());

    let (status, _) = app
        .send(Method::DELETE, &uri, None, Some(&other.access_token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(Method::DELETE, &uri, None, Some(&maya.access_token))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, phones) = app.get_auth("/users/me/phones", &maya.access_token).await;
    assert!(phones.as_array().unwrap().is_empty());
}
