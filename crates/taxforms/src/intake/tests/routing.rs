use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::intake::documents::InMemoryDocumentStorage;
use crate::intake::memory::InMemoryIntakeStore;
use crate::intake::repository::IntakeRepository;
use crate::intake::router::{client_handler, REQUEST_BODY_LIMIT};

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn raw_request(uri: &str, bytes: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::PUT)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes))
        .expect("request builds")
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn client_registration_maps_validation_to_unprocessable() {
    let harness = harness();

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/clients",
            json!({ "phone_number": "416555123" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "Phone number must be exactly 10 digits.");

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/clients",
            json!({ "phone_number": "4165551234", "user": "user-9" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["phone_number"], "4165551234");
    assert!(payload.get("otp").is_none());

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/clients",
            json!({ "phone_number": "4165551234", "user": "user-9" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn client_handler_returns_not_found_for_unknown_ids() {
    let harness = harness();
    let response = client_handler::<InMemoryIntakeStore, InMemoryDocumentStorage, MemoryOtp>(
        State(harness.service.clone()),
        Path(404),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tax_form_lifecycle_over_http() {
    let harness = harness();
    let client = registered_client(&harness.service);

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            "/api/v1/tax-forms",
            json!({
                "client": client.id.0,
                "answers": { "personal": { "first_name": "Amira", "sin_number": "123456789" } }
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let form = read_json_body(response).await;
    assert_eq!(form["status"], "draft");
    assert_eq!(form["apply_method"], "online");
    let form_id = form["id"].as_u64().expect("numeric id");

    let response = router(&harness)
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/tax-forms/{form_id}"),
            json!({ "personal": { "sin_number": "12345678" } }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router(&harness)
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/tax-forms/{form_id}/status"),
            json!({ "status": "submitted" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["status"], "submitted");

    let response = router(&harness)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/clients/{}/tax-forms", client.id.0),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let forms = read_json_body(response).await;
    assert_eq!(forms.as_array().map(Vec::len), Some(1));

    let response = router(&harness)
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/v1/tax-forms/{form_id}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["deleted_tax_forms"], json!([form_id]));

    let response = router(&harness)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/tax-forms/{form_id}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_optional_fields_are_accepted_over_http() {
    let harness = harness();
    let client = registered_client(&harness.service);
    let form = draft_form(&harness.service, &client);

    let response = router(&harness)
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/tax-forms/{}", form.id.0),
            json!({
                "personal": { "first_name": "", "sin_number": "" },
                "contact": { "email": "" }
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["answers"]["personal"]["sin_number"], Value::Null);

    let record = harness
        .store
        .fetch_form(form.id)
        .expect("store reachable")
        .expect("record stored");
    assert!(record.sealed_sin.is_none());
}

#[tokio::test]
async fn uploads_are_judged_by_validation_not_transport() {
    let harness = harness();
    let client = registered_client(&harness.service);
    let form = draft_form(&harness.service, &client);
    assert!(REQUEST_BODY_LIMIT > 5 * MIB);

    let response = router(&harness)
        .oneshot(raw_request(
            &format!("/api/v1/tax-forms/{}/documents/id_document/passport.pdf", form.id.0),
            vec![0u8; 5 * MIB],
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload["error"],
        "id_document: File size must be no more than 4 MB."
    );

    let response = router(&harness)
        .oneshot(raw_request(
            &format!("/api/v1/tax-forms/{}/documents/id_document/passport.docx", form.id.0),
            vec![0u8; 2 * MIB],
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router(&harness)
        .oneshot(raw_request(
            &format!("/api/v1/tax-forms/{}/documents/id_document/passport.png", form.id.0),
            vec![0u8; 2 * MIB],
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["id_document"]["file_name"], "passport.png");
    assert_eq!(harness.storage.len(), 1);

    let response = router(&harness)
        .oneshot(raw_request(
            &format!("/api/v1/tax-forms/{}/documents/t4_document/t4.pdf", form.id.0),
            vec![1, 2, 3],
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dependents_are_addressed_by_kind_slug() {
    let harness = harness();
    let client = registered_client(&harness.service);
    let form = draft_form(&harness.service, &client);

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/tax-forms/{}/dependents/self_employed", form.id.0),
            json!({ "hst_access_code": "HST-1", "fuel_expenses": "99.99" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let record = read_json_body(response).await;
    assert_eq!(record["detail"]["kind"], "self_employed");
    let id = record["id"].as_u64().expect("numeric id");

    let response = router(&harness)
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/dependents/self_employed/{id}"),
            json!({ "hst_access_code": "HST-1", "meals_expenses": "12345.67" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/tax-forms/{}/dependents/children", form.id.0),
            json!({ "kind": "employed" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = router(&harness)
        .oneshot(empty_request(
            Method::GET,
            &format!("/api/v1/tax-forms/{}/dependents/pets", form.id.0),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router(&harness)
        .oneshot(empty_request(
            Method::DELETE,
            &format!("/api/v1/dependents/self_employed/{id}"),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.store.dependent_count(), 0);
}

#[tokio::test]
async fn otp_verification_rejects_wrong_codes() {
    let harness = harness();
    let client = registered_client(&harness.service);

    let response = router(&harness)
        .oneshot(empty_request(
            Method::POST,
            &format!("/api/v1/clients/{}/otp", client.id.0),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let code = harness.otp.last_code().expect("delivered");

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/clients/{}/otp/verify", client.id.0),
            json!({ "code": "wrong" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&harness)
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/clients/{}/otp/verify", client.id.0),
            json!({ "code": code }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["verified"], true);
}
