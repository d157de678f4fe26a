use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use super::documents::{DocumentStorage, UploadedFile};
use super::domain::{
    ApplyMethod, ClientId, DependentDetail, DependentId, DependentKind, FormStatus, NewClient,
    NewTaxForm, RentalIncomeClient, TaxFormAnswers, TaxFormId, UserAccountId,
};
use super::otp::{OtpDelivery, OtpError};
use super::repository::{IntakeRepository, RepositoryError};
use super::service::{ServiceError, TaxFormService};

/// Transport ceiling for request bodies. Kept well above the 4 MiB upload rule so oversized
/// documents are rejected by validation with a readable message.
pub const REQUEST_BODY_LIMIT: usize = 16 * 1024 * 1024;

type SharedService<R, S, D> = Arc<TaxFormService<R, S, D>>;

#[derive(Debug, Deserialize)]
pub struct PhoneUpdate {
    pub phone_number: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerification {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: FormStatus,
}

#[derive(Debug, Deserialize)]
pub struct ApplyMethodUpdate {
    pub apply_method: ApplyMethod,
}

/// Router exposing client, tax form, and dependent endpoints under `/api/v1`.
pub fn intake_router<R, S, D>(service: SharedService<R, S, D>) -> Router
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    Router::new()
        .route("/api/v1/clients", post(register_client_handler::<R, S, D>))
        .route(
            "/api/v1/clients/:client_id",
            get(client_handler::<R, S, D>).delete(delete_client_handler::<R, S, D>),
        )
        .route(
            "/api/v1/clients/:client_id/phone",
            put(update_phone_handler::<R, S, D>),
        )
        .route(
            "/api/v1/clients/:client_id/otp",
            post(issue_otp_handler::<R, S, D>),
        )
        .route(
            "/api/v1/clients/:client_id/otp/verify",
            post(verify_otp_handler::<R, S, D>),
        )
        .route(
            "/api/v1/clients/:client_id/tax-forms",
            get(client_forms_handler::<R, S, D>),
        )
        .route(
            "/api/v1/users/:user_id",
            delete(user_deleted_handler::<R, S, D>),
        )
        .route("/api/v1/tax-forms", post(create_form_handler::<R, S, D>))
        .route(
            "/api/v1/tax-forms/:form_id",
            get(form_handler::<R, S, D>)
                .put(update_answers_handler::<R, S, D>)
                .delete(delete_form_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/status",
            put(set_status_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/apply-method",
            put(set_apply_method_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/sub-forms",
            get(sub_forms_handler::<R, S, D>).post(create_sub_form_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/documents/:field/:file_name",
            put(form_document_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/dependents",
            get(all_dependents_handler::<R, S, D>),
        )
        .route(
            "/api/v1/tax-forms/:form_id/dependents/:kind",
            get(dependents_handler::<R, S, D>).post(add_dependent_handler::<R, S, D>),
        )
        .route(
            "/api/v1/rental-income",
            post(unlinked_rental_income_handler::<R, S, D>),
        )
        .route(
            "/api/v1/dependents/:kind/:dependent_id",
            get(dependent_handler::<R, S, D>)
                .put(update_dependent_handler::<R, S, D>)
                .delete(delete_dependent_handler::<R, S, D>),
        )
        .route(
            "/api/v1/dependents/:kind/:dependent_id/documents/:field/:file_name",
            put(dependent_document_handler::<R, S, D>),
        )
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT))
        .with_state(service)
}

pub(crate) async fn register_client_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Json(request): Json<NewClient>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::CREATED, service.register_client(request))
}

pub(crate) async fn client_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::OK, service.get_client(ClientId(client_id)))
}

pub(crate) async fn delete_client_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let result = service
        .delete_client(ClientId(client_id))
        .map(|detached| json!({ "detached_tax_forms": detached }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn update_phone_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
    Json(update): Json<PhoneUpdate>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::OK,
        service.update_phone(ClientId(client_id), update.phone_number),
    )
}

pub(crate) async fn issue_otp_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let result = service
        .issue_otp(ClientId(client_id))
        .map(|()| json!({ "status": "sent" }));
    respond(StatusCode::ACCEPTED, result)
}

pub(crate) async fn verify_otp_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
    Json(verification): Json<OtpVerification>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let result = service
        .verify_otp(ClientId(client_id), &verification.code)
        .map(|()| json!({ "verified": true }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn client_forms_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(client_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::OK, service.forms_for_client(ClientId(client_id)))
}

pub(crate) async fn user_deleted_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(user_id): Path<String>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let result = service
        .user_account_deleted(&UserAccountId(user_id))
        .map(|client| json!({ "detached_client": client }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_form_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Json(request): Json<NewTaxForm>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::CREATED, service.create_form(request))
}

pub(crate) async fn form_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::OK, service.get_form(TaxFormId(form_id)))
}

pub(crate) async fn update_answers_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
    Json(answers): Json<TaxFormAnswers>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::OK,
        service.update_answers(TaxFormId(form_id), answers),
    )
}

pub(crate) async fn delete_form_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let result = service.delete_form(TaxFormId(form_id)).map(|report| {
        let forms: Vec<TaxFormId> = report.forms.iter().map(|record| record.id()).collect();
        json!({
            "deleted_tax_forms": forms,
            "deleted_dependents": report.dependents.len(),
        })
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn set_status_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
    Json(update): Json<StatusUpdate>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::OK,
        service.set_status(TaxFormId(form_id), update.status),
    )
}

pub(crate) async fn set_apply_method_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
    Json(update): Json<ApplyMethodUpdate>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::OK,
        service.set_apply_method(TaxFormId(form_id), update.apply_method),
    )
}

pub(crate) async fn sub_forms_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::OK, service.sub_forms(TaxFormId(form_id)))
}

pub(crate) async fn create_sub_form_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
    Json(answers): Json<TaxFormAnswers>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::CREATED,
        service.create_sub_form(TaxFormId(form_id), answers),
    )
}

pub(crate) async fn form_document_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((form_id, field, file_name)): Path<(u64, String, String)>,
    body: Bytes,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let upload = UploadedFile::new(file_name, body.to_vec());
    respond(
        StatusCode::OK,
        service.attach_form_document(TaxFormId(form_id), &field, upload),
    )
}

pub(crate) async fn all_dependents_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path(form_id): Path<u64>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(StatusCode::OK, service.dependents(TaxFormId(form_id), None))
}

pub(crate) async fn dependents_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((form_id, kind)): Path<(u64, String)>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.dependents(TaxFormId(form_id), Some(kind)),
    )
}

pub(crate) async fn add_dependent_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((form_id, kind)): Path<(u64, String)>,
    Json(payload): Json<Value>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let detail = match parse_kind(&kind).and_then(|kind| detail_from_payload(kind, payload)) {
        Ok(detail) => detail,
        Err(response) => return response,
    };
    respond(
        StatusCode::CREATED,
        service.add_dependent(TaxFormId(form_id), detail),
    )
}

pub(crate) async fn unlinked_rental_income_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Json(detail): Json<RentalIncomeClient>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    respond(
        StatusCode::CREATED,
        service.add_unlinked_rental_income(detail),
    )
}

pub(crate) async fn dependent_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((kind, dependent_id)): Path<(String, u64)>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.get_dependent(kind, DependentId(dependent_id)),
    )
}

pub(crate) async fn update_dependent_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((kind, dependent_id)): Path<(String, u64)>,
    Json(payload): Json<Value>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let parsed = parse_kind(&kind)
        .and_then(|kind| detail_from_payload(kind, payload).map(|detail| (kind, detail)));
    let (kind, detail) = match parsed {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.update_dependent(kind, DependentId(dependent_id), detail),
    )
}

pub(crate) async fn delete_dependent_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((kind, dependent_id)): Path<(String, u64)>,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.delete_dependent(kind, DependentId(dependent_id)),
    )
}

pub(crate) async fn dependent_document_handler<R, S, D>(
    State(service): State<SharedService<R, S, D>>,
    Path((kind, dependent_id, field, file_name)): Path<(String, u64, String, String)>,
    body: Bytes,
) -> Response
where
    R: IntakeRepository + 'static,
    S: DocumentStorage + 'static,
    D: OtpDelivery + 'static,
{
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let upload = UploadedFile::new(file_name, body.to_vec());
    respond(
        StatusCode::OK,
        service.attach_dependent_document(kind, DependentId(dependent_id), &field, upload),
    )
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => err.into_response(),
    }
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn parse_kind(raw: &str) -> Result<DependentKind, Response> {
    raw.parse::<DependentKind>()
        .map_err(|err| error_body(StatusCode::NOT_FOUND, err.to_string()))
}

/// The path already names the table, so the `kind` tag may be omitted from the body.
fn detail_from_payload(kind: DependentKind, mut payload: Value) -> Result<DependentDetail, Response> {
    if let Value::Object(fields) = &mut payload {
        fields
            .entry("kind")
            .or_insert_with(|| Value::String(kind.slug().to_string()));
    }
    let detail: DependentDetail = serde_json::from_value(payload)
        .map_err(|err| error_body(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))?;
    match ServiceError::kind_mismatch(kind, &detail) {
        Some(err) => Err(err.into_response()),
        None => Ok(detail),
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Validation(_) | ServiceError::KindMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Repository(
                RepositoryError::InvalidReference { .. } | RepositoryError::Immutable { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Repository(RepositoryError::NotFound { .. })
            | ServiceError::UnknownDocumentField { .. } => StatusCode::NOT_FOUND,
            ServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
            ServiceError::Otp(OtpError::InvalidCode) => StatusCode::UNAUTHORIZED,
            ServiceError::Repository(RepositoryError::Unavailable(_))
            | ServiceError::Storage(_)
            | ServiceError::Codec(_)
            | ServiceError::Otp(OtpError::Delivery(_)) => {
                error!(error = %self, "intake request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_body(status, self.to_string())
    }
}
