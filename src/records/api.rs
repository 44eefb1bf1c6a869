//! Record API Endpoints
//! Mission: CRUD for income and expense records, scoped to the acting user
//!
//! Every handler runs behind the auth middleware, so the owner identity
//! always comes from validated claims. Create and update consume
//! multipart/form-data: text fields carry the payload, file fields are
//! persisted through the upload collaborator before the store call.

use crate::auth::models::Claims;
use crate::records::models::{ExpensePayload, ExpenseRecord, FileRef, IncomePayload, IncomeRecord};
use crate::records::store::RecordStore;
use crate::uploads::FileStore;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared record API state
#[derive(Clone)]
pub struct RecordsState {
    pub store: Arc<RecordStore>,
    pub files: Arc<FileStore>,
}

impl RecordsState {
    pub fn new(store: Arc<RecordStore>, files: Arc<FileStore>) -> Self {
        Self { store, files }
    }
}

/// Text fields plus stored file references from one multipart request
struct RecordForm {
    fields: HashMap<String, String>,
    files: Vec<(String, FileRef)>,
}

impl RecordForm {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// First file uploaded under the given field name
    fn file(&self, name: &str) -> Option<FileRef> {
        self.files
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, r)| r.clone())
    }

    /// All files uploaded under the given field name, in request order
    fn files_named(&self, name: &str) -> Vec<FileRef> {
        self.files
            .iter()
            .filter(|(field, _)| field == name)
            .map(|(_, r)| r.clone())
            .collect()
    }
}

/// Drain a multipart body, storing file parts as they stream in
async fn read_form(mut multipart: Multipart, files: &FileStore) -> Result<RecordForm, ApiError> {
    let mut form = RecordForm {
        fields: HashMap::new(),
        files: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(original) = field.file_name().map(|f| f.to_string()) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Failed to read upload: {e}")))?;
            let file_ref = files.store(&original, &bytes).map_err(ApiError::internal)?;
            form.files.push((name, file_ref));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("Malformed field {name}: {e}")))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

fn owner_from_claims(claims: &Claims) -> Result<Uuid, ApiError> {
    Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)
}

// ===== Income =====

/// POST /api/incomes
pub async fn create_income(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<IncomeRecord>), ApiError> {
    let owner = owner_from_claims(&claims)?;
    let form = read_form(multipart, &state.files).await?;

    let payload =
        IncomePayload::from_fields(form.field("amount"), form.fields.get("notes").cloned())
            .map_err(ApiError::Validation)?;
    let slip = form.file("slip");

    let record = state
        .store
        .create_income(&owner, &payload, slip)
        .map_err(ApiError::internal)?;

    info!("Income {} created by {}", record.id, claims.username);

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/incomes
pub async fn list_incomes(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<IncomeRecord>>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let records = state.store.list_incomes(&owner).map_err(ApiError::internal)?;
    Ok(Json(records))
}

/// GET /api/incomes/:id
pub async fn get_income(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<IncomeRecord>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    state
        .store
        .get_income(&owner, &id)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// PUT /api/incomes/:id
pub async fn update_income(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<IncomeRecord>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let form = read_form(multipart, &state.files).await?;

    let payload =
        IncomePayload::from_fields(form.field("amount"), form.fields.get("notes").cloned())
            .map_err(ApiError::Validation)?;
    let slip = form.file("slip");

    state
        .store
        .update_income(&owner, &id, &payload, slip)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// DELETE /api/incomes/:id
pub async fn delete_income(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let deleted = state
        .store
        .delete_income(&owner, &id)
        .map_err(ApiError::internal)?;

    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("Income {} deleted by {}", id, claims.username);
    Ok(StatusCode::NO_CONTENT)
}

// ===== Expense =====

/// POST /api/expenses
pub async fn create_expense(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ExpenseRecord>), ApiError> {
    let owner = owner_from_claims(&claims)?;
    let form = read_form(multipart, &state.files).await?;

    let payload = ExpensePayload::from_fields(
        form.field("items"),
        form.field("total_amount"),
        form.fields.get("notes").cloned(),
    )
    .map_err(ApiError::Validation)?;
    let images = form.files_named("images");

    let record = state
        .store
        .create_expense(&owner, &payload, images)
        .map_err(ApiError::internal)?;

    info!("Expense {} created by {}", record.id, claims.username);

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/expenses
pub async fn list_expenses(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ExpenseRecord>>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let records = state.store.list_expenses(&owner).map_err(ApiError::internal)?;
    Ok(Json(records))
}

/// GET /api/expenses/:id
pub async fn get_expense(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExpenseRecord>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    state
        .store
        .get_expense(&owner, &id)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// PUT /api/expenses/:id
pub async fn update_expense(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ExpenseRecord>, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let form = read_form(multipart, &state.files).await?;

    let payload = ExpensePayload::from_fields(
        form.field("items"),
        form.field("total_amount"),
        form.fields.get("notes").cloned(),
    )
    .map_err(ApiError::Validation)?;
    let images = form.files_named("images");

    state
        .store
        .update_expense(&owner, &id, &payload, images)
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// DELETE /api/expenses/:id
pub async fn delete_expense(
    State(state): State<RecordsState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from_claims(&claims)?;
    let deleted = state
        .store
        .delete_expense(&owner, &id)
        .map_err(ApiError::internal)?;

    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("Expense {} deleted by {}", id, claims.username);
    Ok(StatusCode::NO_CONTENT)
}

// ===== Error Handling =====

/// Record API errors
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized,
    /// Absent or owned by another identity; the two are indistinguishable
    NotFound,
    Internal(String),
}

impl ApiError {
    fn internal(err: anyhow::Error) -> Self {
        error!("Record API internal error: {:#}", err);
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Record not found".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
