//! Patient records and their workbooks.

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::{parse_id, SharedState};
use crate::auth::CurrentUser;
use crate::error::{AppError, SheetError};
use crate::export::{export_mapped, export_unmapped, BatchEntry, MappingConfig, XLSX_CONTENT_TYPE};
use crate::snapshot::SheetSnapshot;
use crate::store::{tashkent_now, PatientRecord};
use crate::workbook::WorkbookFile;
use crate::writer::{apply_snapshots, HeaderFields};

fn file_url(id: u64) -> String {
    format!("/files/{}.xlsx", id)
}

fn xlsx_attachment(bytes: Vec<u8>, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Ids arrive as numbers or numeric strings.
fn id_from_json(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub async fn list_patients(
    State(state): State<SharedState>,
) -> Result<Json<Vec<PatientRecord>>, AppError> {
    Ok(Json(state.store.read_patients()?.patients))
}

pub async fn create_patient(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, AppError> {
    state
        .store
        .ensure_layout()
        .map_err(|e| AppError::internal("Could not create patient", e))?;

    let mut db = state.store.read_patients()?;
    let id = db.create().id;
    state
        .store
        .ensure_patient_workbook(id)
        .map_err(|e| AppError::internal("Could not create patient", e))?;
    state.store.write_patients(&db)?;

    info!("Created patient {}", id);
    state.log_action(&user.session, "create_patient", json!({ "id": id }));
    Ok(Json(json!({ "id": id })))
}

pub async fn sheet_url(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&raw_id)?;
    state
        .store
        .ensure_patient_workbook(id)
        .map_err(|e| AppError::internal("Could not prepare patient file", e))?;
    Ok(Json(json!({ "url": file_url(id) })))
}

#[derive(Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    sheets: Vec<SheetSnapshot>,
}

pub async fn save_patient(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Path(raw_id): Path<String>,
    Json(body): Json<SaveRequest>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&raw_id)?;
    if body.sheets.is_empty() {
        return Err(AppError::bad_request("sheets must not be empty"));
    }

    let path = state
        .store
        .ensure_patient_workbook(id)
        .map_err(|e| AppError::internal("Save failed", e))?;
    let mut workbook = WorkbookFile::load(&path).map_err(|e| AppError::internal("Save failed", e))?;
    let written = apply_snapshots(&mut workbook, &body.sheets).map_err(|e| match e {
        SheetError::MissingWorksheet => AppError::internal("Worksheet not found", e),
        e => AppError::internal("Save failed", e),
    })?;
    workbook
        .save(&path)
        .map_err(|e| AppError::internal("Save failed", e))?;

    let fields = HeaderFields::from_snapshots(&body.sheets, &state.config.header_cells);
    let mut db = state.store.read_patients()?;
    if let Some(record) = db.find_mut(id) {
        fields.apply_to(record);
        record.updated_at = tashkent_now();
        state.store.write_patients(&db)?;
    } else {
        warn!("Saved workbook for unknown patient {}", id);
    }

    info!("Saved patient {} ({} cells)", id, written);
    state.log_action(
        &user.session,
        "update_patient",
        json!({ "id": id, "name": fields.full_name, "phone": fields.phone }),
    );
    Ok(Json(json!({ "ok": true, "file": file_url(id) })))
}

pub async fn download_patient(
    State(state): State<SharedState>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&raw_id)?;
    let path = state.store.patient_workbook_path(id);
    if !path.is_file() {
        return Err(AppError::NotFound("Patient file not found".into()));
    }

    let bytes = fs::read(&path).map_err(|e| AppError::internal("Download failed", e.into()))?;
    Ok(xlsx_attachment(bytes, &format!("patient_{}.xlsx", id)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default, alias = "recordIds")]
    patient_ids: Vec<Value>,
}

/// Mapping rules from `converter.json`, if any. A broken file counts as absent.
fn load_mapping(state: &SharedState) -> Option<MappingConfig> {
    let path = state.config.converter_path()?;
    let parsed = fs::read_to_string(&path)
        .map_err(SheetError::from)
        .and_then(|text| MappingConfig::parse(&text));

    match parsed {
        Ok(config) => config.filter(|c| !c.is_empty()),
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}

fn load_batch(state: &SharedState, ids: &[u64]) -> Result<Vec<BatchEntry>, SheetError> {
    let db = state.store.read_patients()?;

    Ok(ids
        .iter()
        .map(|&id| {
            let path = state.store.patient_workbook_path(id);
            let workbook = if path.is_file() {
                WorkbookFile::load(&path)
                    .map_err(|e| warn!("Skipping unreadable workbook {}: {}", path.display(), e))
                    .ok()
            } else {
                None
            };
            BatchEntry {
                id,
                name: db.find(id).map(|p| p.name.clone()).filter(|n| !n.is_empty()),
                workbook,
            }
        })
        .collect())
}

fn build_export(state: &SharedState, ids: &[u64]) -> Result<(Vec<u8>, String), SheetError> {
    let batch = load_batch(state, ids)?;

    match load_mapping(state) {
        Some(mapping) => {
            let mut output = match state.config.export_template_path() {
                Some(path) => WorkbookFile::load(&path)?,
                None => WorkbookFile::blank("Sheet1")?,
            };
            let exported = export_mapped(&mut output, &mapping.rules, &batch)?;
            info!("Mapped export of {} patients", exported);
            Ok((output.to_bytes()?, "alltmp.xlsx".to_string()))
        }
        None => {
            let bytes = export_unmapped(&batch)?;
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();
            info!("Exported {} patients, one sheet each", batch.len());
            Ok((bytes, format!("patients_export_{}.xlsx", millis)))
        }
    }
}

pub async fn export_patients(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<ExportRequest>,
) -> Result<Response, AppError> {
    let ids: Vec<u64> = body.patient_ids.iter().filter_map(id_from_json).collect();
    if ids.is_empty() {
        return Err(AppError::bad_request("patientIds must not be empty"));
    }

    let (bytes, file_name) = build_export(&state, &ids).map_err(|e| {
        let message = format!("Export failed: {}", e);
        AppError::internal(message, e)
    })?;

    state.log_action(&user.session, "export_patients", json!({ "ids": ids }));
    Ok(xlsx_attachment(bytes, &file_name))
}

#[derive(Deserialize)]
pub struct BulkDeleteRequest {
    #[serde(default)]
    ids: Vec<Value>,
}

pub async fn bulk_delete(
    State(state): State<SharedState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<Value>, AppError> {
    let ids: Vec<u64> = body.ids.iter().filter_map(id_from_json).collect();
    if ids.is_empty() {
        return Err(AppError::bad_request("ids must not be empty"));
    }

    let mut db = state.store.read_patients()?;
    let deleted = db.remove(&ids);
    if deleted.is_empty() {
        return Err(AppError::NotFound("No matching patients".into()));
    }
    state.store.write_patients(&db)?;

    for &id in &deleted {
        if let Err(e) = state.store.remove_patient_workbook(id) {
            warn!("Could not remove workbook of patient {}: {}", id, e);
        }
    }

    state.log_action(&user.session, "bulk_delete_patients", json!({ "ids": deleted }));
    Ok(Json(json!({
        "ok": true,
        "deletedCount": deleted.len(),
        "deletedIds": deleted,
    })))
}
