use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use tracing::{error, info};

use super::{error_response, inventory_error, not_found, ApiError, ApiResult, LimitParams};
use crate::constants::DEFAULT_RECENT_ACTIVITY_LIMIT;
use crate::models::{
    Actor, AdjustmentRequest, CountRequest, DateRange, Item, ItemFilter, ItemUpdate, NewItem,
    StockMovementRequest, Transaction, TransferRequest,
};
use crate::services::labels::{self, LabelData};
use crate::services::spreadsheet::{self, ImportResult, SpreadsheetError};
use crate::services::InventoryStats;
use crate::store::AppliedChange;
use crate::utils::local_now;
use crate::AppState;

/// Item catalog, stock movement and ledger routes
pub fn create_item_routes() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/low-stock", get(low_stock))
        .route("/items/stats", get(stats))
        .route("/items/export", get(export_items))
        .route("/items/import", post(import_items))
        .route("/items/labels", get(print_labels))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/items/{id}/history", get(item_history))
        .route("/items/{id}/label", get(item_label))
        .route("/items/{id}/pull", post(pull_stock))
        .route("/items/{id}/return", post(return_stock))
        .route("/items/{id}/transfer", post(transfer_stock))
        .route("/items/{id}/adjust", post(adjust_stock))
        .route("/items/{id}/count", post(count_item))
        .route("/transactions", get(transactions_between))
        .route("/transactions/recent", get(recent_transactions))
}

/// GET /api/items?query={text}&category={category}
async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Vec<Item>> {
    state
        .inventory
        .list_items(&filter)
        .await
        .map(Json)
        .map_err(inventory_error)
}

/// POST /api/items
async fn create_item(
    State(state): State<AppState>,
    Json(request): Json<NewItem>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let item = state
        .inventory
        .create_item(request)
        .await
        .map_err(inventory_error)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn low_stock(State(state): State<AppState>) -> ApiResult<Vec<Item>> {
    state
        .inventory
        .low_stock_items()
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn stats(State(state): State<AppState>) -> ApiResult<InventoryStats> {
    state
        .inventory
        .inventory_stats()
        .await
        .map(Json)
        .map_err(inventory_error)
}

#[derive(Debug, Default, Deserialize)]
struct ExportParams {
    /// `csv` (default) or `xlsx`
    format: Option<String>,
}

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

fn export_failed(e: SpreadsheetError) -> ApiError {
    error!("🚨 Export failed: {}", e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Export failed",
        "Could not build the export file",
    )
}

/// GET /api/items/export?format={csv|xlsx}
async fn export_items(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let items = state
        .inventory
        .list_items(&ItemFilter::default())
        .await
        .map_err(inventory_error)?;
    let tz = state.config.timezone;
    let stem = format!("inventory-export-{}", local_now(tz).format("%Y-%m-%d"));

    let (content_type, filename, body) = match params.format.as_deref().unwrap_or("csv") {
        "csv" => (
            "text/csv; charset=utf-8",
            format!("{stem}.csv"),
            spreadsheet::export_csv(&items, tz).map_err(export_failed)?.into_bytes(),
        ),
        "xlsx" => (
            XLSX_CONTENT_TYPE,
            format!("{stem}.xlsx"),
            spreadsheet::export_xlsx(&items, tz).map_err(export_failed)?,
        ),
        other => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "Validation error",
                format!("Unknown export format '{other}'"),
            ))
        }
    };
    info!("📤 Exported {} items as {}", items.len(), filename);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

fn is_workbook(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("spreadsheetml") || v.contains("ms-excel"))
        .unwrap_or(false)
}

/// POST /api/items/import with CSV text, or workbook bytes sent with an
/// Excel content type
async fn import_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImportResult>, ApiError> {
    let mut result = if is_workbook(&headers) {
        spreadsheet::parse_workbook(body.to_vec())
    } else {
        spreadsheet::parse_csv(&String::from_utf8_lossy(&body))
    };
    if !result.success {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Import failed",
            result.errors.join("; "),
        ));
    }

    let inserted = state
        .inventory
        .insert_imported(&result.items)
        .await
        .map_err(inventory_error)?;
    info!("📥 Imported {} items ({} row errors)", inserted, result.errors.len());
    result.imported = inserted;
    result.items.clear();
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct LabelParams {
    ids: Option<String>,
}

/// GET /api/items/labels?ids={id},{id}; all items when `ids` is absent
async fn print_labels(
    State(state): State<AppState>,
    Query(params): Query<LabelParams>,
) -> Result<Html<String>, ApiError> {
    let items = state
        .inventory
        .list_items(&ItemFilter::default())
        .await
        .map_err(inventory_error)?;

    let wanted: Option<Vec<&str>> = params.ids.as_deref().map(|ids| {
        ids.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect()
    });
    let selected: Vec<LabelData> = items
        .iter()
        .filter(|item| {
            wanted
                .as_ref()
                .map(|ids| ids.contains(&item.id.as_str()))
                .unwrap_or(true)
        })
        .map(labels::item_label)
        .collect();

    Ok(Html(labels::print_page(&selected)))
}

async fn get_item(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Item> {
    match state.inventory.get_item(&id).await.map_err(inventory_error)? {
        Some(item) => Ok(Json(item)),
        None => Err(not_found("Item", &id)),
    }
}

/// PUT /api/items/{id}; quantity is only changed through stock operations
async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ItemUpdate>,
) -> ApiResult<Item> {
    match state
        .inventory
        .update_item(&id, update)
        .await
        .map_err(inventory_error)?
    {
        Some(item) => Ok(Json(item)),
        None => Err(not_found("Item", &id)),
    }
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.inventory.delete_item(&id).await.map_err(inventory_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Item", &id))
    }
}

async fn item_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Transaction>> {
    state
        .inventory
        .item_history(&id)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn item_label(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<LabelData> {
    match state.inventory.get_item(&id).await.map_err(inventory_error)? {
        Some(item) => Ok(Json(labels::item_label(&item))),
        None => Err(not_found("Item", &id)),
    }
}

async fn pull_stock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<StockMovementRequest>,
) -> ApiResult<AppliedChange> {
    state
        .inventory
        .pull(&id, request, &actor)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn return_stock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<StockMovementRequest>,
) -> ApiResult<AppliedChange> {
    state
        .inventory
        .return_stock(&id, request, &actor)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn transfer_stock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<AppliedChange> {
    state
        .inventory
        .transfer(&id, request, &actor)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn adjust_stock(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<AdjustmentRequest>,
) -> ApiResult<AppliedChange> {
    state
        .inventory
        .adjust(&id, request, &actor)
        .await
        .map(Json)
        .map_err(inventory_error)
}

/// POST /api/items/{id}/count
async fn count_item(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(request): Json<CountRequest>,
) -> ApiResult<AppliedChange> {
    state
        .counts
        .record_count(&id, request, &actor)
        .await
        .map(Json)
        .map_err(inventory_error)
}

/// GET /api/transactions?start={rfc3339}&end={rfc3339}
async fn transactions_between(
    State(state): State<AppState>,
    Query(range): Query<DateRange>,
) -> ApiResult<Vec<Transaction>> {
    state
        .inventory
        .transactions_between(range.start, range.end)
        .await
        .map(Json)
        .map_err(inventory_error)
}

async fn recent_transactions(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<Transaction>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_ACTIVITY_LIMIT);
    state
        .inventory
        .recent_activity(limit)
        .await
        .map(Json)
        .map_err(inventory_error)
}
