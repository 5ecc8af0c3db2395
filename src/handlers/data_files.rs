use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use super::{error_response, inventory_error, ApiError, ApiResult};
use crate::constants::DATA_FILE_EXTENSIONS;
use crate::services::spreadsheet::{self, ImportResult};
use crate::AppState;

/// Spreadsheets dropped into the server's data directory
pub fn create_data_file_routes() -> Router<AppState> {
    Router::new().route("/data-files", get(list_files).post(parse_file))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFile {
    pub name: String,
    pub extension: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct ParseFileRequest {
    filename: String,
    /// Insert the parsed items instead of only previewing them
    #[serde(default)]
    import: bool,
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| DATA_FILE_EXTENSIONS.contains(&ext.as_str()))
}

/// Only the final path component is honoured
fn safe_file_name(requested: &str) -> Option<&str> {
    Path::new(requested.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.starts_with('.'))
}

pub async fn list_data_files(dir: &Path) -> std::io::Result<Vec<DataFile>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(extension) = extension_of(&name) {
            files.push(DataFile {
                name,
                extension,
                size: metadata.len(),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

pub async fn read_data_file(dir: &Path, requested: &str) -> Result<ImportResult, ApiError> {
    let Some(name) = safe_file_name(requested) else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Validation error",
            "A file name is required",
        ));
    };
    let Some(extension) = extension_of(name) else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Validation error",
            format!("'{name}' is not a supported spreadsheet"),
        ));
    };

    let content = match tokio::fs::read(dir.join(name)).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(error_response(
                StatusCode::NOT_FOUND,
                "File not found",
                format!("'{name}' was not found in the data directory"),
            ))
        }
        Err(e) => {
            warn!("🚨 Failed to read data file {}: {}", name, e);
            return Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "File error",
                format!("Could not read '{name}'"),
            ));
        }
    };
    Ok(if extension == "csv" {
        spreadsheet::parse_csv(&String::from_utf8_lossy(&content))
    } else {
        spreadsheet::parse_workbook(content)
    })
}

/// GET /api/data-files
async fn list_files(State(state): State<AppState>) -> ApiResult<Vec<DataFile>> {
    list_data_files(&state.config.data_dir).await.map(Json).map_err(|e| {
        warn!("🚨 Failed to list data directory: {}", e);
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "File error",
            "Could not read the data directory",
        )
    })
}

/// POST /api/data-files { filename, import }
async fn parse_file(
    State(state): State<AppState>,
    Json(request): Json<ParseFileRequest>,
) -> ApiResult<ImportResult> {
    let mut result = read_data_file(&state.config.data_dir, &request.filename).await?;
    if request.import && result.success {
        result.imported = state
            .inventory
            .insert_imported(&result.items)
            .await
            .map_err(inventory_error)?;
        info!("📥 Imported {} items from {}", result.imported, request.filename);
    }
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_components_are_stripped() {
        assert_eq!(safe_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_file_name("stock.csv"), Some("stock.csv"));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name(""), None);
    }

    #[tokio::test]
    async fn test_lists_only_spreadsheets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.CSV"), "Name\nx\n").unwrap();
        std::fs::write(dir.path().join("a.xlsx"), [0u8; 4]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let files = list_data_files(dir.path()).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.xlsx", "b.CSV"]);
        assert_eq!(files[1].extension, "csv");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = list_data_files(&dir.path().join("nope")).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_read_csv_and_workbooks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stock.csv"), "Item,Qty,Bin\nRivets,40,Shelf 2\n").unwrap();
        std::fs::write(dir.path().join("broken.xls"), [0u8; 4]).unwrap();

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Name").unwrap();
        sheet.write_string(0, 1, "Quantity").unwrap();
        sheet.write_string(1, 0, "Trespa Pura").unwrap();
        sheet.write_number(1, 1, 22.0).unwrap();
        workbook.save(dir.path().join("stock.xlsx")).unwrap();

        let result = read_data_file(dir.path(), "../stock.csv").await.unwrap();
        assert!(result.success);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].quantity, 40);

        let result = read_data_file(dir.path(), "stock.xlsx").await.unwrap();
        assert!(result.success);
        assert_eq!(result.items[0].name, "Trespa Pura");
        assert_eq!(result.items[0].quantity, 22);

        let result = read_data_file(dir.path(), "broken.xls").await.unwrap();
        assert!(!result.success);

        let (status, _) = read_data_file(dir.path(), "notes.txt").await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = read_data_file(dir.path(), "other.csv").await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
