use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, patching or exporting workbooks.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid xlsx archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Workbook part missing: {0}")]
    MissingPart(String),

    #[error("Worksheet not found")]
    MissingWorksheet,

    #[error("template.xlsx not found. Place it at one of: {}", display_paths(.searched))]
    MissingTemplate { searched: Vec<PathBuf> },

    #[error("No workbook for record {0}")]
    MissingSourceRecord(u64),

    #[error("Workbook writer error: {0}")]
    Writer(#[from] rust_xlsxwriter::XlsxError),

    #[error("Data file error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "web")]
pub use web::AppError;

#[cfg(feature = "web")]
mod web {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use log::error;
    use thiserror::Error;

    use super::SheetError;

    /// Request-level failure, rendered as `{"error": "..."}`.
    #[derive(Error, Debug)]
    pub enum AppError {
        #[error("{0}")]
        BadRequest(String),

        #[error("Unauthorized")]
        Unauthorized,

        #[error("Forbidden")]
        Forbidden,

        #[error("{0}")]
        NotFound(String),

        #[error("{0}")]
        Conflict(String),

        #[error("{message}")]
        Internal {
            message: String,
            #[source]
            source: Option<SheetError>,
        },
    }

    impl AppError {
        pub fn bad_request(message: impl Into<String>) -> Self {
            AppError::BadRequest(message.into())
        }

        pub fn message(message: impl Into<String>) -> Self {
            AppError::Internal {
                message: message.into(),
                source: None,
            }
        }

        /// Wraps a core error behind a generic message. Missing templates keep
        /// their own text since it tells the operator where to put the file.
        pub fn internal(message: impl Into<String>, source: SheetError) -> Self {
            let message = match &source {
                SheetError::MissingTemplate { .. } => source.to_string(),
                _ => message.into(),
            };
            AppError::Internal {
                message,
                source: Some(source),
            }
        }
    }

    impl From<SheetError> for AppError {
        fn from(e: SheetError) -> Self {
            AppError::internal("Internal error", e)
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = match &self {
                AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
                AppError::Unauthorized => StatusCode::UNAUTHORIZED,
                AppError::Forbidden => StatusCode::FORBIDDEN,
                AppError::NotFound(_) => StatusCode::NOT_FOUND,
                AppError::Conflict(_) => StatusCode::CONFLICT,
                AppError::Internal { source, .. } => {
                    match source {
                        Some(source) => error!("{}: {}", self, source),
                        None => error!("{}", self),
                    }
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };

            (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
        }
    }
}
