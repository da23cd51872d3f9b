/*!
# Patient Sheets

Server core for a hospital's patient records, where each patient's data lives
in a copy of a shared xlsx template.

## Overview

Clinicians edit a patient's workbook in a browser spreadsheet editor. On save
the editor posts its sheets back as JSON snapshots, which are written into the
stored workbook without touching the template's formatting. Several patients
can be exported at once, either into a summary table driven by a cell mapping
(`converter.json`) or as one worksheet per patient.

## Modules

- **address**: A1 cell references to zero-based coordinates and back
- **snapshot**: Sheet snapshots posted by the editor, and value resolution
- **workbook**: Reading and patching xlsx packages in place
- **writer**: Applying snapshots onto a workbook
- **export**: Mapped and per-patient multi-record export
- **store**: JSON file databases for patients, users and the activity log
- **session**: Login session storage
- **config**: Environment configuration
- **auth**, **patients**, **app**: HTTP API and routing (`web` feature)

## REST API Endpoints

- `POST /api/login`, `POST /api/logout`, `GET /api/session`
- `GET|PUT /api/profile`
- `GET|POST /api/users`, `PUT|DELETE /api/users/:id`, `GET /api/actions`
- `GET|POST /api/patients`
- `GET /api/patients/:id/sheet`, `POST /api/patients/:id/save`,
  `GET /api/patients/:id/download`
- `POST /api/patients/export`, `POST /api/patients/bulk-delete`
*/

pub mod address;
pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod workbook;
pub mod writer;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod auth;
#[cfg(feature = "web")]
pub mod patients;

pub use address::CellAddress;
pub use error::SheetError;
pub use workbook::{CellData, WorkbookFile, Worksheet};
