//! Network side of besengine.
//!
//! Resolves vendor download links, fetches self-service icons, and talks to
//! the BigFix console REST API to upload installers and import finished tasks.

mod client;
mod download;
mod response;

pub use client::{ConsoleClient, ImportOutcome, ImportSummary, ImportedTask};
pub use download::{HttpSources, fetch_icon, icon_data_uri, icon_mime_type, resolve_direct_url};
pub use response::{
    TaskRecord, UploadResult, parse_import_response, parse_task_list, parse_upload_response,
};
