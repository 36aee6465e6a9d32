//! BES task document assembly and serialization.
//!
//! Turns resolved [`TaskMetadata`], the ordered [`ActionCollection`] and an
//! optional [`SelfServiceConfig`] into the `BES` element tree, then writes it
//! to disk in a single atomic step.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use besengine_shared::{ActionCollection, BesEngineError, LinkDescription, Result};

use crate::action::make_action;
use crate::metadata::{SelfServiceConfig, TOOL_NAME, TaskMetadata};
use crate::node::{XmlNode, make_node};
use crate::relevance::RelevanceValidator;

/// Namespace bound to the `xsi` prefix on the root element.
pub const SCHEMA_INSTANCE_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Schema referenced by `xsi:noNamespaceSchemaLocation`.
pub const SCHEMA_LOCATION: &str = "BES.xsd";

/// Fixed `Domain` element value.
pub const TASK_DOMAIN: &str = "BESC";

/// Action number given to the self-service copy of an action.
pub const SELF_SERVICE_ACTION_NUMBER: &str = "Action10";

/// Element name given to the self-service copy of an action.
pub const SELF_SERVICE_ACTION_NAME: &str = "Action";

/// A finished task document and where it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub root: XmlNode,
    pub path: PathBuf,
}

impl OutputDocument {
    /// Full serialized text, XML declaration included.
    pub fn to_xml(&self) -> String {
        self.root.to_document()
    }

    /// Write the document once, atomically (write to temp, then rename).
    ///
    /// A tree that would not serialize to well-formed XML is rejected with
    /// [`BesEngineError::Validation`] before anything touches the disk.
    pub fn write(&self) -> Result<()> {
        self.root.check_well_formed()?;
        let xml = self.to_xml();
        write_atomic(&self.path, xml.as_bytes())?;
        info!(path = %self.path.display(), bytes = xml.len(), "wrote BES file");
        Ok(())
    }
}

/// `<cache_dir>/Deploy <name> <version>.bes`.
pub fn output_path(cache_dir: &Path, display_name: &str, version: &str) -> PathBuf {
    cache_dir.join(format!("Deploy {display_name} {version}.bes"))
}

/// Assemble the `BES` tree.
///
/// Each relevance line goes through `validator` first; findings are logged
/// and never stop emission. Actions are emitted `DefaultAction` first, then
/// by ascending key, then the self-service copy when one is configured and
/// the named action exists.
#[instrument(skip_all, fields(title = %meta.title, actions = actions.len()))]
pub fn build_document(
    meta: &TaskMetadata,
    actions: &ActionCollection,
    self_service: Option<&SelfServiceConfig>,
    validator: &dyn RelevanceValidator,
) -> XmlNode {
    let mut task = XmlNode::element("Task");

    task.push(XmlNode::leaf("Title", &meta.title));
    task.push(XmlNode::leaf("Description", &meta.description));

    for line in &meta.relevance {
        validator.validate(line);
        task.push(XmlNode::leaf("Relevance", line));
    }

    let download_size = meta.download_size.to_string();
    let details: [(&str, &str); 8] = [
        ("Category", meta.category.as_str()),
        ("DownloadSize", download_size.as_str()),
        ("Source", meta.source.as_str()),
        ("SourceID", meta.source_id.as_str()),
        ("SourceReleaseDate", meta.source_release_date.as_str()),
        ("SourceSeverity", ""),
        ("CVENames", ""),
        ("SANSID", ""),
    ];
    for (key, value) in details {
        task.push(XmlNode::leaf(key, value));
    }

    if let Some(ui) = &meta.ui_metadata {
        task.push(mime_field("action-ui-metadata", &ui.to_json()));
    }

    task.push(mime_field("x-fixlet-source", TOOL_NAME));
    for field in &meta.mime_fields {
        task.push(mime_field(&field.name, &field.value));
    }
    task.push(mime_field("x-fixlet-modification-time", &meta.modification_time));
    task.push(XmlNode::leaf("Domain", TASK_DOMAIN));

    for action in actions.ordered() {
        task.push(make_action(&action.descriptor, None));
    }

    if let Some(config) = self_service {
        match actions.get(&config.action_name) {
            Some(descriptor) => {
                let mut offer = descriptor.clone();
                offer.action_name = SELF_SERVICE_ACTION_NAME.to_string();
                offer.action_number = SELF_SERVICE_ACTION_NUMBER.to_string();
                offer.description = Some(LinkDescription::new(
                    "",
                    "Make available",
                    " in Self Service",
                ));
                task.push(make_action(&offer, Some(&config.settings)));
                debug!(source = %config.action_name, "added self-service action");
            }
            None => debug!(
                action = %config.action_name,
                "self-service action not found, skipping"
            ),
        }
    }

    make_node(
        "BES",
        "",
        &[
            ("xmlns:xsi", SCHEMA_INSTANCE_NAMESPACE),
            ("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION),
        ],
    )
    .with_child(task)
}

/// A `MIMEField` element with `Name` and `Value` children.
pub fn mime_field(name: &str, value: &str) -> XmlNode {
    XmlNode::element("MIMEField")
        .with_child(XmlNode::leaf("Name", name))
        .with_child(XmlNode::leaf("Value", value))
}

/// Write `data` to a temp file beside `path`, then rename over it.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| BesEngineError::write(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BesEngineError::validation(format!("not a file path: {}", path.display())))?;
    let temp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    if let Err(e) = std::fs::write(&temp, data) {
        let _ = std::fs::remove_file(&temp);
        return Err(BesEngineError::write(&temp, e));
    }
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(BesEngineError::write(path, e));
    }
    Ok(())
}
