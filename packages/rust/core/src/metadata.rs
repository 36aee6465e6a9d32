//! Effective task metadata: every recipe default resolved into immutable
//! values before the document tree is built.

use chrono::{DateTime, Utc};

use besengine_shared::{MimeField, Recipe, SelfServiceSettings};

/// Name reported in the `x-fixlet-source` MIME field and `Source` element.
pub const TOOL_NAME: &str = "besengine";

/// Ambient facts about the build run, injected so output is reproducible.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Clock used for the release date and modification time.
    pub now: DateTime<Utc>,
    /// Invoking user, recorded as `SourceID`.
    pub user: String,
    pub tool_version: String,
    /// Version of the automation host driving the build, if any.
    pub host_version: Option<String>,
}

impl BuildContext {
    /// Context for a build happening now.
    pub fn now(user: impl Into<String>) -> Self {
        Self {
            now: Utc::now(),
            user: user.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            host_version: None,
        }
    }

    /// `<tool> v<version> (<host version>)`.
    pub fn source_attribution(&self) -> String {
        match &self.host_version {
            Some(host) => format!("{TOOL_NAME} v{} ({host})", self.tool_version),
            None => format!("{TOOL_NAME} v{}", self.tool_version),
        }
    }
}

/// Payload of the `action-ui-metadata` MIME field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiMetadata {
    pub version: String,
    pub size: String,
    /// `data:` URI of the catalog icon.
    pub icon: Option<String>,
}

impl UiMetadata {
    /// JSON text in the layout existing console consumers expect.
    pub fn to_json(&self) -> String {
        let version = json_string(&self.version);
        let size = json_string(&self.size);
        match &self.icon {
            Some(icon) => format!(
                "{{\"version\": {version},\"size\": {size},\"icon\": {}}}",
                json_string(icon)
            ),
            None => format!("{{\"version\": {version}, \"size\": {size}}}"),
        }
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Every value the document needs outside of the actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMetadata {
    pub display_name: String,
    pub version: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub relevance: Vec<String>,
    pub download_size: u64,
    pub source: String,
    pub source_id: String,
    /// `YYYY-MM-DD`.
    pub source_release_date: String,
    pub ui_metadata: Option<UiMetadata>,
    pub mime_fields: Vec<MimeField>,
    /// RFC 1123 style, always `+0000`.
    pub modification_time: String,
}

impl TaskMetadata {
    /// Resolve recipe defaults.
    ///
    /// `default_category` comes from configuration; `icon` is the already
    /// fetched `data:` URI when the recipe names an icon.
    pub fn resolve(
        recipe: &Recipe,
        default_category: &str,
        download_size: u64,
        icon: Option<String>,
        ctx: &BuildContext,
    ) -> Self {
        let name = &recipe.name;
        let version = &recipe.version;

        let title = recipe
            .title
            .clone()
            .unwrap_or_else(|| format!("Deploy {name} {version}"));
        let description = recipe.description.clone().unwrap_or_else(|| {
            format!(
                "This task will deploy {name} {version}.<BR><BR>\
                 This task is applicable on Mac OS X"
            )
        });
        let category = recipe
            .category
            .clone()
            .unwrap_or_else(|| default_category.to_string());

        let ui_metadata = recipe.self_service.then(|| UiMetadata {
            version: version.clone(),
            size: download_size.to_string(),
            icon,
        });

        Self {
            display_name: name.clone(),
            version: version.clone(),
            title,
            description,
            category,
            relevance: recipe.relevance.clone(),
            download_size,
            source: ctx.source_attribution(),
            source_id: ctx.user.clone(),
            source_release_date: ctx.now.format("%Y-%m-%d").to_string(),
            ui_metadata,
            mime_fields: recipe.mime_fields.clone(),
            modification_time: ctx.now.format("%a, %d %b %Y %H:%M:%S +0000").to_string(),
        }
    }
}

/// The action re-emitted as a self-service offer, and its presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfServiceConfig {
    pub action_name: String,
    pub settings: SelfServiceSettings,
}

impl SelfServiceConfig {
    /// Present only when the recipe names a self-service action.
    pub fn resolve(recipe: &Recipe) -> Option<Self> {
        let action_name = recipe.self_service_action.clone()?;
        Some(Self {
            action_name,
            settings: SelfServiceSettings {
                ui_title: recipe.name.clone(),
                offer_category: recipe.offer_category.clone().unwrap_or_default(),
                offer_description_html: recipe.offer_description_html.clone().unwrap_or_default(),
            },
        })
    }
}

/// Prefetch file name: the recipe's `filename`, else the URL's last path
/// segment; trimmed, with spaces replaced by underscores.
pub fn prefetch_file_name(recipe: &Recipe, url: &str) -> String {
    let raw = match &recipe.filename {
        Some(name) => name.as_str(),
        None => url.rsplit('/').next().unwrap_or(url),
    };
    raw.trim().replace(' ', "_")
}
