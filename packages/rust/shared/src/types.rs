//! Domain types for BES task generation: recipes, action descriptors and
//! the ordered action collection.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{BesEngineError, Result};
use crate::xml::is_xml_name;

/// Name that marks the action emitted ahead of all others.
pub const DEFAULT_ACTION_NAME: &str = "DefaultAction";

// ---------------------------------------------------------------------------
// LinkDescription
// ---------------------------------------------------------------------------

/// The three-part link text shown next to an action in the console:
/// `<pre_link><a>link</a><post_link>`.
///
/// Serialized as a three-element array to keep recipes compact:
/// `Description = ["Click ", "here", " to install."]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[String; 3]", into = "[String; 3]")]
pub struct LinkDescription {
    pub pre_link: String,
    pub link: String,
    pub post_link: String,
}

impl LinkDescription {
    pub fn new(
        pre_link: impl Into<String>,
        link: impl Into<String>,
        post_link: impl Into<String>,
    ) -> Self {
        Self {
            pre_link: pre_link.into(),
            link: link.into(),
            post_link: post_link.into(),
        }
    }
}

impl From<[String; 3]> for LinkDescription {
    fn from([pre_link, link, post_link]: [String; 3]) -> Self {
        Self {
            pre_link,
            link,
            post_link,
        }
    }
}

impl From<LinkDescription> for [String; 3] {
    fn from(d: LinkDescription) -> Self {
        [d.pre_link, d.link, d.post_link]
    }
}

// ---------------------------------------------------------------------------
// ActionDescriptor
// ---------------------------------------------------------------------------

/// A validated action: one named, numbered script plus its presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionDescriptor {
    pub action_name: String,
    pub action_number: String,
    pub action_script: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<LinkDescription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_criteria: Option<String>,
}

impl ActionDescriptor {
    /// Shorthand for a descriptor with no description or success criteria.
    pub fn new(
        action_name: impl Into<String>,
        action_number: impl Into<String>,
        action_script: impl Into<String>,
    ) -> Self {
        Self {
            action_name: action_name.into(),
            action_number: action_number.into(),
            action_script: action_script.into(),
            description: None,
            success_criteria: None,
        }
    }

    /// Whether this is the distinguished `DefaultAction`.
    pub fn is_default(&self) -> bool {
        self.action_name == DEFAULT_ACTION_NAME
    }
}

/// An action as it appears in a recipe, before required fields are checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Ordering key; actions other than `DefaultAction` are emitted in ascending key order.
    pub key: u32,
    #[serde(rename = "ActionName", default)]
    pub action_name: Option<String>,
    #[serde(rename = "ActionNumber", default)]
    pub action_number: Option<String>,
    #[serde(rename = "ActionScript", default)]
    pub action_script: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<LinkDescription>,
    #[serde(rename = "SuccessCriteria", default)]
    pub success_criteria: Option<String>,
}

impl ActionEntry {
    /// Check required fields and split off the ordering key.
    pub fn into_keyed(self) -> Result<(u32, ActionDescriptor)> {
        let key = self.key;
        let missing = |field: &str| {
            BesEngineError::malformed_action(format!("action with key {key} has no {field}"))
        };

        let action_name = self
            .action_name
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("ActionName"))?;
        let action_number = self
            .action_number
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("ActionNumber"))?;
        let action_script = self.action_script.ok_or_else(|| missing("ActionScript"))?;

        Ok((
            key,
            ActionDescriptor {
                action_name,
                action_number,
                action_script,
                description: self.description,
                success_criteria: self.success_criteria,
            },
        ))
    }
}

// ---------------------------------------------------------------------------
// ActionCollection
// ---------------------------------------------------------------------------

/// An action paired with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedAction {
    pub key: u32,
    pub descriptor: ActionDescriptor,
}

/// Emission order: `DefaultAction` first, everything else by ascending key.
pub fn emission_order(a: &KeyedAction, b: &KeyedAction) -> Ordering {
    b.descriptor
        .is_default()
        .cmp(&a.descriptor.is_default())
        .then(a.key.cmp(&b.key))
}

/// The task's actions, held in emission order with a name index.
///
/// Invariants checked on construction: keys are unique, at most one entry is
/// named `DefaultAction`, every entry has a non-empty name and number, and
/// every name is a legal XML element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCollection {
    actions: Vec<KeyedAction>,
    by_name: HashMap<String, usize>,
}

impl ActionCollection {
    /// Build a collection from `(key, descriptor)` pairs in any order.
    pub fn new(entries: impl IntoIterator<Item = (u32, ActionDescriptor)>) -> Result<Self> {
        let mut actions: Vec<KeyedAction> = entries
            .into_iter()
            .map(|(key, descriptor)| KeyedAction { key, descriptor })
            .collect();

        let mut keys = HashSet::new();
        let mut defaults = 0usize;
        for action in &actions {
            let d = &action.descriptor;
            if d.action_name.is_empty() {
                return Err(BesEngineError::malformed_action(format!(
                    "action with key {} has an empty ActionName",
                    action.key
                )));
            }
            if !is_xml_name(&d.action_name) {
                return Err(BesEngineError::malformed_action(format!(
                    "ActionName {:?} is not a valid XML element name",
                    d.action_name
                )));
            }
            if d.action_number.is_empty() {
                return Err(BesEngineError::malformed_action(format!(
                    "action {} has an empty ActionNumber",
                    d.action_name
                )));
            }
            if !keys.insert(action.key) {
                return Err(BesEngineError::malformed_action(format!(
                    "duplicate action key {}",
                    action.key
                )));
            }
            if d.is_default() {
                defaults += 1;
            }
        }
        if defaults > 1 {
            return Err(BesEngineError::malformed_action(format!(
                "{defaults} actions are named {DEFAULT_ACTION_NAME}, at most one is allowed"
            )));
        }

        actions.sort_by(emission_order);

        // Later (higher-key) entries win a name collision.
        let mut by_name = HashMap::with_capacity(actions.len());
        let mut by_key: Vec<usize> = (0..actions.len()).collect();
        by_key.sort_by_key(|&i| actions[i].key);
        for i in by_key {
            by_name.insert(actions[i].descriptor.action_name.clone(), i);
        }

        Ok(Self { actions, by_name })
    }

    /// Validate raw recipe entries and build the collection.
    pub fn from_entries(entries: Vec<ActionEntry>) -> Result<Self> {
        let pairs = entries
            .into_iter()
            .map(ActionEntry::into_keyed)
            .collect::<Result<Vec<_>>>()?;
        Self::new(pairs)
    }

    /// The collection used when a recipe declares no actions: a single
    /// `DefaultAction` numbered `Action1` with an empty script.
    pub fn single_default() -> Self {
        let descriptor = ActionDescriptor::new(DEFAULT_ACTION_NAME, "Action1", "");
        let mut by_name = HashMap::new();
        by_name.insert(descriptor.action_name.clone(), 0);
        Self {
            actions: vec![KeyedAction { key: 1, descriptor }],
            by_name,
        }
    }

    /// Actions in emission order.
    pub fn ordered(&self) -> &[KeyedAction] {
        &self.actions
    }

    /// Look up an action by `ActionName`.
    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.by_name.get(name).map(|&i| &self.actions[i].descriptor)
    }

    /// Rewrite every action script in place.
    pub fn map_scripts(&mut self, mut f: impl FnMut(&str) -> String) {
        for action in &mut self.actions {
            action.descriptor.action_script = f(&action.descriptor.action_script);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Recipe
// ---------------------------------------------------------------------------

/// A caller-supplied MIME field appended to the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeField {
    pub name: String,
    pub value: String,
}

/// Per-task inputs, read from a TOML recipe file.
///
/// Optional fields fall back to documented defaults when the task metadata
/// is resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipe {
    /// Display name of the software (e.g. `Firefox`).
    pub name: String,
    /// Version string used in the title, relevance and UI metadata.
    pub version: String,
    /// Download URL; redirects are resolved before it is used.
    pub url: String,
    /// Replaces `url` for the prefetch statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_url: Option<String>,
    /// Local path to the installer that is hashed for the prefetch.
    pub installer: String,
    /// Prefetch file name; defaults to the tail of the resolved URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// A complete prefetch statement, usually supplied by the upload flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefetch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Relevance expressions, emitted in order.
    pub relevance: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_action_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_action_script: Option<String>,
    /// Attach self-service UI metadata to the task.
    #[serde(default)]
    pub self_service: bool,
    /// `ActionName` of the action re-emitted as the self-service offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_service_action: Option<String>,
    /// Icon URL for the self-service catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_description_html: Option<String>,
    /// Extra MIME fields, emitted in the order given.
    #[serde(default)]
    pub mime_fields: Vec<MimeField>,
}

// ---------------------------------------------------------------------------
// SelfServiceSettings
// ---------------------------------------------------------------------------

/// Presentation data for the self-service action's `Settings` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfServiceSettings {
    /// Catalog display name.
    pub ui_title: String,
    pub offer_category: String,
    pub offer_description_html: String,
}
