//! Action element assembly.
//!
//! An action descriptor is first resolved into an [`EffectiveAction`] with
//! every default applied, then rendered into an XML fragment.

use besengine_shared::{ActionCollection, ActionDescriptor, LinkDescription, SelfServiceSettings};

use crate::node::{XmlNode, make_node};

/// MIME type tagging every action script.
pub const ACTION_SCRIPT_MIME_TYPE: &str = "application/x-Fixlet-Windows-Shell";

/// Success criteria used when a descriptor does not set one.
pub const DEFAULT_SUCCESS_CRITERIA: &str = "OriginalRelevance";

/// Reapply limit applied to every self-service offer.
pub const SELF_SERVICE_REAPPLY_LIMIT: u32 = 5;

/// An action with all defaults resolved, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveAction {
    pub name: String,
    pub number: String,
    pub script: String,
    pub description: LinkDescription,
    pub success_criteria: String,
}

impl EffectiveAction {
    /// Apply the description and success-criteria defaults without touching `descriptor`.
    pub fn resolve(descriptor: &ActionDescriptor) -> Self {
        let description = descriptor.description.clone().unwrap_or_else(|| {
            LinkDescription::new(
                format!("{} - Click ", descriptor.action_number),
                "here",
                " to take action.",
            )
        });

        let success_criteria = descriptor
            .success_criteria
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SUCCESS_CRITERIA.to_string());

        Self {
            name: descriptor.action_name.clone(),
            number: descriptor.action_number.clone(),
            script: descriptor.action_script.clone(),
            description,
            success_criteria,
        }
    }
}

/// Build one action element. `self_service` adds the offer `Settings` block.
pub fn make_action(
    descriptor: &ActionDescriptor,
    self_service: Option<&SelfServiceSettings>,
) -> XmlNode {
    render_action(&EffectiveAction::resolve(descriptor), self_service)
}

/// Render an already-resolved action.
pub fn render_action(
    action: &EffectiveAction,
    self_service: Option<&SelfServiceSettings>,
) -> XmlNode {
    let mut node = make_node(&action.name, "", &[("ID", action.number.as_str())]);

    node.push(link_description(&action.description));
    node.push(make_node(
        "ActionScript",
        &action.script,
        &[("MIMEType", ACTION_SCRIPT_MIME_TYPE)],
    ));
    node.push(make_node(
        "SuccessCriteria",
        "",
        &[("Option", action.success_criteria.as_str())],
    ));

    if let Some(settings) = self_service {
        node.push(self_service_settings(settings));
    }

    node
}

fn link_description(description: &LinkDescription) -> XmlNode {
    XmlNode::element("Description")
        .with_child(XmlNode::leaf("PreLink", &description.pre_link))
        .with_child(XmlNode::leaf("Link", &description.link))
        .with_child(XmlNode::leaf("PostLink", &description.post_link))
}

fn self_service_settings(settings: &SelfServiceSettings) -> XmlNode {
    let limit = SELF_SERVICE_REAPPLY_LIMIT.to_string();
    let entries: [(&str, &str); 9] = [
        ("ActionUITitle", settings.ui_title.as_str()),
        ("HasEndTime", "false"),
        ("Reapply", "true"),
        ("HasReapplyLimit", "true"),
        ("ReapplyLimit", limit.as_str()),
        ("HasReapplyInterval", "false"),
        ("IsOffer", "true"),
        ("OfferCategory", settings.offer_category.as_str()),
        ("OfferDescriptionHTML", settings.offer_description_html.as_str()),
    ];

    let mut node = XmlNode::element("Settings");
    for (key, value) in entries {
        node.push(XmlNode::leaf(key, value));
    }
    node
}

/// Wrap every action script with the pre-script, prefetch and post-script:
/// `trim("<pre>\n<prefetch><script>\n<post>")`.
pub fn wrap_scripts(actions: &mut ActionCollection, pre: &str, prefetch: &str, post: &str) {
    actions.map_scripts(|script| {
        format!("{pre}\n{prefetch}{script}\n{post}")
            .trim()
            .to_string()
    });
}
