//! In-memory XML element tree and its serializer.
//!
//! [`make_node`] is the single place leaf text is escaped: text containing any
//! of `< > & ' "` becomes a CDATA section, anything else stays plain text.

use quick_xml::escape::escape;

use besengine_shared::{BesEngineError, Result, first_invalid_char, is_xml_name};

/// Characters that force a text value into a CDATA section.
const RESERVED: [char; 5] = ['<', '>', '&', '\'', '"'];

/// XML declaration written ahead of every document.
pub const XML_DECLARATION: &str = "<?xml version='1.0' encoding='UTF-8'?>\n";

/// Text content of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeText {
    Plain(String),
    CData(String),
}

impl NodeText {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) | Self::CData(s) => s,
        }
    }
}

/// A single element with optional text, attributes and ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    name: String,
    text: Option<NodeText>,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

/// Whether `text` must be wrapped in CDATA.
pub fn needs_cdata(text: &str) -> bool {
    text.contains(RESERVED)
}

/// Build an element. Empty `text` yields an element with no text content.
pub fn make_node(name: &str, text: &str, attributes: &[(&str, &str)]) -> XmlNode {
    let text = if text.is_empty() {
        None
    } else if needs_cdata(text) {
        Some(NodeText::CData(text.to_string()))
    } else {
        Some(NodeText::Plain(text.to_string()))
    };

    XmlNode {
        name: name.to_string(),
        text,
        attributes: attributes
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        children: Vec::new(),
    }
}

impl XmlNode {
    /// An empty element with no text or attributes.
    pub fn element(name: &str) -> Self {
        make_node(name, "", &[])
    }

    /// A text-only element.
    pub fn leaf(name: &str, text: &str) -> Self {
        make_node(name, text, &[])
    }

    pub fn push(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    /// Builder form of [`XmlNode::push`].
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&NodeText> {
        self.text.as_ref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Check that every name, attribute value and text in the tree can be
    /// serialized as well-formed XML 1.0.
    pub fn check_well_formed(&self) -> Result<()> {
        if !is_xml_name(&self.name) {
            return Err(BesEngineError::validation(format!(
                "{:?} is not a valid XML element name",
                self.name
            )));
        }
        for (key, value) in &self.attributes {
            if !is_xml_name(key) {
                return Err(BesEngineError::validation(format!(
                    "<{}>: {key:?} is not a valid XML attribute name",
                    self.name
                )));
            }
            reject_invalid_chars(&self.name, value)?;
        }
        if let Some(text) = &self.text {
            reject_invalid_chars(&self.name, text.as_str())?;
        }
        self.children.iter().try_for_each(XmlNode::check_well_formed)
    }

    /// Append this element, compactly, to `out`.
    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }

        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');

        match &self.text {
            Some(NodeText::Plain(text)) => out.push_str(&escape(text.as_str())),
            Some(NodeText::CData(text)) => write_cdata(text, out),
            None => {}
        }
        for child in &self.children {
            child.write_to(out);
        }

        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Serialize as a complete document with the XML declaration.
    pub fn to_document(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        self.write_to(&mut out);
        out
    }
}

fn reject_invalid_chars(element: &str, text: &str) -> Result<()> {
    match first_invalid_char(text) {
        Some(c) => Err(BesEngineError::validation(format!(
            "<{element}> contains U+{:04X}, which XML 1.0 does not allow",
            u32::from(c)
        ))),
        None => Ok(()),
    }
}

/// A `]]>` inside the payload is split across two adjacent sections.
fn write_cdata(text: &str, out: &mut String) {
    out.push_str("<![CDATA[");
    out.push_str(&text.replace("]]>", "]]]]><![CDATA[>"));
    out.push_str("]]>");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_characters_force_cdata() {
        for text in ["a&b", "<tag>", "it's", "say \"hi\"", "x > y"] {
            let node = make_node("Value", text, &[]);
            assert_eq!(node.text(), Some(&NodeText::CData(text.to_string())), "{text}");
        }
    }

    #[test]
    fn plain_text_stays_plain() {
        let node = make_node("Title", "plain", &[]);
        assert_eq!(node.text(), Some(&NodeText::Plain("plain".into())));

        let mut out = String::new();
        node.write_to(&mut out);
        assert_eq!(out, "<Title>plain</Title>");
    }

    #[test]
    fn empty_text_has_no_content() {
        let node = make_node("SANSID", "", &[]);
        assert!(node.text().is_none());

        let mut out = String::new();
        node.write_to(&mut out);
        assert_eq!(out, "<SANSID/>");
    }

    #[test]
    fn cdata_serialization() {
        let mut out = String::new();
        make_node("Description", "Deploy <b>it</b>", &[]).write_to(&mut out);
        assert_eq!(out, "<Description><![CDATA[Deploy <b>it</b>]]></Description>");
    }

    #[test]
    fn cdata_terminator_is_split() {
        let mut out = String::new();
        make_node("ActionScript", "if a[b[1]]>0", &[]).write_to(&mut out);
        assert_eq!(
            out,
            "<ActionScript><![CDATA[if a[b[1]]]]><![CDATA[>0]]></ActionScript>"
        );
    }

    #[test]
    fn attributes_keep_caller_order_and_are_escaped() {
        let node = make_node("SuccessCriteria", "", &[("Option", "A&B"), ("ID", "1")]);
        assert_eq!(node.attribute("Option"), Some("A&B"));

        let mut out = String::new();
        node.write_to(&mut out);
        assert_eq!(out, "<SuccessCriteria Option=\"A&amp;B\" ID=\"1\"/>");
    }

    #[test]
    fn control_character_in_text_is_not_well_formed() {
        let script = make_node("ActionScript", "printf '\x1b[31mred'", &[]);
        let root = XmlNode::element("Task").with_child(script);
        let err = root.check_well_formed().unwrap_err();
        assert!(matches!(err, BesEngineError::Validation { .. }));
        assert!(err.to_string().contains("<ActionScript> contains U+001B"));
    }

    #[test]
    fn control_character_in_attribute_is_not_well_formed() {
        let node = make_node("SuccessCriteria", "", &[("Option", "a\u{0}b")]);
        assert!(node.check_well_formed().is_err());
    }

    #[test]
    fn illegal_element_name_is_not_well_formed() {
        let root = XmlNode::element("Task").with_child(XmlNode::element("Install App"));
        let err = root.check_well_formed().unwrap_err();
        assert!(err.to_string().contains("Install App"));
    }

    #[test]
    fn ordinary_tree_is_well_formed() {
        let root = make_node("BES", "", &[("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance")])
            .with_child(XmlNode::leaf("Title", "Deploy Firefox 130.0"))
            .with_child(XmlNode::leaf("ActionScript", "line one\n\tline <two>\r\n"));
        assert!(root.check_well_formed().is_ok());
    }

    #[test]
    fn nested_document_has_declaration() {
        let root = XmlNode::element("BES").with_child(XmlNode::leaf("Task", "x"));
        assert_eq!(
            root.to_document(),
            "<?xml version='1.0' encoding='UTF-8'?>\n<BES><Task>x</Task></BES>"
        );
        assert_eq!(root.child("Task").map(XmlNode::name), Some("Task"));
    }
}
