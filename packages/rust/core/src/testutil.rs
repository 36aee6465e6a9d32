//! Re-parses serialized documents so tests can assert on structure.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// A parsed element.
#[derive(Debug, Default)]
pub(crate) struct Parsed {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub cdata: bool,
    pub children: Vec<Parsed>,
}

impl Parsed {
    fn open(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8(start.name().as_ref().to_vec()).expect("utf-8 name");
        let attrs = start
            .attributes()
            .map(|a| {
                let a = a.expect("attribute");
                let key = String::from_utf8(a.key.as_ref().to_vec()).expect("utf-8 key");
                let value = a.unescape_value().expect("attribute value").into_owned();
                (key, value)
            })
            .collect();
        Self {
            name,
            attrs,
            ..Default::default()
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&Parsed> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Text of the first child named `name`, or `""` when absent.
    pub fn child_text(&self, name: &str) -> &str {
        self.child(name).map(|c| c.text.as_str()).unwrap_or("")
    }
}

fn attach(stack: &mut [Parsed], root: &mut Option<Parsed>, node: Parsed) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

/// Parse a complete document into its root element.
pub(crate) fn parse(xml: &str) -> Parsed {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Parsed> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().expect("well-formed XML") {
            Event::Start(e) => stack.push(Parsed::open(&e)),
            Event::Empty(e) => {
                let node = Parsed::open(&e);
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                let node = stack.pop().expect("balanced tags");
                attach(&mut stack, &mut root, node);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape().expect("text"));
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let raw = c.into_inner();
                    top.text.push_str(std::str::from_utf8(&raw).expect("utf-8 cdata"));
                    top.cdata = true;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.expect("document has a root element")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_cdata_reassembles() {
        let doc = parse("<a><![CDATA[x]]]]><![CDATA[>y]]></a>");
        assert_eq!(doc.text, "x]]>y");
        assert!(doc.cdata);
    }
}
