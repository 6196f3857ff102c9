//! Tag-soup HTML parser with implicit-tag repair, grounded on the original
//! implementation's `parsing/html_parser.py`.

use std::collections::BTreeMap;

use crate::dom::{append_child, Node, NodeRef};

const SELF_CLOSING_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const HEAD_TAGS: &[&str] = &[
    "base", "basefont", "bgsound", "noscript", "link", "meta", "title", "style", "script",
];

pub struct HtmlParser {
    body: String,
}

impl HtmlParser {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn parse(&self) -> NodeRef {
        let mut state = ParserState { unfinished: Vec::new() };
        let mut text = String::new();
        let mut in_tag = false;

        for c in self.body.chars() {
            match c {
                '<' => {
                    in_tag = true;
                    if !text.is_empty() {
                        state.add_text(&text);
                    }
                    text.clear();
                }
                '>' => {
                    in_tag = false;
                    state.add_tag(&text);
                    text.clear();
                }
                _ => text.push(c),
            }
        }
        if !in_tag && !text.is_empty() {
            state.add_text(&text);
        }

        state.finish()
    }
}

struct ParserState {
    unfinished: Vec<NodeRef>,
}

impl ParserState {
    fn implicit_tags(&mut self, tag: Option<&str>) {
        loop {
            let open_tags: Vec<String> = self
                .unfinished
                .iter()
                .map(|n| n.borrow().tag().unwrap_or("").to_string())
                .collect();

            if open_tags.is_empty() && tag != Some("html") {
                self.add_tag("html");
            } else if open_tags == ["html"]
                && !matches!(tag, Some("head") | Some("body") | Some("/html"))
            {
                if tag.map(|t| HEAD_TAGS.contains(&t)).unwrap_or(false) {
                    self.add_tag("head");
                } else {
                    self.add_tag("body");
                }
            } else if open_tags == ["html", "head"]
                && tag != Some("/head")
                && !tag.map(|t| HEAD_TAGS.contains(&t)).unwrap_or(false)
            {
                self.add_tag("/head");
            } else {
                break;
            }
        }
    }

    fn add_text(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.implicit_tags(None);
        let parent = self.unfinished.last().expect("implicit html/body inserted").clone();
        let node = Node::new_text(text.to_string());
        append_child(&parent, node);
    }

    fn add_tag(&mut self, raw: &str) {
        let (tag, attributes) = get_attributes(raw);
        if tag.starts_with('!') {
            return;
        }

        self.implicit_tags(Some(&tag));

        if let Some(closing) = tag.strip_prefix('/') {
            let _ = closing;
            if self.unfinished.len() == 1 {
                return;
            }
            let node = self.unfinished.pop().unwrap();
            let parent = self.unfinished.last().unwrap().clone();
            append_child(&parent, node);
        } else if SELF_CLOSING_TAGS.contains(&tag.as_str()) {
            let node = Node::new_element(tag, attributes);
            if let Some(parent) = self.unfinished.last().cloned() {
                append_child(&parent, node);
            }
        } else {
            let node = Node::new_element(tag, attributes);
            self.unfinished.push(node);
        }
    }

    fn finish(mut self) -> NodeRef {
        if self.unfinished.is_empty() {
            self.implicit_tags(None);
        }
        while self.unfinished.len() > 1 {
            let node = self.unfinished.pop().unwrap();
            let parent = self.unfinished.last().unwrap().clone();
            append_child(&parent, node);
        }
        self.unfinished.pop().expect("root element always present")
    }
}

/// Splits `<tag attr="value" attr2=value2>` text into a lowercased tag name
/// and an attribute map, honoring both quoted and bare attribute values.
fn get_attributes(text: &str) -> (String, BTreeMap<String, String>) {
    let mut parts = text.splitn(2, char::is_whitespace);
    let tag = parts.next().unwrap_or("").to_lowercase();
    let rest = parts.next().unwrap_or("");
    let mut attributes = BTreeMap::new();

    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let key_start = i;
        while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        if key.is_empty() {
            break;
        }

        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }

        if i >= chars.len() || chars[i] != '=' {
            attributes.insert(key.to_lowercase(), String::new());
            continue;
        }
        i += 1;
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            attributes.insert(key.to_lowercase(), String::new());
            break;
        }

        let value: String = if chars[i] == '\'' || chars[i] == '"' {
            let quote = chars[i];
            i += 1;
            let value_start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            let v: String = chars[value_start..i].iter().collect();
            if i < chars.len() {
                i += 1;
            }
            v
        } else {
            let value_start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            chars[value_start..i].iter().collect()
        };

        attributes.insert(key.to_lowercase(), value);
    }

    (tag, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeType;

    fn tag_of(n: &NodeRef) -> String {
        n.borrow().tag().unwrap().to_string()
    }

    #[test]
    fn empty_body_yields_html_body_shape() {
        let doc = HtmlParser::new("").parse();
        assert_eq!(tag_of(&doc), "html");
        assert_eq!(doc.borrow().children.len(), 1);
        assert_eq!(tag_of(&doc.borrow().children[0]), "body");
        assert!(doc.borrow().children[0].borrow().children.is_empty());
    }

    #[test]
    fn implicit_head_body_split() {
        let doc = HtmlParser::new("<title>hi</title><p>there</p>").parse();
        assert_eq!(tag_of(&doc), "html");
        let children = &doc.borrow().children;
        assert_eq!(children.len(), 2);
        assert_eq!(tag_of(&children[0]), "head");
        assert_eq!(tag_of(&children[1]), "body");
    }

    #[test]
    fn self_closing_tag_does_not_nest() {
        let doc = HtmlParser::new("<body><br><p>x</p></body>").parse();
        let body = &doc.borrow().children[0];
        assert_eq!(body.borrow().children.len(), 2);
        assert_eq!(tag_of(&body.borrow().children[0]), "br");
        assert!(body.borrow().children[0].borrow().children.is_empty());
    }

    #[test]
    fn attribute_quoting() {
        let doc = HtmlParser::new(r#"<body><a href="/x" target='_blank' disabled>hi</a></body>"#).parse();
        let body = &doc.borrow().children[0];
        let a = &body.borrow().children[0];
        let a_ref = a.borrow();
        match &a_ref.node_type {
            NodeType::Element(e) => {
                assert_eq!(e.attributes.get("href").unwrap(), "/x");
                assert_eq!(e.attributes.get("target").unwrap(), "_blank");
                assert_eq!(e.attributes.get("disabled").unwrap(), "");
            }
            _ => panic!("expected element"),
        }
    }
}
