//! CSS selectors: tag and descendant, with cascade priority = selector
//! specificity. Grounded on the original implementation's
//! `css/tag_selector.py`; `Descendant` has no retrieved original and is
//! designed directly from SPEC_FULL.md §3.

use crate::dom::NodeRef;

#[derive(Clone, Debug)]
pub enum Selector {
    Tag(String),
    Descendant(Box<Selector>, Box<Selector>),
}

impl Selector {
    pub fn tag(name: impl Into<String>) -> Self {
        Selector::Tag(name.into())
    }

    pub fn descendant(ancestor: Selector, child: Selector) -> Self {
        Selector::Descendant(Box::new(ancestor), Box::new(child))
    }

    pub fn priority(&self) -> i32 {
        match self {
            Selector::Tag(_) => 1,
            Selector::Descendant(a, c) => a.priority() + c.priority(),
        }
    }

    pub fn matches(&self, node: &NodeRef) -> bool {
        match self {
            Selector::Tag(tag) => node.borrow().tag() == Some(tag.as_str()),
            Selector::Descendant(ancestor, child) => {
                if !child.matches(node) {
                    return false;
                }
                let mut cur = node.borrow().parent();
                while let Some(parent) = cur {
                    if ancestor.matches(&parent) {
                        return true;
                    }
                    cur = parent.borrow().parent();
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html_parser::HtmlParser;

    #[test]
    fn tag_selector_matches_element_only() {
        let doc = HtmlParser::new("<p>hi</p>").parse();
        let body = &doc.borrow().children[0];
        let p = body.borrow().children[0].clone();
        assert!(Selector::tag("p").matches(&p));
        assert!(!Selector::tag("div").matches(&p));
    }

    #[test]
    fn descendant_selector_priority_is_sum() {
        let sel = Selector::descendant(Selector::tag("div"), Selector::tag("p"));
        assert_eq!(sel.priority(), 2);
    }

    #[test]
    fn descendant_selector_requires_ancestor() {
        let doc = HtmlParser::new("<div><p>a</p></div><p>b</p>").parse();
        let body = &doc.borrow().children[0];
        let div = body.borrow().children[0].clone();
        let p_in_div = div.borrow().children[0].clone();
        let p_outside = body.borrow().children[1].clone();

        let sel = Selector::descendant(Selector::tag("div"), Selector::tag("p"));
        assert!(sel.matches(&p_in_div));
        assert!(!sel.matches(&p_outside));
    }
}
