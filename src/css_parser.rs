//! CSS parser: selectors (tag, descendant) and declaration bodies. No
//! retrieved original source exists for this file (the Python project's
//! `css_parser.py` was not part of the retrieval pack); designed directly
//! from SPEC_FULL.md §3's selector/rule grammar and exercised the way the
//! original's `css/style.py` exercises it: `CSSParser(text).selector()` for
//! a single selector, `CSSParser(text).body()` for a declaration block.

use std::collections::BTreeMap;

use crate::error::{BrowserError, Result};
use crate::selector::Selector;

pub struct CssParser<'a> {
    s: &'a str,
    chars: Vec<char>,
    index: usize,
}

impl<'a> CssParser<'a> {
    pub fn new(s: &'a str) -> Self {
        Self { s, chars: s.chars().collect(), index: 0 }
    }

    fn whitespace(&mut self) {
        while self.index < self.chars.len() && self.chars[self.index].is_whitespace() {
            self.index += 1;
        }
    }

    fn literal(&mut self, lit: char) -> Result<()> {
        if self.index >= self.chars.len() || self.chars[self.index] != lit {
            return Err(BrowserError::Parse(format!(
                "expected '{}' at {} in {:?}",
                lit, self.index, self.s
            )));
        }
        self.index += 1;
        Ok(())
    }

    fn word(&mut self) -> Result<String> {
        let start = self.index;
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            if c.is_alphanumeric() || "#-.%".contains(c) {
                self.index += 1;
            } else {
                break;
            }
        }
        if self.index == start {
            return Err(BrowserError::Parse(format!("expected word at {} in {:?}", self.index, self.s)));
        }
        Ok(self.chars[start..self.index].iter().collect())
    }

    fn ignore_until(&mut self, stop: &[char]) -> Option<char> {
        while self.index < self.chars.len() {
            let c = self.chars[self.index];
            if stop.contains(&c) {
                return Some(c);
            }
            self.index += 1;
        }
        None
    }

    /// Parses one declaration block: `prop: value; prop2: value2` with or
    /// without enclosing braces.
    pub fn body(&mut self) -> Result<BTreeMap<String, String>> {
        let mut pairs = BTreeMap::new();
        loop {
            self.whitespace();
            if self.index >= self.chars.len() || self.chars[self.index] == '}' {
                break;
            }
            match self.pair() {
                Ok((prop, value)) => {
                    pairs.insert(prop.to_lowercase(), value);
                    self.whitespace();
                    if self.index < self.chars.len() && self.chars[self.index] == ';' {
                        self.index += 1;
                    } else {
                        break;
                    }
                }
                Err(_) => {
                    if self.ignore_until(&[';', '}']).is_none() {
                        break;
                    }
                    if self.index < self.chars.len() && self.chars[self.index] == ';' {
                        self.index += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        Ok(pairs)
    }

    fn pair(&mut self) -> Result<(String, String)> {
        let prop = self.word()?;
        self.whitespace();
        self.literal(':')?;
        self.whitespace();
        let value = self.value()?;
        Ok((prop, value.trim().to_string()))
    }

    fn value(&mut self) -> Result<String> {
        let start = self.index;
        self.ignore_until(&[';', '}']);
        Ok(self.chars[start..self.index].iter().collect())
    }

    /// Parses a single simple or descendant selector (`tag1 tag2 tag3`,
    /// right-to-left binds the rightmost as the "subject").
    pub fn selector(&mut self) -> Result<Selector> {
        self.whitespace();
        let mut out = Selector::tag(self.word()?);
        self.whitespace();
        while self.index < self.chars.len() && self.chars[self.index] != '{' {
            let ancestor = out;
            let descendant_tag = self.word()?;
            out = Selector::descendant(ancestor, Selector::tag(descendant_tag));
            self.whitespace();
        }
        Ok(out)
    }

    /// Parses a full stylesheet: a sequence of `selector { body }` rules.
    pub fn parse(&mut self) -> Result<Vec<(Selector, BTreeMap<String, String>)>> {
        let mut rules = Vec::new();
        loop {
            self.whitespace();
            if self.index >= self.chars.len() {
                break;
            }
            match self.selector() {
                Ok(selector) => {
                    self.whitespace();
                    if self.literal('{').is_err() {
                        // Malformed rule: skip to the next '}' and continue.
                        self.ignore_until(&['}']);
                        if self.index < self.chars.len() {
                            self.index += 1;
                        }
                        continue;
                    }
                    let body = self.body()?;
                    self.whitespace();
                    let _ = self.literal('}');
                    rules.push((selector, body));
                }
                Err(_) => {
                    if self.ignore_until(&['}']).is_none() {
                        break;
                    }
                    self.index += 1;
                }
            }
        }
        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_stylesheet() {
        let css = "p { color: blue; font-size: 12px }\ndiv p { color: red; }";
        let rules = CssParser::new(css).parse().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].0.priority(), 1);
        assert_eq!(rules[1].0.priority(), 2);
        assert_eq!(rules[0].1.get("color").unwrap(), "blue");
    }

    #[test]
    fn parses_inline_style_body() {
        let mut p = CssParser::new("color:red; font-weight: bold");
        let body = p.body().unwrap();
        assert_eq!(body.get("color").unwrap(), "red");
        assert_eq!(body.get("font-weight").unwrap(), "bold");
    }
}
