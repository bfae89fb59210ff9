//! Snapshot of a rendered page with Capybara-style matchers

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::error::{E2eError, E2eResult};

static TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)\b([^>]*)>").expect("tag regex")
});
static ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)
        .expect("attr regex")
});
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("link regex"));
static BUTTON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button>").expect("button regex"));
static STRIP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<[^>]+>").expect("strip regex")
});
static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("space regex"));

/// An element's opening tag
#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attrs: HashMap<String, String>,
}

impl Element {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|c| c.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

/// A simple selector: `tag`, `.class`, `#id` or a combination like `span.slider`
#[derive(Debug, Default)]
struct Selector {
    tag: Option<String>,
    classes: Vec<String>,
    id: Option<String>,
}

impl Selector {
    fn parse(selector: &str) -> Self {
        let mut parsed = Selector::default();
        let mut current = String::new();
        let mut kind = ' ';

        for ch in selector.trim().chars().chain(std::iter::once('\0')) {
            if ch == '.' || ch == '#' || ch == '\0' {
                if !current.is_empty() {
                    match kind {
                        '.' => parsed.classes.push(current.clone()),
                        '#' => parsed.id = Some(current.clone()),
                        _ => parsed.tag = Some(current.to_ascii_lowercase()),
                    }
                }
                current.clear();
                kind = ch;
            } else {
                current.push(ch);
            }
        }
        parsed
    }

    fn matches(&self, element: &Element) -> bool {
        self.tag.as_deref().map_or(true, |t| t == element.tag)
            && self.id.as_deref().map_or(true, |id| element.attr("id") == Some(id))
            && self.classes.iter().all(|c| element.has_class(c))
    }
}

/// Rendered HTML captured from the browser
#[derive(Debug, Clone)]
pub struct Page {
    html: String,
}

impl Page {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Visible text with tags removed and whitespace collapsed
    pub fn text(&self) -> String {
        let stripped = STRIP.replace_all(&self.html, " ");
        normalize(&decode_entities(&stripped))
    }

    pub fn has_text(&self, text: &str) -> bool {
        self.text().contains(&normalize(text))
    }

    /// A link whose text, id or title is `locator`
    pub fn has_link(&self, locator: &str) -> bool {
        LINK.captures_iter(&self.html).any(|caps| {
            let attrs = parse_attrs(&caps[1]);
            inner_text(&caps[2]) == locator
                || attrs.get("id").map(String::as_str) == Some(locator)
                || attrs.get("title").map(String::as_str) == Some(locator)
        })
    }

    /// A `<button>` or submit/button input identified by `locator`
    pub fn has_button(&self, locator: &str) -> bool {
        let button_tag = BUTTON.captures_iter(&self.html).any(|caps| {
            let attrs = parse_attrs(&caps[1]);
            inner_text(&caps[2]) == locator
                || attrs.get("id").map(String::as_str) == Some(locator)
                || attrs.get("value").map(String::as_str) == Some(locator)
        });

        button_tag
            || self.elements().iter().any(|el| {
                el.tag == "input"
                    && matches!(el.attr("type"), Some("submit" | "button" | "reset"))
                    && (el.attr("value") == Some(locator) || el.attr("id") == Some(locator))
            })
    }

    pub fn has_css(&self, selector: &str) -> bool {
        let selector = Selector::parse(selector);
        self.elements().iter().any(|el| selector.matches(el))
    }

    /// A fillable field whose name, id or placeholder is `locator`
    pub fn has_field(&self, locator: &str) -> bool {
        self.elements().iter().any(|el| {
            let fillable = match el.tag.as_str() {
                "textarea" | "select" => true,
                "input" => !matches!(
                    el.attr("type"),
                    Some("submit" | "button" | "reset" | "image" | "hidden")
                ),
                _ => false,
            };
            fillable
                && (el.attr("name") == Some(locator)
                    || el.attr("id") == Some(locator)
                    || el.attr("placeholder") == Some(locator))
        })
    }

    pub fn assert_text(&self, text: &str) -> E2eResult<()> {
        check(self.has_text(text), || format!("expected to find text {:?}", text))
    }

    pub fn assert_link(&self, locator: &str) -> E2eResult<()> {
        check(self.has_link(locator), || format!("expected to find link {:?}", locator))
    }

    pub fn assert_button(&self, locator: &str) -> E2eResult<()> {
        check(self.has_button(locator), || format!("expected to find button {:?}", locator))
    }

    pub fn assert_css(&self, selector: &str) -> E2eResult<()> {
        check(self.has_css(selector), || format!("expected to find css {:?}", selector))
    }

    pub fn assert_field(&self, locator: &str) -> E2eResult<()> {
        check(self.has_field(locator), || format!("expected to find field {:?}", locator))
    }

    fn elements(&self) -> Vec<Element> {
        TAG.captures_iter(&self.html)
            .map(|caps| Element {
                tag: caps[1].to_ascii_lowercase(),
                attrs: parse_attrs(&caps[2]),
            })
            .collect()
    }
}

fn check(ok: bool, message: impl FnOnce() -> String) -> E2eResult<()> {
    if ok {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(message()))
    }
}

fn parse_attrs(raw: &str) -> HashMap<String, String> {
    ATTR.captures_iter(raw.trim_end_matches('/'))
        .map(|caps| {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            (caps[1].to_ascii_lowercase(), value)
        })
        .collect()
}

fn inner_text(fragment: &str) -> String {
    normalize(&decode_entities(&STRIP.replace_all(fragment, " ")))
}

fn normalize(text: &str) -> String {
    SPACE.replace_all(text, " ").trim().to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
