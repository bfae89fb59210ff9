//! Sail settings as they appear on the dashboard, and the edit-card assertion

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::E2eResult;
use crate::page::Page;

/// Value types a Sail setting can be cast to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastType {
    Integer,
    String,
    Boolean,
    Range,
    Array,
    Float,
    AbTest,
    Cron,
    ObjModel,
    Date,
    Uri,
    Throttle,
    Locales,
    Set,
}

impl CastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CastType::Integer => "integer",
            CastType::String => "string",
            CastType::Boolean => "boolean",
            CastType::Range => "range",
            CastType::Array => "array",
            CastType::Float => "float",
            CastType::AbTest => "ab_test",
            CastType::Cron => "cron",
            CastType::ObjModel => "obj_model",
            CastType::Date => "date",
            CastType::Uri => "uri",
            CastType::Throttle => "throttle",
            CastType::Locales => "locales",
            CastType::Set => "set",
        }
    }
}

impl fmt::Display for CastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub cast_type: CastType,
    pub group: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Setting {
    pub fn new(name: impl Into<String>, cast_type: CastType, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cast_type,
            group: group.into(),
            value: String::new(),
            description: None,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.cast_type == CastType::Boolean
    }

    pub fn is_ab_test(&self) -> bool {
        self.cast_type == CastType::AbTest
    }

    /// Name as rendered in the card header
    pub fn title(&self) -> String {
        titleize(&self.name)
    }
}

/// Check that `page` renders the edit card for `setting`.
///
/// Toggle-style settings render a slider; every other type renders a
/// `value` input.
pub fn expect_setting(page: &Page, setting: &Setting) -> E2eResult<()> {
    page.assert_text(&setting.title())?;
    page.assert_text(setting.cast_type.as_str())?;
    page.assert_link(&setting.group)?;
    page.assert_button("SAVE")?;

    if setting.is_boolean() || setting.is_ab_test() {
        page.assert_css(".slider")
    } else {
        page.assert_field("value")
    }
}

/// `feature_enabled` / `featureEnabled` -> `Feature Enabled`
pub fn titleize(name: &str) -> String {
    let mut underscored = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() && prev_lower {
            underscored.push('_');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        underscored.extend(ch.to_lowercase());
    }

    let trimmed = underscored.strip_suffix("_id").unwrap_or(&underscored);

    trimmed
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
