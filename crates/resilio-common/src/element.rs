use serde::{Deserialize, Serialize};

/// A live element found on the page.
///
/// The handle is addressed by the selector that found it; drivers re-query
/// through it, so a handle can go stale when the page re-renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    /// Lowercase tag name (`input`, `select`, ...).
    pub tag: String,
    pub visible: bool,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, tag: impl Into<String>, visible: bool) -> Self {
        Self {
            selector: selector.into(),
            tag: tag.into().to_ascii_lowercase(),
            visible,
        }
    }
}

/// Option to pick in a `<select>` (or text to type into an autocomplete input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectChoice {
    Label(String),
    Value(String),
}

impl SelectChoice {
    pub fn text(&self) -> &str {
        match self {
            SelectChoice::Label(s) | SelectChoice::Value(s) => s,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg { quality: u8 },
    Png,
}

/// Node of the page's accessibility tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxNode {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub children: Vec<AxNode>,
}
