//! Locator strategies for the dashboard UI.
//!
//! Each logical target declares an ordered list of strategies; the probe
//! script walks them in priority order and tags the first match with a
//! `data-cvsync-target` attribute so the element can be re-found with a
//! plain attribute selector afterwards.

use serde_json::json;

pub const MARKER_ATTRIBUTE: &str = "data-cvsync-target";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS selector.
    Css(String),
    /// A search-style input identified by a nearby label text and a
    /// placeholder fragment. The input must follow the label in document
    /// order.
    LabelledInput { label: String, placeholder: String },
    /// A button or submit input carrying the given visible label, either as
    /// a `value` attribute or as text content.
    ActionControl { label: String },
}

impl Locator {
    pub fn css<S: Into<String>>(selector: S) -> Self {
        Locator::Css(selector.into())
    }

    pub fn describe(&self) -> String {
        match self {
            Locator::Css(selector) => format!("css:{selector}"),
            Locator::LabelledInput { label, .. } => format!("labelled_input:{label}"),
            Locator::ActionControl { label } => format!("action_control:{label}"),
        }
    }

    /// JS expression evaluating to an array of candidate elements, in
    /// document order.
    fn candidates_expr(&self) -> String {
        match self {
            Locator::Css(selector) => {
                format!(
                    "Array.from(document.querySelectorAll({sel}))",
                    sel = json!(selector)
                )
            }
            Locator::LabelledInput { label, placeholder } => {
                format!(
                    "(() => {{
                        const anchor = Array.from(document.querySelectorAll('div, label'))
                            .find(node => (node.textContent || '').includes({label}));
                        if (!anchor) return [];
                        return Array.from(document.querySelectorAll('input'))
                            .filter(input => (input.getAttribute('placeholder') || '').includes({placeholder}))
                            .filter(input => anchor.compareDocumentPosition(input) & Node.DOCUMENT_POSITION_FOLLOWING);
                    }})()",
                    label = json!(label),
                    placeholder = json!(placeholder)
                )
            }
            Locator::ActionControl { label } => {
                format!(
                    "Array.from(document.querySelectorAll('input[type=submit], input[type=button], button, a'))
                        .filter(node => (node.value || '').includes({label})
                            || (node.innerText || node.textContent || '').includes({label}))",
                    label = json!(label)
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// The element exists in the DOM.
    Present,
    /// The element is rendered with a nonzero box and not hidden.
    Clickable,
}

/// Build the probe script for one polling attempt. Returns the index of the
/// first locator that resolved (per the declared priority order), or -1.
pub fn probe_script(step: &str, locators: &[Locator], wait: WaitCondition) -> String {
    let lists = locators
        .iter()
        .map(|locator| locator.candidates_expr())
        .collect::<Vec<_>>()
        .join(",\n        ");
    let require_visible = matches!(wait, WaitCondition::Clickable);
    format!(
        "(() => {{
    const visible = (el) => {{
        if (!el) return false;
        const rect = el.getBoundingClientRect();
        if (rect.width <= 0 || rect.height <= 0) return false;
        const style = window.getComputedStyle(el);
        return style.visibility !== 'hidden' && style.display !== 'none';
    }};
    const requireVisible = {require_visible};
    const lists = [
        {lists}
    ];
    for (let i = 0; i < lists.length; i++) {{
        for (const el of lists[i]) {{
            if (!requireVisible || visible(el)) {{
                document.querySelectorAll('[{marker}={value}]')
                    .forEach(node => node.removeAttribute('{marker}'));
                el.setAttribute('{marker}', {value_literal});
                return i;
            }}
        }}
    }}
    return -1;
}})()",
        require_visible = require_visible,
        lists = lists,
        marker = MARKER_ATTRIBUTE,
        value = json!(step),
        value_literal = json!(step),
    )
}

/// Attribute selector re-finding the element tagged by [`probe_script`].
pub fn marker_selector(step: &str) -> String {
    format!("[{MARKER_ATTRIBUTE}={value}]", value = json!(step))
}
