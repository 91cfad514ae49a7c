//! Style normalization for the rasterizer
//!
//! Dashboard themes tint backgrounds with `color-mix(...)`, which the
//! rasterizers cannot evaluate. The normalizer reads a snapshot of the
//! page's rules and produces a separate set of static overrides, keyed on
//! the page's theme. Nothing is rewritten in place; the session applies the
//! overrides to its own page only.

use crate::StyleAccessError;
use log::{debug, warn};
use serde::Deserialize;
use std::fmt::Write as _;

/// Dynamic color function the rasterizers cannot evaluate
const COLOR_MIX: &str = "color-mix(";

/// A named visual variant of the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    Light,
    Dark,
    Corporate,
    Neutral,
}

impl Theme {
    pub const ALL: [Theme; 4] = [Theme::Light, Theme::Dark, Theme::Corporate, Theme::Neutral];

    /// Body class that selects this theme
    pub fn class_name(self) -> &'static str {
        match self {
            Theme::Light => "light-theme",
            Theme::Dark => "dark-theme",
            Theme::Corporate => "corporate-theme",
            Theme::Neutral => "neutral-theme",
        }
    }

    /// Resolve the theme from a body class attribute. The first recognised
    /// class token wins; anything else is the light theme.
    pub fn from_body_class(class: Option<&str>) -> Theme {
        class
            .into_iter()
            .flat_map(str::split_whitespace)
            .find_map(|token| Theme::ALL.into_iter().find(|t| t.class_name() == token))
            .unwrap_or(Theme::Light)
    }
}

/// Static fallback fill for each theme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeFallbackTable {
    light: &'static str,
    dark: &'static str,
    corporate: &'static str,
    neutral: &'static str,
}

impl Default for ThemeFallbackTable {
    fn default() -> Self {
        Self {
            light: "#5e97f8",
            dark: "#7db5fb",
            corporate: "#497ee9",
            neutral: "#858b98",
        }
    }
}

impl ThemeFallbackTable {
    pub fn color(&self, theme: Theme) -> &'static str {
        match theme {
            Theme::Light => self.light,
            Theme::Dark => self.dark,
            Theme::Corporate => self.corporate,
            Theme::Neutral => self.neutral,
        }
    }

    /// Fallback for a body class attribute, defaulting to the light entry
    pub fn for_body_class(&self, class: Option<&str>) -> &'static str {
        self.color(Theme::from_body_class(class))
    }
}

/// The background-related declarations of one style rule
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct StyleRule {
    pub selector: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
}

impl StyleRule {
    fn needs_fallback(&self) -> bool {
        uses_color_mix(self.background.as_deref()) || uses_color_mix(self.background_color.as_deref())
    }
}

fn uses_color_mix(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.to_ascii_lowercase().contains(COLOR_MIX))
}

fn replace_color_mix(value: Option<&str>, fallback: &str) -> Option<String> {
    value.map(|v| {
        if uses_color_mix(Some(v)) {
            fallback.to_string()
        } else {
            v.to_string()
        }
    })
}

/// A style sheet as seen from the page
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSheet {
    /// Source URL, `None` for inline `<style>` elements
    pub href: Option<String>,
    /// The sheet's rules, or why they could not be read
    pub rules: std::result::Result<Vec<StyleRule>, StyleAccessError>,
}

impl StyleSheet {
    pub fn readable(href: Option<String>, rules: Vec<StyleRule>) -> Self {
        Self { href, rules: Ok(rules) }
    }

    pub fn unreadable(href: impl Into<String>, reason: impl Into<String>) -> Self {
        let href = href.into();
        Self {
            href: Some(href.clone()),
            rules: Err(StyleAccessError {
                href,
                reason: reason.into(),
            }),
        }
    }
}

/// Static replacements for rules the rasterizer cannot paint
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedStyles {
    pub overrides: Vec<StyleRule>,
}

impl NormalizedStyles {
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Override rules as a style sheet body, with `!important` so they win
    /// over the original declarations.
    pub fn to_css(&self) -> String {
        let mut css = String::new();
        for rule in &self.overrides {
            let _ = write!(css, "{} {{", rule.selector);
            if let Some(bg) = &rule.background {
                let _ = write!(css, " background: {} !important;", bg);
            }
            if let Some(bg) = &rule.background_color {
                let _ = write!(css, " background-color: {} !important;", bg);
            }
            css.push_str(" }\n");
        }
        css
    }

    /// Produce a copy of `sheets` with the overrides applied. The input is
    /// left untouched.
    pub fn apply_to(&self, sheets: &[StyleSheet]) -> Vec<StyleSheet> {
        let mut remaining = self.overrides.iter();
        sheets
            .iter()
            .map(|sheet| StyleSheet {
                href: sheet.href.clone(),
                rules: sheet.rules.as_ref().map_err(Clone::clone).map(|rules| {
                    rules
                        .iter()
                        .map(|rule| {
                            if rule.needs_fallback() {
                                if let Some(fix) = remaining.next() {
                                    return fix.clone();
                                }
                            }
                            rule.clone()
                        })
                        .collect()
                }),
            })
            .collect()
    }
}

/// Rewrites dynamic background values into theme-appropriate static colors
#[derive(Debug, Clone, Default)]
pub struct StyleNormalizer {
    fallbacks: ThemeFallbackTable,
}

impl StyleNormalizer {
    pub fn new(fallbacks: ThemeFallbackTable) -> Self {
        Self { fallbacks }
    }

    /// Compute overrides for every readable rule whose background uses
    /// `color-mix`. Unreadable sheets are logged and skipped.
    pub fn normalize(&self, sheets: &[StyleSheet], body_class: Option<&str>) -> NormalizedStyles {
        let fallback = self.fallbacks.for_body_class(body_class);
        let mut overrides = Vec::new();

        for sheet in sheets {
            let rules = match &sheet.rules {
                Ok(rules) => rules,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            for rule in rules.iter().filter(|r| r.needs_fallback()) {
                overrides.push(StyleRule {
                    selector: rule.selector.clone(),
                    background: replace_color_mix(rule.background.as_deref(), fallback),
                    background_color: replace_color_mix(rule.background_color.as_deref(), fallback),
                });
            }
        }

        debug!(
            "normalized {} rule(s) to {} for theme {:?}",
            overrides.len(),
            fallback,
            Theme::from_body_class(body_class)
        );
        NormalizedStyles { overrides }
    }
}
