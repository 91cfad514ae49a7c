/// Paint commands and a minimal background cascade

use super::layout::{ElementType, LayoutNode, PageLayout, LINE_HEIGHT};
use crate::style::{StyleRule, StyleSheet};

pub type Rgba = (u8, u8, u8, u8);

const WHITE: Rgba = (255, 255, 255, 255);
const CHART_PLACEHOLDER: Rgba = (236, 238, 242, 255);

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    SolidRect {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        rgba: Rgba,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        scale: u32,
        rgba: Rgba,
    },
}

/// Parse a CSS color value. Returns `None` for anything we cannot paint,
/// including `transparent`, gradients and `color-mix(...)`.
pub fn parse_color(value: &str) -> Option<Rgba> {
    let v = value.trim().trim_end_matches("!important").trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = v
        .strip_prefix("rgba(")
        .or_else(|| v.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let parts: Vec<&str> = args
            .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() < 3 {
            return None;
        }
        let channel = |s: &str| s.parse::<f32>().ok().map(|n| n.clamp(0.0, 255.0) as u8);
        let alpha = match parts.get(3) {
            Some(a) => (a.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0) as u8,
            None => 255,
        };
        return Some((channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha));
    }
    match v.as_str() {
        "white" => Some(WHITE),
        "black" => Some((0, 0, 0, 255)),
        "red" => Some((255, 0, 0, 255)),
        "green" => Some((0, 128, 0, 255)),
        "blue" => Some((0, 0, 255, 255)),
        "gray" | "grey" => Some((128, 128, 128, 255)),
        "silver" => Some((192, 192, 192, 255)),
        "navy" => Some((0, 0, 128, 255)),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some((nibble(0)?, nibble(1)?, nibble(2)?, 255)),
        4 => Some((nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        6 => Some((byte(0)?, byte(2)?, byte(4)?, 255)),
        8 => Some((byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// Color of a `background` shorthand or `background-color` value
fn background_color(value: &str) -> Option<Rgba> {
    if value.to_ascii_lowercase().contains("color-mix(") {
        return None;
    }
    parse_color(value).or_else(|| value.split_whitespace().find_map(parse_color))
}

/// The parts of an element a simple selector can match
#[derive(Debug, Clone, Copy)]
pub struct ElementKey<'a> {
    pub tag: &'a str,
    pub id: Option<&'a str>,
    pub classes: &'a [String],
}

impl<'a> From<&'a LayoutNode> for ElementKey<'a> {
    fn from(node: &'a LayoutNode) -> Self {
        Self {
            tag: &node.tag,
            id: node.id.as_deref(),
            classes: &node.classes,
        }
    }
}

/// Match one compound selector such as `div#line-chart.card`
fn compound_matches(compound: &str, el: ElementKey<'_>) -> bool {
    if compound.is_empty()
        || compound.contains(|c: char| matches!(c, '[' | ':' | '>' | '+' | '~' | '*'))
    {
        return false;
    }
    let mut rest = compound;
    let tag_end = rest.find(['.', '#']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && !tag.eq_ignore_ascii_case(el.tag) {
        return false;
    }
    rest = &rest[tag_end..];
    while !rest.is_empty() {
        let marker = &rest[..1];
        let body = &rest[1..];
        let end = body.find(['.', '#']).unwrap_or(body.len());
        let name = &body[..end];
        let ok = match marker {
            "#" => el.id == Some(name),
            _ => el.classes.iter().any(|c| c == name),
        };
        if !ok {
            return false;
        }
        rest = &body[end..];
    }
    true
}

/// Match a selector against `el`. Descendant selectors are honored only
/// through the page body: every leading compound has to match `body`.
pub fn selector_matches(selector: &str, el: ElementKey<'_>, body: ElementKey<'_>) -> bool {
    selector.split(',').any(|alternative| {
        let compounds: Vec<&str> = alternative.split_whitespace().collect();
        match compounds.split_last() {
            Some((last, ancestors)) => {
                compound_matches(last, el)
                    && ancestors
                        .iter()
                        .all(|a| compound_matches(a, body) || a.eq_ignore_ascii_case("html"))
            }
            None => false,
        }
    })
}

/// Resolves element backgrounds from readable style sheets.
/// Later rules win; specificity is not considered.
pub struct StyleResolver<'a> {
    rules: Vec<&'a StyleRule>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(sheets: &'a [StyleSheet]) -> Self {
        let rules = sheets
            .iter()
            .filter_map(|s| s.rules.as_ref().ok())
            .flatten()
            .collect();
        Self { rules }
    }

    pub fn background(&self, el: ElementKey<'_>, body: ElementKey<'_>) -> Option<Rgba> {
        let mut found = None;
        for rule in &self.rules {
            if !selector_matches(&rule.selector, el, body) {
                continue;
            }
            // background-color beats the shorthand within one rule
            let color = rule
                .background_color
                .as_deref()
                .and_then(background_color)
                .or_else(|| rule.background.as_deref().and_then(background_color));
            if color.is_some() {
                found = color;
            }
        }
        found
    }
}

fn ink_for(bg: Rgba) -> Rgba {
    let luma = (299 * bg.0 as u32 + 587 * bg.1 as u32 + 114 * bg.2 as u32) / 1000;
    if luma > 128 {
        (34, 34, 34, 255)
    } else {
        (238, 238, 238, 255)
    }
}

/// Turn a layout into paint commands, back to front.
pub fn paint_layout(layout: &PageLayout, resolver: &StyleResolver<'_>) -> Vec<PaintCommand> {
    let body = ElementKey {
        tag: "body",
        id: None,
        classes: &layout.body_classes,
    };
    let page_bg = resolver.background(body, body).unwrap_or(WHITE);
    let mut cmds = vec![PaintCommand::SolidRect {
        x: 0,
        y: 0,
        width: layout.width,
        height: layout.height,
        rgba: page_bg,
    }];

    for node in &layout.nodes {
        let own = resolver.background(node.into(), body);
        let fill = match node.elem_type {
            ElementType::Chart => Some(own.unwrap_or(CHART_PLACEHOLDER)),
            ElementType::Panel => Some(own.unwrap_or(WHITE)),
            _ => own,
        };
        if let Some(rgba) = fill {
            cmds.push(PaintCommand::SolidRect {
                x: node.rect.x,
                y: node.rect.y,
                width: node.rect.width,
                height: node.rect.height,
                rgba,
            });
        }

        let ink = ink_for(fill.unwrap_or(page_bg));
        for (i, line) in node.text.lines().enumerate() {
            cmds.push(PaintCommand::Text {
                x: node.rect.x + node.padding as i32,
                y: node.rect.y + (node.padding + i as u32 * LINE_HEIGHT * node.scale) as i32,
                text: line.to_string(),
                scale: node.scale,
                rgba: ink,
            });
        }
    }
    cmds
}
