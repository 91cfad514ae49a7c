/// Block layout for the static painter

use crate::{Viewport, CHART_CONTAINER_IDS, DETAILS_PANEL_ID};
use scraper::{ElementRef, Html};

/// Height given to every chart container, in pixels
pub const CHART_HEIGHT: u32 = 240;
/// Width of one text cell at scale 1
pub const CHAR_WIDTH: u32 = 8;
/// Height of one text line at scale 1
pub const LINE_HEIGHT: u32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Title,
    Paragraph,
    Chart,
    Panel,
}

/// A laid-out box plus what the painter needs to style it
#[derive(Debug, Clone)]
pub struct LayoutNode {
    pub rect: Rect,
    pub padding: u32,
    pub text: String,
    pub elem_type: ElementType,
    pub scale: u32,
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl LayoutNode {
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.as_deref() == Some(id)
    }
}

/// Result of laying out a page body
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub nodes: Vec<LayoutNode>,
    pub width: u32,
    pub height: u32,
    pub body_classes: Vec<String>,
}

pub(crate) fn find_body(document: &Html) -> Option<ElementRef<'_>> {
    let root = document.root_element();
    if root.value().name() == "body" {
        return Some(root);
    }
    root.children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
}

fn element_key(el: ElementRef<'_>) -> (String, Option<String>, Vec<String>) {
    let v = el.value();
    (
        v.name().to_string(),
        v.id().map(|s| s.to_string()),
        v.classes().map(|c| c.to_string()).collect(),
    )
}

/// Wrap `text` to `width` pixels of cells at `scale`
fn wrap(text: &str, width: u32, scale: u32) -> Vec<String> {
    let cell = CHAR_WIDTH * scale.max(1);
    let chars_per_line = if width >= cell { (width / cell) as usize } else { 1 };
    let mut lines = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if cur_len + word_len + 1 > chars_per_line && !cur.is_empty() {
            lines.push(cur);
            cur = word.to_string();
            cur_len = word_len;
        } else {
            if !cur.is_empty() {
                cur.push(' ');
                cur_len += 1;
            }
            cur.push_str(word);
            cur_len += word_len;
        }
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

struct Cursor {
    y: u32,
    left: i32,
    width: u32,
}

impl Cursor {
    fn push_text(
        &mut self,
        nodes: &mut Vec<LayoutNode>,
        el: ElementRef<'_>,
        elem_type: ElementType,
        scale: u32,
        padding: u32,
        margin: u32,
    ) {
        let raw = el.text().collect::<String>();
        let lines = wrap(&raw, self.width.saturating_sub(padding * 2), scale);
        if lines.is_empty() && elem_type != ElementType::Panel {
            return;
        }
        let lines_count = (lines.len() as u32).max(1);
        let height = lines_count * LINE_HEIGHT * scale + padding * 2;
        let (tag, id, classes) = element_key(el);
        nodes.push(LayoutNode {
            rect: Rect {
                x: self.left,
                y: self.y as i32,
                width: self.width,
                height,
            },
            padding,
            text: lines.join("\n"),
            elem_type,
            scale,
            tag,
            id,
            classes,
        });
        self.y += height + margin;
    }

    fn push_chart(&mut self, nodes: &mut Vec<LayoutNode>, el: ElementRef<'_>) {
        let (tag, id, classes) = element_key(el);
        nodes.push(LayoutNode {
            rect: Rect {
                x: self.left,
                y: self.y as i32,
                width: self.width,
                height: CHART_HEIGHT,
            },
            padding: 0,
            text: String::new(),
            elem_type: ElementType::Chart,
            scale: 1,
            tag,
            id,
            classes,
        });
        self.y += CHART_HEIGHT + 8;
    }
}

/// Stack the body's blocks vertically in document order.
/// - `h1`-`h3` become titles at scale 2, `p`/`li`/`h4`-`h6` paragraphs
/// - chart containers become fixed-height boxes; their markup is not walked
/// - the details panel is laid out only when `details_visible`
pub fn layout_document(document: &Html, viewport: Viewport, details_visible: bool) -> PageLayout {
    let mut nodes = Vec::new();
    let mut cursor = Cursor {
        y: 8,
        left: 8,
        width: viewport.width.saturating_sub(16),
    };

    let Some(body) = find_body(document) else {
        return PageLayout {
            nodes,
            width: viewport.width,
            height: viewport.height,
            body_classes: Vec::new(),
        };
    };
    let body_classes = body.value().classes().map(|c| c.to_string()).collect();

    let mut stack: Vec<ElementRef<'_>> = body.children().filter_map(ElementRef::wrap).collect();
    stack.reverse();

    while let Some(el) = stack.pop() {
        let value = el.value();
        let tag = value.name();
        if matches!(tag, "script" | "style" | "template" | "noscript" | "link" | "meta") {
            continue;
        }
        if value.id() == Some(DETAILS_PANEL_ID) {
            if details_visible {
                cursor.push_text(&mut nodes, el, ElementType::Panel, 1, 12, 8);
            }
            continue;
        }
        if value.id().is_some_and(|id| CHART_CONTAINER_IDS.contains(&id)) {
            cursor.push_chart(&mut nodes, el);
            continue;
        }
        match tag {
            "h1" | "h2" | "h3" => cursor.push_text(&mut nodes, el, ElementType::Title, 2, 8, 8),
            "p" | "li" | "h4" | "h5" | "h6" => {
                cursor.push_text(&mut nodes, el, ElementType::Paragraph, 1, 6, 6)
            }
            _ => {
                let mut children: Vec<_> = el.children().filter_map(ElementRef::wrap).collect();
                children.reverse();
                stack.extend(children);
            }
        }
    }

    PageLayout {
        nodes,
        width: viewport.width,
        height: viewport.height.max(cursor.y),
        body_classes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>T</title><style>p{}</style></head>
        <body class="dark-theme">
          <header><h1>Home Dashboard</h1></header>
          <p>Hello world</p>
          <div class="chart-grid">
            <div id="line-chart" class="chart-card"><svg><text>ignored</text></svg></div>
          </div>
          <aside id="details" class="open"><p>Comments</p></aside>
        </body></html>"#;

    #[test]
    fn layout_stacks_blocks_in_document_order() {
        let doc = Html::parse_document(PAGE);
        let v = Viewport { width: 200, height: 100 };
        let layout = layout_document(&doc, v, true);
        let kinds: Vec<_> = layout.nodes.iter().map(|n| n.elem_type).collect();
        assert_eq!(
            kinds,
            [ElementType::Title, ElementType::Paragraph, ElementType::Chart, ElementType::Panel]
        );
        assert!(layout.nodes.windows(2).all(|w| w[0].rect.y < w[1].rect.y));
        assert!(layout.height > 100);
        assert_eq!(layout.body_classes, ["dark-theme"]);
    }

    #[test]
    fn hidden_details_panel_is_not_laid_out() {
        let doc = Html::parse_document(PAGE);
        let layout = layout_document(&doc, Viewport::default(), false);
        assert!(layout.nodes.iter().all(|n| !n.matches_id(DETAILS_PANEL_ID)));
        assert!(layout.nodes.iter().all(|n| !n.text.contains("Comments")));
    }

    #[test]
    fn wrap_breaks_on_cell_width() {
        let lines = wrap("aaaa bbbb cccc", 80, 1);
        assert_eq!(lines, ["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn wrap_counts_characters_not_bytes() {
        let lines = wrap("Übersicht Ärzte", 80, 1);
        assert_eq!(lines, ["Übersicht", "Ärzte"]);
        assert_eq!(wrap("äöü äöü", 80, 1), ["äöü äöü"]);
    }
}
