//! Pure markdown rendering of [`MessageElement`] trees.
//!
//! Asset re-hosting is asynchronous, so rendering is split into two passes:
//! [`collect_media_sources`] surfaces every media source that needs
//! transformation, the caller resolves them, and [`render_markdown`] consumes
//! the resolved map synchronously.

use std::collections::HashMap;

use crate::message_element::{MediaKind, MessageElement};

/// True when a media source must go through the asset transformer before it
/// can appear in a comment (anything that is not already a network URL).
pub fn needs_transform(src: &str) -> bool {
    !src.starts_with("http")
}

/// Walks the tree and returns each distinct media source that needs
/// transformation, in first-appearance order.
pub fn collect_media_sources(elements: &[MessageElement]) -> Vec<(MediaKind, String)> {
    let mut pending = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack: Vec<&MessageElement> = elements.iter().rev().collect();
    while let Some(element) = stack.pop() {
        match element {
            MessageElement::Media { kind, src } => {
                if needs_transform(src) && seen.insert(src.clone()) {
                    pending.push((*kind, src.clone()));
                }
            }
            MessageElement::Bold(children)
            | MessageElement::Italic(children)
            | MessageElement::Strikethrough(children)
            | MessageElement::Code(children)
            | MessageElement::Paragraph(children)
            | MessageElement::Quote(children) => {
                stack.extend(children.iter().rev());
            }
            _ => {}
        }
    }
    pending
}

/// Renders the tree into one markdown string.
///
/// `resolved` maps transformed media sources to their re-hosted URL, or
/// `None` when transformation failed; failed or unresolved media render their
/// failure marker.
pub fn render_markdown(
    elements: &[MessageElement],
    resolved: &HashMap<String, Option<String>>,
) -> String {
    let mut buffer = String::new();
    render_into(&mut buffer, elements, resolved);
    buffer
}

fn render_into(
    buffer: &mut String,
    elements: &[MessageElement],
    resolved: &HashMap<String, Option<String>>,
) {
    for element in elements {
        match element {
            MessageElement::Text { content } => buffer.push_str(content),
            MessageElement::Mention { id, name } => {
                buffer.push('@');
                buffer.push_str(name.as_deref().unwrap_or(id));
            }
            MessageElement::ChannelLink { id, name } => {
                buffer.push('#');
                buffer.push_str(name.as_deref().unwrap_or(id));
            }
            MessageElement::Link { href } => buffer.push_str(href),
            MessageElement::Media { kind, src } => {
                let url = if needs_transform(src) {
                    resolved.get(src).and_then(Option::as_deref)
                } else {
                    Some(src.as_str())
                };
                match url {
                    Some(url) => match kind {
                        MediaKind::Image => {
                            buffer.push_str(&format!("![image]({url})"));
                        }
                        other => {
                            buffer.push_str(&format!("[{}]({url})", other.label()));
                        }
                    },
                    None => buffer.push_str(kind.failure_marker()),
                }
            }
            MessageElement::Bold(children) => {
                buffer.push_str("**");
                render_into(buffer, children, resolved);
                buffer.push_str("**");
            }
            MessageElement::Italic(children) => {
                buffer.push('*');
                render_into(buffer, children, resolved);
                buffer.push('*');
            }
            MessageElement::Strikethrough(children) => {
                buffer.push_str("~~");
                render_into(buffer, children, resolved);
                buffer.push_str("~~");
            }
            MessageElement::Code(children) => {
                buffer.push('`');
                render_into(buffer, children, resolved);
                buffer.push('`');
            }
            MessageElement::Paragraph(children) => {
                render_into(buffer, children, resolved);
                buffer.push_str("\n\n");
            }
            MessageElement::LineBreak => buffer.push('\n'),
            MessageElement::Quote(children) => {
                render_into(buffer, children, resolved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{collect_media_sources, needs_transform, render_markdown};
    use crate::message_element::{MediaKind, MessageElement};

    #[test]
    fn unit_needs_transform_passes_network_urls_through() {
        assert!(!needs_transform("https://example.test/a.png"));
        assert!(!needs_transform("http://example.test/a.png"));
        assert!(needs_transform("file:///tmp/a.png"));
        assert!(needs_transform("base64://aGk="));
        assert!(needs_transform("/tmp/a.png"));
    }

    #[test]
    fn unit_collect_media_sources_dedups_and_skips_network_urls() {
        let elements = vec![
            MessageElement::image("https://example.test/direct.png"),
            MessageElement::Paragraph(vec![
                MessageElement::image("/tmp/local.png"),
                MessageElement::image("/tmp/local.png"),
                MessageElement::Media {
                    kind: MediaKind::File,
                    src: "base64://aGk=".to_string(),
                },
            ]),
        ];
        let pending = collect_media_sources(&elements);
        assert_eq!(
            pending,
            vec![
                (MediaKind::Image, "/tmp/local.png".to_string()),
                (MediaKind::File, "base64://aGk=".to_string()),
            ]
        );
    }

    #[test]
    fn functional_render_markdown_handles_inline_styles() {
        let elements = vec![
            MessageElement::Bold(vec![MessageElement::text("hot")]),
            MessageElement::text(" "),
            MessageElement::Italic(vec![MessageElement::text("take")]),
            MessageElement::text(" "),
            MessageElement::Strikethrough(vec![MessageElement::text("cold")]),
            MessageElement::text(" "),
            MessageElement::Code(vec![MessageElement::text("let x = 1;")]),
            MessageElement::LineBreak,
            MessageElement::Mention {
                id: "octo".to_string(),
                name: None,
            },
            MessageElement::text(" "),
            MessageElement::ChannelLink {
                id: "42".to_string(),
                name: Some("general".to_string()),
            },
        ];
        let rendered = render_markdown(&elements, &HashMap::new());
        assert_eq!(rendered, "**hot** *take* ~~cold~~ `let x = 1;`\n@octo #general");
    }

    #[test]
    fn functional_render_markdown_substitutes_failure_markers() {
        let elements = vec![
            MessageElement::image("https://example.test/ok.png"),
            MessageElement::image("/tmp/missing.png"),
            MessageElement::Media {
                kind: MediaKind::Audio,
                src: "/tmp/clip.ogg".to_string(),
            },
        ];
        let mut resolved = HashMap::new();
        resolved.insert("/tmp/missing.png".to_string(), None);
        resolved.insert(
            "/tmp/clip.ogg".to_string(),
            Some("https://uploads.test/clip.ogg".to_string()),
        );
        let rendered = render_markdown(&elements, &resolved);
        assert_eq!(
            rendered,
            "![image](https://example.test/ok.png)[image upload failed][audio](https://uploads.test/clip.ogg)"
        );
    }

    #[test]
    fn unit_render_markdown_paragraph_and_quote_layout() {
        let elements = vec![
            MessageElement::Paragraph(vec![MessageElement::text("first")]),
            MessageElement::Quote(vec![MessageElement::text("quoted")]),
        ];
        let rendered = render_markdown(&elements, &HashMap::new());
        assert_eq!(rendered, "first\n\nquoted");
    }
}
