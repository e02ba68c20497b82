//! Rich inline content tree for outbound replies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Attachment category of a media element.
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

impl MediaKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    /// Literal marker substituted when an asset cannot be re-hosted. The
    /// element is never dropped silently.
    pub fn failure_marker(&self) -> &'static str {
        match self {
            Self::Image => "[image upload failed]",
            Self::Audio => "[audio upload failed]",
            Self::Video => "[video upload failed]",
            Self::File => "[file upload failed]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// One node of an outbound reply. Emphasis and structural variants nest.
pub enum MessageElement {
    Text { content: String },
    Mention { id: String, name: Option<String> },
    ChannelLink { id: String, name: Option<String> },
    Link { href: String },
    Media { kind: MediaKind, src: String },
    Bold(Vec<MessageElement>),
    Italic(Vec<MessageElement>),
    Strikethrough(Vec<MessageElement>),
    Code(Vec<MessageElement>),
    Paragraph(Vec<MessageElement>),
    LineBreak,
    Quote(Vec<MessageElement>),
}

impl MessageElement {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(src: impl Into<String>) -> Self {
        Self::Media {
            kind: MediaKind::Image,
            src: src.into(),
        }
    }
}
