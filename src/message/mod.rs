//! Compiled message model.
//!
//! A [`CompiledMessage`] is the transport-ready form of one rendered email:
//! an ordered outgoing header list, an envelope (sender plus recipients
//! collected from TO/CC/BCC), and a body structure. The body is a tagged
//! variant built bottom-up by pure constructors -- the nesting rules are
//! testable without touching the wire serializer.

mod compile;
mod wire;

pub use compile::compile;

use std::path::PathBuf;

/// Character set of a text part, detected by scanning the part's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Pure ASCII; sent with a legacy-safe 7bit transfer encoding.
    UsAscii,
    /// Anything else; sent as UTF-8 with base64 transfer encoding.
    Utf8,
}

impl Charset {
    /// Detect whether `text` is representable as us-ascii.
    pub fn detect(text: &str) -> Self {
        if text.is_ascii() {
            Self::UsAscii
        } else {
            Self::Utf8
        }
    }

    /// The MIME charset label.
    pub fn label(self) -> &'static str {
        match self {
            Self::UsAscii => "us-ascii",
            Self::Utf8 => "utf-8",
        }
    }
}

/// One text payload (plain, HTML, or an opaque passthrough type).
#[derive(Debug, Clone)]
pub struct TextPart {
    /// MIME type, e.g. `text/plain`.
    pub content_type: String,
    /// Detected character set.
    pub charset: Charset,
    /// The text content.
    pub content: String,
}

impl TextPart {
    /// A `text/plain` part.
    pub fn plain(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            content_type: "text/plain".to_string(),
            charset: Charset::detect(&content),
            content,
        }
    }

    /// A `text/html` part.
    pub fn html(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            content_type: "text/html".to_string(),
            charset: Charset::detect(&content),
            content,
        }
    }

    /// An opaque part with a caller-declared content type, passed through
    /// with no post-processing.
    pub fn opaque(content_type: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            content_type: content_type.into(),
            charset: Charset::detect(&content),
            content,
        }
    }
}

/// How an attachment part is presented to the mail reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Referenced from the HTML body via its content-id.
    Inline,
    /// An ordinary downloadable attachment.
    Attachment,
}

/// A resolved, loaded attachment.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    /// The raw `ATTACHMENT:` header text, kept for inline-image matching.
    pub declared: String,
    /// Resolved absolute path on disk.
    pub path: PathBuf,
    /// Basename used in `name=`/`filename=` parameters.
    pub filename: String,
    /// MIME type guessed from the file extension.
    pub content_type: String,
    /// Unique content-id within the message.
    pub content_id: String,
    /// Inline vs ordinary attachment.
    pub disposition: Disposition,
    /// File bytes, read at compile time.
    pub content: Vec<u8>,
}

/// The body structure of a compiled message.
///
/// Constructed bottom-up: start from [`Body::simple`] or
/// [`Body::alternative`], then apply [`Body::with_inline`] and
/// [`Body::with_attachments`]. Each wrapper is only added when its part
/// list is non-empty, so the common single-part case stays a single part.
#[derive(Debug, Clone)]
pub enum Body {
    /// One text part, headers attached directly, no multipart wrapper.
    Simple(TextPart),
    /// `multipart/alternative`: plain and HTML renditions of one content.
    Alternative { plain: TextPart, html: TextPart },
    /// `multipart/related`: a main part plus the inline images it references.
    Related {
        main: Box<Body>,
        inline: Vec<AttachmentPart>,
    },
    /// `multipart/mixed`: a main part plus ordinary attachments.
    Mixed {
        main: Box<Body>,
        attachments: Vec<AttachmentPart>,
    },
}

impl Body {
    /// A single-part body.
    pub fn simple(part: TextPart) -> Self {
        Self::Simple(part)
    }

    /// A two-part alternative (plain first, HTML last, per RFC 2046 order
    /// of increasing faithfulness).
    pub fn alternative(plain: TextPart, html: TextPart) -> Self {
        Self::Alternative { plain, html }
    }

    /// Wrap in `multipart/related` when inline parts exist.
    pub fn with_inline(self, inline: Vec<AttachmentPart>) -> Self {
        if inline.is_empty() {
            self
        } else {
            Self::Related {
                main: Box::new(self),
                inline,
            }
        }
    }

    /// Wrap in `multipart/mixed` when ordinary attachments exist.
    pub fn with_attachments(self, attachments: Vec<AttachmentPart>) -> Self {
        if attachments.is_empty() {
            self
        } else {
            Self::Mixed {
                main: Box::new(self),
                attachments,
            }
        }
    }

    /// Whether serialization produces a multipart container.
    pub fn is_multipart(&self) -> bool {
        !matches!(self, Self::Simple(_))
    }

    /// All attachment parts in the body, in declaration order.
    pub fn attachment_parts(&self) -> Vec<&AttachmentPart> {
        match self {
            Self::Simple(_) | Self::Alternative { .. } => Vec::new(),
            Self::Related { main, inline } => {
                let mut parts = main.attachment_parts();
                parts.extend(inline.iter());
                parts
            }
            Self::Mixed { main, attachments } => {
                let mut parts = main.attachment_parts();
                parts.extend(attachments.iter());
                parts
            }
        }
    }
}

/// The transport-ready form of one rendered email.
#[derive(Debug, Clone)]
pub struct CompiledMessage {
    ordinal: usize,
    headers: Vec<(String, String)>,
    sender: String,
    recipients: Vec<String>,
    body: Body,
}

impl CompiledMessage {
    pub(crate) fn new(
        ordinal: usize,
        headers: Vec<(String, String)>,
        sender: String,
        recipients: Vec<String>,
        body: Body,
    ) -> Self {
        Self {
            ordinal,
            headers,
            sender,
            recipients,
            body,
        }
    }

    /// Zero-based position of this message within the run.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Outgoing headers in declaration order (canonical name casing,
    /// values verbatim; `Bcc` already removed).
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Envelope sender address.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Envelope recipient addresses (TO + CC + BCC).
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// The body structure.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Serialize to RFC 5322 wire form (CRLF line endings).
    ///
    /// Used both for SMTP submission and for dry-run printing.
    pub fn to_wire(&self) -> String {
        wire::serialize(self)
    }
}

/// Canonical transport casing for a header name: each hyphen-separated
/// token is capitalized (`content-type` -> `Content-Type`).
pub(crate) fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|token| {
            let mut chars = token.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Content-id for an attachment, derived from (message ordinal, attachment
/// ordinal) so repeated compilation of the same inputs is reproducible.
pub(crate) fn content_id(message_ordinal: usize, attachment_ordinal: usize) -> String {
    format!("msg{message_ordinal}.att{attachment_ordinal}@mergemail.invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(name: &str) -> AttachmentPart {
        AttachmentPart {
            declared: name.to_string(),
            path: PathBuf::from(name),
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            content_id: content_id(0, 0),
            disposition: Disposition::Attachment,
            content: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_charset_detection() {
        assert_eq!(Charset::detect("plain ascii"), Charset::UsAscii);
        assert_eq!(Charset::detect("Laȝamon"), Charset::Utf8);
        assert_eq!(Charset::UsAscii.label(), "us-ascii");
        assert_eq!(Charset::Utf8.label(), "utf-8");
    }

    #[test]
    fn test_empty_wrappers_are_noops() {
        let body = Body::simple(TextPart::plain("hi"))
            .with_inline(Vec::new())
            .with_attachments(Vec::new());
        assert!(!body.is_multipart());
    }

    #[test]
    fn test_minimal_nesting_for_attachments() {
        let body = Body::simple(TextPart::plain("hi")).with_attachments(vec![att("a.pdf")]);
        match body {
            Body::Mixed { main, attachments } => {
                assert!(matches!(*main, Body::Simple(_)));
                assert_eq!(attachments.len(), 1);
            }
            other => panic!("expected Mixed, got {other:?}"),
        }
    }

    #[test]
    fn test_alternative_inside_related_inside_mixed() {
        let body = Body::alternative(TextPart::plain("hi"), TextPart::html("<p>hi</p>"))
            .with_inline(vec![att("logo.png")])
            .with_attachments(vec![att("report.pdf")]);
        match body {
            Body::Mixed { main, .. } => match *main {
                Body::Related { main, .. } => {
                    assert!(matches!(*main, Body::Alternative { .. }));
                }
                other => panic!("expected Related, got {other:?}"),
            },
            other => panic!("expected Mixed, got {other:?}"),
        }
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("TO"), "To");
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-custom-header"), "X-Custom-Header");
        assert_eq!(canonical_header_name("Reply-TO"), "Reply-To");
    }

    #[test]
    fn test_content_id_is_deterministic() {
        assert_eq!(content_id(3, 1), content_id(3, 1));
        assert_ne!(content_id(3, 1), content_id(3, 2));
        assert_ne!(content_id(3, 1), content_id(4, 1));
    }
}
