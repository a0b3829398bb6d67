//! RFC 5322 wire serialization.
//!
//! Produces the transport form of a [`CompiledMessage`] with CRLF line
//! endings. Multipart boundaries are derived from the message ordinal, so
//! serializing the same compiled message is byte-for-byte reproducible.
//! ASCII text travels as 7bit, everything else as base64-encoded UTF-8;
//! attachments are always base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::{AttachmentPart, Body, Charset, CompiledMessage, Disposition, TextPart};

const BASE64_LINE_WIDTH: usize = 76;

/// Serialize a compiled message to wire form.
pub(super) fn serialize(message: &CompiledMessage) -> String {
    let mut out = String::new();

    for (name, value) in message.headers() {
        push_header(&mut out, name, value);
    }
    push_header(&mut out, "MIME-Version", "1.0");

    write_body(&mut out, message.body(), message.ordinal());
    out
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Write a body's own headers, a blank separator line, and its content.
fn write_body(out: &mut String, body: &Body, ordinal: usize) {
    match body {
        Body::Simple(part) => write_text_part(out, part),
        Body::Alternative { plain, html } => {
            let boundary = boundary(ordinal, "alt");
            push_header(
                out,
                "Content-Type",
                &format!("multipart/alternative; boundary=\"{boundary}\""),
            );
            out.push_str("\r\n");
            open_part(out, &boundary);
            write_text_part(out, plain);
            open_part(out, &boundary);
            write_text_part(out, html);
            close_multipart(out, &boundary);
        }
        Body::Related { main, inline } => {
            let boundary = boundary(ordinal, "rel");
            push_header(
                out,
                "Content-Type",
                &format!("multipart/related; boundary=\"{boundary}\""),
            );
            out.push_str("\r\n");
            open_part(out, &boundary);
            write_body(out, main, ordinal);
            for attachment in inline {
                open_part(out, &boundary);
                write_attachment_part(out, attachment);
            }
            close_multipart(out, &boundary);
        }
        Body::Mixed { main, attachments } => {
            let boundary = boundary(ordinal, "mix");
            push_header(
                out,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{boundary}\""),
            );
            out.push_str("\r\n");
            open_part(out, &boundary);
            write_body(out, main, ordinal);
            for attachment in attachments {
                open_part(out, &boundary);
                write_attachment_part(out, attachment);
            }
            close_multipart(out, &boundary);
        }
    }
}

/// Deterministic boundary for one nesting level of one message.
fn boundary(ordinal: usize, kind: &str) -> String {
    format!("=_mergemail_{ordinal}_{kind}")
}

fn open_part(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("\r\n");
}

fn close_multipart(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("--\r\n");
}

fn write_text_part(out: &mut String, part: &TextPart) {
    let is_standard_text =
        part.content_type == "text/plain" || part.content_type == "text/html";

    if is_standard_text {
        push_header(
            out,
            "Content-Type",
            &format!("{}; charset=\"{}\"", part.content_type, part.charset.label()),
        );
    } else {
        // Opaque passthrough: the declared type goes out verbatim.
        push_header(out, "Content-Type", &part.content_type);
    }

    match part.charset {
        Charset::UsAscii => {
            push_header(out, "Content-Transfer-Encoding", "7bit");
            out.push_str("\r\n");
            push_text_crlf(out, &part.content);
        }
        Charset::Utf8 => {
            push_header(out, "Content-Transfer-Encoding", "base64");
            out.push_str("\r\n");
            push_base64(out, part.content.as_bytes());
        }
    }
}

fn write_attachment_part(out: &mut String, attachment: &AttachmentPart) {
    push_header(
        out,
        "Content-Type",
        &format!("{}; name=\"{}\"", attachment.content_type, attachment.filename),
    );
    push_header(out, "Content-Transfer-Encoding", "base64");
    let disposition = match attachment.disposition {
        Disposition::Inline => "inline",
        Disposition::Attachment => "attachment",
    };
    push_header(
        out,
        "Content-Disposition",
        &format!("{disposition}; filename=\"{}\"", attachment.filename),
    );
    push_header(out, "Content-Id", &format!("<{}>", attachment.content_id));
    out.push_str("\r\n");
    push_base64(out, &attachment.content);
}

/// Append text content, normalizing line endings to CRLF.
fn push_text_crlf(out: &mut String, text: &str) {
    for line in text.split('\n') {
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
        out.push_str("\r\n");
    }
}

/// Append base64-encoded content wrapped at the RFC 2045 line width.
fn push_base64(out: &mut String, bytes: &[u8]) {
    let encoded = BASE64.encode(bytes);
    let mut start = 0;
    while start < encoded.len() {
        let end = (start + BASE64_LINE_WIDTH).min(encoded.len());
        out.push_str(&encoded[start..end]);
        out.push_str("\r\n");
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::compile;
    use std::path::Path;

    fn compile_text(text: &str) -> CompiledMessage {
        compile(text, Path::new("."), 0).unwrap()
    }

    #[test]
    fn test_single_part_has_no_multipart_wrapper() {
        let wire = compile_text("TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\n\nHello X.").to_wire();
        assert!(!wire.contains("multipart"));
        assert!(wire.contains("Content-Type: text/plain; charset=\"us-ascii\""));
        assert!(wire.contains("Content-Transfer-Encoding: 7bit"));
        assert!(wire.contains("Hello X."));
        assert!(wire.contains("To: x@y.com\r\n"));
        assert!(wire.contains("MIME-Version: 1.0\r\n"));
    }

    #[test]
    fn test_unicode_body_is_base64_utf8() {
        let wire =
            compile_text("TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\n\nLaȝamon æðelen").to_wire();
        assert!(wire.contains("charset=\"utf-8\""));
        assert!(wire.contains("Content-Transfer-Encoding: base64"));
        let encoded = BASE64.encode("Laȝamon æðelen".as_bytes());
        assert!(
            wire.contains(&encoded),
            "expected base64 body in wire:\n{wire}"
        );
    }

    #[test]
    fn test_markdown_alternative_structure() {
        let wire = compile_text(
            "TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\nCONTENT-TYPE: text/markdown\n\n# Hi",
        )
        .to_wire();
        assert!(wire.contains("multipart/alternative"));
        let plain_at = wire.find("text/plain").expect("plain part");
        let html_at = wire.find("text/html").expect("html part");
        assert!(plain_at < html_at, "plain part must precede html part");
        assert!(wire.contains("--=_mergemail_0_alt--\r\n"));
    }

    #[test]
    fn test_attachment_wire_form() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), [0u8, 159, 146, 150]).unwrap();
        let msg = compile(
            "TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\nATTACHMENT: data.bin\n\nbody",
            dir.path(),
            0,
        )
        .unwrap();
        let wire = msg.to_wire();

        assert!(wire.contains("multipart/mixed"));
        assert!(wire.contains("Content-Disposition: attachment; filename=\"data.bin\""));
        assert!(wire.contains("Content-Id: <msg0.att0@mergemail.invalid>"));
        assert!(wire.contains(&BASE64.encode([0u8, 159, 146, 150])));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let msg = compile_text("TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\n\nHello X.");
        assert_eq!(msg.to_wire(), msg.to_wire());
    }

    #[test]
    fn test_base64_wrapped_at_76_columns() {
        let mut out = String::new();
        push_base64(&mut out, &[b'x'; 200]);
        for line in out.lines() {
            assert!(line.len() <= 76, "line too long: {}", line.len());
        }
    }

    #[test]
    fn test_crlf_normalization() {
        let wire = compile_text("TO: x@y.com\nSUBJECT: Hi\nFROM: a@b.com\n\nline1\nline2").to_wire();
        assert!(wire.contains("line1\r\nline2\r\n"));
        assert!(!wire.contains("line1\nline2"));
    }
}
