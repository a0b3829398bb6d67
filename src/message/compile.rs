//! Template-to-message compilation.
//!
//! Takes the rendered header+body text for one record and produces a
//! [`CompiledMessage`]: headers parsed and canonicalized, recipients
//! collected into the envelope, attachments resolved and loaded, content
//! type dispatched (plain/HTML/Markdown/opaque), and inline image
//! references rewritten to `cid:` URLs.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use lettre::message::Mailboxes;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use tracing::debug;

use crate::error::{MergeError, Result};

use super::{
    canonical_header_name, content_id, AttachmentPart, Body, CompiledMessage, Disposition,
    TextPart,
};

/// Compile rendered template text into a transport-ready message.
///
/// `template_dir` anchors relative attachment paths. `ordinal` is the
/// zero-based message number within the run; content-ids and multipart
/// boundaries derive from it so repeated compilation is reproducible.
pub fn compile(rendered: &str, template_dir: &Path, ordinal: usize) -> Result<CompiledMessage> {
    let normalized = rendered.replace("\r\n", "\n");
    let (header_block, body_text) = split_message(&normalized);
    let parsed = parse_header_block(header_block)?;

    require_header(&parsed, "to")?;
    require_header(&parsed, "subject")?;
    require_header(&parsed, "from")?;

    // Partition: recognized pseudo-headers are pulled out, the rest go to
    // the outgoing header set verbatim (names canonicalized).
    let mut content_type: Option<String> = None;
    let mut attachment_decls: Vec<String> = Vec::new();
    let mut recipient_values: Vec<String> = Vec::new();
    let mut from_value: Option<String> = None;
    let mut outgoing: Vec<(String, String)> = Vec::new();

    for (name, value) in &parsed {
        match name.to_ascii_lowercase().as_str() {
            "attachment" => attachment_decls.push(value.clone()),
            "content-type" => {
                if content_type.is_none() {
                    content_type = Some(value.clone());
                }
            }
            "bcc" => recipient_values.push(value.clone()),
            "to" | "cc" => {
                recipient_values.push(value.clone());
                outgoing.push((canonical_header_name(name), value.clone()));
            }
            "from" => {
                from_value = Some(value.clone());
                outgoing.push((canonical_header_name(name), value.clone()));
            }
            _ => outgoing.push((canonical_header_name(name), value.clone())),
        }
    }

    let sender = parse_sender(from_value.as_deref().unwrap_or_default())?;
    let recipients = parse_recipients(&recipient_values)?;

    let mut attachments = resolve_attachments(&attachment_decls, template_dir, ordinal)?;

    let main = match content_kind(content_type.as_deref()) {
        ContentKind::Plain => Body::simple(TextPart::plain(body_text)),
        ContentKind::Html => {
            let html_text = rewrite_inline_images(body_text, &mut attachments);
            Body::simple(TextPart::html(html_text))
        }
        ContentKind::Markdown => {
            let html_text = markdown_to_html(body_text);
            let html_text = rewrite_inline_images(&html_text, &mut attachments);
            Body::alternative(TextPart::plain(body_text), TextPart::html(html_text))
        }
        ContentKind::Opaque(declared) => Body::simple(TextPart::opaque(declared, body_text)),
    };

    let (inline, ordinary): (Vec<_>, Vec<_>) = attachments
        .into_iter()
        .partition(|a| a.disposition == Disposition::Inline);
    let body = main.with_inline(inline).with_attachments(ordinary);

    outgoing.push(("Date".to_string(), chrono::Utc::now().to_rfc2822()));

    debug!(ordinal, multipart = body.is_multipart(), "compiled message");

    Ok(CompiledMessage::new(
        ordinal, outgoing, sender, recipients, body,
    ))
}

/// Split at the first fully blank line: header block above, body below.
fn split_message(text: &str) -> (&str, &str) {
    match text.split_once("\n\n") {
        Some((headers, body)) => (headers, body),
        None => (text.trim_end_matches('\n'), ""),
    }
}

/// Parse the header block into ordered (name, value) pairs.
///
/// Continuation lines (leading whitespace) are unfolded into the previous
/// header's value. A non-continuation line without a colon is an error.
fn parse_header_block(block: &str) -> Result<Vec<(String, String)>> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            match headers.last_mut() {
                Some(last) => {
                    last.1.push(' ');
                    last.1.push_str(line.trim());
                }
                None => {
                    return Err(MergeError::HeaderParse(format!(
                        "continuation line with no preceding header: '{line}'"
                    )));
                }
            }
            continue;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(MergeError::HeaderParse(format!(
                "malformed header line: '{line}'"
            )));
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(MergeError::HeaderParse(format!(
                "invalid header name in line: '{line}'"
            )));
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(headers)
}

/// Error unless `name` is present with a non-empty value.
fn require_header(headers: &[(String, String)], name: &str) -> Result<()> {
    let present = headers
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case(name) && !v.trim().is_empty());
    if present {
        Ok(())
    } else {
        Err(MergeError::HeaderParse(format!(
            "missing required header: {}",
            name.to_uppercase()
        )))
    }
}

/// Extract the envelope sender from the rendered FROM value.
fn parse_sender(from_value: &str) -> Result<String> {
    parse_mailboxes(from_value)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            MergeError::HeaderParse(format!("FROM header has no address: '{from_value}'"))
        })
}

/// Collect envelope recipients from the rendered TO/CC/BCC values.
fn parse_recipients(values: &[String]) -> Result<Vec<String>> {
    let mut recipients = Vec::new();
    for value in values {
        recipients.extend(parse_mailboxes(value)?);
    }
    if recipients.is_empty() {
        return Err(MergeError::HeaderParse(
            "message has no recipients".to_string(),
        ));
    }
    Ok(recipients)
}

/// Parse an address-list header value into bare email addresses.
fn parse_mailboxes(value: &str) -> Result<Vec<String>> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mailboxes: Mailboxes = value
        .parse()
        .map_err(|e| MergeError::HeaderParse(format!("invalid address '{value}': {e}")))?;
    Ok(mailboxes
        .into_iter()
        .map(|mailbox| mailbox.email.to_string())
        .collect())
}

enum ContentKind<'a> {
    Plain,
    Html,
    Markdown,
    Opaque(&'a str),
}

/// Dispatch on the declared CONTENT-TYPE header value.
fn content_kind(declared: Option<&str>) -> ContentKind<'_> {
    let Some(declared) = declared else {
        return ContentKind::Plain;
    };
    let declared = declared.trim();
    let main_type = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match main_type.as_str() {
        "" | "text/plain" => ContentKind::Plain,
        "text/html" => ContentKind::Html,
        "text/markdown" => ContentKind::Markdown,
        _ => ContentKind::Opaque(declared),
    }
}

/// Resolve, verify, and load each declared attachment.
///
/// A declaration whose rendered value is empty or whitespace is a no-op:
/// a placeholder may legitimately render to nothing for some records.
fn resolve_attachments(
    decls: &[String],
    template_dir: &Path,
    message_ordinal: usize,
) -> Result<Vec<AttachmentPart>> {
    let mut attachments = Vec::new();

    for decl in decls {
        let declared = decl.trim();
        if declared.is_empty() {
            continue;
        }

        let path = resolve_attachment_path(declared, template_dir)?;
        let content = std::fs::read(&path).map_err(|e| MergeError::io(&path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| declared.to_string());
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        attachments.push(AttachmentPart {
            declared: declared.to_string(),
            path,
            filename,
            content_type,
            content_id: content_id(message_ordinal, attachments.len()),
            disposition: Disposition::Attachment,
            content,
        });
    }

    Ok(attachments)
}

/// Resolve one attachment path: tilde expansion, template-relative
/// anchoring, symlink following, regular-file check.
fn resolve_attachment_path(declared: &str, template_dir: &Path) -> Result<PathBuf> {
    let expanded = expand_tilde(declared);
    let anchored = if expanded.is_absolute() {
        expanded
    } else {
        template_dir.join(expanded)
    };

    let resolved = std::fs::canonicalize(&anchored)
        .map_err(|_| MergeError::AttachmentNotFound(anchored.clone()))?;

    let metadata =
        std::fs::metadata(&resolved).map_err(|_| MergeError::AttachmentNotFound(anchored.clone()))?;
    if !metadata.is_file() {
        return Err(MergeError::AttachmentNotFound(anchored));
    }

    Ok(resolved)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Convert a Markdown body to an HTML document.
fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    format!("<html><body>{rendered}</body></html>")
}

/// Rewrite `<img src="...">` references that name a declared attachment to
/// `cid:` URLs, and mark the matched attachments inline.
///
/// Matching is by exact string comparison of the `src` text against each
/// attachment's declared path or basename; when two attachments would
/// claim the same reference, the first-declared one wins.
fn rewrite_inline_images(html_text: &str, attachments: &mut [AttachmentPart]) -> String {
    if attachments.is_empty() {
        return html_text.to_string();
    }

    // First-declared-wins: later duplicates never overwrite an entry.
    let mut by_reference: Vec<(&str, usize)> = Vec::new();
    for (idx, att) in attachments.iter().enumerate() {
        for key in [att.declared.as_str(), att.filename.as_str()] {
            if !by_reference.iter().any(|(k, _)| *k == key) {
                by_reference.push((key, idx));
            }
        }
    }

    let matched: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    let img_src =
        Regex::new(r#"(?i)(<img[^>]*?src\s*=\s*["'])([^"']*)(["'])"#).expect("valid regex");

    let rewritten = img_src.replace_all(html_text, |caps: &regex::Captures<'_>| {
        let src = &caps[2];
        match by_reference.iter().find(|(k, _)| *k == src) {
            Some((_, idx)) => {
                matched.borrow_mut().push(*idx);
                format!("{}cid:{}{}", &caps[1], attachments[*idx].content_id, &caps[3])
            }
            None => caps[0].to_string(),
        }
    });
    let rewritten = rewritten.into_owned();

    for idx in matched.into_inner() {
        attachments[idx].disposition = Disposition::Inline;
    }

    rewritten
}
