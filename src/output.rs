//! Console preview formatting.
//!
//! The orchestrator prints every compiled message's wire text between
//! `>>> message N` banners. `colorized` styles the banners and header
//! block, `text` prints the same content unstyled, `raw` emits the wire
//! form untouched (CRLF line endings preserved).

use clap::ValueEnum;
use crossterm::style::Stylize;

/// Console output format for message previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Styled banners and headers.
    Colorized,
    /// Plain text, LF line endings.
    Text,
    /// Wire form exactly as transmitted.
    Raw,
}

/// Print a `>>> ...` banner line.
pub fn print_banner(text: &str, format: OutputFormat) {
    match format {
        OutputFormat::Colorized => println!("{}", text.bold().white().on_cyan()),
        OutputFormat::Text | OutputFormat::Raw => println!("{text}"),
    }
}

/// Print one message preview.
pub fn print_message(wire: &str, format: OutputFormat) {
    match format {
        OutputFormat::Raw => print!("{wire}"),
        OutputFormat::Text => print!("{}", wire.replace("\r\n", "\n")),
        OutputFormat::Colorized => {
            let text = wire.replace("\r\n", "\n");
            let mut in_headers = true;
            for line in text.split_inclusive('\n') {
                if in_headers && line.trim_end_matches('\n').is_empty() {
                    in_headers = false;
                }
                if in_headers {
                    print!("{}", line.to_string().dark_cyan());
                } else {
                    print!("{line}");
                }
            }
        }
    }
}
