// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Job normalization: turns an accepted submission into a canonical PrintJob.
//
// The normalizer validates bounds and applies the few format-specific
// transformations the agent owns.  It never parses printer command syntax —
// raw ESC/POS streams pass through untouched (that is a device concern).
// The ZPL field sanitisation is a required security property: it prevents
// command injection into the label stream via substituted free text.

use printflow_core::error::{AgentError, Result};
use printflow_core::types::{JobFormat, JobOrigin, PrintJob};

/// ESC/POS full-cut sequence (GS V B 0), appended to graphic_cut payloads.
/// Matches the cut command the ERP frontend emits in raw mode.
pub const PAPER_CUT: &[u8] = b"\x1d\x56\x42\x00";

/// Maximum length of a ZPL `^FD` field after sanitisation, in characters.
/// Mirrors the ERP label controller's truncation rule.
pub const MAX_LABEL_FIELD_CHARS: usize = 35;

/// An incoming job submission, decoded from the wire but not yet validated.
#[derive(Debug, Clone)]
pub struct Submission {
    pub printer: String,
    pub format: JobFormat,
    pub payload: Vec<u8>,
    pub copies: u32,
    pub origin: JobOrigin,
}

pub struct Normalizer {
    max_payload: usize,
}

impl Normalizer {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }

    /// Validate a submission and produce the canonical job payload.
    pub fn normalize(&self, sub: Submission) -> Result<PrintJob> {
        if sub.payload.is_empty() {
            return Err(AgentError::InvalidSubmission("empty payload".into()));
        }
        if sub.copies == 0 {
            return Err(AgentError::InvalidSubmission(
                "copies must be a positive integer".into(),
            ));
        }
        if sub.payload.len() > self.max_payload {
            return Err(AgentError::PayloadTooLarge {
                size: sub.payload.len(),
                limit: self.max_payload,
            });
        }

        let payload = match sub.format {
            // Pre-rendered image, raw command stream, and PDF pass through.
            JobFormat::Graphic | JobFormat::Raw | JobFormat::Pdf => sub.payload,
            JobFormat::GraphicCut => {
                let mut payload = sub.payload;
                payload.extend_from_slice(PAPER_CUT);
                payload
            }
            JobFormat::Zpl => {
                let text = std::str::from_utf8(&sub.payload).map_err(|_| {
                    AgentError::InvalidSubmission("zpl payload is not valid UTF-8".into())
                })?;
                sanitize_zpl(text).into_bytes()
            }
        };

        Ok(PrintJob::new(
            sub.printer,
            sub.format,
            payload,
            sub.copies,
            sub.origin,
        ))
    }
}

/// Sanitise one ZPL field-data value: `_` becomes a space, the `^` and `~`
/// command introducers are stripped, and the result is truncated to
/// [`MAX_LABEL_FIELD_CHARS`] characters.
pub fn sanitize_label_text(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '^' | '~' => None,
            '_' => Some(' '),
            other => Some(other),
        })
        .take(MAX_LABEL_FIELD_CHARS)
        .collect()
}

/// Sanitise every `^FD…^FS` field in a ZPL stream, leaving the surrounding
/// commands untouched.  The agent cannot tell templated fields from static
/// ones, so all field data gets the treatment.
///
/// Per ZPL grammar the first `^FS` always terminates a field, so a literal
/// `^FS` inside substituted text ends that field and whatever follows is
/// treated as commands again.  Free text must therefore be cleaned before it
/// is templated into a label (the ERP does this); this pass is a per-field
/// second line of defence, not a substitute for that rule.
pub fn sanitize_zpl(zpl: &str) -> String {
    let mut out = String::with_capacity(zpl.len());
    let mut rest = zpl;
    while let Some(start) = rest.find("^FD") {
        let (head, tail) = rest.split_at(start + 3);
        out.push_str(head);
        match tail.find("^FS") {
            Some(end) => {
                let (field, after) = tail.split_at(end);
                out.push_str(&sanitize_label_text(field));
                out.push_str("^FS");
                rest = &after[3..];
            }
            None => {
                // Unterminated field — sanitise the remainder.
                out.push_str(&sanitize_label_text(tail));
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
