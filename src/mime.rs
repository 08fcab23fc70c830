//! Decoding of raw RFC 822 messages into mirror records

use chrono::{TimeZone, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GmailError, Result};
use crate::models::{EmailRecord, Mailbox, RawMessage, UNREAD_LABEL};

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]+>").unwrap());
static HTML_DROPPED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());

/// Decode a fetched message into the record stored in the mirror
pub fn decode_message(message: &RawMessage) -> Result<EmailRecord> {
    let parsed = mailparse::parse_mail(&message.raw).map_err(|e| {
        GmailError::InvalidMessageFormat(format!("{}: failed to parse MIME: {}", message.id, e))
    })?;
    let headers = parsed.headers.as_slice();

    let (from_email, from_name) = headers
        .get_first_value("From")
        .and_then(|v| parse_address(&v))
        .unwrap_or_default();
    let (to_email, to_name) = headers
        .get_first_value("To")
        .and_then(|v| parse_address(&v))
        .unwrap_or_default();
    let subject = headers.get_first_value("Subject").unwrap_or_default();

    let date = headers
        .get_first_value("Date")
        .and_then(|v| mailparse::dateparse(&v).ok())
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .or(message.internal_date)
        .ok_or_else(|| {
            GmailError::InvalidMessageFormat(format!("{}: message has no usable date", message.id))
        })?;

    Ok(EmailRecord {
        id: message.id.clone(),
        from_name,
        from_email,
        to_name,
        to_email,
        subject,
        date,
        mailbox: Mailbox::from_labels(&message.label_ids),
        read: !message.label_ids.iter().any(|l| l == UNREAD_LABEL),
        body: extract_body(&parsed),
    })
}

/// Split an address header into (address, display name)
fn parse_address(value: &str) -> Option<(String, Option<String>)> {
    let addresses = mailparse::addrparse(value).ok()?.into_inner();
    addresses.into_iter().find_map(|address| match address {
        MailAddr::Single(single) => Some((single.addr, single.display_name)),
        MailAddr::Group(group) => group
            .addrs
            .into_iter()
            .next()
            .map(|single| (single.addr, single.display_name)),
    })
}

/// Plain text parts win; otherwise HTML parts are reduced to text
fn extract_body(parsed: &ParsedMail<'_>) -> String {
    let mut plain = Vec::new();
    let mut html = Vec::new();
    collect_parts(parsed, &mut plain, &mut html);

    let body = if !plain.is_empty() {
        plain.join("\n")
    } else if !html.is_empty() {
        html_to_text(&html.join("\n"))
    } else {
        String::new()
    };

    body.replace("\r\n", "\n").trim().to_string()
}

fn collect_parts(part: &ParsedMail<'_>, plain: &mut Vec<String>, html: &mut Vec<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_parts(sub, plain, html);
        }
        return;
    }

    if matches!(
        part.get_content_disposition().disposition,
        DispositionType::Attachment
    ) {
        return;
    }

    let mime_type = part.ctype.mimetype.to_ascii_lowercase();
    let Ok(body) = part.get_body() else {
        return;
    };
    if body.trim().is_empty() {
        return;
    }

    if mime_type.starts_with("text/html") {
        html.push(body);
    } else if mime_type.starts_with("text/plain") {
        plain.push(body);
    }
}

/// Strip markup and collapse the remaining text, one visible run per line
pub fn html_to_text(html: &str) -> String {
    let without_blocks = HTML_DROPPED_BLOCK.replace_all(html, " ");
    let without_tags = HTML_TAG.replace_all(&without_blocks, "\n");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
