//! Plain-text body extraction from Gmail message resources

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use super::patterns::Patterns;
use crate::error::{Error, Result};
use crate::models::{MessagePart, RawEmailMessage};

/// Get the searchable plain text of a message
///
/// Prefers the provider snippet; otherwise walks the MIME tree for a
/// `text/plain` part, then a `text/html` part (tag-stripped). Whitespace runs
/// are collapsed to single spaces.
pub fn plain_text(message: &RawEmailMessage) -> Result<String> {
    if let Some(snippet) = message.snippet.as_deref() {
        let snippet = collapse_whitespace(&decode_entities(snippet));
        if !snippet.is_empty() {
            return Ok(snippet);
        }
    }

    if let Some(part) = find_part(&message.payload, "text/plain") {
        return Ok(collapse_whitespace(&decode_part(part)?));
    }

    if let Some(part) = find_part(&message.payload, "text/html") {
        return Ok(collapse_whitespace(&strip_html(&decode_part(part)?)));
    }

    // Single-part message without a declared type
    if message.payload.parts.is_empty() && message.payload.body.data.is_some() {
        return Ok(collapse_whitespace(&decode_part(&message.payload)?));
    }

    Ok(String::new())
}

/// Depth-first search for the first part with the given MIME type and a body
fn find_part<'a>(part: &'a MessagePart, mime_type: &str) -> Option<&'a MessagePart> {
    if part.mime_type.eq_ignore_ascii_case(mime_type) && part.body.data.is_some() {
        return Some(part);
    }
    part.parts.iter().find_map(|p| find_part(p, mime_type))
}

/// Decode a part's transfer-encoded payload into text
fn decode_part(part: &MessagePart) -> Result<String> {
    let Some(data) = part.body.data.as_deref() else {
        return Ok(String::new());
    };

    let bytes = decode_base64url(data)?;

    let quoted_printable = part
        .header("Content-Transfer-Encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("quoted-printable"));

    let bytes = if quoted_printable {
        decode_quoted_printable(&bytes)
    } else {
        bytes
    };

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode Gmail's base64url payloads, tolerating padding and standard alphabet
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let unpadded = cleaned.trim_end_matches('=');

    URL_SAFE_NO_PAD
        .decode(unpadded)
        .or_else(|_| STANDARD.decode(&cleaned))
        .map_err(|e| Error::Decode(format!("Invalid base64 message body: {}", e)))
}

/// Decode quoted-printable bytes (RFC 2045), leaving malformed escapes as-is
fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if input[i] != b'=' {
            out.push(input[i]);
            i += 1;
            continue;
        }

        // Soft line breaks
        if input.get(i + 1) == Some(&b'\r') && input.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if input.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }

        let hex = input
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());

        match hex {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    out
}

/// Strip HTML down to its visible text
pub fn strip_html(html: &str) -> String {
    let p = Patterns::get();
    let text = p.script_style.replace_all(html, " ");
    let text = p.block_break.replace_all(&text, " ");
    let text = p.html_tag.replace_all(&text, " ");
    decode_entities(&text)
}

/// Decode the HTML entities that show up in bank emails and Gmail snippets
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let named = text
        .replace("&nbsp;", " ")
        .replace("&rupee;", "₹")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    let numeric = Patterns::get()
        .numeric_entity
        .replace_all(&named, |caps: &regex::Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                _ => None,
            };
            code.and_then(char::from_u32)
                .map(|c| c.to_string())
                .unwrap_or_default()
        });

    // &amp; last so that "&amp;lt;" stays a literal "&lt;"
    numeric.replace("&amp;", "&")
}

/// Collapse all whitespace runs to single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Header, MessageBody};

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    fn leaf(mime: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime.to_string(),
            headers: vec![],
            body: MessageBody {
                size: text.len() as u64,
                data: Some(encode(text)),
            },
            parts: vec![],
        }
    }

    fn message(payload: MessagePart, snippet: Option<&str>) -> RawEmailMessage {
        RawEmailMessage {
            id: "m1".to_string(),
            thread_id: None,
            snippet: snippet.map(String::from),
            internal_date: None,
            payload,
        }
    }

    #[test]
    fn test_snippet_preferred() {
        let msg = message(
            leaf("text/plain", "body text"),
            Some("Rs.500 debited &amp; paid   to  Zomato"),
        );
        assert_eq!(plain_text(&msg).unwrap(), "Rs.500 debited & paid to Zomato");
    }

    #[test]
    fn test_plain_part_preferred_over_html() {
        let payload = MessagePart {
            mime_type: "multipart/alternative".to_string(),
            parts: vec![
                leaf("text/html", "<p>html version</p>"),
                leaf("text/plain", "plain\n\nversion"),
            ],
            ..Default::default()
        };
        let msg = message(payload, None);
        assert_eq!(plain_text(&msg).unwrap(), "plain version");
    }

    #[test]
    fn test_html_fallback_is_stripped() {
        let html = r#"<html><head><style>p { color: red; }</style></head>
            <body><p>Amount:&nbsp;&#8377;1,250.00</p><br/><div>Paid to <b>Swiggy</b></div>
            <script>var x = 1;</script></body></html>"#;
        let payload = MessagePart {
            mime_type: "multipart/mixed".to_string(),
            parts: vec![MessagePart {
                mime_type: "multipart/alternative".to_string(),
                parts: vec![leaf("text/html", html)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let msg = message(payload, None);
        assert_eq!(
            plain_text(&msg).unwrap(),
            "Amount: ₹1,250.00 Paid to Swiggy"
        );
    }

    #[test]
    fn test_quoted_printable_part() {
        let mut part = leaf("text/plain", "Rs.=3D1,000 debited=\r\n from your account");
        part.headers.push(Header {
            name: "Content-Transfer-Encoding".to_string(),
            value: "quoted-printable".to_string(),
        });
        let msg = message(part, None);
        assert_eq!(
            plain_text(&msg).unwrap(),
            "Rs.=1,000 debited from your account"
        );
    }

    #[test]
    fn test_base64url_variants() {
        // '?' and '>' exercise the URL-safe alphabet
        let text = "a?b>c";
        let padded = base64::engine::general_purpose::URL_SAFE.encode(text);
        assert_eq!(decode_base64url(&padded).unwrap(), text.as_bytes());
        assert_eq!(decode_base64url(&encode(text)).unwrap(), text.as_bytes());
        let standard = STANDARD.encode(text);
        assert_eq!(decode_base64url(&standard).unwrap(), text.as_bytes());
        assert!(decode_base64url("!!!not base64!!!").is_err());
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("A &amp;lt; B"), "A &lt; B");
        assert_eq!(decode_entities("&#x20B9;99 &rupee;1"), "₹99 ₹1");
        assert_eq!(decode_entities("it&#39;s"), "it's");
    }

    #[test]
    fn test_empty_message() {
        let msg = message(MessagePart::default(), None);
        assert_eq!(plain_text(&msg).unwrap(), "");
    }
}
