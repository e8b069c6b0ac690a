//! Stream-connect markup handed to Twilio for incoming and outgoing calls.

use anyhow::{Context, Result};
use reqwest::Url;

/// Builds the `wss://` URL Twilio should stream call media to.
pub fn media_stream_url(server_url: &str, agent_id: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("wss://{}/media-stream", server_url))
        .with_context(|| format!("`{}` is not a usable host", server_url))?;
    url.query_pairs_mut().append_pair("agentId", agent_id);
    Ok(url)
}

/// Renders the `<Connect><Stream>` document for one agent.
pub fn stream_connect(server_url: &str, agent_id: &str) -> Result<String> {
    let url = media_stream_url(server_url, agent_id)?;
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="{}" />
  </Connect>
</Response>"#,
        escape_attribute(url.as_str())
    ))
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_connect_document() {
        let twiml = stream_connect("relay.example.com", "agent_123").unwrap();
        assert!(twiml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(twiml.contains(
            r#"<Stream url="wss://relay.example.com/media-stream?agentId=agent_123" />"#
        ));
        assert!(twiml.contains("<Connect>"));
    }

    #[test]
    fn test_agent_id_is_encoded_and_escaped() {
        let twiml = stream_connect("relay.example.com", "a&b \"c\"").unwrap();
        assert!(twiml.contains("agentId=a%26b+%22c%22"));
        assert!(!twiml.contains("a&b"));
    }

    #[test]
    fn test_media_stream_url_keeps_port() {
        let url = media_stream_url("localhost:3000", "x").unwrap();
        assert_eq!(url.as_str(), "wss://localhost:3000/media-stream?agentId=x");
    }

    #[test]
    fn test_escape_attribute() {
        assert_eq!(escape_attribute("a&b<c>'d'"), "a&amp;b&lt;c&gt;&apos;d&apos;");
    }
}
