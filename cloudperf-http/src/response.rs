//! Response body helpers

use futures::StreamExt;
use reqwest::Response;

/// Longest body excerpt carried in error messages
const MAX_SNIPPET_CHARS: usize = 512;

/// Read at most a short excerpt of a failed response body for error messages
pub async fn body_snippet(response: Response) -> String {
    match response.text().await {
        Ok(text) => {
            let text = text.trim();
            if text.chars().count() > MAX_SNIPPET_CHARS {
                let truncated: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
                format!("{}...", truncated)
            } else {
                text.to_string()
            }
        }
        Err(e) => format!("<unreadable body: {}>", e),
    }
}

/// Read a response body to the end and discard it, returning the byte count
pub async fn drain_body(response: Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total = 0u64;

    while let Some(chunk) = stream.next().await {
        total += chunk?.len() as u64;
    }

    Ok(total)
}
