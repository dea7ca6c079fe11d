use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::core::models::Link;

/// Extract ticket/dashboard references from raw thread text.
///
/// We intentionally support:
/// - raw URLs like `https://example.com/foo`
/// - Slack link markup like `<https://example.com|label>` or `<https://example.com>`
///
/// Output is deduplicated by URL, first-seen order preserved, and each URL is
/// paired with a display label derived from its shape (Jira ticket, Zendesk
/// ticket, Datadog view, or the host name for anything else). Pure function:
/// no network calls, no side effects, idempotent.
#[must_use]
pub fn extract_links(text: &str) -> Vec<Link> {
    static SLACK_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<(https?://[^>|\s]+)(?:\|[^>]*)?>").unwrap_or_else(|_| {
            // Extremely defensive: in practice this cannot fail.
            Regex::new(r"$^").expect("fallback regex compiles")
        })
    });

    static RAW_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"https?://[^\s<>()\[\]{}"']+"#)
            .unwrap_or_else(|_| Regex::new(r"$^").expect("fallback regex compiles"))
    });

    let mut raw: Vec<String> = Vec::new();

    for caps in SLACK_LINK_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            raw.push(trim_trailing_punctuation(m.as_str()).to_string());
        }
    }

    for m in RAW_URL_RE.find_iter(text) {
        raw.push(trim_trailing_punctuation(m.as_str()).to_string());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Link> = Vec::new();

    for candidate in raw {
        if let Some(url) = normalize(&candidate) {
            let rendered = url.to_string();
            let rendered = rendered.trim_end_matches('/').to_string();
            if seen.insert(rendered.clone()) {
                out.push(Link {
                    label: label_for(&url),
                    url: rendered,
                });
            }
        }
    }

    out
}

fn normalize(raw: &str) -> Option<Url> {
    let raw = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '<' | '>' | '"' | '\''));
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return None;
    }

    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);

    // Slack message permalinks and Slack file URLs are not references worth
    // listing; the report already carries a permalink to the thread itself.
    if let Some(host) = url.host_str().map(str::to_ascii_lowercase) {
        let path = url.path();
        let is_message_permalink = host.ends_with("slack.com") && path.contains("/archives/");
        let is_file_url = host == "slack-files.com"
            || host == "files.slack.com"
            || (host.ends_with("slack.com") && path.contains("/files-pri/"));

        if is_message_permalink || is_file_url {
            return None;
        }
    }

    Some(url)
}

/// Display label for a URL, by host/path shape.
///
/// - Jira issue pages get their ticket key: `.../browse/MIS-67359` → `JIRA MIS-67359`
/// - Zendesk agent tickets get their number: `.../tickets/1239298` → `Zendesk #1239298`
/// - Datadog views become `Datadog logs` or `Datadog dashboard`
/// - anything else falls back to the host name
#[must_use]
fn label_for(url: &Url) -> String {
    let host = url.host_str().map(str::to_ascii_lowercase).unwrap_or_default();
    let path = url.path();

    if host.ends_with("atlassian.net")
        && let Some(key) = segment_after(path, "browse")
    {
        return format!("JIRA {key}");
    }

    if host.ends_with("zendesk.com")
        && let Some(num) = segment_after(path, "tickets")
    {
        return format!("Zendesk #{num}");
    }

    if host.ends_with("datadoghq.com") || host.ends_with("datadoghq.eu") {
        return if path.starts_with("/logs") {
            "Datadog logs".to_string()
        } else {
            "Datadog dashboard".to_string()
        };
    }

    if host.is_empty() {
        url.to_string()
    } else {
        host
    }
}

/// Path segment immediately following `marker`, if present and non-empty.
fn segment_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments
        .by_ref()
        .find(|s| *s == marker)
        .and_then(|_| segments.next())
        .filter(|s| !s.is_empty())
}

#[must_use]
fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(&['.', ',', ';', ':', '!', '?', ')', ']', '}'][..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_links_from_slack_markup_and_raw_urls() {
        let text = "See <https://www.example.com|example> and also https://foo.bar/baz).";
        let links = extract_links(text);
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert!(urls.contains(&"https://www.example.com"));
        assert!(urls.contains(&"https://foo.bar/baz"));
    }

    #[test]
    fn labels_jira_tickets_by_key() {
        let links = extract_links("ticket: https://orchard.atlassian.net/browse/MIS-67359");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].label, "JIRA MIS-67359");
    }

    #[test]
    fn labels_zendesk_tickets_by_number() {
        let links =
            extract_links("see https://arboreducation.zendesk.com/agent/tickets/1239298 please");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].label, "Zendesk #1239298");
    }

    #[test]
    fn labels_datadog_by_view() {
        let links = extract_links(
            "logs https://app.datadoghq.com/logs?query=a and board https://app.datadoghq.com/dashboard/abc",
        );
        assert_eq!(links[0].label, "Datadog logs");
        assert_eq!(links[1].label, "Datadog dashboard");
    }

    #[test]
    fn other_urls_fall_back_to_host_label() {
        let links = extract_links("https://grafana.internal.example.io/d/abc123");
        assert_eq!(links[0].label, "grafana.internal.example.io");
    }

    #[test]
    fn dedupes_by_url_preserving_first_seen_order() {
        let text = "https://a.example.com/x then https://b.example.com/y then https://a.example.com/x";
        let links = extract_links(text);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://a.example.com/x");
        assert_eq!(links[1].url, "https://b.example.com/y");
    }

    #[test]
    fn filters_slack_message_permalinks() {
        let links = extract_links(
            "https://example.com/a and https://acme.slack.com/archives/C123/p1234567890",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/a");
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "a https://example.com/a, b <https://b.io|b>, a again https://example.com/a";
        let first = extract_links(text);
        let second = extract_links(text);
        assert_eq!(first, second);
    }
}
