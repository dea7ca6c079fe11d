//! Block Kit rendering for thread summaries.

use serde_json::{Value, json};

use crate::core::models::Summary;

/// Render a summary into the report document posted to Slack: header,
/// timestamp context, Problem and Solution sections, a participants line,
/// a links line when any were collected, and a "View thread" reference when
/// the source permalink is known.
#[must_use]
pub fn render_report(summary: &Summary, permalink: Option<&str>) -> Value {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": summary.title, "emoji": true }
        }),
        json!({
            "type": "context",
            "elements": [ { "type": "plain_text", "text": summary.timestamp, "emoji": true } ]
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Problem:*\n{}", summary.problem) }
        }),
        json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*Solution:*\n{}", summary.solution) }
        }),
        json!({
            "type": "context",
            "elements": [ {
                "type": "mrkdwn",
                "text": format!("*Participants:* {}", summary.participants.join(", "))
            } ]
        }),
    ];

    if !summary.links.is_empty() {
        let rendered: Vec<String> = summary
            .links
            .iter()
            .map(|l| format!("<{}|{}>", l.url, l.label))
            .collect();
        blocks.push(json!({
            "type": "context",
            "elements": [ {
                "type": "mrkdwn",
                "text": format!("*Links:* {}", rendered.join(" · "))
            } ]
        }));
    }

    if let Some(url) = permalink {
        blocks.push(json!({
            "type": "context",
            "elements": [ { "type": "mrkdwn", "text": format!("<{url}|View thread>") } ]
        }));
    }

    Value::Array(blocks)
}

/// Plain-text fallback shown by clients that cannot render blocks.
#[must_use]
pub fn fallback_text(summary: &Summary) -> String {
    format!("Firefighter thread summary: {}", summary.title)
}

/// Header-only document used to open the weekly parent message.
#[must_use]
pub fn weekly_parent_blocks(title: &str) -> Value {
    json!([
        {
            "type": "header",
            "text": { "type": "plain_text", "text": title, "emoji": true }
        }
    ])
}
