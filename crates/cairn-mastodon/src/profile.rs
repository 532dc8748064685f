use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::types::ProfileField;

pub const FIELD_SYSTEM_ID: &str = "SystemID";
pub const FIELD_MENTIONS: &str = "Mentions";
pub const FIELD_UPDATED: &str = "Updated";
pub const FIELD_MODEL: &str = "Model";

const MANAGED_FIELD_NAMES: &[&str] = &[FIELD_SYSTEM_ID, FIELD_MENTIONS, FIELD_UPDATED, FIELD_MODEL];

/// Rebuilds the four managed profile fields in a fixed order, preserving
/// any user-added fields ahead of them and keeping their original relative
/// order (a stable sort by original index).
pub fn rebuild_managed_fields(
    existing: &[ProfileField],
    system_id: &str,
    mentions_open: bool,
    model_identifier: &str,
    timezone: &Tz,
    now: DateTime<Utc>,
) -> Vec<ProfileField> {
    let mut user_fields: Vec<ProfileField> = existing
        .iter()
        .filter(|f| !MANAGED_FIELD_NAMES.contains(&f.name.as_str()))
        .cloned()
        .collect();

    let mentions_value = if mentions_open { "公開中" } else { "停止中" };
    let local_now = now.with_timezone(timezone);

    user_fields.push(ProfileField {
        name: FIELD_SYSTEM_ID.to_string(),
        value: system_id.to_string(),
    });
    user_fields.push(ProfileField {
        name: FIELD_MENTIONS.to_string(),
        value: mentions_value.to_string(),
    });
    user_fields.push(ProfileField {
        name: FIELD_UPDATED.to_string(),
        value: local_now.format("%Y-%m-%d %H:%M:%S %Z").to_string(),
    });
    user_fields.push(ProfileField {
        name: FIELD_MODEL.to_string(),
        value: model_identifier.to_string(),
    });

    user_fields
}

/// Truncates a synthesized profile body so that `body + disclaimer` fits
/// within `budget` characters, preferring to cut at the last `。` or
/// newline within the available window over a plain Unicode-scalar cut.
pub fn truncate_profile_body(body: &str, disclaimer: &str, budget: usize) -> String {
    let compacted = compact_blank_lines(body);
    let disclaimer_len = disclaimer.chars().count();
    let available = budget.saturating_sub(disclaimer_len);

    let chars: Vec<char> = compacted.chars().collect();
    if chars.len() <= available {
        return compacted;
    }

    let window: String = chars[..available].iter().collect();
    let cut = window
        .rfind('。')
        .map(|i| i + '。'.len_utf8())
        .or_else(|| window.rfind('\n'));

    match cut {
        Some(byte_idx) => window[..byte_idx].to_string(),
        None => window,
    }
}

fn compact_blank_lines(s: &str) -> String {
    let mut out = String::new();
    let mut last_blank = false;
    for line in s.lines() {
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        last_blank = blank;
    }
    out
}
