//! Reply-splitting for posts that exceed the server's character limit.
//!
//! The mention prefix counts against every part's budget, not just the
//! first. Splitting prefers the last newline inside the window, falling
//! back to the window boundary, and drops the newline that caused a split
//! plus any further leading newlines on the next part.

/// Splits `reply` into parts that each fit in `max_post_chars` once
/// `mention_prefix` is prepended. Returns a single-element vec when no
/// split is needed.
pub fn split_reply(reply: &str, mention_prefix: &str, max_post_chars: usize) -> Vec<String> {
    let mention_len = mention_prefix.chars().count();
    let reply_chars: Vec<char> = reply.chars().collect();

    if mention_len + reply_chars.len() <= max_post_chars {
        return vec![reply.to_string()];
    }

    let window = max_post_chars.saturating_sub(mention_len).max(1);
    let mut parts = Vec::new();
    let mut remaining = reply_chars;
    let mut first = true;

    loop {
        if !first {
            while remaining.first() == Some(&'\n') {
                remaining.remove(0);
            }
        }
        if remaining.is_empty() {
            break;
        }
        if remaining.len() <= window {
            parts.push(remaining.iter().collect());
            break;
        }

        let window_slice = &remaining[..window];
        if let Some(pos) = window_slice.iter().rposition(|&c| c == '\n') {
            parts.push(remaining[..pos].iter().collect());
            remaining = remaining[pos + 1..].to_vec();
        } else {
            parts.push(remaining[..window].iter().collect());
            remaining = remaining[window..].to_vec();
        }
        first = false;
    }

    parts
}

pub const REPLY_POST_DELAY_MS: u64 = 200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reply_is_single_part() {
        let parts = split_reply("hello", "@u ", 480);
        assert_eq!(parts, vec!["hello".to_string()]);
    }

    #[test]
    fn scenario_s1_literal() {
        let mention = "@u ";
        let reply = format!("a\n{}\ncc", "b".repeat(15));
        let parts = split_reply(&reply, mention, 20);
        assert_eq!(
            parts,
            vec!["a".to_string(), "b".repeat(15), "cc".to_string()]
        );
    }

    #[test]
    fn every_part_fits_window() {
        let mention = "@someone ";
        let reply = "word ".repeat(200);
        let parts = split_reply(&reply, mention, 100);
        let window = 100 - mention.chars().count();
        for p in &parts {
            assert!(p.chars().count() <= window);
        }
    }

    #[test]
    fn exact_fit_does_not_split() {
        let mention = "@u ";
        let reply = "x".repeat(17);
        let parts = split_reply(&reply, mention, 20);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn no_newline_forces_hard_split() {
        let mention = "@u ";
        let reply = "x".repeat(40);
        let parts = split_reply(&reply, mention, 20);
        assert!(parts.len() > 1);
        for p in &parts {
            assert!(p.chars().count() <= 17);
        }
    }
}
