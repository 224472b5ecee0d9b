//! Allow-list filtering for inbound messages (§4.11, §4.12 step 1).
//!
//! An empty allow-list means accept all. Entries are matched
//! case-insensitively against the sender id and support `*` glob wildcards.

/// Check if a sender is allowed to interact with the bot.
#[must_use]
pub fn is_allowed(sender_id: &str, allow_from: &[String]) -> bool {
    if allow_from.is_empty() {
        return true;
    }
    let sender_lower = sender_id.to_lowercase();
    allow_from.iter().any(|pattern| {
        let pat = pattern.to_lowercase();
        if pat.contains('*') {
            glob_match(&pat, &sender_lower)
        } else {
            pat == sender_lower
        }
    })
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let mut pos = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        match text[pos..].find(part) {
            Some(idx) => {
                if i == 0 && idx != 0 {
                    return false;
                }
                pos += idx + part.len();
            },
            None => return false,
        }
    }
    if !parts.last().unwrap_or(&"").is_empty() {
        pos == text.len()
    } else {
        true
    }
}
