//! Shared helpers used by more than one skill: code-fence stripping,
//! `<think>` section removal, and CJK detection for prompt-language
//! selection. Small hand-rolled string scans, in the spirit of this
//! toolkit's own `parse_tool_call()` brace-counting — no regex dependency
//! is introduced for what is fundamentally substring search.

/// Strip a single ```` ```json ... ``` ```` or ```` ``` ... ``` ```` fence
/// around `text`, if present. Leaves unfenced text untouched (besides
/// trimming surrounding whitespace).
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end) = rest.rfind("```") {
            let mut body = &rest[..end];
            if let Some(after_lang) = body.strip_prefix("json") {
                body = after_lang;
            }
            return body.trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Remove any `<think>...</think>` sections (and the whitespace immediately
/// following them), tolerating multiple occurrences.
pub fn strip_think_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        rest = &rest[start + "<think>".len()..];
        if let Some(end) = rest.find("</think>") {
            rest = &rest[end + "</think>".len()..];
            rest = rest.trim_start();
        } else {
            rest = "";
        }
    }
    out.push_str(rest);
    out
}

/// Whether `text` contains a CJK (Han/Hiragana/Katakana/Hangul) codepoint.
/// Used to select the Center skill's prompt language.
pub fn detect_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0x4E00..=0x9FFF).contains(&cp) // CJK Unified Ideographs
            || (0x3040..=0x30FF).contains(&cp) // Hiragana + Katakana
            || (0xAC00..=0xD7AF).contains(&cp) // Hangul syllables
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence() {
        let text = "```\nhello\n```";
        assert_eq!(strip_code_fence(text), "hello");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fence("  raw text  "), "raw text");
    }

    #[test]
    fn removes_think_sections() {
        let text = "<think>reasoning here</think>\nactual answer";
        assert_eq!(strip_think_tags(text), "actual answer");
    }

    #[test]
    fn detects_cjk_and_latin() {
        assert!(detect_cjk("帮我找人搬钢琴"));
        assert!(!detect_cjk("help me move a piano"));
    }
}
