//! Rule-based cleanup for model replies.
//!
//! Chat replies in the room carry no punctuation, so the model output is
//! stripped of the usual sentence marks before it is recorded.

/// Characters removed from every reply.
pub const STRIPPED_PUNCTUATION: &[char] = &[',', '.', '!', '?', ';', ':', '"', '\''];

/// Clean a raw model reply.
///
/// 1. strip [`STRIPPED_PUNCTUATION`] everywhere,
/// 2. drop one leading and one trailing double quote,
/// 3. trim surrounding whitespace.
///
/// Total and idempotent. Whether a reply is a question must be decided from the
/// raw text, see [`is_question`].
pub fn sanitize(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();

    let unquoted = stripped.strip_prefix('"').unwrap_or(&stripped);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);

    unquoted.trim().to_string()
}

/// Does the unsanitized reply end in a question mark?
pub fn is_question(raw: &str) -> bool {
    raw.trim().ends_with('?')
}

/// Text before the first period, or the whole reply when that would leave nothing.
pub fn first_sentence(raw: &str) -> &str {
    match raw.split('.').next() {
        Some(head) if !head.trim().is_empty() => head,
        _ => raw,
    }
}

/// Keep at most `max` sentences of the raw reply.
pub fn clip_sentences(raw: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let mut end = raw.len();
    let mut seen = 0;
    for (i, c) in raw.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            seen += 1;
            if seen == max {
                end = i + c.len_utf8();
                break;
            }
        }
    }
    raw[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_punctuation() {
        assert_eq!(sanitize("gm, frens! wen moon?"), "gm frens wen moon");
        assert_eq!(sanitize("it's: fine; ok."), "its fine ok");
    }

    #[test]
    fn test_trims_quotes_and_whitespace() {
        assert_eq!(sanitize("  \"looks bullish\"  "), "looks bullish");
        assert_eq!(sanitize("\"\""), "");
    }

    #[test]
    fn test_empty_and_garbage() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("...!!!???"), "");
        assert_eq!(sanitize("🚀🚀"), "🚀🚀");
    }

    #[test]
    fn test_idempotent_examples() {
        for s in ["\" \"hey\" \"", "a . b", "?x?", "  ", "mixed 'quotes' \"here\""] {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "input {:?}", s);
        }
    }

    #[test]
    fn test_is_question_uses_raw_text() {
        assert!(is_question("wen token?"));
        assert!(is_question("wen token?  "));
        assert!(!is_question("token soon."));
        // The sanitized text never carries the mark
        assert!(!is_question(&sanitize("wen token?")));
    }

    #[test]
    fn test_first_sentence() {
        assert_eq!(first_sentence("one. two. three"), "one");
        assert_eq!(first_sentence("no period here"), "no period here");
        assert_eq!(first_sentence(".leading"), ".leading");
    }

    #[test]
    fn test_clip_sentences() {
        assert_eq!(clip_sentences("a. b! c? d", 2), "a. b!");
        assert_eq!(clip_sentences("only one", 3), "only one");
        assert_eq!(clip_sentences("x. y", 0), "");
    }
}
