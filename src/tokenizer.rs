//! Compound shell command splitting.
//!
//! Breaks a raw command string into the independent commands it chains
//! together, so each one can be judged on its own. Only the chaining
//! operators are understood; quoting is tracked just well enough that an
//! operator inside a quoted string never splits it.
//!
//! Separators recognized outside quotes:
//! - `&&` and `||` (checked first so `||` is never read as two pipes)
//! - `;` and `|`
//! - `|&` (pipe with stderr)
//! - newline
//! - a lone `&` (background job), but not the `&` of a redirection such as
//!   `2>&1`, `<&3` or `&>file`

use tracing::trace;

/// Split `command` into ordered, trimmed, non-empty segments.
///
/// Segments borrow from the input; operator characters are dropped. A command
/// with no operators yields a single segment equal to the trimmed input, and
/// an unterminated quote keeps the rest of the input as literal text.
#[must_use]
pub fn split_command_segments(command: &str) -> Vec<&str> {
    let bytes = command.as_bytes();
    let len = bytes.len();

    let mut segments = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' && q == b'"' {
                // Escaped character inside double quotes.
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let op_len = match (b, next) {
            (b'\\', _) => {
                i += 2;
                continue;
            }
            (b'\'' | b'"', _) => {
                quote = Some(b);
                i += 1;
                continue;
            }
            (b'&', Some(b'&')) | (b'|', Some(b'|' | b'&')) => 2,
            (b'|' | b';' | b'\n', _) => 1,
            (b'&', _) if !is_redirection_ampersand(bytes, i) => 1,
            _ => {
                i += 1;
                continue;
            }
        };

        push_segment(&mut segments, &command[start..i]);
        i += op_len;
        start = i;
    }

    if start < len {
        push_segment(&mut segments, &command[start..]);
    }

    trace!(segments = segments.len(), "split command");
    segments
}

fn push_segment<'a>(segments: &mut Vec<&'a str>, raw: &'a str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed);
    }
}

/// `&` that belongs to a redirection (`2>&1`, `<&0`, `&>out`, `&>>out`).
fn is_redirection_ampersand(bytes: &[u8], idx: usize) -> bool {
    let prev = idx.checked_sub(1).and_then(|p| bytes.get(p)).copied();
    let next = bytes.get(idx + 1).copied();
    matches!(prev, Some(b'>' | b'<')) || next == Some(b'>')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_all_chaining_operators() {
        assert_eq!(
            split_command_segments("a && b || c; d | e"),
            vec!["a", "b", "c", "d", "e"]
        );
    }

    #[test]
    fn single_command_is_one_trimmed_segment() {
        assert_eq!(split_command_segments("  ls -la  "), vec!["ls -la"]);
    }

    #[test]
    fn empty_and_blank_input_yield_nothing() {
        assert!(split_command_segments("").is_empty());
        assert!(split_command_segments("   ").is_empty());
        assert!(split_command_segments(";;").is_empty());
        assert!(split_command_segments("&& ||").is_empty());
    }

    #[test]
    fn operators_inside_quotes_do_not_split() {
        assert_eq!(
            split_command_segments(r#"echo "a && b""#),
            vec![r#"echo "a && b""#]
        );
        assert_eq!(
            split_command_segments("echo 'x | y; z' && ls"),
            vec!["echo 'x | y; z'", "ls"]
        );
    }

    #[test]
    fn mixed_quotes_nest_correctly() {
        assert_eq!(
            split_command_segments(r#"echo "it's; fine" ; pwd"#),
            vec![r#"echo "it's; fine""#, "pwd"]
        );
    }

    #[test]
    fn escaped_quote_does_not_toggle() {
        assert_eq!(
            split_command_segments(r#"echo \"a && b"#),
            vec![r#"echo \"a"#, "b"]
        );
        assert_eq!(
            split_command_segments(r#"echo "say \"hi\" && bye" ; ls"#),
            vec![r#"echo "say \"hi\" && bye""#, "ls"]
        );
    }

    #[test]
    fn unterminated_quote_keeps_remainder() {
        assert_eq!(
            split_command_segments("ls && echo 'oops; rm -rf /"),
            vec!["ls", "echo 'oops; rm -rf /"]
        );
    }

    #[test]
    fn double_pipe_is_never_two_pipes() {
        assert_eq!(split_command_segments("false||true"), vec!["false", "true"]);
        assert_eq!(split_command_segments("a|b"), vec!["a", "b"]);
    }

    #[test]
    fn newline_and_background_separate() {
        assert_eq!(
            split_command_segments("cd build\nrm -rf out"),
            vec!["cd build", "rm -rf out"]
        );
        assert_eq!(
            split_command_segments("sleep 5 & rm -rf /"),
            vec!["sleep 5", "rm -rf /"]
        );
        assert_eq!(split_command_segments("make |& tee log"), vec!["make", "tee log"]);
    }

    #[test]
    fn redirection_ampersand_does_not_split() {
        assert_eq!(
            split_command_segments("make 2>&1 | tee out"),
            vec!["make 2>&1", "tee out"]
        );
        assert_eq!(split_command_segments("cmd &>/dev/null"), vec!["cmd &>/dev/null"]);
        assert_eq!(split_command_segments("cmd <&3"), vec!["cmd <&3"]);
    }

    #[test]
    fn multibyte_text_survives() {
        assert_eq!(
            split_command_segments("echo 日本語 && ls ñ"),
            vec!["echo 日本語", "ls ñ"]
        );
    }
}

#[cfg(test)]
mod proptest_invariants {
    use super::*;
    use proptest::prelude::*;

    fn command_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z ]{0,20}( (&&|\\|\\||;|\\||&) [a-z ]{0,20}){0,5}",
            "[!-~ ]{0,80}",
            "\\PC{0,60}",
            Just(String::new()),
        ]
    }

    proptest! {
        #[test]
        fn segments_are_trimmed_and_non_empty(cmd in command_strategy()) {
            for segment in split_command_segments(&cmd) {
                prop_assert!(!segment.is_empty());
                prop_assert_eq!(segment, segment.trim());
            }
        }

        #[test]
        fn splitting_is_deterministic(cmd in command_strategy()) {
            prop_assert_eq!(split_command_segments(&cmd), split_command_segments(&cmd));
        }

        #[test]
        fn operator_free_input_is_one_segment(cmd in "[a-z0-9 ./_-]{1,40}") {
            let expected: Vec<&str> = if cmd.trim().is_empty() {
                Vec::new()
            } else {
                vec![cmd.trim()]
            };
            prop_assert_eq!(split_command_segments(&cmd), expected);
        }
    }
}
