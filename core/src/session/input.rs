//! User input classification
//!
//! Turns a raw line from the user into a turn, a quit request, or nothing.

/// Classified user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Blank input; ask again, it is not a turn
    Empty,
    /// One of the configured quit commands
    Quit,
    /// A turn, possibly shortened to the configured limit
    Message { text: String, truncated: bool },
}

/// Classify `raw` against the quit commands and the length limit
pub fn classify_input(raw: &str, quit_commands: &[String], max_chars: usize) -> UserInput {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UserInput::Empty;
    }

    if quit_commands.iter().any(|q| q.eq_ignore_ascii_case(trimmed)) {
        return UserInput::Quit;
    }

    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => UserInput::Message {
            text: trimmed[..cut].to_string(),
            truncated: true,
        },
        None => UserInput::Message {
            text: trimmed.to_string(),
            truncated: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quits() -> Vec<String> {
        vec!["quit".to_string(), "exit".to_string(), "q".to_string()]
    }

    #[test]
    fn test_empty() {
        assert_eq!(classify_input("", &quits(), 10), UserInput::Empty);
        assert_eq!(classify_input("   \t\n", &quits(), 10), UserInput::Empty);
    }

    #[test]
    fn test_quit_commands() {
        assert_eq!(classify_input("quit", &quits(), 10), UserInput::Quit);
        assert_eq!(classify_input("  EXIT ", &quits(), 10), UserInput::Quit);
        assert_eq!(classify_input("Q", &quits(), 10), UserInput::Quit);
        assert!(matches!(
            classify_input("quite good", &quits(), 100),
            UserInput::Message { .. }
        ));
    }

    #[test]
    fn test_message_trimmed() {
        assert_eq!(
            classify_input("  Dune, obviously  ", &quits(), 100),
            UserInput::Message {
                text: "Dune, obviously".to_string(),
                truncated: false
            }
        );
    }

    #[test]
    fn test_truncation_on_char_boundary() {
        let input = "ééééé";
        assert_eq!(
            classify_input(input, &quits(), 3),
            UserInput::Message {
                text: "ééé".to_string(),
                truncated: true
            }
        );
        assert_eq!(
            classify_input("abc", &quits(), 3),
            UserInput::Message {
                text: "abc".to_string(),
                truncated: false
            }
        );
    }
}
