//! Operator console used by interactive mode.
//!
//! `0` or an empty line means "go back" at every prompt, and a closed input
//! stream is treated the same way.

/// Line-oriented operator I/O.
pub trait OperatorConsole {
    /// Ask for one line. `None` when input is closed.
    fn prompt(&mut self, message: &str) -> Option<String>;
    fn show(&mut self, line: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Back,
}

pub fn is_back(input: &str) -> bool {
    let input = input.trim();
    input.is_empty() || input == "0"
}

/// `None` for anything that is not a recognizable answer.
pub fn parse_yes_no(input: &str) -> Option<Answer> {
    if is_back(input) {
        return Some(Answer::Back);
    }
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(Answer::Yes),
        "n" | "no" => Some(Answer::No),
        _ => None,
    }
}

/// Parse 1-based roster numbers separated by spaces or commas.
///
/// Returns zero-based indices in input order without duplicates. At least two
/// distinct personas are needed for a discussion.
pub fn parse_selection(input: &str, roster_len: usize) -> Option<Vec<usize>> {
    let mut picked = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let n: usize = token.parse().ok()?;
        if n == 0 || n > roster_len {
            return None;
        }
        if !picked.contains(&(n - 1)) {
            picked.push(n - 1);
        }
    }
    (picked.len() >= 2).then_some(picked)
}

/// Ask for a topic. `None` on the back sentinel.
pub fn ask_topic(console: &mut dyn OperatorConsole) -> Option<String> {
    let input = console.prompt("topic (0 to go back): ")?;
    if is_back(&input) {
        return None;
    }
    Some(input.trim().to_string())
}

/// Ask a yes/no question until the answer parses.
pub fn ask_yes_no(console: &mut dyn OperatorConsole, question: &str) -> Answer {
    loop {
        let Some(input) = console.prompt(question) else {
            return Answer::Back;
        };
        match parse_yes_no(&input) {
            Some(answer) => return answer,
            None => console.show("please answer yes or no (0 to go back)"),
        }
    }
}

/// Show the roster and ask which personas join. `None` on the back sentinel.
pub fn ask_selection(console: &mut dyn OperatorConsole, roster: &[String]) -> Option<Vec<String>> {
    for (i, handle) in roster.iter().enumerate() {
        console.show(&format!("{}. {}", i + 1, handle));
    }
    loop {
        let input = console.prompt("pick at least two personas, e.g. 1 3 (0 to go back): ")?;
        if is_back(&input) {
            return None;
        }
        match parse_selection(&input, roster.len()) {
            Some(indices) => return Some(indices.into_iter().map(|i| roster[i].clone()).collect()),
            None => console.show(&format!(
                "invalid selection, use numbers between 1 and {}",
                roster.len()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        inputs: VecDeque<&'static str>,
        shown: Vec<String>,
    }

    impl Scripted {
        fn new(inputs: &[&'static str]) -> Self {
            Self {
                inputs: inputs.iter().copied().collect(),
                shown: Vec::new(),
            }
        }
    }

    impl OperatorConsole for Scripted {
        fn prompt(&mut self, _message: &str) -> Option<String> {
            self.inputs.pop_front().map(str::to_string)
        }

        fn show(&mut self, line: &str) {
            self.shown.push(line.to_string());
        }
    }

    #[test]
    fn test_back_sentinel() {
        assert!(is_back(""));
        assert!(is_back("  0 "));
        assert!(!is_back("00"));
        assert!(!is_back("no"));
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("YES"), Some(Answer::Yes));
        assert_eq!(parse_yes_no(" n "), Some(Answer::No));
        assert_eq!(parse_yes_no(""), Some(Answer::Back));
        assert_eq!(parse_yes_no("maybe"), None);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("1 3", 4), Some(vec![0, 2]));
        assert_eq!(parse_selection("2,1, 2", 4), Some(vec![1, 0]));
        assert_eq!(parse_selection("1", 4), None);
        assert_eq!(parse_selection("1 1", 4), None);
        assert_eq!(parse_selection("1 5", 4), None);
        assert_eq!(parse_selection("one two", 4), None);
    }

    #[test]
    fn test_malformed_input_reprompts() {
        let mut console = Scripted::new(&["sure", "what", "y"]);
        assert_eq!(ask_yes_no(&mut console, "continue? "), Answer::Yes);
        assert_eq!(console.shown.len(), 2);

        let roster = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut console = Scripted::new(&["9", "3 1"]);
        assert_eq!(
            ask_selection(&mut console, &roster),
            Some(vec!["c".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_closed_input_goes_back() {
        let mut console = Scripted::new(&[]);
        assert_eq!(ask_yes_no(&mut console, "continue? "), Answer::Back);
        assert_eq!(ask_topic(&mut console), None);
    }
}
