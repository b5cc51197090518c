use cryptochat_reasoning::console::OperatorConsole;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub struct RustylineConsole {
    editor: DefaultEditor,
}

impl RustylineConsole {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl OperatorConsole for RustylineConsole {
    fn prompt(&mut self, message: &str) -> Option<String> {
        match self.editor.readline(message) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Some(line)
            }
            // Ctrl-C and Ctrl-D both mean "back"
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(e) => {
                tracing::warn!("Console read failed: {}", e);
                None
            }
        }
    }

    fn show(&mut self, line: &str) {
        println!("{}", line);
    }
}
