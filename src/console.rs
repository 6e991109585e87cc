// Terminal stand-in for the messenger: prints replies, numbers the buttons,
// and turns what the operator types back into actions.
use crate::bot::{Action, Reply};
use std::io::{BufRead, Write};
use tabled::{settings::Style, Table, Tabled};

pub trait ChatUi {
    /// Next operator intent, or `None` when the conversation is over.
    fn next_action(&mut self) -> Option<Action>;
    fn send(&mut self, reply: &Reply);
}

#[derive(Tabled)]
struct ButtonRow {
    #[tabled(rename = "#")]
    key: usize,
    #[tabled(rename = "Action")]
    label: String,
}

pub struct ConsoleUi<R, W> {
    input: R,
    output: W,
    pressable: Vec<Action>,
}

impl<R: BufRead, W: Write> ConsoleUi<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output, pressable: Vec::new() }
    }

    fn read_line(&mut self) -> Option<String> {
        let _ = write!(self.output, "> ");
        let _ = self.output.flush();
        let mut buf = String::new();
        match self.input.read_line(&mut buf) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(buf.trim().to_string()),
        }
    }

    fn resolve(&self, line: &str) -> Option<Action> {
        if let Ok(n) = line.parse::<usize>() {
            return n.checked_sub(1).and_then(|i| self.pressable.get(i)).cloned();
        }
        Action::parse(line)
    }
}

impl<R: BufRead, W: Write> ChatUi for ConsoleUi<R, W> {
    fn next_action(&mut self) -> Option<Action> {
        loop {
            let line = self.read_line()?;
            match line.as_str() {
                "" => continue,
                "q" | "quit" | "exit" => return None,
                _ => {}
            }
            match self.resolve(&line) {
                Some(action) => return Some(action),
                None => {
                    let _ = writeln!(
                        self.output,
                        "Unknown command. Enter a button number, a command such as /start, or q to quit."
                    );
                }
            }
        }
    }

    fn send(&mut self, reply: &Reply) {
        let _ = writeln!(self.output, "{}", reply.text);
        self.pressable = reply.buttons.iter().flatten().map(|b| b.action.clone()).collect();
        if !self.pressable.is_empty() {
            let rows: Vec<ButtonRow> = reply
                .buttons
                .iter()
                .flatten()
                .enumerate()
                .map(|(i, b)| ButtonRow { key: i + 1, label: b.label.clone() })
                .collect();
            let _ = writeln!(self.output, "{}", Table::new(rows).with(Style::rounded()));
        }
        let _ = writeln!(self.output);
    }
}
