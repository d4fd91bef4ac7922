//! Interactive conversation viewer.
//!
//! Loads message records from a JSON file, spawns a renderer, opens the
//! conversation, then reads one command per line from stdin and prints the
//! renderer-confirmed cursor after each.
//!
//! # Commands
//!
//! ```text
//! j / k        next / previous visible element
//! J / K        next / previous element (forced)
//! n / p        next / previous message
//! P            previous message, entering at its last element
//! space / b    page down / up
//! d / u        small scroll down / up
//! g / G        first / last element
//! v            focus the message in view
//! h            toggle collapse of the focused message
//! m            toggle mark of the focused message
//! focus MID N  focus element N of MID
//! resync       push the full state again
//! q            quit
//! ```

use std::fs;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::controller::ThreadView;
use crate::navigation::{Direction, NavigationKind, Navigate};
use crate::state::{FocusCursor, MessageRecord};

/// One parsed viewer command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// A navigation intent.
    Navigate(Navigate),
    /// Collapse or expand the focused message.
    ToggleHidden,
    /// Mark or unmark the focused message.
    ToggleMarked,
    /// Focus an explicit element.
    Focus(String, usize),
    /// Push the full state.
    Resync,
    /// Leave the viewer.
    Quit,
}

/// Parse one input line. `None` for blank or unknown input.
pub fn parse_command(line: &str) -> Option<ViewCommand> {
    use Direction::{Down, Up};
    use NavigationKind::{
        Element, Extreme, FocusView, Message, VisualBig, VisualElement, VisualSmall,
    };

    let nav = |direction, kind| Some(ViewCommand::Navigate(Navigate::new(direction, kind)));
    let mut words = line.split_whitespace();
    match words.next()? {
        "j" => nav(Down, VisualElement),
        "k" => nav(Up, VisualElement),
        "J" => nav(Down, Element),
        "K" => nav(Up, Element),
        "n" => nav(Down, Message),
        "p" => nav(Up, Message),
        "P" => Some(ViewCommand::Navigate(Navigate {
            bottom: true,
            ..Navigate::new(Up, Message)
        })),
        "space" => nav(Down, VisualBig),
        "b" => nav(Up, VisualBig),
        "d" => nav(Down, VisualSmall),
        "u" => nav(Up, VisualSmall),
        "g" => nav(Up, Extreme),
        "G" => nav(Down, Extreme),
        "v" => nav(Down, FocusView),
        "h" => Some(ViewCommand::ToggleHidden),
        "m" => Some(ViewCommand::ToggleMarked),
        "focus" => {
            let mid = words.next()?.to_string();
            let element = words.next().map_or(Some(0), |w| w.parse().ok())?;
            Some(ViewCommand::Focus(mid, element))
        }
        "resync" => Some(ViewCommand::Resync),
        "q" | "quit" => Some(ViewCommand::Quit),
        _ => None,
    }
}

/// Read message records from a JSON array file.
pub fn load_records(path: &Path) -> Result<Vec<MessageRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("read conversation file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parse conversation file: {}", path.display()))
}

/// Run the viewer against a freshly launched renderer.
pub fn run(path: &Path, config: &Config) -> Result<()> {
    let records = load_records(path)?;
    let mut view = ThreadView::launch(config)?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = drive(&mut view, records, stdin.lock(), stdout.lock());
    view.shutdown();
    result
}

/// Open `records` and apply commands from `input`, echoing the cursor.
pub fn drive<R: Read, W: Write>(
    view: &mut ThreadView<R, W>,
    records: Vec<MessageRecord>,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<()> {
    let count = records.len();
    let cursor = view.open(records)?;
    writeln!(output, "opened {count} message(s), focus {cursor}")?;

    for line in input.lines() {
        let line = line?;
        let Some(command) = parse_command(&line) else {
            if !line.trim().is_empty() {
                writeln!(output, "unknown command: {}", line.trim())?;
            }
            continue;
        };
        let cursor = match command {
            ViewCommand::Quit => break,
            ViewCommand::Navigate(request) => view.navigate_request(&request),
            ViewCommand::ToggleHidden => toggle(view, |m| m.hidden, |v, mid, on| v.hide(mid, on)),
            ViewCommand::ToggleMarked => toggle(view, |m| m.marked, |v, mid, on| v.mark(mid, on)),
            ViewCommand::Focus(mid, element) => view.focus_element(&mid, element),
            ViewCommand::Resync => view.resync(),
        };
        match cursor {
            Ok(cursor) => writeln!(output, "focus {cursor}")?,
            Err(e) => writeln!(output, "error: {e:#}")?,
        }
        if view.is_diverged() {
            writeln!(output, "renderer out of sync; type `resync`")?;
        }
    }
    Ok(())
}

fn toggle<R: Read, W: Write>(
    view: &mut ThreadView<R, W>,
    current: impl Fn(&MessageRecord) -> bool,
    apply: impl Fn(&mut ThreadView<R, W>, &str, bool) -> Result<FocusCursor>,
) -> Result<FocusCursor> {
    let Some(mid) = view.cursor().message().map(str::to_string) else {
        return Ok(view.cursor().clone());
    };
    let on = view.conversation().get(&mid).is_some_and(|m| !current(m));
    apply(view, &mid, on)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation_keys() {
        assert_eq!(
            parse_command("J"),
            Some(ViewCommand::Navigate(Navigate::new(
                Direction::Down,
                NavigationKind::Element
            )))
        );
        assert_eq!(
            parse_command("  g  "),
            Some(ViewCommand::Navigate(Navigate::new(
                Direction::Up,
                NavigationKind::Extreme
            )))
        );
        match parse_command("P") {
            Some(ViewCommand::Navigate(n)) => assert!(n.bottom),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_focus_command() {
        assert_eq!(
            parse_command("focus abc@x 2"),
            Some(ViewCommand::Focus("abc@x".into(), 2))
        );
        assert_eq!(
            parse_command("focus abc@x"),
            Some(ViewCommand::Focus("abc@x".into(), 0))
        );
        assert_eq!(parse_command("focus abc@x two"), None);
        assert_eq!(parse_command("focus"), None);
    }

    #[test]
    fn test_parse_rejects_unknown_and_blank() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("xyzzy"), None);
        assert_eq!(parse_command("q"), Some(ViewCommand::Quit));
    }

    #[test]
    fn test_load_records_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thread.json");
        fs::write(
            &path,
            r#"[{"mid":"m1","sender":{"email":"a@b.c"},"date":"2024-01-01T10:00:00Z"}]"#,
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mid, "m1");
        assert!(records[0].elements.is_empty());
    }
}
