//! ---
//! jtc_section: "05-networking-external-interfaces"
//! jtc_subsection: "binary"
//! jtc_type: "source"
//! jtc_scope: "code"
//! jtc_description: "Interactive secret entry with terminal echo disabled."
//! jtc_version: "v0.1.0"
//! jtc_owner: "tbd"
//! ---
use std::io::{self, Write};

use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Leaves raw mode when dropped, on every exit path.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    Continue,
    Submit,
    Abort,
}

fn apply_key(secret: &mut String, key: KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Continue;
    }
    match key.code {
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Esc => KeyAction::Abort,
        KeyCode::Char('c') | KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyAction::Abort
        }
        KeyCode::Char(c) => {
            secret.push(c);
            KeyAction::Continue
        }
        KeyCode::Backspace => {
            secret.pop();
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

/// Prompt on stderr and read one line without echo.
pub fn read_secret(prompt: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut secret = String::new();
    let action = {
        let _raw = RawModeGuard::enable()?;
        loop {
            if let Event::Key(key) = event::read()? {
                match apply_key(&mut secret, key) {
                    KeyAction::Continue => continue,
                    done => break done,
                }
            }
        }
    };
    writeln!(stderr)?;

    if action == KeyAction::Abort {
        bail!("secret entry aborted");
    }
    Ok(secret)
}
