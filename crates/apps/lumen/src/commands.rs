//! Command line parsing for the interactive prompt

use history::{AnalysisKind, HistoryId};

/// A command typed at the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the current list
    List,
    /// Manual refresh (forced)
    Refresh,
    /// Pretend the window regained focus
    Focus,
    Open(HistoryId),
    /// Run an analysis and save its result
    Analyze {
        language: String,
        kind: AnalysisKind,
        code: String,
    },
    Save {
        language: String,
        kind: AnalysisKind,
        code: String,
    },
    Delete(HistoryId),
    /// Set the list filter; no arguments clears it
    Filter {
        language: Option<String>,
        search: Option<String>,
    },
    User(String),
    Logout,
    Help,
    Quit,
}

/// A command and what it does, for the help screen
pub struct CommandHelp {
    pub usage: &'static str,
    pub description: &'static str,
}

/// Everything the prompt understands
pub fn help() -> Vec<CommandHelp> {
    vec![
        CommandHelp { usage: "list", description: "Show the history list" },
        CommandHelp { usage: "refresh", description: "Reload the list now" },
        CommandHelp { usage: "focus", description: "Reload if the list is older than 10s" },
        CommandHelp { usage: "open <id>", description: "Show a record in full" },
        CommandHelp { usage: "analyze <lang> <re|ex|su> <code>", description: "Analyze code and save the result" },
        CommandHelp { usage: "save <lang> <re|ex|su> <code>", description: "Save an analysis typed by hand" },
        CommandHelp { usage: "delete <id>", description: "Delete a record" },
        CommandHelp { usage: "filter [lang|all] [text]", description: "Filter the list; no arguments clears" },
        CommandHelp { usage: "user <name>", description: "Switch user" },
        CommandHelp { usage: "logout", description: "Sign out" },
        CommandHelp { usage: "help", description: "Show this help" },
        CommandHelp { usage: "quit", description: "Exit" },
    ]
}

/// Parse one input line. Blank lines give `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => Command::List,
        "refresh" | "r" => Command::Refresh,
        "focus" => Command::Focus,
        "open" => Command::Open(parse_id(rest)?),
        "delete" | "rm" => Command::Delete(parse_id(rest)?),
        "analyze" | "a" => {
            let (language, kind, code) = parse_submission(rest, "analyze")?;
            Command::Analyze { language, kind, code }
        }
        "save" => {
            let (language, kind, code) = parse_submission(rest, "save")?;
            Command::Save { language, kind, code }
        }
        "filter" => parse_filter(rest),
        "user" | "login" => {
            if rest.is_empty() {
                return Err("usage: user <name>".to_string());
            }
            Command::User(rest.to_string())
        }
        "logout" => Command::Logout,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn parse_id(arg: &str) -> Result<HistoryId, String> {
    let arg = arg.trim_start_matches('#');
    arg.parse::<i64>()
        .map(HistoryId::new)
        .map_err(|_| format!("'{}' is not a history id", arg))
}

/// `<lang> <kind> <code>`, shared by analyze and save
fn parse_submission(rest: &str, verb: &str) -> Result<(String, AnalysisKind, String), String> {
    let mut parts = rest.splitn(3, char::is_whitespace);
    let (Some(language), Some(kind), Some(code)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("usage: {} <lang> <re|ex|su> <code>", verb));
    };
    let kind = AnalysisKind::parse(kind).ok_or_else(|| format!("unknown analysis kind '{}'", kind))?;

    // Allow multi-line code typed as \n
    Ok((language.to_string(), kind, code.trim().replace("\\n", "\n")))
}

fn parse_filter(rest: &str) -> Command {
    let (language, search) = match rest.split_once(char::is_whitespace) {
        Some((language, search)) => (language, search.trim()),
        None => (rest, ""),
    };
    Command::Filter {
        language: Some(language).filter(|l| !l.is_empty()).map(str::to_string),
        search: Some(search).filter(|s| !s.is_empty()).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("  "), Ok(None));
        assert_eq!(parse("refresh"), Ok(Some(Command::Refresh)));
        assert_eq!(parse("R"), Ok(Some(Command::Refresh)));
        assert_eq!(parse("quit"), Ok(Some(Command::Quit)));
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn test_ids() {
        assert_eq!(parse("open 5"), Ok(Some(Command::Open(HistoryId::new(5)))));
        assert_eq!(parse("delete #12"), Ok(Some(Command::Delete(HistoryId::new(12)))));
        assert!(parse("open five").is_err());
        assert!(parse("open").is_err());
    }

    #[test]
    fn test_save() {
        let parsed = parse("save python re def f():\\n    return 1").unwrap();
        assert_eq!(
            parsed,
            Some(Command::Save {
                language: "python".to_string(),
                kind: AnalysisKind::Review,
                code: "def f():\n    return 1".to_string(),
            })
        );
        assert!(parse("save python").is_err());
        assert!(parse("save python zz x = 1").is_err());
    }

    #[test]
    fn test_analyze() {
        assert_eq!(
            parse("analyze go ex fmt.Println(1)"),
            Ok(Some(Command::Analyze {
                language: "go".to_string(),
                kind: AnalysisKind::Explain,
                code: "fmt.Println(1)".to_string(),
            }))
        );
        assert_eq!(
            parse("analyze go"),
            Err("usage: analyze <lang> <re|ex|su> <code>".to_string())
        );
    }

    #[test]
    fn test_filter() {
        assert_eq!(
            parse("filter"),
            Ok(Some(Command::Filter { language: None, search: None }))
        );
        assert_eq!(
            parse("filter java hello world"),
            Ok(Some(Command::Filter {
                language: Some("java".to_string()),
                search: Some("hello world".to_string()),
            }))
        );
    }

    #[test]
    fn test_user() {
        assert_eq!(parse("user bob"), Ok(Some(Command::User("bob".to_string()))));
        assert!(parse("user").is_err());
    }
}
