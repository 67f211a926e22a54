//! Turning a compiled profile and a command into something a caller can spawn.
//!
//! The command is always handed to the shell as a single `-c` argument, so its
//! own quoting is never re-tokenized. The single-string form quotes every argv
//! element so one shell parse gives back the exact argv.

use serde::Serialize;

use crate::error::{Result, SandboxError};

/// A ready-to-spawn invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrappedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl WrappedCommand {
    /// `<shell> -c <command>` with no confinement at all.
    pub fn unconfined(shell: &str, command: &str) -> Result<Self> {
        validate_shell(shell)?;
        validate_command(command)?;
        Ok(Self {
            program: shell.to_string(),
            args: vec!["-c".to_string(), command.to_string()],
        })
    }

    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// The invocation as one shell-safe string.
    pub fn to_shell_string(&self) -> String {
        shell_words::join(self.argv())
    }

    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.program, self.args)
    }
}

/// Reject commands that cannot be carried through a shell `-c` argument unchanged.
pub fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(SandboxError::WrapEscaping("command is empty".to_string()));
    }
    if command.contains('\0') {
        return Err(SandboxError::WrapEscaping(
            "command contains a NUL byte".to_string(),
        ));
    }
    check_quoting(command)
        .map_err(|e| SandboxError::WrapEscaping(format!("command has unbalanced quoting: {e}")))
}

/// One level of shell nesting the scanner is inside.
#[derive(Clone, Copy)]
enum Frame {
    /// Plain command text. `close` ends a `$(...)` or backtick substitution.
    Command { close: Option<char>, parens: usize },
    DoubleQuote,
}

/// Scan `command` the way a POSIX shell tokenizer would, failing only on
/// constructs left open at end of input.
///
/// Understands backslash escapes, `'...'`, `$'...'`, `"..."`, `$(...)`,
/// backticks, comments and here-document bodies, which are skipped verbatim.
fn check_quoting(command: &str) -> std::result::Result<(), &'static str> {
    let chars: Vec<char> = command.chars().collect();
    let mut stack = vec![Frame::Command {
        close: None,
        parens: 0,
    }];
    let mut heredocs: Vec<(String, bool)> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let Some(&frame) = stack.last() else {
            break;
        };

        match frame {
            Frame::DoubleQuote => match c {
                '\\' => i += 2,
                '"' => {
                    stack.pop();
                    i += 1;
                }
                '$' if next == Some('(') => {
                    stack.push(Frame::Command {
                        close: Some(')'),
                        parens: 0,
                    });
                    i += 2;
                }
                '`' => {
                    stack.push(Frame::Command {
                        close: Some('`'),
                        parens: 0,
                    });
                    i += 1;
                }
                _ => i += 1,
            },
            Frame::Command { close, parens } => match c {
                '\\' => i += 2,
                '\'' => {
                    i = find_from(&chars, i + 1, '\'').ok_or("missing closing single quote")? + 1;
                }
                '$' if next == Some('\'') => i = skip_ansi_c(&chars, i + 2)?,
                '$' if next == Some('(') => {
                    stack.push(Frame::Command {
                        close: Some(')'),
                        parens: 0,
                    });
                    i += 2;
                }
                '"' => {
                    stack.push(Frame::DoubleQuote);
                    i += 1;
                }
                '`' if close == Some('`') => {
                    stack.pop();
                    i += 1;
                }
                '`' => {
                    stack.push(Frame::Command {
                        close: Some('`'),
                        parens: 0,
                    });
                    i += 1;
                }
                '(' => {
                    set_parens(&mut stack, parens + 1);
                    i += 1;
                }
                ')' if close == Some(')') && parens == 0 => {
                    stack.pop();
                    i += 1;
                }
                ')' => {
                    set_parens(&mut stack, parens.saturating_sub(1));
                    i += 1;
                }
                '#' if starts_word(&chars, i) => {
                    i = find_from(&chars, i, '\n').unwrap_or(chars.len());
                }
                '<' if next == Some('<') && chars.get(i + 2) == Some(&'<') => i += 3,
                '<' if next == Some('<') => {
                    let (delimiter, strip_tabs, end) = read_heredoc_delimiter(&chars, i + 2);
                    if !delimiter.is_empty() {
                        heredocs.push((delimiter, strip_tabs));
                    }
                    i = end;
                }
                '\n' if !heredocs.is_empty() => {
                    i += 1;
                    for (delimiter, strip_tabs) in heredocs.drain(..) {
                        i = skip_heredoc_body(&chars, i, &delimiter, strip_tabs);
                    }
                }
                _ => i += 1,
            },
        }
    }

    match stack.last() {
        Some(Frame::DoubleQuote) => Err("missing closing double quote"),
        Some(Frame::Command {
            close: Some(')'), ..
        }) => Err("missing closing ')' of command substitution"),
        Some(Frame::Command {
            close: Some(_), ..
        }) => Err("missing closing backtick"),
        _ => Ok(()),
    }
}

fn set_parens(stack: &mut [Frame], depth: usize) {
    if let Some(Frame::Command { parens, .. }) = stack.last_mut() {
        *parens = depth;
    }
}

fn find_from(chars: &[char], start: usize, target: char) -> Option<usize> {
    chars
        .get(start..)?
        .iter()
        .position(|&c| c == target)
        .map(|offset| start + offset)
}

fn starts_word(chars: &[char], i: usize) -> bool {
    i == 0 || matches!(chars[i - 1], ' ' | '\t' | '\n' | ';' | '&' | '|' | '(' | ')')
}

/// Index just past the `'` closing a `$'...'` string whose body starts at `start`.
fn skip_ansi_c(chars: &[char], start: usize) -> std::result::Result<usize, &'static str> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err("missing closing quote of $'...' string")
}

/// Parse the word after `<<` (or `<<-`). Returns the unquoted delimiter,
/// whether leading tabs are stripped, and the index after the word.
fn read_heredoc_delimiter(chars: &[char], start: usize) -> (String, bool, usize) {
    let mut i = start;
    let strip_tabs = chars.get(i) == Some(&'-');
    if strip_tabs {
        i += 1;
    }
    while matches!(chars.get(i), Some(' ' | '\t')) {
        i += 1;
    }

    let mut delimiter = String::new();
    let mut quote = None;
    while let Some(&c) = chars.get(i) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => delimiter.push(c),
            (None, '\'' | '"') => quote = Some(c),
            (None, '\\') => {}
            (None, c) if c.is_whitespace() || ";|&<>()".contains(c) => break,
            (None, c) => delimiter.push(c),
        }
        i += 1;
    }
    (delimiter, strip_tabs, i)
}

/// Index just past the line holding `delimiter`, or the end of input when the
/// body is never closed (the shell warns but still runs it).
fn skip_heredoc_body(chars: &[char], start: usize, delimiter: &str, strip_tabs: bool) -> usize {
    let mut i = start;
    while i < chars.len() {
        let end = find_from(chars, i, '\n').unwrap_or(chars.len());
        let line: String = chars[i..end].iter().collect();
        let line = if strip_tabs {
            line.trim_start_matches('\t')
        } else {
            line.as_str()
        };
        if line == delimiter {
            return (end + 1).min(chars.len());
        }
        i = end + 1;
    }
    chars.len()
}

pub(crate) fn validate_shell(shell: &str) -> Result<()> {
    if shell.trim().is_empty() {
        return Err(SandboxError::WrapEscaping("shell is empty".to_string()));
    }
    if shell.contains('\0') {
        return Err(SandboxError::WrapEscaping(
            "shell path contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_profile(profile: &str) -> Result<()> {
    if profile.contains('\0') {
        return Err(SandboxError::WrapEscaping(
            "profile contains a NUL byte".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfined_passes_command_as_single_argument() {
        let wrapped = WrappedCommand::unconfined("/bin/bash", "echo 'a b' | wc -c").unwrap();
        assert_eq!(wrapped.program, "/bin/bash");
        assert_eq!(wrapped.args, vec!["-c", "echo 'a b' | wc -c"]);
    }

    #[test]
    fn test_shell_string_round_trips() {
        let commands = [
            r#"python3 -c "print('BOUND')""#,
            r#"echo "it's" && echo '"quoted"'"#,
            "printf '%s\\n' $HOME `whoami` $(id -u)",
            "cat <<EOF\nline one\nEOF",
        ];
        for command in commands {
            let wrapped = WrappedCommand::unconfined("/bin/sh", command).unwrap();
            let reparsed = shell_words::split(&wrapped.to_shell_string()).unwrap();
            assert_eq!(reparsed, wrapped.argv(), "round trip failed for {command:?}");
        }
    }

    #[test]
    fn test_validate_command_rejects_unbalanced_quotes() {
        for command in [
            "echo 'oops",
            "echo \"oops",
            "python3 -c \"print(1)",
            "echo $'oops",
            "echo $(ls",
            "echo \"$(echo 'x')",
            "echo `date",
        ] {
            let err = validate_command(command).unwrap_err();
            assert!(matches!(err, SandboxError::WrapEscaping(_)), "{command:?}");
        }
    }

    #[test]
    fn test_validate_command_rejects_empty_and_nul() {
        assert!(validate_command("").is_err());
        assert!(validate_command("   ").is_err());
        assert!(validate_command("echo a\0b").is_err());
    }

    #[test]
    fn test_validate_command_accepts_shell_syntax() {
        validate_command("ls -la | grep foo && echo done; exit 3").unwrap();
        validate_command("echo \"nested 'quotes'\"").unwrap();
    }

    #[test]
    fn test_validate_command_accepts_heredoc_bodies() {
        for command in [
            "cat <<'EOF'\nit's fine\nEOF",
            "cat <<EOF\nit's \"fine\nEOF\necho after",
            "cat <<-\"END\" > /tmp/out\n\tdon't\n\tEND\n",
            "python3 - <<'PY'\nprint(\"it's\")\nPY",
            "cat <<EOF\nunterminated body with '",
        ] {
            validate_command(command).unwrap_or_else(|e| panic!("{command:?}: {e}"));
        }
    }

    #[test]
    fn test_validate_command_accepts_ansi_c_and_escapes() {
        for command in [
            r"echo $'don\'t'",
            r"echo $'tab\there'",
            r"echo don\'t",
            r#"echo "say \"hi\"""#,
        ] {
            validate_command(command).unwrap_or_else(|e| panic!("{command:?}: {e}"));
        }
    }

    #[test]
    fn test_validate_command_accepts_nested_substitutions_and_comments() {
        for command in [
            r#"echo "$(echo "it's")""#,
            "echo $(printf '%s' \"$(id -u)\")",
            "echo `echo \"a\"`",
            "echo hi # don't worry",
            "echo $((1 + (2 * 3)))",
            "cat <<< 'here string'",
        ] {
            validate_command(command).unwrap_or_else(|e| panic!("{command:?}: {e}"));
        }
    }

    #[test]
    fn test_into_parts() {
        let (program, args) = WrappedCommand::unconfined("sh", "true")
            .unwrap()
            .into_parts();
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", "true"]);
    }
}
