//! Expressions in the daemon's command dialect.
//!
//! A pre-filter narrows what the daemon sends back. It is never trusted on its
//! own, every returned item is still matched locally. Expressions therefore
//! only have to select a superset of the matching items, and track whether
//! they are exact so that negation is only applied where it cannot drop a
//! true match.

use std::fmt;

/// Seconds of slack added to time comparisons, for clock and timezone skew.
pub const TIME_FUZZ: i64 = 60 * 60 * 24;

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Emitted verbatim, e.g. `$d.name=` or `value=12`.
    Raw(String),
    /// Emitted as a double quoted, escaped string literal.
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Call { name: String, args: Vec<Arg> },
    Not(Box<Command>),
    And(Vec<Command>),
    Or(Vec<Command>),
}

pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

impl Command {
    pub fn call(name: &str, args: Vec<Arg>) -> Self {
        Command::Call {
            name: name.to_string(),
            args,
        }
    }

    /// `string.contains_i=$d.name=,"needle"`
    pub fn contains(key: &str, needle: &str) -> Self {
        Command::call(
            "string.contains_i",
            vec![Arg::Raw(format!("${}", key)), Arg::Str(needle.to_string())],
        )
    }

    /// `equal=d.name=,cat=`, true for empty values.
    pub fn empty(key: &str) -> Self {
        Command::call(
            "equal",
            vec![Arg::Raw(key.to_string()), Arg::Raw("cat=".to_string())],
        )
    }

    /// `greater=d.size_bytes=,value=N`, for commands returning plain integers.
    pub fn compare(comparison: &str, key: &str, value: i64) -> Self {
        Command::call(
            comparison,
            vec![Arg::Raw(key.to_string()), Arg::Raw(format!("value={}", value))],
        )
    }

    /// `greater=value=$d.ratio=,value=N`, coercing the command result to a number first.
    pub fn compare_value(comparison: &str, key: &str, value: i64) -> Self {
        Command::call(
            comparison,
            vec![
                Arg::Raw(format!("value=${}", key)),
                Arg::Raw(format!("value={}", value)),
            ],
        )
    }

    /// Logical negation, collapsing a double negation into the original command.
    pub fn negate(self) -> Self {
        match self {
            Command::Not(inner) => *inner,
            other => Command::Not(Box::new(other)),
        }
    }

    /// A command passed as an argument to another one: `"$<escaped command>"`.
    fn nested(&self) -> String {
        format!("\"${}\"", escape(&self.to_string()))
    }

    fn write_list(f: &mut fmt::Formatter<'_>, name: &str, commands: &[Command]) -> fmt::Result {
        let nested: Vec<String> = commands.iter().map(Command::nested).collect();
        write!(f, "{}={{{}}}", name, nested.join(","))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Call { name, args } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Raw(raw) => raw.clone(),
                        Arg::Str(s) => format!("\"{}\"", escape(s)),
                    })
                    .collect();
                write!(f, "{}={}", name, args.join(","))
            }
            Command::Not(inner) => write!(f, "not={}", inner.nested()),
            Command::And(commands) => Command::write_list(f, "and", commands),
            Command::Or(commands) => Command::write_list(f, "or", commands),
        }
    }
}

/// A rendered pre-filter and whether it selects exactly the matching items.
#[derive(Debug, Clone, PartialEq)]
pub struct PreFilter {
    pub command: Command,
    pub exact: bool,
}

impl PreFilter {
    pub fn exact(command: Command) -> Self {
        Self {
            command,
            exact: true,
        }
    }

    pub fn superset(command: Command) -> Self {
        Self {
            command,
            exact: false,
        }
    }

    /// Negating a superset could exclude true matches, so only exact filters negate.
    pub fn negate(self) -> Option<Self> {
        self.exact.then(|| PreFilter::exact(self.command.negate()))
    }

    pub fn all_of(mut filters: Vec<PreFilter>) -> Option<Self> {
        if filters.len() <= 1 {
            return filters.pop();
        }
        let exact = filters.iter().all(|f| f.exact);
        Some(PreFilter {
            command: Command::And(filters.into_iter().map(|f| f.command).collect()),
            exact,
        })
    }

    pub fn any_of(mut filters: Vec<PreFilter>) -> Option<Self> {
        if filters.len() <= 1 {
            return filters.pop();
        }
        let exact = filters.iter().all(|f| f.exact);
        Some(PreFilter {
            command: Command::Or(filters.into_iter().map(|f| f.command).collect()),
            exact,
        })
    }
}

impl fmt::Display for PreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.command.fmt(f)
    }
}

/// `string.contains_i` filter for a needle, if the needle can be sent at all.
pub fn contains_needle(key: &str, needle: &str) -> Option<PreFilter> {
    (!needle.is_empty() && needle.is_ascii())
        .then(|| PreFilter::superset(Command::contains(key, needle)))
}

/// First of the longest runs.
fn longest(runs: Vec<String>) -> String {
    runs.into_iter()
        .rev()
        .max_by_key(|run| run.chars().count())
        .unwrap_or_default()
}

/// Longest literal part of a shell glob.
pub fn glob_needle(pattern: &str) -> String {
    let mut runs = Vec::new();
    let mut run = String::new();
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' | '?' => runs.push(std::mem::take(&mut run)),
            '[' => {
                runs.push(std::mem::take(&mut run));
                for class_ch in chars.by_ref() {
                    if class_ch == ']' {
                        break;
                    }
                }
            }
            ']' => runs.push(std::mem::take(&mut run)),
            _ => run.push(ch),
        }
    }
    runs.push(run);
    longest(runs)
}

/// Longest literal part of a regex that every match must contain.
///
/// Returns `None` for patterns this simple scan cannot reason about, such as
/// top-level alternation, unbalanced groups or inline flags other than `i`.
pub fn regex_needle(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut runs = Vec::new();
    let mut run = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '\\' => {
                runs.push(std::mem::take(&mut run));
                i += 1;
            }
            '[' => {
                runs.push(std::mem::take(&mut run));
                i = skip_class(&chars, i)?;
            }
            '(' => {
                if inline_flags(&chars[i..]).is_some_and(|flags| flags.chars().any(|f| f != 'i')) {
                    return None;
                }
                runs.push(std::mem::take(&mut run));
                i = skip_group(&chars, i)?;
            }
            '{' => {
                run.pop();
                runs.push(std::mem::take(&mut run));
                while i < chars.len() && chars[i] != '}' {
                    i += 1;
                }
                if i == chars.len() {
                    return None;
                }
            }
            '?' | '*' => {
                run.pop();
                runs.push(std::mem::take(&mut run));
            }
            '|' | ')' | ']' | '}' => return None,
            c if c.is_ascii_alphanumeric() || c == '_' || c == '/' => run.push(c),
            _ => runs.push(std::mem::take(&mut run)),
        }
        i += 1;
    }
    runs.push(run);
    Some(longest(runs))
}

/// Flags of a `(?flags)` or `(?flags:...)` group starting at `group[0]`.
fn inline_flags(group: &[char]) -> Option<String> {
    if group.get(1) != Some(&'?') {
        return None;
    }
    let flags: String = group[2..]
        .iter()
        .take_while(|c| c.is_ascii_alphabetic() || **c == '-')
        .collect();
    let closed = matches!(group.get(2 + flags.len()), Some(':') | Some(')'));
    (!flags.is_empty() && closed).then_some(flags)
}

/// Index of the `]` closing the class opened at `open`.
fn skip_class(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            ']' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the `)` closing the group opened at `open`.
fn skip_group(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => i = skip_class(chars, i)?,
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}
