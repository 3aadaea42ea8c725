// src/formatting.rs

use crate::core::{Formatter, LogEvent};
use crate::error::PatternError;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use std::fmt::Write;

/// Pattern used for file output when none is configured.
pub const DEFAULT_PATTERN: &str = "[%d] %-5level %logger - %msg%n";
/// Pattern used for alert bodies.
pub const ALERT_PATTERN: &str = "[%d{%Y-%m-%d %H:%M:%S}] %-5level %logger - %msg%n";

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq)]
enum Field {
    Literal(String),
    Date(String),
    Level,
    Logger,
    Thread,
    Message,
    Newline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Padding {
    left_align: bool,
    width: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    field: Field,
    padding: Option<Padding>,
}

/// A formatter compiled from a conversion pattern such as
/// `[%d] %-5level %logger - %msg%n`.
///
/// Supported conversions: `%d` / `%d{strftime}`, `%level` (`%p`), `%logger`
/// (`%c`, any `{n}` argument is ignored), `%thread` (`%t`), `%msg` (`%m`),
/// `%n` and `%%`. A `-N` or `N` prefix pads the field to `N` characters.
/// Unknown conversions are copied through literally.
#[derive(Debug, Clone)]
pub struct PatternFormatter {
    pattern: String,
    segments: Vec<Segment>,
}

impl PatternFormatter {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        Ok(Self {
            pattern: pattern.to_string(),
            segments: parse(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Formatter for PatternFormatter {
    fn format(&self, event: &LogEvent) -> String {
        let mut out = String::with_capacity(self.pattern.len() + event.message.len() + 32);
        for segment in &self.segments {
            let value = match &segment.field {
                Field::Literal(text) => {
                    out.push_str(text);
                    continue;
                }
                Field::Newline => {
                    out.push('\n');
                    continue;
                }
                Field::Date(format) => event
                    .timestamp
                    .with_timezone(&Local)
                    .format(format)
                    .to_string(),
                Field::Level => event.severity.as_str().to_string(),
                Field::Logger => event.application.clone(),
                Field::Thread => event.thread.clone(),
                Field::Message => event.message.clone(),
            };
            match segment.padding {
                Some(Padding { left_align: true, width }) => {
                    let _ = write!(out, "{:<width$}", value, width = width);
                }
                Some(Padding { left_align: false, width }) => {
                    let _ = write!(out, "{:>width$}", value, width = width);
                }
                None => out.push_str(&value),
            }
        }
        out
    }
}

fn parse(pattern: &str) -> Result<Vec<Segment>, PatternError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            literal.push(chars[i]);
            i += 1;
            continue;
        }

        let start = i;
        i += 1;
        if i < chars.len() && chars[i] == '%' {
            literal.push('%');
            i += 1;
            continue;
        }

        let left_align = i < chars.len() && chars[i] == '-';
        if left_align {
            i += 1;
        }
        let mut width = String::new();
        while i < chars.len() && chars[i].is_ascii_digit() {
            width.push(chars[i]);
            i += 1;
        }
        let mut name = String::new();
        while i < chars.len() && chars[i].is_ascii_alphabetic() {
            name.push(chars[i]);
            i += 1;
        }
        let mut argument = None;
        if i < chars.len() && chars[i] == '{' {
            let close = chars[i..]
                .iter()
                .position(|c| *c == '}')
                .ok_or(PatternError::UnclosedBrace(i))?;
            argument = Some(chars[i + 1..i + close].iter().collect::<String>());
            i += close + 1;
        }

        let field = match name.as_str() {
            "d" | "date" => {
                let format = argument.unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
                if StrftimeItems::new(&format).any(|item| matches!(item, Item::Error)) {
                    return Err(PatternError::InvalidDateFormat(format));
                }
                Field::Date(format)
            }
            "level" | "le" | "p" => Field::Level,
            "logger" | "lo" | "c" => Field::Logger,
            "thread" | "t" => Field::Thread,
            "msg" | "m" | "message" => Field::Message,
            "n" => Field::Newline,
            _ => {
                literal.extend(&chars[start..i]);
                continue;
            }
        };

        if !literal.is_empty() {
            segments.push(Segment {
                field: Field::Literal(std::mem::take(&mut literal)),
                padding: None,
            });
        }
        let padding = width.parse::<usize>().ok().map(|width| Padding { left_align, width });
        segments.push(Segment { field, padding });
    }

    if !literal.is_empty() {
        segments.push(Segment {
            field: Field::Literal(literal),
            padding: None,
        });
    }
    Ok(segments)
}
