//! The config line syntax.
//!
//! `[section]` or `[section "subsection"]` headers, `name = value`
//! lines, `#`/`;` comments, double-quoted spans with `\\ \" \n \t`
//! escapes, and backslash line continuation.

use bstr::BString;

use crate::file::ConfigEntry;
use crate::ConfigError;

pub(crate) fn parse(text: &str) -> Result<Vec<ConfigEntry>, ConfigError> {
    let mut entries = Vec::new();
    let mut section: Option<(String, Option<String>)> = None;

    let mut lines = text.lines().enumerate().peekable();
    while let Some((lineno, raw)) = lines.next() {
        let lineno = lineno + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') {
            section = Some(parse_section_header(line, lineno)?);
            continue;
        }

        let Some((current_section, current_sub)) = section.clone() else {
            return Err(ConfigError::Parse {
                line: lineno,
                reason: "key outside any section".into(),
            });
        };

        // Collect continuation lines (trailing backslash).
        let mut logical = line.to_string();
        while logical.ends_with('\\') && !logical.ends_with("\\\\") {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => {
                    return Err(ConfigError::Parse {
                        line: lineno,
                        reason: "dangling line continuation".into(),
                    })
                }
            }
        }

        let (name, value) = split_key_value(&logical, lineno)?;
        if name.is_empty() || !name.chars().next().unwrap().is_ascii_alphabetic() {
            return Err(ConfigError::Parse {
                line: lineno,
                reason: format!("bad key name: {name}"),
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ConfigError::Parse {
                line: lineno,
                reason: format!("bad key name: {name}"),
            });
        }

        entries.push(ConfigEntry {
            section: current_section,
            subsection: current_sub,
            name: name.to_ascii_lowercase(),
            value,
        });
    }

    Ok(entries)
}

fn parse_section_header(
    line: &str,
    lineno: usize,
) -> Result<(String, Option<String>), ConfigError> {
    let bad = |reason: &str| ConfigError::Parse {
        line: lineno,
        reason: reason.into(),
    };

    let end = line.find(']').ok_or_else(|| bad("unterminated section header"))?;
    if !line[end + 1..].trim().is_empty() && !line[end + 1..].trim_start().starts_with(['#', ';'])
    {
        return Err(bad("trailing junk after section header"));
    }
    let inner = &line[1..end];

    if let Some(quote) = inner.find('"') {
        let section = inner[..quote].trim().to_ascii_lowercase();
        let quoted = &inner[quote..];
        if !quoted.ends_with('"') || quoted.len() < 2 {
            return Err(bad("unterminated subsection name"));
        }
        let mut sub = String::new();
        let mut chars = quoted[1..quoted.len() - 1].chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some(escaped) => sub.push(escaped),
                    None => return Err(bad("dangling escape in subsection")),
                }
            } else {
                sub.push(c);
            }
        }
        validate_section_name(&section, lineno)?;
        return Ok((section, Some(sub)));
    }

    // Legacy dotted form: [section.subsection]
    if let Some(dot) = inner.find('.') {
        let section = inner[..dot].trim().to_ascii_lowercase();
        let sub = inner[dot + 1..].trim().to_string();
        validate_section_name(&section, lineno)?;
        return Ok((section, Some(sub)));
    }

    let section = inner.trim().to_ascii_lowercase();
    validate_section_name(&section, lineno)?;
    Ok((section, None))
}

fn validate_section_name(section: &str, lineno: usize) -> Result<(), ConfigError> {
    if section.is_empty()
        || !section
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Parse {
            line: lineno,
            reason: format!("bad section name: {section}"),
        });
    }
    Ok(())
}

fn split_key_value(
    logical: &str,
    lineno: usize,
) -> Result<(String, Option<BString>), ConfigError> {
    match logical.split_once('=') {
        None => {
            // Bare key: implicit true.
            let name = strip_comment(logical).trim().to_string();
            Ok((name, None))
        }
        Some((name, value)) => {
            let value = parse_value(value.trim_start(), lineno)?;
            Ok((name.trim().to_string(), Some(value)))
        }
    }
}

fn strip_comment(text: &str) -> &str {
    match text.find(['#', ';']) {
        Some(at) => &text[..at],
        None => text,
    }
}

fn parse_value(text: &str, lineno: usize) -> Result<BString, ConfigError> {
    let mut out = Vec::new();
    let mut chars = text.chars().peekable();
    let mut in_quotes = false;
    // Trailing unquoted whitespace is stripped at the end.
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' => match chars.next() {
                Some('n') => out.push(b'\n'),
                Some('t') => out.push(b'\t'),
                Some('b') => out.push(0x08),
                Some('"') => out.push(b'"'),
                Some('\\') => out.push(b'\\'),
                Some(other) => {
                    return Err(ConfigError::Parse {
                        line: lineno,
                        reason: format!("bad escape: \\{other}"),
                    })
                }
                None => {
                    return Err(ConfigError::Parse {
                        line: lineno,
                        reason: "dangling escape".into(),
                    })
                }
            },
            '#' | ';' if !in_quotes => break,
            other => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    if in_quotes {
        return Err(ConfigError::Parse {
            line: lineno,
            reason: "unterminated quote".into(),
        });
    }
    while out.last().is_some_and(|b| *b == b' ' || *b == b'\t') {
        out.pop();
    }
    Ok(BString::from(out))
}
