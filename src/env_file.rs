//! `.env` loading. Variables already present in the process environment win
//! over the file.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
    pub applied: usize,
}

/// Loads `explicit` if given (it must exist), else `./.env` when present.
pub fn load(explicit: Option<&Path>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, is_explicit) = match explicit {
        Some(p) if !p.is_file() => return Err(format!("env file not found: {}", p.display())),
        Some(p) => (p.to_path_buf(), true),
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {e}"))?;
            let default_path = cwd.join(".env");
            if !default_path.is_file() {
                return Ok(None);
            }
            (default_path, false)
        }
    };

    let text = fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let mut applied = 0;
    for (key, value) in parse(&text).map_err(|(line, e)| format!("{}:{line}: {e}", path.display()))? {
        if std::env::var_os(&key).is_none() {
            // SAFETY: called from `main` before logging or any other thread starts.
            unsafe { std::env::set_var(&key, value) };
            applied += 1;
        }
    }
    Ok(Some(LoadedEnvFile {
        path,
        explicit: is_explicit,
        applied,
    }))
}

/// Parses `KEY=value` lines; errors carry the 1-based line number.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_line(line).map_err(|e| (idx + 1, e)).transpose())
        .collect()
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
    let (key, raw) = line.split_once('=').ok_or("missing '=' in assignment")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("variable name contains whitespace: {key}"));
    }
    Ok(Some((key.to_string(), parse_value(raw.trim())?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    if let Some(rest) = raw.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => return Err("unterminated escape in double-quoted value".to_string()),
                },
                '"' => return closing_tail(chars.as_str()).map(|_| out),
                other => out.push(other),
            }
        }
        Err("unterminated double-quoted value".to_string())
    } else if let Some(rest) = raw.strip_prefix('\'') {
        let (value, tail) = rest.split_once('\'').ok_or("unterminated single-quoted value")?;
        closing_tail(tail).map(|_| value.to_string())
    } else {
        Ok(raw.split('#').next().unwrap_or_default().trim_end().to_string())
    }
}

// Only a comment may follow a closing quote.
fn closing_tail(tail: &str) -> Result<(), String> {
    let tail = tail.trim();
    if tail.is_empty() || tail.starts_with('#') {
        Ok(())
    } else {
        Err("unexpected characters after closing quote".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        let text = r#"
# local settings
DATABASE_URL=postgres://u:p@db/energy   # trailing comment
export FORECAST_URL = "http://f:8000/forecast"
NOTE="line\nbreak"
RAW='a # b'
EMPTY=
"#;
        let vars = parse(text).unwrap();
        assert_eq!(
            vars,
            vec![
                ("DATABASE_URL".into(), "postgres://u:p@db/energy".into()),
                ("FORECAST_URL".into(), "http://f:8000/forecast".into()),
                ("NOTE".into(), "line\nbreak".into()),
                ("RAW".into(), "a # b".into()),
                ("EMPTY".into(), String::new()),
            ]
        );
    }

    #[test]
    fn reports_line_of_malformed_entry() {
        assert_eq!(parse("A=1\nB\n").unwrap_err().0, 2);
        assert!(parse("A=\"open").is_err());
        assert!(parse("A='x' y").is_err());
        assert!(parse("MY KEY=1").is_err());
    }
}
