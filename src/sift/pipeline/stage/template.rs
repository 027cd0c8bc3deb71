// SPDX-License-Identifier: MIT

//! Placeholder substitution for filenames, directories and log lines
//!
//! | Placeholder | Replaced with |
//! |---|---|
//! | `%n` | stage name, lower-cased |
//! | `%r` | result classes as `['a', 'b']`, lower-cased, first 50 characters |
//! | `%R` | result classes as `['a', 'b']`, lower-cased |
//! | `%d` | local time, `YYYY_MM_DD-HH_MM_SS` |
//! | `%a` | random number in `1000..=9999` |
//! | `%c` | client identifier |

use std::path::{Path, PathBuf};

pub const DEFAULT_FILENAME: &str = "%d-%n-%R.wav";
pub const DEFAULT_LOG_LINE: &str = "Stage '%n' -> Result : '%r'";
pub const DEFAULT: &str = "default";

const SHORT_CLASSES_LEN: usize = 50;
const FILENAME_SUFFIX: &str = ".wav";
const FILENAME_EXTRA_CHARS: &str = "-_.(),;!@=+";

/// Everything a template can refer to
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub stage: &'a str,
    pub classes: &'a [String],
    pub client_id: &'a str,
}

impl<'a> TemplateContext<'a> {
    pub fn new(stage: &'a str, classes: &'a [String], client_id: &'a str) -> Self {
        Self {
            stage,
            classes,
            client_id,
        }
    }

    /// Substitute every placeholder, always in the order `%n %r %R %d %a %c`
    pub fn render(&self, template: &str) -> String {
        let classes = list_repr(self.classes).to_lowercase();
        let short: String = classes.chars().take(SHORT_CLASSES_LEN).collect();
        let timestamp = chrono::Local::now().format("%Y_%m_%d-%H_%M_%S").to_string();

        template
            .replace("%n", &self.stage.to_lowercase())
            .replace("%r", &short)
            .replace("%R", &classes)
            .replace("%d", &timestamp)
            .replace("%a", &disambiguator().to_string())
            .replace("%c", self.client_id)
    }

    /// Log line for `line`, where `None` and `default` select the default line
    pub fn log_line(&self, line: Option<&str>) -> String {
        self.render(or_default(line, DEFAULT_LOG_LINE))
    }

    /// Sanitized filename with the `.wav` suffix enforced
    pub fn filename(&self, template: Option<&str>) -> String {
        let rendered = self.render(or_default(template, DEFAULT_FILENAME));
        let mut name = sanitize_filename(&rendered);
        if !name.ends_with(FILENAME_SUFFIX) {
            name.push_str(FILENAME_SUFFIX);
        }
        name
    }

    /// Target directory; the default is `<save_dir>/%c`
    pub fn directory(&self, template: Option<&str>, save_dir: &Path) -> PathBuf {
        match template {
            Some(t) if t != DEFAULT => PathBuf::from(self.render(t)),
            _ => save_dir.join(self.render("%c")),
        }
    }
}

fn or_default<'t>(value: Option<&'t str>, fallback: &'t str) -> &'t str {
    match value {
        Some(v) if v != DEFAULT => v,
        _ => fallback,
    }
}

/// Replace every character outside `[A-Za-z0-9-_.(),;!@=+]` with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || FILENAME_EXTRA_CHARS.contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `['a', 'b']`; labels holding `'` but no `"` are double-quoted instead
fn list_repr(classes: &[String]) -> String {
    let quoted: Vec<String> = classes
        .iter()
        .map(|class| {
            if class.contains('\'') && !class.contains('"') {
                format!("\"{}\"", class.replace('\\', "\\\\"))
            } else {
                format!("'{}'", class.replace('\\', "\\\\").replace('\'', "\\'"))
            }
        })
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn disambiguator() -> u32 {
    (uuid::Uuid::new_v4().as_u128() % 9000) as u32 + 1000
}
