use bstr::{BStr, BString, ByteSlice};

use crate::parse;
use crate::ConfigError;

/// One `key = value` occurrence, in file order.
///
/// Section and key names are stored lower-cased (they compare
/// case-insensitively); subsection names keep their case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub section: String,
    pub subsection: Option<String>,
    pub name: String,
    /// `None` for a bare key (`[core]\n\tbare`), which reads as true.
    pub value: Option<BString>,
}

/// One parsed config file, order preserved.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    entries: Vec<ConfigEntry>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            entries: parse::parse(text)?,
        })
    }

    /// Read and parse a file; a missing file is an empty scope.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn entries(&self) -> &[ConfigEntry] {
        &self.entries
    }

    /// The key's effective value within this file: last definition wins.
    /// Outer `None`: key absent. Inner `None`: present without value.
    pub fn get(
        &self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
    ) -> Option<Option<&BStr>> {
        self.matching(section, subsection, name)
            .last()
            .map(|e| e.value.as_ref().map(|v| v.as_bstr()))
    }

    /// Every value of the key, in file order.
    pub fn get_all(
        &self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
    ) -> Vec<Option<&BStr>> {
        self.matching(section, subsection, name)
            .map(|e| e.value.as_ref().map(|v| v.as_bstr()))
            .collect()
    }

    /// Replace all definitions of the key with one value.
    pub fn set(
        &mut self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
        value: impl Into<BString>,
    ) {
        let section = section.to_ascii_lowercase();
        let name = name.to_ascii_lowercase();
        self.entries.retain(|e| {
            !(e.section == section
                && e.subsection.as_deref() == subsection
                && e.name == name)
        });
        self.entries.push(ConfigEntry {
            section,
            subsection: subsection.map(String::from),
            name,
            value: Some(value.into()),
        });
    }

    /// Append an additional value (multi-valued key).
    pub fn add(
        &mut self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
        value: impl Into<BString>,
    ) {
        self.entries.push(ConfigEntry {
            section: section.to_ascii_lowercase(),
            subsection: subsection.map(String::from),
            name: name.to_ascii_lowercase(),
            value: Some(value.into()),
        });
    }

    /// Drop every definition of the key. Returns whether any existed.
    pub fn unset(&mut self, section: &str, subsection: Option<&str>, name: &str) -> bool {
        let section = section.to_ascii_lowercase();
        let name = name.to_ascii_lowercase();
        let before = self.entries.len();
        self.entries.retain(|e| {
            !(e.section == section
                && e.subsection.as_deref() == subsection
                && e.name == name)
        });
        self.entries.len() != before
    }

    /// Render back to text, grouping consecutive same-section entries.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut current: Option<(&str, Option<&str>)> = None;
        for entry in &self.entries {
            let header = (entry.section.as_str(), entry.subsection.as_deref());
            if current != Some(header) {
                match header.1 {
                    Some(sub) => {
                        out.push_str(&format!("[{} \"{}\"]\n", header.0, escape_sub(sub)))
                    }
                    None => out.push_str(&format!("[{}]\n", header.0)),
                }
                current = Some(header);
            }
            match &entry.value {
                Some(value) => {
                    out.push_str(&format!("\t{} = {}\n", entry.name, render_value(value)))
                }
                None => out.push_str(&format!("\t{}\n", entry.name)),
            }
        }
        out
    }

    fn matching<'a>(
        &'a self,
        section: &str,
        subsection: Option<&str>,
        name: &str,
    ) -> impl Iterator<Item = &'a ConfigEntry> {
        let section = section.to_ascii_lowercase();
        let subsection = subsection.map(String::from);
        let name = name.to_ascii_lowercase();
        self.entries.iter().filter(move |e| {
            e.section == section && e.subsection == subsection && e.name == name
        })
    }
}

fn escape_sub(sub: &str) -> String {
    sub.replace('\\', "\\\\").replace('"', "\\\"")
}

fn render_value(value: &BString) -> String {
    let text = String::from_utf8_lossy(value);
    let needs_quotes = text.starts_with(' ')
        || text.ends_with(' ')
        || text.contains('#')
        || text.contains(';');
    let escaped = text
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t");
    if needs_quotes {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}
