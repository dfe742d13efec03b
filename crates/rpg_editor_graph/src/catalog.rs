// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command catalog loaded from script file headers.
//!
//! Every command lives in its own script file. The three lines right above the
//! entry function declare the command:
//!
//! ```text
//! # name: Say
//! # params: [speaker, text]
//! # nexts: [Next]
//! def execute(speaker, text):
//! ```
//!
//! The header lines may appear in any order. Files that break this contract
//! are skipped and logged; a load never fails as a whole.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and how command scripts are discovered under an authoring root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Command directory, relative to the authoring root
    pub commands_dir: PathBuf,
    /// Script file extension (without the dot)
    pub extension: String,
    /// Prefix of the line that opens the command's entry function
    pub entry_marker: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            commands_dir: PathBuf::from("data").join("commands"),
            extension: "py".to_string(),
            entry_marker: "def execute".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Absolute command directory for an authoring root
    pub fn commands_path(&self, root: &Path) -> PathBuf {
        root.join(&self.commands_dir)
    }
}

/// One kind of executable step an author can place as a node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Stable identifier (script file stem)
    pub id: String,
    /// Human-readable name from the header
    pub display_name: String,
    /// Parameter names in binding order
    pub parameters: Vec<String>,
    /// Branch labels in port order
    pub branches: Vec<String>,
}

impl CommandDescriptor {
    /// Number of output ports a node of this kind exposes
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }
}

/// Why a single script file was left out of the catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogParseError {
    /// File could not be read
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File stem is not valid UTF-8, so it cannot serve as a command id
    #[error("file name of {0:?} is not valid UTF-8")]
    InvalidFileName(PathBuf),

    /// No entry function, or not enough lines above it for a header
    #[error("no `{0}` line with a header above it")]
    MissingEntryPoint(String),

    /// Header has no `name:` line, or the name is blank
    #[error("header declares no name")]
    MissingName,

    /// Header has no non-empty `params: [...]` list
    #[error("header declares no params")]
    EmptyParams,

    /// Header has no non-empty `nexts: [...]` list
    #[error("header declares no nexts")]
    EmptyNexts,
}

/// Parse one script's source into a descriptor
pub fn parse_command(
    id: &str,
    source: &str,
    entry_marker: &str,
) -> Result<CommandDescriptor, CatalogParseError> {
    let lines: Vec<&str> = source.lines().collect();
    let entry = lines
        .iter()
        .position(|line| line.trim().starts_with(entry_marker))
        .filter(|&index| index >= 2)
        .ok_or_else(|| CatalogParseError::MissingEntryPoint(entry_marker.to_string()))?;

    let mut name = None;
    let mut params = Vec::new();
    let mut nexts = Vec::new();

    for line in &lines[entry.saturating_sub(3)..entry] {
        let comment = strip_comment(line);
        if let Some(rest) = comment.strip_prefix("name:") {
            name = Some(rest.trim().to_string());
        } else if let Some(rest) = comment.strip_prefix("params:") {
            params = bracket_list(rest);
        } else if let Some(rest) = comment.strip_prefix("nexts:") {
            nexts = bracket_list(rest);
        }
    }

    let display_name = name
        .filter(|n| !n.is_empty())
        .ok_or(CatalogParseError::MissingName)?;
    if params.is_empty() {
        return Err(CatalogParseError::EmptyParams);
    }
    if nexts.is_empty() {
        return Err(CatalogParseError::EmptyNexts);
    }

    Ok(CommandDescriptor {
        id: id.to_string(),
        display_name,
        parameters: params,
        branches: nexts,
    })
}

fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    line.strip_prefix('#').unwrap_or(line).trim()
}

/// `" [a, b ,, c]"` -> `["a", "b", "c"]`
fn bracket_list(rest: &str) -> Vec<String> {
    let rest = rest.trim_start();
    let Some(inner) = rest.strip_prefix('[') else {
        return Vec::new();
    };
    let Some(end) = inner.find(']') else {
        return Vec::new();
    };
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Immutable set of command descriptors for one authoring session
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    /// Descriptors by id, kept sorted by id
    commands: IndexMap<String, CommandDescriptor>,
}

impl CommandCatalog {
    /// Build a catalog from descriptors in any order.
    ///
    /// When several descriptors share an id the smallest one (by display name,
    /// then parameters, then branches) is kept, so the result never depends on
    /// input order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = CommandDescriptor>) -> Self {
        let mut commands: IndexMap<String, CommandDescriptor> = IndexMap::new();
        for descriptor in descriptors {
            match commands.get_mut(&descriptor.id) {
                Some(kept) => {
                    tracing::warn!("Duplicate command id {:?}, keeping one definition", descriptor.id);
                    if descriptor < *kept {
                        *kept = descriptor;
                    }
                }
                None => {
                    commands.insert(descriptor.id.clone(), descriptor);
                }
            }
        }
        commands.sort_keys();
        Self { commands }
    }

    /// Load every script under `<root>/<commands_dir>`.
    ///
    /// Unparseable files are skipped with a warning. An unreadable directory
    /// yields an empty catalog.
    pub fn load(root: &Path, config: &CatalogConfig) -> Self {
        let dir = config.commands_path(root);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read command directory {:?}: {e}", dir);
                return Self::default();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_command_script(path, &config.extension) && path.is_file())
            .collect();
        paths.sort();

        let mut descriptors: Vec<CommandDescriptor> = Vec::new();
        for path in paths {
            match load_command(&path, &config.entry_marker) {
                Ok(descriptor) => {
                    if descriptors.iter().any(|d| d.id == descriptor.id) {
                        tracing::warn!("Skipping command script {:?}: id {:?} already defined", path, descriptor.id);
                    } else {
                        descriptors.push(descriptor);
                    }
                }
                Err(e) => tracing::warn!("Skipping command script {:?}: {e}", path),
            }
        }

        let catalog = Self::from_descriptors(descriptors);
        tracing::info!("Loaded {} commands from {:?}", catalog.len(), dir);
        catalog
    }

    /// Get a descriptor by id
    pub fn get(&self, id: &str) -> Option<&CommandDescriptor> {
        self.commands.get(id)
    }

    /// First descriptor (by id) carrying this display name
    pub fn by_display_name(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.values().find(|d| d.display_name == name)
    }

    /// All descriptors, ordered by id
    pub fn commands(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.values()
    }

    /// Display names for the insertion picker, ordered by id
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.commands.values().map(|d| d.display_name.as_str())
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the catalog has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn is_command_script(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}

fn load_command(path: &Path, entry_marker: &str) -> Result<CommandDescriptor, CatalogParseError> {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CatalogParseError::InvalidFileName(path.to_path_buf()))?;
    let source = std::fs::read_to_string(path).map_err(|source| CatalogParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_command(id, &source, entry_marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAY: &str = "\
import engine

# name: Say
# params: [text]
# nexts: [Next]
def execute(text):
    engine.say(text)
";

    fn write(dir: &Path, file: &str, source: &str) {
        std::fs::write(dir.join(file), source).unwrap();
    }

    fn root_with_commands() -> (tempfile::TempDir, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let commands = CatalogConfig::default().commands_path(root.path());
        std::fs::create_dir_all(&commands).unwrap();
        (root, commands)
    }

    #[test]
    fn test_parse_header() {
        let cmd = parse_command("say", SAY, "def execute").unwrap();
        assert_eq!(cmd.id, "say");
        assert_eq!(cmd.display_name, "Say");
        assert_eq!(cmd.parameters, vec!["text"]);
        assert_eq!(cmd.branches, vec!["Next"]);
    }

    #[test]
    fn test_header_order_and_whitespace() {
        let source = "#nexts: [ Yes , No ,]\n#   name:   Ask  \n# params: [question,  default]\n    def execute(q, d):\n";
        let cmd = parse_command("ask", source, "def execute").unwrap();
        assert_eq!(cmd.display_name, "Ask");
        assert_eq!(cmd.parameters, vec!["question", "default"]);
        assert_eq!(cmd.branches, vec!["Yes", "No"]);
    }

    #[test]
    fn test_header_failures() {
        let no_entry = "# name: A\n# params: [x]\n# nexts: [n]\n";
        assert!(matches!(
            parse_command("a", no_entry, "def execute"),
            Err(CatalogParseError::MissingEntryPoint(_))
        ));

        let too_early = "# name: A\ndef execute():\n";
        assert!(matches!(
            parse_command("a", too_early, "def execute"),
            Err(CatalogParseError::MissingEntryPoint(_))
        ));

        let no_name = "# params: [x]\n# nexts: [n]\n# something\ndef execute(x):\n";
        assert!(matches!(
            parse_command("a", no_name, "def execute"),
            Err(CatalogParseError::MissingName)
        ));

        let no_params = "# name: A\n# params: []\n# nexts: [n]\ndef execute():\n";
        assert!(matches!(
            parse_command("a", no_params, "def execute"),
            Err(CatalogParseError::EmptyParams)
        ));

        let no_nexts = "# name: A\n# params: [x]\n# nexts: [ , ]\ndef execute(x):\n";
        assert!(matches!(
            parse_command("a", no_nexts, "def execute"),
            Err(CatalogParseError::EmptyNexts)
        ));
    }

    #[test]
    fn test_header_must_be_adjacent() {
        // Header separated from the entry line by a blank line is not a header
        let source = "# name: A\n# params: [x]\n# nexts: [n]\n\ndef execute(x):\n";
        assert!(parse_command("a", source, "def execute").is_err());
    }

    #[test]
    fn test_load_single_command() {
        let (root, commands) = root_with_commands();
        write(&commands, "say.py", SAY);

        let catalog = CommandCatalog::load(root.path(), &CatalogConfig::default());
        assert_eq!(catalog.len(), 1);
        let cmd = catalog.get("say").unwrap();
        assert_eq!(
            *cmd,
            CommandDescriptor {
                id: "say".to_string(),
                display_name: "Say".to_string(),
                parameters: vec!["text".to_string()],
                branches: vec!["Next".to_string()],
            }
        );
    }

    #[test]
    fn test_load_skips_bad_files() {
        let (root, commands) = root_with_commands();
        write(&commands, "say.py", SAY);
        write(&commands, "broken.py", "def execute():\n    pass\n");
        write(&commands, "notes.txt", SAY);
        std::fs::create_dir(commands.join("nested.py")).unwrap();

        let catalog = CommandCatalog::load(root.path(), &CatalogConfig::default());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("broken").is_none());
        assert!(catalog.get("notes").is_none());
        for cmd in catalog.commands() {
            assert!(!cmd.parameters.is_empty());
            assert!(!cmd.branches.is_empty());
        }
    }

    #[test]
    fn test_missing_directory_gives_empty_catalog() {
        let root = tempfile::tempdir().unwrap();
        let catalog = CommandCatalog::load(root.path(), &CatalogConfig::default());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_catalog_is_order_independent() {
        let a = parse_command("a", &SAY.replace("Say", "Alpha"), "def execute").unwrap();
        let b = parse_command("b", &SAY.replace("Say", "Beta"), "def execute").unwrap();

        let forward = CommandCatalog::from_descriptors(vec![a.clone(), b.clone()]);
        let backward = CommandCatalog::from_descriptors(vec![b, a]);

        let names_fwd: Vec<_> = forward.display_names().collect();
        let names_bwd: Vec<_> = backward.display_names().collect();
        assert_eq!(names_fwd, vec!["Alpha", "Beta"]);
        assert_eq!(names_fwd, names_bwd);
        assert_eq!(forward.by_display_name("Beta").unwrap().id, "b");
    }

    #[test]
    fn test_duplicate_ids_resolve_independent_of_order() {
        let lower = parse_command("say", &SAY.replace("Say", "Lower"), "def execute").unwrap();
        let upper = parse_command("say", &SAY.replace("Say", "Upper"), "def execute").unwrap();

        let forward = CommandCatalog::from_descriptors(vec![lower.clone(), upper.clone()]);
        let backward = CommandCatalog::from_descriptors(vec![upper, lower]);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.get("say").unwrap().display_name, "Lower");
        assert_eq!(backward.get("say").unwrap().display_name, "Lower");
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let (root, commands) = root_with_commands();
        write(&commands, "say.py", &SAY.replace("Say", "Lower"));
        write(&commands, "say.PY", &SAY.replace("Say", "Upper"));

        let catalog = CommandCatalog::load(root.path(), &CatalogConfig::default());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("say").unwrap().display_name, "Lower");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_file_name_is_skipped() {
        use std::os::unix::ffi::OsStrExt;

        let (root, commands) = root_with_commands();
        let path = commands.join(std::ffi::OsStr::from_bytes(b"s\xffy.py"));
        std::fs::write(&path, SAY).unwrap();
        write(&commands, "say.py", SAY);

        assert!(matches!(
            load_command(&path, "def execute"),
            Err(CatalogParseError::InvalidFileName(_))
        ));
        let catalog = CommandCatalog::load(root.path(), &CatalogConfig::default());
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("").is_none());
    }
}
