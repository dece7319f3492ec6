use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error as ThisError;

use crate::dispatch::PhaseTracker;
use crate::error::{Error, Result};
use crate::load::PluginLoader;
use crate::options::OptionRegistry;
use crate::plugin::SpankPlugin;

const REQUIRED: &str = "required";
const OPTIONAL: &str = "optional";

/// One directive of a plugin stack file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub path: String,
    pub required: bool,
    pub argv: Vec<String>,
}

fn keyword_matches(keyword: &str, token: &str) -> bool {
    keyword
        .get(..token.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(token))
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ParseError {
    #[error("invalid option \"{0}\", must be either required or optional")]
    BadKeyword(String),
    #[error("missing plugin path after \"{0}\"")]
    MissingPath(String),
}

/// Parses `(required|optional) <path> [arg]...`. Blank and comment-only lines
/// yield `Ok(None)`.
pub fn parse_line(line: &str) -> std::result::Result<Option<StackEntry>, ParseError> {
    let line = match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let mut tokens = line.split_whitespace();
    let Some(keyword) = tokens.next() else {
        return Ok(None);
    };
    let required = if keyword_matches(REQUIRED, keyword) {
        true
    } else if keyword_matches(OPTIONAL, keyword) {
        false
    } else {
        return Err(ParseError::BadKeyword(keyword.to_string()));
    };
    let Some(path) = tokens.next() else {
        return Err(ParseError::MissingPath(keyword.to_string()));
    };
    Ok(Some(StackEntry {
        path: path.to_string(),
        required,
        argv: tokens.map(str::to_string).collect(),
    }))
}

/// Resolves a relative plugin path against a colon-separated search list. The
/// first candidate the loader can peek wins; otherwise `path` is returned as is.
pub fn resolve_path(path: &str, search: &str, loader: &dyn PluginLoader) -> PathBuf {
    let original = Path::new(path);
    if original.is_absolute() {
        return original.to_path_buf();
    }
    search
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(path))
        .find(|candidate| loader.peek(candidate))
        .unwrap_or_else(|| original.to_path_buf())
}

pub struct PluginRecord {
    pub(crate) fq_path: PathBuf,
    pub(crate) required: bool,
    pub(crate) argv: Vec<String>,
    pub(crate) plugin: Box<dyn SpankPlugin>,
}

impl PluginRecord {
    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn path(&self) -> &Path {
        &self.fq_path
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Ordered list of active plugins and the options they contributed.
///
/// `options` is declared first so cached callbacks drop before the plugin
/// images they point into.
pub struct PluginStack {
    pub(crate) options: OptionRegistry,
    pub(crate) plugins: Vec<PluginRecord>,
    pub(crate) tracker: PhaseTracker,
}

impl Default for PluginStack {
    fn default() -> Self {
        Self::new(OptionRegistry::new())
    }
}

impl PluginStack {
    pub fn new(options: OptionRegistry) -> Self {
        Self {
            options,
            plugins: Vec::new(),
            tracker: PhaseTracker::default(),
        }
    }

    /// Loads the stack described by `config`. A missing file yields an empty stack.
    pub fn load(config: &Path, plugin_dir: &str, loader: &dyn PluginLoader) -> Result<Self> {
        let mut stack = Self::default();
        stack.load_config(config, plugin_dir, loader)?;
        Ok(stack)
    }

    /// Appends the plugins listed in `config`. If a required plugin fails to
    /// load the whole stack is torn down, including plugins added earlier.
    pub fn load_config(
        &mut self,
        config: &Path,
        plugin_dir: &str,
        loader: &dyn PluginLoader,
    ) -> Result<()> {
        tracing::info!(path = %config.display(), "opening plugin stack");
        let file = match File::open(config) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %config.display(), "no plugin stack file");
                return Ok(());
            }
            Err(err) => return Err(Error::io_at(config, err)),
        };
        let result = self.load_lines(BufReader::new(file), config, plugin_dir, loader);
        if result.is_err() {
            self.teardown();
        }
        result
    }

    fn load_lines(
        &mut self,
        reader: impl BufRead,
        config: &Path,
        plugin_dir: &str,
        loader: &dyn PluginLoader,
    ) -> Result<()> {
        let file = config.display().to_string();
        for (index, line) in reader.lines().enumerate() {
            let line_no = index + 1;
            let line = line.map_err(|err| Error::io_at(config, err))?;
            let entry = match parse_line(&line) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(parse) => {
                    let err = Error::invalid_line(&file, line_no, parse.to_string());
                    tracing::error!(error = %err, "invalid plugin stack line, ignoring");
                    continue;
                }
            };

            let path = resolve_path(&entry.path, plugin_dir, loader);
            match loader.load(&path) {
                Ok(plugin) => {
                    tracing::info!(
                        plugin = %plugin.name(),
                        path = %path.display(),
                        "loaded plugin"
                    );
                    self.push(path, entry.required, entry.argv, plugin);
                }
                Err(source) if entry.required => {
                    tracing::error!(
                        file = %file,
                        line = line_no,
                        path = %path.display(),
                        error = %source,
                        "failed to load required plugin, aborting"
                    );
                    return Err(Error::RequiredPlugin {
                        file,
                        line: line_no,
                        path,
                        source: Box::new(source),
                    });
                }
                Err(source) => {
                    tracing::info!(
                        file = %file,
                        line = line_no,
                        path = %path.display(),
                        error = %source,
                        "failed to load optional plugin, ignored"
                    );
                }
            }
        }
        Ok(())
    }

    /// Appends a loaded plugin and caches its options.
    pub fn push(
        &mut self,
        path: impl Into<PathBuf>,
        required: bool,
        argv: Vec<String>,
        plugin: Box<dyn SpankPlugin>,
    ) {
        self.options.cache_options(plugin.name(), plugin.options());
        self.plugins.push(PluginRecord {
            fq_path: path.into(),
            required,
            argv,
            plugin,
        });
    }

    pub fn plugins(&self) -> &[PluginRecord] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn options(&self) -> &OptionRegistry {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut OptionRegistry {
        &mut self.options
    }

    /// Drops the option cache, then every plugin.
    pub fn teardown(&mut self) {
        self.options.clear();
        self.plugins.clear();
    }
}

#[cfg(test)]
mod tests;
