use std::collections::HashSet;
use std::io::{self, Write};

use parking_lot::Mutex;
use stepd_plugin_api::SPANK_OPTION_MAXLEN;
use stepd_proto::JobOptions;

use crate::error::{Error, Result};
use crate::plugin::SpankOption;

/// First identifier handed out to plugin options.
pub const SPANK_OPTVAL_BASE: i32 = 0xfff;
/// Job-options kind tag for forwarded plugin options.
pub const OPT_TYPE_SPANK: u32 = 0x4400;
/// Longest forwarded `name:plugin` key accepted on the execution side.
pub const MAX_FORWARDED_KEY_LEN: usize = 255;

const DEFAULT_COLUMNS: usize = 80;

/// Monotonic option id source, safe to draw from on any thread.
#[derive(Debug)]
pub struct OptionIdAllocator {
    next: Mutex<i32>,
}

impl OptionIdAllocator {
    pub fn new() -> Self {
        Self {
            next: Mutex::new(SPANK_OPTVAL_BASE),
        }
    }

    pub fn next_id(&self) -> i32 {
        let mut next = self.next.lock();
        let id = *next;
        *next += 1;
        id
    }
}

impl Default for OptionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct OptionRecord {
    opt: SpankOption,
    plugin: String,
    optval: i32,
    found: bool,
    disabled: bool,
    optarg: Option<String>,
}

impl OptionRecord {
    pub fn option(&self) -> &SpankOption {
        &self.opt
    }

    pub fn name(&self) -> &str {
        &self.opt.name
    }

    /// Name of the plugin that contributed the option.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn optval(&self) -> i32 {
        self.optval
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn optarg(&self) -> Option<&str> {
        self.optarg.as_deref()
    }
}

/// Entry of a merged command-line option table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub name: String,
    pub has_arg: bool,
    /// Dispatch key handed back to [`OptionRegistry::dispatch`] for plugin options.
    pub val: i32,
}

impl OptionEntry {
    pub fn new(name: impl Into<String>, has_arg: bool, val: i32) -> Self {
        Self {
            name: name.into(),
            has_arg,
            val,
        }
    }
}

/// Options contributed by the loaded plugins, in load order.
#[derive(Debug, Default)]
pub struct OptionRegistry {
    ids: OptionIdAllocator,
    records: Vec<OptionRecord>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign_id(&self) -> i32 {
        self.ids.next_id()
    }

    pub fn records(&self) -> &[OptionRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Caches one plugin's option table. A name already cached from any plugin
    /// is kept but disabled, since the other side may load plugins in a
    /// different order. Returns the number of records appended.
    pub fn cache_options(&mut self, plugin: &str, options: Vec<SpankOption>) -> usize {
        let mut cached = 0;
        for opt in options {
            if opt.name.len() > SPANK_OPTION_MAXLEN {
                tracing::error!(
                    plugin = %plugin,
                    option = %opt.name,
                    max_len = SPANK_OPTION_MAXLEN,
                    "plugin option name too long, ignoring"
                );
                continue;
            }
            let disabled = self.records.iter().any(|r| r.opt.name == opt.name);
            if disabled {
                tracing::info!(
                    plugin = %plugin,
                    option = %opt.name,
                    "plugin option conflicts with an earlier plugin, disabling"
                );
            }
            self.records.push(OptionRecord {
                optval: self.assign_id(),
                plugin: plugin.to_string(),
                opt,
                found: false,
                disabled,
                optarg: None,
            });
            cached += 1;
        }
        cached
    }

    /// Returns `base` followed by one entry per enabled plugin option. Plugin
    /// options whose name is already taken are disabled and left out.
    pub fn build_merged_table(&mut self, base: &[OptionEntry]) -> Vec<OptionEntry> {
        let mut table = base.to_vec();
        let mut taken: HashSet<String> = base.iter().map(|e| e.name.clone()).collect();
        for record in self.records.iter_mut().filter(|r| !r.disabled) {
            if !taken.insert(record.opt.name.clone()) {
                tracing::error!(
                    plugin = %record.plugin,
                    option = %record.opt.name,
                    "plugin option conflicts with an existing option, disabling"
                );
                record.disabled = true;
                continue;
            }
            table.push(OptionEntry::new(
                record.opt.name.clone(),
                record.opt.has_arg,
                record.optval,
            ));
        }
        table
    }

    /// Handles a plugin option seen on the launcher command line.
    pub fn dispatch(&mut self, optval: i32, arg: Option<&str>) -> Result<()> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.optval == optval)
            .ok_or(Error::UnknownOption(optval))?;

        let rc = record.opt.invoke(arg, false);
        if rc < 0 {
            return Err(Error::OptionCallback {
                name: record.opt.name.clone(),
                plugin: record.plugin.clone(),
                rc,
            });
        }
        if record.opt.has_arg {
            record.optarg = arg.map(str::to_string);
        }
        record.found = true;
        Ok(())
    }

    /// Appends every option set on the command line as a `name:plugin` entry.
    pub fn serialize_found(&self, sink: &mut JobOptions) {
        for record in self.records.iter().filter(|r| r.found && !r.disabled) {
            sink.append(
                OPT_TYPE_SPANK,
                format!("{}:{}", record.opt.name, record.plugin),
                record.optarg.clone(),
            );
        }
    }

    /// Replays forwarded options into their callbacks with `remote == true`.
    /// Entries that cannot be resolved are logged and skipped. Returns the
    /// number of callbacks that accepted their option.
    pub fn deserialize_and_apply(&self, source: &JobOptions) -> usize {
        let mut applied = 0;
        for entry in source.of_kind(OPT_TYPE_SPANK) {
            let key = entry.option.as_str();
            if key.len() > MAX_FORWARDED_KEY_LEN {
                tracing::error!(key_len = key.len(), "forwarded plugin option key too long");
                continue;
            }
            let Some((name, plugin)) = key.split_once(':') else {
                tracing::error!(key = %key, "malformed forwarded plugin option");
                continue;
            };
            let Some(record) = self
                .records
                .iter()
                .find(|r| r.plugin == plugin && r.opt.name == name)
            else {
                tracing::error!(
                    plugin = %plugin,
                    option = %name,
                    "failed to find forwarded plugin option"
                );
                continue;
            };
            let rc = record.opt.invoke(entry.optarg.as_deref(), true);
            if rc < 0 {
                tracing::error!(
                    plugin = %plugin,
                    option = %name,
                    rc,
                    "invalid forwarded plugin option"
                );
                continue;
            }
            applied += 1;
        }
        applied
    }

    /// Prints help for enabled plugin options, wrapped to `$COLUMNS`.
    pub fn render_help(
        &self,
        out: &mut dyn Write,
        left_pad: usize,
        width: usize,
    ) -> io::Result<()> {
        self.render_help_with_columns(out, left_pad, width, term_columns())
    }

    pub fn render_help_with_columns(
        &self,
        out: &mut dyn Write,
        left_pad: usize,
        width: usize,
        columns: usize,
    ) -> io::Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        writeln!(out, "Options provided by plugins:")?;
        for record in self.records.iter().filter(|r| !r.disabled) {
            print_option(out, &record.opt, left_pad, width, columns)?;
        }
        Ok(())
    }
}

fn term_columns() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_COLUMNS)
}

fn print_option(
    out: &mut dyn Write,
    opt: &SpankOption,
    left_pad: usize,
    width: usize,
    columns: usize,
) -> io::Result<()> {
    let descrsiz = columns.saturating_sub(width).max(2);
    let mut info = match &opt.arginfo {
        Some(arginfo) => format!("{:left_pad$}--{}={}", "", opt.name, arginfo),
        None => format!("{:left_pad$}--{}", "", opt.name),
    };
    let n = info.chars().count();
    if n > columns {
        info = info.chars().take(columns.saturating_sub(2)).collect();
        info.push('+');
    }

    let usage: Vec<char> = opt.usage.chars().collect();
    let mut pos = 0;
    let first = next_segment(&usage, &mut pos, descrsiz).unwrap_or_default();
    if n < width {
        writeln!(out, "{info:<width$}{first}")?;
    } else {
        writeln!(out, "\n{info}\n{:width$}{first}", "")?;
    }
    while let Some(seg) = next_segment(&usage, &mut pos, descrsiz) {
        writeln!(out, "{:width$}{seg}", "")?;
    }
    Ok(())
}

/// Next line of at most `width` characters starting at `pos`. Breaks at the
/// last whitespace that fits; a word longer than the line is split with `-`.
fn next_segment(text: &[char], pos: &mut usize, width: usize) -> Option<String> {
    let rest = &text[*pos..];
    if rest.is_empty() {
        return None;
    }
    if rest.len() <= width {
        *pos = text.len();
        return Some(rest.iter().collect());
    }

    let mut p = width;
    while p != 0 && !rest[p].is_whitespace() {
        p -= 1;
    }
    let next = p + 1;
    while p != 0 && rest[p].is_whitespace() {
        p -= 1;
    }
    if p == 0 {
        let mut seg: String = rest[..width - 1].iter().collect();
        seg.push('-');
        *pos += width - 1;
        return Some(seg);
    }
    *pos += next;
    Some(rest[..=p].iter().collect())
}
