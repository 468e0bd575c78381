use crate::coverage::coverage_control_port;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Launch parameter carrying the port offset, e.g. `-DportOffset=5`.
pub const PORT_OFFSET_KEY: &str = "-DportOffset";

/// Launch parameter carrying whitespace-separated free-form arguments.
pub const CMD_ARG_KEY: &str = "cmdArg";

/// Fallback substring for locating a startup script.
const FALLBACK_SCRIPT_PATTERN: &str = "server";

/// Parameters passed to the server's startup script.
///
/// Each entry becomes `key` or `key=value` on the command line. The
/// [`CMD_ARG_KEY`] entry is special: its value is split on whitespace and
/// appended verbatim. Entries are kept sorted, so the command line derived
/// from a spec is always the same.
///
/// # Examples
///
/// ```
/// use server_harness::server::LaunchSpec;
///
/// let mut spec = LaunchSpec::new();
/// spec.set("-DportOffset", "2");
/// spec.flag("-DosgiConsole");
///
/// assert_eq!(spec.port_offset().unwrap(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    params: BTreeMap<String, Option<String>>,
}

impl LaunchSpec {
    /// Create an empty launch spec
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key=value`
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), Some(value.into()));
        self
    }

    /// Set a bare `key` without a value
    pub fn flag(&mut self, key: impl Into<String>) -> &mut Self {
        self.params.insert(key.into(), None);
        self
    }

    /// Look up a parameter. Flags yield `Some(None)`.
    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.params.get(key).map(|value| value.as_deref())
    }

    /// Number of parameters, the free-form entry included
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether no parameters are set
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Port offset requested by this spec, 0 when absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigInvalid`] when the value is not a
    /// non-negative integer that fits in a port number.
    pub fn port_offset(&self) -> Result<u16> {
        match self.get(PORT_OFFSET_KEY) {
            None | Some(None) => Ok(0),
            Some(Some(value)) => value.trim().parse().map_err(|_| {
                Error::ConfigInvalid(format!("Invalid port offset '{}'", value))
            }),
        }
    }

    /// Free-form arguments split on whitespace
    pub fn cmd_args(&self) -> Vec<String> {
        match self.get(CMD_ARG_KEY) {
            Some(Some(value)) => value.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for LaunchSpec
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut spec = Self::new();
        for (key, value) in iter {
            let value = value.into();
            if value.is_empty() {
                spec.flag(key);
            } else {
                spec.set(key, value);
            }
        }
        spec
    }
}

/// Flatten a launch spec into startup script arguments.
///
/// Parameters come first as `key` or `key=value`, followed by the
/// whitespace-split free-form arguments. The launch spec itself is left untouched.
pub fn expand_launch_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args: Vec<String> = spec
        .params
        .iter()
        .filter(|(key, _)| key.as_str() != CMD_ARG_KEY)
        .map(|(key, value)| match value.as_deref() {
            Some(value) if !value.is_empty() => format!("{}={}", key, value),
            _ => key.clone(),
        })
        .collect();

    args.extend(spec.cmd_args());
    args
}

/// Host platform family, which decides how the startup script is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// `cmd.exe /c <script>.bat`, run from `<home>/bin`
    Windows,
    /// `sh bin/<script>.sh`, run from `<home>`
    Unix,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Directory the startup script must be launched from
    pub fn working_dir(&self, home: &Path) -> PathBuf {
        match self {
            Platform::Windows => home.join("bin"),
            Platform::Unix => home.to_path_buf(),
        }
    }

    fn launcher(&self, script_name: &str) -> Vec<String> {
        match self {
            Platform::Windows => vec![
                "cmd.exe".to_string(),
                "/c".to_string(),
                format!("{}.bat", script_name),
            ],
            Platform::Unix => vec!["sh".to_string(), format!("bin/{}.sh", script_name)],
        }
    }
}

/// Assembles the argument vector that launches a server.
///
/// # Examples
///
/// ```
/// use server_harness::server::{CommandBuilder, Platform};
///
/// let argv = CommandBuilder::new(Platform::Unix, "wso2server")
///     .with_coverage("/tmp/emma.properties")
///     .build(1, &["-DportOffset=1".to_string()]);
///
/// assert_eq!(
///     argv,
///     vec![
///         "sh",
///         "bin/wso2server.sh",
///         "-Demma.properties=/tmp/emma.properties",
///         "-Demma.rt.control.port=47654",
///         "-DportOffset=1",
///     ]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuilder {
    platform: Platform,
    script_name: String,
    coverage_properties: Option<PathBuf>,
}

impl CommandBuilder {
    /// Builder for `script_name` (without extension) on `platform`
    pub fn new(platform: Platform, script_name: impl Into<String>) -> Self {
        Self {
            platform,
            script_name: script_name.into(),
            coverage_properties: None,
        }
    }

    /// Add coverage instrumentation flags pointing at `properties_file`
    pub fn with_coverage(mut self, properties_file: impl Into<PathBuf>) -> Self {
        self.coverage_properties = Some(properties_file.into());
        self
    }

    /// Produce the full argument vector, program first
    pub fn build(&self, port_offset: u16, base_args: &[String]) -> Vec<String> {
        let mut argv = self.platform.launcher(&self.script_name);

        if let Some(properties) = &self.coverage_properties {
            argv.push(format!("-Demma.properties={}", properties.display()));
            argv.push(format!(
                "-Demma.rt.control.port={}",
                coverage_control_port(port_offset)
            ));
        }

        argv.extend(base_args.iter().cloned());
        argv
    }
}

/// Locate the startup script in `<home>/bin` and return its name without
/// extension.
///
/// The first file whose name contains `pattern` wins; failing that, the
/// first file whose name contains `server`. Files are considered in name
/// order.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the directory cannot be read or holds
/// no matching file.
pub fn find_startup_script(home: &Path, pattern: &str) -> Result<String> {
    let bin = home.join("bin");
    let entries = std::fs::read_dir(&bin).map_err(|e| {
        Error::NotFound(format!(
            "Server startup script not found at {}: {}",
            bin.display(),
            e
        ))
    })?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    names.sort();

    let script = names
        .iter()
        .find(|name| name.contains(pattern))
        .or_else(|| names.iter().find(|name| name.contains(FALLBACK_SCRIPT_PATTERN)))
        .ok_or_else(|| {
            Error::NotFound(format!(
                "Server startup script not found at {}",
                bin.display()
            ))
        })?;

    Ok(Path::new(script)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(script.as_str())
        .to_string())
}
