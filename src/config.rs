//! Configuration values for build and run invocations.
//!
//! Nothing here is global: the CLI layer builds a [`BuildConfig`] or a
//! [`RunConfig`] and passes it down explicitly.

use crate::error::{Error, Result};
use fatbin_pack::Compression;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable overriding the base directory of temporary
/// extraction roots.
pub const TMPDIR_ENV: &str = "FATBIN_TMPDIR";

/// Default output file name of `fatbin build`.
pub const DEFAULT_OUTPUT: &str = "archive.fbin";

/// Executable the archive is appended to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostMode {
    /// Copy of the running fatbin executable.
    #[default]
    SelfExe,
    /// Copy of the given executable.
    Path(PathBuf),
    /// No host: write a bare archive.
    None,
}

impl HostMode {
    /// Resolve the host executable path, if any.
    pub fn resolve(&self) -> Result<Option<PathBuf>> {
        match self {
            HostMode::SelfExe => std::env::current_exe()
                .map(Some)
                .map_err(|e| Error::config("resolve host", e.to_string())),
            HostMode::Path(path) => Ok(Some(path.clone())),
            HostMode::None => Ok(None),
        }
    }
}

impl std::fmt::Display for HostMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostMode::SelfExe => write!(f, "self"),
            HostMode::Path(path) => write!(f, "{}", path.display()),
            HostMode::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for HostMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" => Err("host path can't be empty".to_string()),
            "self" => Ok(HostMode::SelfExe),
            "none" => Ok(HostMode::None),
            path => Ok(HostMode::Path(PathBuf::from(path))),
        }
    }
}

/// Settings of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory to package.
    pub source_dir: PathBuf,
    /// Root file launched after extraction.
    pub entry_point: String,
    /// Output file.
    pub output: PathBuf,
    /// Compression of the archive stream.
    pub compression: Compression,
    /// Host executable selection.
    pub host: HostMode,
}

impl BuildConfig {
    /// Create a build config with default output, compression and host.
    pub fn new(source_dir: impl Into<PathBuf>, entry_point: impl Into<String>) -> Self {
        Self {
            source_dir: source_dir.into(),
            entry_point: entry_point.into(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            compression: Compression::default(),
            host: HostMode::default(),
        }
    }

    /// Validate values the type system can't.
    pub fn validate(&self) -> Result<()> {
        if self.entry_point.is_empty() {
            return Err(Error::config(
                "validate entry point",
                "an entry point is required when building",
            ));
        }
        if self.entry_point.contains('/') {
            return Err(Error::config(
                "validate entry point",
                format!("{} is not a root file name", self.entry_point),
            ));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::config("validate output", "output path can't be empty"));
        }
        Ok(())
    }
}

/// Settings of one run invocation.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Archive or self-extracting binary to run.
    pub archive: PathBuf,
    /// Arguments forwarded to the entry point.
    pub args: Vec<OsString>,
    /// Base directory for temporary files (system default when unset).
    pub temp_base: Option<PathBuf>,
}

impl RunConfig {
    /// Create a run config for `archive`.
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            ..Default::default()
        }
    }

    /// Set the forwarded arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the temporary base directory; empty values are ignored.
    pub fn with_temp_base(mut self, temp_base: Option<PathBuf>) -> Self {
        self.temp_base = temp_base.filter(|p| !p.as_os_str().is_empty());
        self
    }

    /// Directory temporary roots and archive copies are created in.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_base.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Read the temporary base directory from the environment.
    pub fn temp_base_from_env() -> Option<PathBuf> {
        std::env::var_os(TMPDIR_ENV).map(PathBuf::from)
    }

    /// Path of the archive.
    pub fn archive(&self) -> &Path {
        &self.archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_mode_parse() {
        assert_eq!("self".parse::<HostMode>(), Ok(HostMode::SelfExe));
        assert_eq!("none".parse::<HostMode>(), Ok(HostMode::None));
        assert_eq!(
            "/usr/bin/true".parse::<HostMode>(),
            Ok(HostMode::Path(PathBuf::from("/usr/bin/true")))
        );
        assert!("".parse::<HostMode>().is_err());
    }

    #[test]
    fn test_host_mode_display_roundtrip() {
        for mode in [
            HostMode::SelfExe,
            HostMode::None,
            HostMode::Path(PathBuf::from("/opt/host")),
        ] {
            assert_eq!(mode.to_string().parse::<HostMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_host_mode_resolve() {
        assert_eq!(HostMode::None.resolve().unwrap(), None);
        assert_eq!(
            HostMode::Path(PathBuf::from("/opt/host")).resolve().unwrap(),
            Some(PathBuf::from("/opt/host"))
        );
        assert!(HostMode::SelfExe.resolve().unwrap().is_some());
    }

    #[test]
    fn test_build_config_defaults() {
        let config = BuildConfig::new("dist", "app");
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(config.compression, Compression::default());
        assert_eq!(config.host, HostMode::SelfExe);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_config_validate() {
        let config = BuildConfig::new("dist", "");
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let config = BuildConfig::new("dist", "bin/app");
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        let mut config = BuildConfig::new("dist", "app");
        config.output = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_config_temp_dir() {
        let config = RunConfig::new("a.fbin");
        assert_eq!(config.temp_dir(), std::env::temp_dir());

        let config = RunConfig::new("a.fbin").with_temp_base(Some(PathBuf::from("/var/tmp")));
        assert_eq!(config.temp_dir(), PathBuf::from("/var/tmp"));

        let config = RunConfig::new("a.fbin").with_temp_base(Some(PathBuf::new()));
        assert_eq!(config.temp_base, None);
    }

    #[test]
    fn test_run_config_args() {
        let config = RunConfig::new("a.fbin").with_args(["-v", "--", "x"]);
        assert_eq!(config.args, vec![OsString::from("-v"), "--".into(), "x".into()]);
        assert_eq!(config.archive(), Path::new("a.fbin"));
    }
}
