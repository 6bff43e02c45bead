//! Build command for creating archives and self-extracting binaries.

use crate::cli::format_size;
use clap::Args;
use fatbin::config::DEFAULT_OUTPUT;
use fatbin::{BuildConfig, Error, HostMode};
use fatbin_pack::Compression;
use std::path::PathBuf;
use tracing::info;

/// Package a directory into an archive or a self-extracting binary.
///
/// By default the output is a copy of this fatbin executable with the
/// archive appended, runnable on its own. Use --plain for a bare archive
/// that `fatbin run` can execute.
///
/// Examples:
///   fatbin build dist --exe app -o app.run
///   fatbin build dist --exe app --plain -o app.fbin
///   fatbin build dist --exe app --compression none
///   fatbin build dist --exe app --compression zstd:19
#[derive(Args, Debug)]
pub struct BuildCmd {
    /// Directory to package
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// File of DIR to execute at startup
    #[arg(long = "exe", value_name = "NAME")]
    pub exe: String,

    /// Output file path
    #[arg(short = 'o', long, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Archive compression: none, zstd or zstd:LEVEL
    #[arg(long, value_name = "MODE", default_value_t = Compression::default())]
    pub compression: Compression,

    /// zstd compression level (1-22), overrides the level of --compression
    #[arg(
        long,
        value_name = "N",
        value_parser = clap::value_parser!(i32).range(1..=22)
    )]
    pub level: Option<i32>,

    /// Write a bare archive instead of a self-extracting binary
    #[arg(long, conflicts_with = "host")]
    pub plain: bool,

    /// Executable to prepend instead of this fatbin binary
    #[arg(long, value_name = "PATH")]
    pub host: Option<HostMode>,
}

impl BuildCmd {
    /// Translate the arguments into a build config.
    pub fn config(&self) -> fatbin::Result<BuildConfig> {
        let compression = match (self.compression, self.level) {
            (Compression::None, Some(_)) => {
                return Err(Error::config(
                    "parse level",
                    "--level requires zstd compression",
                ))
            }
            (Compression::Zstd(_), Some(level)) => Compression::Zstd(level),
            (compression, None) => compression,
        };

        let host = if self.plain {
            HostMode::None
        } else {
            self.host.clone().unwrap_or_default()
        };

        let mut config = BuildConfig::new(&self.dir, self.exe.as_str());
        config.output = self.output.clone();
        config.compression = compression;
        config.host = host;
        Ok(config)
    }

    /// Execute the build command.
    pub fn run(self) -> fatbin::Result<()> {
        let config = self.config()?;
        info!(
            dir = %config.source_dir.display(),
            output = %config.output.display(),
            host = %config.host,
            "building archive"
        );

        let info = fatbin::build(&config)?;

        if info.host_size > 0 {
            println!(
                "Packed: {} ({} files, host: {}, archive: {}, total: {})",
                config.output.display(),
                info.files,
                format_size(info.host_size),
                format_size(info.archive_size),
                format_size(info.total_size)
            );
        } else {
            println!(
                "Packed: {} ({} files, archive: {}, {})",
                config.output.display(),
                info.files,
                format_size(info.archive_size),
                config.compression
            );
        }
        println!("Checksum: {:08x}", info.checksum);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestCli {
        #[command(flatten)]
        cmd: BuildCmd,
    }

    fn parse(args: &[&str]) -> BuildCmd {
        let mut argv = vec!["fatbin-build"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().cmd
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["dist", "--exe", "app"]).config().unwrap();
        assert_eq!(config.source_dir, PathBuf::from("dist"));
        assert_eq!(config.entry_point, "app");
        assert_eq!(config.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(config.compression, Compression::default());
        assert_eq!(config.host, HostMode::SelfExe);
    }

    #[test]
    fn test_plain_and_level() {
        let config = parse(&["dist", "--exe", "app", "--plain", "--level", "19"])
            .config()
            .unwrap();
        assert_eq!(config.host, HostMode::None);
        assert_eq!(config.compression, Compression::Zstd(19));
    }

    #[test]
    fn test_compression_modes() {
        let config = parse(&["dist", "--exe", "app", "--compression", "zstd:7"])
            .config()
            .unwrap();
        assert_eq!(config.compression, Compression::Zstd(7));

        let config = parse(&["dist", "--exe", "app", "--compression", "none"])
            .config()
            .unwrap();
        assert_eq!(config.compression, Compression::None);

        let config = parse(&["dist", "--exe", "app", "--compression", "zstd:7", "--level", "12"])
            .config()
            .unwrap();
        assert_eq!(config.compression, Compression::Zstd(12));

        for bad in ["gzip", "zstd:0", "zstd:23"] {
            let argv = ["fatbin-build", "dist", "--exe", "app", "--compression", bad];
            assert!(TestCli::try_parse_from(argv).is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_level_requires_zstd() {
        let cmd = parse(&["dist", "--exe", "app", "--compression", "none", "--level", "3"]);
        assert!(cmd.config().is_err());
    }

    #[test]
    fn test_explicit_host() {
        let config = parse(&["dist", "--exe", "app", "--host", "/opt/host"])
            .config()
            .unwrap();
        assert_eq!(config.host, HostMode::Path(PathBuf::from("/opt/host")));
    }

    #[test]
    fn test_plain_conflicts_with_host() {
        let argv = ["fatbin-build", "dist", "--exe", "app", "--plain", "--host", "/x"];
        assert!(TestCli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_exe_required() {
        assert!(TestCli::try_parse_from(["fatbin-build", "dist"]).is_err());
    }
}
