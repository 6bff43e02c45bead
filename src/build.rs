//! Build an archive or self-extracting binary from a directory.

use crate::config::BuildConfig;
use crate::error::Result;
use fatbin_pack::{Directory, PackedInfo, Packer};

/// Scan `config.source_dir` and write the output file.
pub fn build(config: &BuildConfig) -> Result<PackedInfo> {
    config.validate()?;

    let tree = Directory::scan(&config.source_dir)?;
    tracing::debug!(
        source = %config.source_dir.display(),
        files = tree.file_count(),
        directories = tree.directory_count(),
        "scanned source directory"
    );

    let mut packer = Packer::new(tree, config.entry_point.as_str())?
        .with_source_root(&config.source_dir)
        .with_compression(config.compression);
    if let Some(host) = config.host.resolve()? {
        packer = packer.with_host(host);
    }

    Ok(packer.pack(&config.output)?)
}
