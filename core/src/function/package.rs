//! Deployment package for the edge function.
//!
//! Lambda@Edge only runs Node.js or Python, so the archive carries the Node
//! handler that mirrors `cdn_proxy_edge::rewrite`, the help page it serves on
//! bad requests, and the deploy-time settings as `config.json`. The edge
//! runtime has no environment variables, which is why settings travel in the
//! archive.

use std::io::{Cursor, Write};

use cdn_proxy_common::error::CdnProxyError;
use cdn_proxy_edge::{
    HANDLER_SOURCE, HELP_PAGE, PACKAGE_HANDLER_FILE, PACKAGE_HELP_FILE, PACKAGE_SETTINGS_FILE,
    RewriteSettings,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Builds the zip archive uploaded as function code. Entries carry a fixed
/// timestamp so identical settings produce byte-identical archives.
pub fn build(settings: &RewriteSettings) -> Result<Vec<u8>, CdnProxyError> {
    let config: Vec<u8> = serde_json::to_vec_pretty(settings).map_err(package_error)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let entries: [(&str, &[u8]); 3] = [
        (PACKAGE_HANDLER_FILE, HANDLER_SOURCE.as_bytes()),
        (PACKAGE_HELP_FILE, HELP_PAGE.as_bytes()),
        (PACKAGE_SETTINGS_FILE, &config),
    ];
    for (name, contents) in entries {
        writer.start_file(name, options).map_err(package_error)?;
        writer.write_all(contents).map_err(package_error)?;
    }

    let archive: Cursor<Vec<u8>> = writer.finish().map_err(package_error)?;
    Ok(archive.into_inner())
}

fn package_error(err: impl std::fmt::Display) -> CdnProxyError {
    CdnProxyError::Package(err.to_string())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::Ipv4Addr;

    use zip::ZipArchive;

    use super::*;

    fn entry(archive: &[u8], name: &str) -> String {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        let mut file = zip.by_name(name).unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        contents
    }

    #[test]
    fn archive_contains_handler_help_and_settings() {
        let settings = RewriteSettings {
            x_forwarded_for: Some(Ipv4Addr::new(8, 8, 4, 4)),
        };
        let archive: Vec<u8> = build(&settings).unwrap();

        assert_eq!(entry(&archive, "index.mjs"), HANDLER_SOURCE);
        assert_eq!(entry(&archive, "help.html"), HELP_PAGE);

        let shipped: RewriteSettings = serde_json::from_str(&entry(&archive, "config.json")).unwrap();
        assert_eq!(shipped, settings);
    }

    #[test]
    fn archives_are_reproducible() {
        let settings = RewriteSettings::default();
        assert_eq!(build(&settings).unwrap(), build(&settings).unwrap());
    }
}
