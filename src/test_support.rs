//! Fixture builders shared by the unit tests.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tar::{Builder, EntryType, Header};

pub type TarGzBuilder = Builder<GzEncoder<File>>;

pub fn write_tar_gz(
    path: &Path,
    build: impl FnOnce(&mut TarGzBuilder) -> io::Result<()>,
) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(path)?, Compression::fast());
    let mut builder = Builder::new(encoder);
    build(&mut builder)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

pub fn append_dir(builder: &mut TarGzBuilder, path: &str, mode: u32) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(mode);
    builder.append_data(&mut header, path, io::empty())
}

pub fn append_file(builder: &mut TarGzBuilder, path: &str, mode: u32, data: &[u8]) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    builder.append_data(&mut header, path, data)
}

pub fn append_symlink(builder: &mut TarGzBuilder, path: &str, target: &str) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, path, target)
}

/// A stand-in `go` executable that reports `version` on `platform`.
pub fn version_script(version: &str, platform: &str) -> String {
    format!("#!/bin/sh\necho \"go version go{version} {platform}\"\n")
}

/// Writes a release archive laid out like the official ones: everything under `go/`.
pub fn write_release_archive(path: &Path, version: &str) -> io::Result<()> {
    let script = version_script(version, "linux/amd64");
    let version_file = format!("go{version}\n");
    write_tar_gz(path, |builder| {
        append_dir(builder, "go/", 0o755)?;
        append_dir(builder, "go/bin/", 0o755)?;
        append_file(builder, "go/bin/go", 0o755, script.as_bytes())?;
        append_file(builder, "go/VERSION", 0o644, version_file.as_bytes())
    })
}

pub fn release_archive_bytes(version: &str) -> io::Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("release.tar.gz");
    write_release_archive(&path, version)?;
    fs::read(path)
}

/// Lays out an already-extracted tree at `dir` that probes as `version`.
pub fn write_fake_tree(dir: &Path, version: &str) -> io::Result<()> {
    let bin = dir.join("bin");
    fs::create_dir_all(&bin)?;
    let exe = bin.join("go");
    fs::write(&exe, version_script(version, "linux/amd64"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755))?;
    }
    fs::write(dir.join("VERSION"), format!("go{version}\n"))
}

/// A listing page in the shape the release site serves.
pub fn listing_html(versions: &[&str]) -> String {
    let mut html = String::from("<html><body>\n");
    for version in versions {
        for platform in ["linux-amd64", "darwin-arm64", "windows-amd64"] {
            let ext = if platform.starts_with("windows") { "zip" } else { "tar.gz" };
            html.push_str(&format!(
                "<a class=\"download\" href=\"/dl/go{version}.{platform}.{ext}\">go{version}.{platform}.{ext}</a>\n"
            ));
        }
    }
    html.push_str("</body></html>\n");
    html
}
