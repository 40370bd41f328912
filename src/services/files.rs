//! Files service: artifact download, archive extraction and publishing
//!
//! The three concerns sit behind traits so the repo and image pipelines can be
//! exercised against local fixtures.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

use crate::error::{AppError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` into `path`, replacing any existing file
    async fn download_to_path(&self, url: &str, path: &Path) -> Result<()>;
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Unpack the archive at `archive` into `dest`, overwriting existing entries
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Publish a single file under `key`, returning its public URL
    async fn upload_file(&self, local: &Path, key: &str) -> Result<String>;

    /// Publish a directory tree under `key`, returning the URL of its root
    async fn upload_repo(&self, local_dir: &Path, key: &str, acl: &str) -> Result<String>;
}

/// The collaborators the build pipelines move artifacts with
#[derive(Clone)]
pub struct FilesService {
    pub downloader: Arc<dyn Downloader>,
    pub extractor: Arc<dyn Extractor>,
    pub uploader: Arc<dyn Uploader>,
}

impl FilesService {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            downloader,
            extractor,
            uploader,
        }
    }
}

// ============================================================================
// HTTP downloader
// ============================================================================

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download_to_path(&self, url: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Internal(format!(
                "Download of {} failed with status {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url = %url, path = %path.display(), bytes = written, "Downloaded artifact");
        Ok(())
    }
}

// ============================================================================
// Tar extractor
// ============================================================================

/// Unpacks plain or gzip-compressed tarballs on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct TarExtractor;

impl TarExtractor {
    fn extract_blocking(archive: &Path, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;

        let mut file = File::open(archive)?;
        let mut magic = [0u8; 2];
        let gzipped = file.read_exact(&mut magic).is_ok() && magic == GZIP_MAGIC;
        file.seek(SeekFrom::Start(0))?;

        let reader: Box<dyn Read> = if gzipped {
            Box::new(flate2::read::GzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        let mut tar = tar::Archive::new(reader);
        tar.set_overwrite(true);
        tar.set_preserve_permissions(true);
        tar.unpack(dest)?;
        Ok(())
    }
}

#[async_trait]
impl Extractor for TarExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive_path = archive.to_path_buf();
        let dest_path = dest.to_path_buf();

        tokio::task::spawn_blocking(move || Self::extract_blocking(&archive_path, &dest_path))
            .await
            .map_err(|e| AppError::Internal(format!("Extraction task failed: {}", e)))??;

        tracing::debug!(archive = %archive.display(), dest = %dest.display(), "Extracted archive");
        Ok(())
    }
}

// ============================================================================
// Local uploader
// ============================================================================

/// Publishes into a directory that is served under `base_url`
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
    base_url: String,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }

    fn target_for(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(AppError::InvalidArgument(format!(
                "Invalid storage key: {}",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

fn copy_tree(src: &Path, dest: &Path) -> std::io::Result<u64> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(link, &target)?;
            #[cfg(not(unix))]
            let _ = link;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload_file(&self, local: &Path, key: &str) -> Result<String> {
        let target = self.target_for(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &target).await?;

        let url = self.url_for(key);
        tracing::info!(key = %key, url = %url, "Uploaded file");
        Ok(url)
    }

    async fn upload_repo(&self, local_dir: &Path, key: &str, acl: &str) -> Result<String> {
        let target = self.target_for(key)?;
        let src = local_dir.to_path_buf();

        let files = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            // Re-publishing replaces the previous tree
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            copy_tree(&src, &target)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Upload task failed: {}", e)))??;

        let url = self.url_for(key);
        tracing::info!(key = %key, url = %url, acl = %acl, files, "Uploaded repo");
        Ok(url)
    }
}

// ============================================================================
// Checksums
// ============================================================================

fn sha256_file_blocking(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex SHA-256 of a file's contents
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || sha256_file_blocking(&path))
        .await
        .map_err(|e| AppError::Internal(format!("Checksum task failed: {}", e)))??;
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tar(path: &Path, gzip: bool) {
        let file = File::create(path).unwrap();
        let writer: Box<dyn Write> = if gzip {
            Box::new(flate2::write::GzEncoder::new(
                file,
                flate2::Compression::default(),
            ))
        } else {
            Box::new(file)
        };

        let mut builder = tar::Builder::new(writer);
        let data = b"ostree-config";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "repo/config", &data[..])
            .unwrap();
        builder.into_inner().unwrap().flush().unwrap();
    }

    #[tokio::test]
    async fn test_extract_plain_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("commit.tar");
        write_tar(&archive, false);

        TarExtractor
            .extract(&archive, &dir.path().join("out"))
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("out/repo/config")).unwrap();
        assert_eq!(content, "ostree-config");
    }

    #[tokio::test]
    async fn test_extract_gzip_tar_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("commit.tar");
        write_tar(&archive, true);

        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("repo")).unwrap();
        std::fs::write(out.join("repo/config"), "stale").unwrap();

        TarExtractor.extract(&archive, &out).await.unwrap();

        let content = std::fs::read_to_string(out.join("repo/config")).unwrap();
        assert_eq!(content, "ostree-config");
    }

    #[tokio::test]
    async fn test_extract_missing_archive_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TarExtractor
            .extract(&dir.path().join("missing.tar"), dir.path())
            .await;
        assert!(matches!(result, Err(AppError::Io(_))));
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installer.iso");
        std::fs::write(&path, "abc").unwrap();

        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_local_uploader_replaces_repo_tree() {
        let storage = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(storage.path(), "http://cdn.local/storage/");

        std::fs::create_dir_all(work.path().join("repo/objects")).unwrap();
        std::fs::write(work.path().join("repo/config"), "v1").unwrap();
        std::fs::write(work.path().join("repo/objects/old"), "x").unwrap();

        let url = uploader
            .upload_repo(&work.path().join("repo"), "v2/org-1/repos/3", "public-read")
            .await
            .unwrap();
        assert_eq!(url, "http://cdn.local/storage/v2/org-1/repos/3");

        std::fs::remove_file(work.path().join("repo/objects/old")).unwrap();
        std::fs::write(work.path().join("repo/config"), "v2").unwrap();
        uploader
            .upload_repo(&work.path().join("repo"), "v2/org-1/repos/3", "public-read")
            .await
            .unwrap();

        let published = storage.path().join("v2/org-1/repos/3");
        assert_eq!(std::fs::read_to_string(published.join("config")).unwrap(), "v2");
        assert!(!published.join("objects/old").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_uploader_keeps_nested_files_and_symlinks() {
        let storage = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(storage.path(), "http://cdn.local");

        let repo = work.path().join("repo");
        std::fs::create_dir_all(repo.join("refs/heads/rhel/9")).unwrap();
        std::fs::write(repo.join("refs/heads/rhel/9/edge"), "abc123").unwrap();
        std::os::unix::fs::symlink("refs/heads/rhel/9/edge", repo.join("current")).unwrap();

        uploader
            .upload_repo(&repo, "v2/org-1/updates/4", "public-read")
            .await
            .unwrap();

        let published = storage.path().join("v2/org-1/updates/4");
        assert_eq!(
            std::fs::read_to_string(published.join("refs/heads/rhel/9/edge")).unwrap(),
            "abc123"
        );
        let link = std::fs::read_link(published.join("current")).unwrap();
        assert_eq!(link, Path::new("refs/heads/rhel/9/edge"));
    }

    #[tokio::test]
    async fn test_local_uploader_rejects_escaping_keys() {
        let storage = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(storage.path(), "http://cdn.local");
        let file = storage.path().join("f");
        std::fs::write(&file, "x").unwrap();

        let result = uploader.upload_file(&file, "v2/../../etc/passwd").await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_http_downloader_writes_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/commit.tar")
            .with_status(200)
            .with_body("tarball-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/commit.tar");
        HttpDownloader::new(reqwest::Client::new())
            .download_to_path(&format!("{}/commit.tar", server.url()), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dest).unwrap(), "tarball-bytes");
    }

    #[tokio::test]
    async fn test_http_downloader_rejects_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone.tar")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = HttpDownloader::new(reqwest::Client::new())
            .download_to_path(
                &format!("{}/gone.tar", server.url()),
                &dir.path().join("gone.tar"),
            )
            .await;
        assert!(result.is_err());
    }
}
