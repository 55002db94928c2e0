//! HTTP download of zipped release binaries

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use vdut_core::config::AlloyConfig;
use vdut_core::AgentError;

use crate::cache::ArtifactFetcher;

/// Downloads a release archive and extracts the one matching entry
pub struct HttpFetcher {
    client: reqwest::Client,
    url_template: String,
    entry_pattern: String,
}

impl HttpFetcher {
    /// `url_template` may contain `{version}`, replaced with the cache key
    pub fn new(url_template: impl Into<String>, entry_pattern: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url_template: url_template.into(),
            entry_pattern: entry_pattern.into(),
        }
    }

    pub fn for_alloy(config: &AlloyConfig) -> Self {
        Self::new(config.url_template.clone(), config.entry_pattern.clone())
    }

    fn url(&self, key: &str) -> String {
        self.url_template.replace("{version}", key)
    }

    async fn download(&self, url: &str, archive: &Path) -> Result<u64, AgentError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::Download(format!("GET {} failed: {}", url, e)))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(AgentError::Download(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(archive).await?;
        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AgentError::Download(format!("reading {} failed: {}", url, e)))?
        {
            file.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(total)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<(), AgentError> {
        let url = self.url(key);
        let archive = archive_path(dest);

        tracing::info!("Downloading {}", url);
        let result = async {
            let size = self.download(&url, &archive).await?;
            tracing::debug!("Downloaded {} bytes to {}", size, archive.display());

            let archive_owned = archive.clone();
            let dest_owned = dest.to_path_buf();
            let pattern = self.entry_pattern.clone();
            tokio::task::spawn_blocking(move || {
                extract_entry(&archive_owned, &pattern, &dest_owned)
            })
            .await
            .map_err(|e| AgentError::Download(format!("extraction task failed: {}", e)))?
        }
        .await;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", archive.display(), e);
            }
        }

        let written = result?;
        tracing::info!("Extracted {} ({} bytes)", dest.display(), written);
        Ok(())
    }
}

fn archive_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".zip");
    dest.with_file_name(name)
}

/// Copy the single file entry whose name contains `pattern` to `dest`
///
/// Zero or several matches are an error.
pub fn extract_entry(archive: &Path, pattern: &str, dest: &Path) -> Result<u64, AgentError> {
    let zip_err = |e: zip::result::ZipError| {
        AgentError::Download(format!("bad archive {}: {}", archive.display(), e))
    };

    let mut zip = zip::ZipArchive::new(File::open(archive)?).map_err(zip_err)?;

    let mut matches = Vec::new();
    for index in 0..zip.len() {
        let entry = zip.by_index(index).map_err(zip_err)?;
        if !entry.is_dir() && entry.name().contains(pattern) {
            matches.push(index);
        }
    }

    let index = match matches.as_slice() {
        [index] => *index,
        other => {
            return Err(AgentError::Download(format!(
                "expected exactly one entry matching '{}' in {}, found {}",
                pattern,
                archive.display(),
                other.len()
            )))
        }
    };

    let mut entry = zip.by_index(index).map_err(zip_err)?;
    let mut out = File::create(dest)?;
    let written = std::io::copy(&mut entry, &mut out)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Serve one canned HTTP response on a loopback port
    async fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/{{version}}/alloy.zip", addr)
    }

    #[test]
    fn test_extract_single_match() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        std::fs::write(
            &archive,
            build_zip(&[("README.md", "docs"), ("alloy-linux-amd64", "ELF...")]),
        )
        .unwrap();

        let dest = dir.path().join("alloy");
        let written = extract_entry(&archive, "alloy-linux-amd64", &dest).unwrap();
        assert_eq!(written, 6);
        assert_eq!(std::fs::read(dest).unwrap(), b"ELF...");
    }

    #[test]
    fn test_extract_rejects_missing_and_ambiguous_entries() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("alloy");

        let none = dir.path().join("none.zip");
        std::fs::write(&none, build_zip(&[("README.md", "docs")])).unwrap();
        assert!(matches!(
            extract_entry(&none, "alloy-linux-amd64", &dest),
            Err(AgentError::Download(_))
        ));

        let two = dir.path().join("two.zip");
        std::fs::write(
            &two,
            build_zip(&[
                ("alloy-linux-amd64", "a"),
                ("debug/alloy-linux-amd64.sym", "b"),
            ]),
        )
        .unwrap();
        let err = extract_entry(&two, "alloy-linux-amd64", &dest).unwrap_err();
        assert!(err.to_string().contains("found 2"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("a.zip");
        std::fs::write(&archive, b"<html>not found</html>").unwrap();
        assert!(extract_entry(&archive, "alloy", &dir.path().join("alloy")).is_err());
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("200 OK", build_zip(&[("alloy-linux-amd64", "binary")])).await;
        let fetcher = HttpFetcher::new(url, "alloy-linux-amd64");

        let dest = dir.path().join("alloy.partial");
        fetcher.fetch("v1.5.1", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"binary");
        assert!(!archive_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_fetch_requires_200() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("404 Not Found", b"missing".to_vec()).await;
        let fetcher = HttpFetcher::new(url, "alloy-linux-amd64");

        let dest = dir.path().join("alloy.partial");
        let err = fetcher.fetch("v9.9.9", &dest).await.unwrap_err();
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
        assert!(!archive_path(&dest).exists());
    }

    #[test]
    fn test_url_substitutes_version() {
        let fetcher = HttpFetcher::for_alloy(&AlloyConfig::default());
        assert!(fetcher
            .url("v1.5.1")
            .ends_with("/download/v1.5.1/alloy-linux-amd64.zip"));
    }
}
