use crate::errors::*;
use futures::TryStreamExt;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tokio_util::io::StreamReader;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const USER_AGENT: &str = "curl/8.14.1";

/// Build an HTTP client honoring `http_proxy`/`https_proxy` from the
/// environment, which `reqwest` does by default whenever no explicit proxy
/// is configured.
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::ClientBuilder::new()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .build()?;
    Ok(client)
}

/// Issue a GET and fail with `Error::HttpStatus` on a non-200 response.
pub async fn proxy_get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let resp = client.get(url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        // the body is dropped here, releasing the connection
        return Err(Error::HttpStatus(status));
    }
    Ok(resp)
}

/// Download `url` into `dest`, atomically: the transfer lands at
/// `<dest>.part` first and is renamed into place only once it completes.
/// On any failure the `.part` file is removed so it never becomes visible
/// under its final name. The destination's parent directory is created
/// with mode 0700 if missing.
pub async fn get_file(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        create_dir_private(parent).await?;
    }
    let part = part_path(dest);

    let result = download_to(client, url, &part).await;
    match result {
        Ok(last_modified) => {
            fs::rename(&part, dest).await?;
            if let Some(mtime) = last_modified {
                let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
            }
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            Err(e)
        }
    }
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let mut part = dest.as_os_str().to_os_string();
    part.push(".part");
    std::path::PathBuf::from(part)
}

async fn download_to(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
) -> Result<Option<SystemTime>> {
    let resp = proxy_get(client, url).await?;
    let last_modified = resp
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate_to_systemtime(v));

    let stream = resp.bytes_stream();
    let mut reader = StreamReader::new(stream.map_err(io::Error::other));
    let mut file = fs::File::create(part).await?;
    io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(last_modified)
}

fn httpdate_to_systemtime(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value).ok()
}

pub async fn create_dir_private(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/srv/x/a.rpm")),
            Path::new("/srv/x/a.rpm.part")
        );
    }
}
