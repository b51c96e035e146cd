use crate::error::Result;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const IMAGE_DIR: &str = "img";

/// File extension for an image content type, if recognised.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type.split(';').next().unwrap_or("").trim() {
        "image/gif" => Some("gif"),
        "image/jpeg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Save the avatar at `url` as `<root>/img/<id>.<ext>`.
pub async fn download_image(client: &Client, root: &Path, id: u64, url: &str) -> Result<PathBuf> {
    let dir = root.join(IMAGE_DIR);
    tokio::fs::create_dir_all(&dir).await?;

    let response = client.get(url).send().await?.error_for_status()?;
    let extension = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(image_extension);

    let mut path = dir.join(id.to_string());
    if let Some(ext) = extension {
        path.set_extension(ext);
    }

    let bytes = response.bytes().await?;
    tokio::fs::write(&path, &bytes).await?;
    debug!("saved {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/pjpeg"), Some("jpg"));
        assert_eq!(image_extension("image/jpeg; charset=binary"), Some("jpg"));
        assert_eq!(image_extension("text/html"), None);
    }

    #[tokio::test]
    async fn test_download_image_names_file_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/avatar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0x89, b'P', b'N', b'G']),
            )
            .mount(&server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let saved = download_image(
            &Client::new(),
            temp_dir.path(),
            42,
            &format!("{}/avatar", server.uri()),
        )
        .await
        .unwrap();

        assert_eq!(saved, temp_dir.path().join("img").join("42.png"));
        assert_eq!(std::fs::read(&saved).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }
}
