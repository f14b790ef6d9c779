use std::fs;
use std::path::Path;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use stagehand_contracts::image::{
    extension_for_mime, mime_for_extension, mime_for_path, DEFAULT_IMAGE_MIME,
};
use stagehand_contracts::{ImageHandle, WorkspaceError};
use url::Url;

use crate::{timestamp_millis, truncate_text};

const CAMERA_MIME: &str = "image/jpeg";
const URL_FALLBACK_STEM: &str = "imported-image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    File,
    Camera,
    Url,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSource::File => "file",
            ImageSource::Camera => "camera",
            ImageSource::Url => "url",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Retrieves raw bytes for an arbitrary URL, usually through a proxy.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchedBytes, WorkspaceError>;
}

pub struct HttpImageFetcher {
    http: HttpClient,
    proxy_base: Option<String>,
}

impl HttpImageFetcher {
    pub fn new(proxy_base: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            proxy_base: proxy_base
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }

    /// The URL actually requested: the target itself, or the proxy with the
    /// target passed as `?url=`.
    pub fn request_url(&self, target: &str) -> Result<String, WorkspaceError> {
        let parsed = Url::parse(target.trim())
            .map_err(|err| WorkspaceError::Fetch(format!("invalid URL {target}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WorkspaceError::Fetch(format!(
                "unsupported URL scheme {}",
                parsed.scheme()
            )));
        }
        let Some(proxy) = self.proxy_base.as_deref() else {
            return Ok(parsed.to_string());
        };
        let proxied = Url::parse_with_params(proxy, &[("url", parsed.as_str())])
            .map_err(|err| WorkspaceError::Fetch(format!("invalid image proxy {proxy}: {err}")))?;
        Ok(proxied.to_string())
    }
}

impl ImageFetcher for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedBytes, WorkspaceError> {
        let request_url = self.request_url(url)?;
        let response = self
            .http
            .get(&request_url)
            .send()
            .map_err(|err| WorkspaceError::Fetch(format!("request to {url} failed: {err}")))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(WorkspaceError::Fetch(format!(
                "{url} returned {code}: {}",
                truncate_text(&body, 256)
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| WorkspaceError::Fetch(format!("failed reading {url}: {err}")))?
            .to_vec();
        Ok(FetchedBytes {
            bytes,
            content_type,
        })
    }
}

/// Reads a picked file. Only the MIME type is inferred; the bytes are taken as-is.
pub fn import_file(path: &Path) -> Result<ImageHandle, WorkspaceError> {
    let bytes = fs::read(path)
        .map_err(|err| WorkspaceError::Io(format!("failed reading {}: {err}", path.display())))?;
    let mime_type = sniff_mime(&bytes)
        .or_else(|| mime_for_path(path).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("upload.{}", extension_for_mime(&mime_type)));
    Ok(ImageHandle::new(bytes, mime_type, file_name))
}

/// Wraps a still frame from a camera capture.
pub fn import_camera_still(
    bytes: Vec<u8>,
    mime_type: Option<&str>,
) -> Result<ImageHandle, WorkspaceError> {
    if bytes.is_empty() {
        return Err(WorkspaceError::InvalidImage("camera frame is empty".to_string()));
    }
    let mime_type = mime_type
        .map(str::to_string)
        .or_else(|| sniff_mime(&bytes))
        .unwrap_or_else(|| CAMERA_MIME.to_string());
    let file_name = format!(
        "camera-{}.{}",
        timestamp_millis(),
        extension_for_mime(&mime_type)
    );
    Ok(ImageHandle::new(bytes, mime_type, file_name))
}

/// Fetches a remote image and accepts it only if it decodes. The sniffed
/// format wins over the served `Content-Type`, which only enriches rejections.
pub fn import_url(fetcher: &dyn ImageFetcher, url: &str) -> Result<ImageHandle, WorkspaceError> {
    let fetched = fetcher.fetch(url)?;
    let mime_type = validate_image(&fetched.bytes).map_err(|err| {
        match (err, fetched.content_type.as_deref().map(str::trim)) {
            (WorkspaceError::InvalidImage(reason), Some(served)) if !served.is_empty() => {
                WorkspaceError::InvalidImage(format!("{reason} (served as {served})"))
            }
            (err, _) => err,
        }
    })?;
    let file_name = file_name_from_url(url, &mime_type);
    Ok(ImageHandle::new(fetched.bytes, mime_type, file_name))
}

/// Returns the detected MIME type if the bytes decode as an image.
pub fn validate_image(bytes: &[u8]) -> Result<String, WorkspaceError> {
    if bytes.is_empty() {
        return Err(WorkspaceError::InvalidImage("payload is empty".to_string()));
    }
    let format = image::guess_format(bytes)
        .map_err(|err| WorkspaceError::InvalidImage(format!("unrecognised format: {err}")))?;
    image::load_from_memory_with_format(bytes, format)
        .map_err(|err| WorkspaceError::InvalidImage(format!("decode failed: {err}")))?;
    Ok(format.to_mime_type().to_string())
}

/// Last path segment when it carries an image suffix, else a synthesized name.
pub fn file_name_from_url(url: &str, mime_type: &str) -> String {
    let segment = Url::parse(url.trim()).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });
    if let Some(segment) = segment.filter(|value| !value.is_empty()) {
        let has_image_suffix = Path::new(&segment)
            .extension()
            .and_then(|value| value.to_str())
            .and_then(mime_for_extension)
            .is_some();
        if has_image_suffix {
            return segment;
        }
    }
    format!("{URL_FALLBACK_STEM}.{}", extension_for_mime(mime_type))
}

fn sniff_mime(bytes: &[u8]) -> Option<String> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::sync::Mutex;

    use image::{ImageFormat, Rgb, RgbImage};
    use stagehand_contracts::WorkspaceError;

    use super::{
        file_name_from_url, import_camera_still, import_file, import_url, validate_image,
        FetchedBytes, HttpImageFetcher, ImageFetcher,
    };

    struct StaticFetcher {
        result: Result<FetchedBytes, WorkspaceError>,
        seen: Mutex<Vec<String>>,
    }

    impl ImageFetcher for StaticFetcher {
        fn fetch(&self, url: &str) -> Result<FetchedBytes, WorkspaceError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(url.to_string());
            }
            self.result.clone()
        }
    }

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 3, Rgb([200, 40, 10]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), format)
            .expect("encode test image");
        bytes
    }

    #[test]
    fn validate_image_detects_png_and_jpeg() {
        assert_eq!(
            validate_image(&encoded(ImageFormat::Png)),
            Ok("image/png".to_string())
        );
        assert_eq!(
            validate_image(&encoded(ImageFormat::Jpeg)),
            Ok("image/jpeg".to_string())
        );
    }

    #[test]
    fn validate_image_rejects_html_and_truncated_payloads() {
        let html = b"<!doctype html><html><body>not found</body></html>";
        assert!(matches!(
            validate_image(html),
            Err(WorkspaceError::InvalidImage(_))
        ));

        let mut truncated = encoded(ImageFormat::Png);
        truncated.truncate(24);
        assert!(matches!(
            validate_image(&truncated),
            Err(WorkspaceError::InvalidImage(_))
        ));
        assert!(matches!(
            validate_image(&[]),
            Err(WorkspaceError::InvalidImage(_))
        ));
    }

    #[test]
    fn import_url_accepts_image_and_names_it_from_path() {
        let fetcher = StaticFetcher {
            result: Ok(FetchedBytes {
                bytes: encoded(ImageFormat::Png),
                content_type: Some("application/octet-stream".to_string()),
            }),
            seen: Mutex::new(Vec::new()),
        };
        let handle = import_url(&fetcher, "https://cdn.example.test/items/lamp.png?w=400");
        let handle = handle.expect("png import");
        assert_eq!(handle.mime_type(), "image/png");
        assert_eq!(handle.file_name(), "lamp.png");
        assert_eq!(
            fetcher.seen.lock().map(|seen| seen.len()).unwrap_or(0),
            1
        );
    }

    #[test]
    fn import_url_rejects_html_payload() {
        let fetcher = StaticFetcher {
            result: Ok(FetchedBytes {
                bytes: b"<html><body>login required</body></html>".to_vec(),
                content_type: Some("text/html".to_string()),
            }),
            seen: Mutex::new(Vec::new()),
        };
        let Err(WorkspaceError::InvalidImage(reason)) =
            import_url(&fetcher, "https://example.test/page")
        else {
            panic!("html payload must be rejected as an invalid image");
        };
        assert!(reason.contains("served as text/html"), "{reason}");
    }

    #[test]
    fn import_url_passes_fetch_errors_through() {
        let fetcher = StaticFetcher {
            result: Err(WorkspaceError::Fetch("404".to_string())),
            seen: Mutex::new(Vec::new()),
        };
        assert_eq!(
            import_url(&fetcher, "https://example.test/missing.png"),
            Err(WorkspaceError::Fetch("404".to_string()))
        );
    }

    #[test]
    fn file_name_falls_back_to_mime_extension() {
        assert_eq!(
            file_name_from_url("https://example.test/photo?id=3", "image/jpeg"),
            "imported-image.jpg"
        );
        assert_eq!(
            file_name_from_url("https://example.test/", "image/webp"),
            "imported-image.webp"
        );
        assert_eq!(file_name_from_url("not a url", "image/png"), "imported-image.png");
        assert_eq!(
            file_name_from_url("https://example.test/a/chair.JPG", "image/jpeg"),
            "chair.JPG"
        );
    }

    #[test]
    fn request_url_wraps_target_in_proxy() -> Result<(), WorkspaceError> {
        let direct = HttpImageFetcher::new(None);
        assert_eq!(
            direct.request_url("https://example.test/a.png")?,
            "https://example.test/a.png"
        );
        assert!(matches!(
            direct.request_url("ftp://example.test/a.png"),
            Err(WorkspaceError::Fetch(_))
        ));

        let proxied = HttpImageFetcher::new(Some("https://proxy.test/fetch".to_string()));
        assert_eq!(
            proxied.request_url("https://example.test/a b.png")?,
            "https://proxy.test/fetch?url=https%3A%2F%2Fexample.test%2Fa%2520b.png"
        );
        Ok(())
    }

    #[test]
    fn import_file_sniffs_mime_and_keeps_name() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("scene.bin");
        fs::write(&path, encoded(ImageFormat::Jpeg))?;

        let handle = import_file(&path)?;
        assert_eq!(handle.mime_type(), "image/jpeg");
        assert_eq!(handle.file_name(), "scene.bin");

        let missing = import_file(&temp.path().join("nope.png"));
        assert!(matches!(missing, Err(WorkspaceError::Io(_))));
        Ok(())
    }

    #[test]
    fn camera_still_defaults_to_jpeg_name() -> Result<(), WorkspaceError> {
        let handle = import_camera_still(vec![1, 2, 3], None)?;
        assert_eq!(handle.mime_type(), "image/jpeg");
        assert!(handle.file_name().starts_with("camera-"));
        assert!(handle.file_name().ends_with(".jpg"));

        assert!(matches!(
            import_camera_still(Vec::new(), None),
            Err(WorkspaceError::InvalidImage(_))
        ));
        Ok(())
    }
}
