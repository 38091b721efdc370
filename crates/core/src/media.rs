//! Media kind classification and output file inference.
//!
//! The tool-type substring heuristics below are load-bearing: storage
//! folder names and file extensions chosen here are what the dashboard
//! and CDN already serve. They live in this one module so every caller
//! (materializer, post-processing gate, webhook reconciler) agrees on
//! the same answer.

// ---------------------------------------------------------------------------
// Classification tables
// ---------------------------------------------------------------------------

/// Tool-type substrings that mark a generation as video.
const VIDEO_TOOL_PATTERNS: &[&str] = &[
    "text2video",
    "image2video",
    "wan",
    "animatediff",
    "haiper",
    "mochi",
    "minimax",
    "cogvideox",
    "ltx",
    "runway",
    "luma",
    "kling",
    "qwen",
    "video",
];

/// Tool-type substrings that mark a generation as image.
///
/// Note that `qwen` appears in both lists; video classification is
/// checked first, so a qwen tool resolves as video. This matches the
/// folder layout already in production.
const IMAGE_TOOL_PATTERNS: &[&str] = &[
    "flux",
    "bria",
    "hidream",
    "stable-diffusion",
    "sdxl",
    "image",
    "txt2img",
    "gemini",
    "qwen",
    "img2img",
];

/// Tool-type substrings that mark a generation as audio.
const AUDIO_TOOL_PATTERNS: &[&str] = &["audio", "music", "sound"];

const VIDEO_URL_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv"];
const IMAGE_URL_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp"];

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// The media kind of a generation's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Classify a generation by tool type and (optionally) its output URL.
///
/// Returns `None` when neither the tool type nor the URL matches any
/// known pattern -- callers must treat that as "do nothing", never guess.
pub fn classify(tool_type: Option<&str>, output_url: Option<&str>) -> Option<MediaKind> {
    if is_video(tool_type, output_url) {
        Some(MediaKind::Video)
    } else if is_image(tool_type, output_url) {
        Some(MediaKind::Image)
    } else if is_audio(tool_type) {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

/// True when the tool type or output URL indicates video.
pub fn is_video(tool_type: Option<&str>, output_url: Option<&str>) -> bool {
    let tool = tool_type.unwrap_or_default().to_lowercase();
    let by_tool = VIDEO_TOOL_PATTERNS.iter().any(|p| tool.contains(p));
    let by_url = url_has_extension(output_url, VIDEO_URL_EXTENSIONS);
    by_tool || by_url
}

/// True when the tool type or output URL indicates a still image.
pub fn is_image(tool_type: Option<&str>, output_url: Option<&str>) -> bool {
    let tool = tool_type.unwrap_or_default().to_lowercase();
    let by_tool = IMAGE_TOOL_PATTERNS.iter().any(|p| tool.contains(p));
    let by_url = url_has_extension(output_url, IMAGE_URL_EXTENSIONS);
    by_tool || by_url
}

fn is_audio(tool_type: Option<&str>) -> bool {
    let tool = tool_type.unwrap_or_default().to_lowercase();
    AUDIO_TOOL_PATTERNS.iter().any(|p| tool.contains(p))
}

fn url_has_extension(url: Option<&str>, extensions: &[&str]) -> bool {
    let Some(url) = url else { return false };
    let lower = url.to_lowercase();
    // Ignore any query string when matching the extension.
    let path = lower.split('?').next().unwrap_or(&lower);
    extensions.iter().any(|ext| path.ends_with(ext))
}

// ---------------------------------------------------------------------------
// Output file inference
// ---------------------------------------------------------------------------

/// Content-type hint extracted from the webhook payload, when present.
///
/// Explicit hints take priority over tool-type heuristics.
#[derive(Debug, Clone, Default)]
pub enum PayloadHint {
    Image,
    Audio { content_type: Option<String> },
    Video { content_type: Option<String> },
    #[default]
    None,
}

/// Extension + content type chosen for a materialized output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredFile {
    pub extension: &'static str,
    pub content_type: String,
}

/// Pick the storage extension and content type for a generation output.
///
/// Priority: payload hints, then tool-type substrings, then video/mp4
/// as the fallback. `output_format` (from submission metadata) selects
/// jpeg vs png for image outputs.
pub fn infer_output_file(
    tool_type: Option<&str>,
    hint: &PayloadHint,
    output_format: Option<&str>,
) -> InferredFile {
    let tool = tool_type.unwrap_or_default().to_lowercase();

    let image_by_tool = ["image", "flux", "bria", "hidream"]
        .iter()
        .any(|p| tool.contains(p));
    let audio_by_tool = AUDIO_TOOL_PATTERNS.iter().any(|p| tool.contains(p));

    if matches!(hint, PayloadHint::Image) || image_by_tool {
        return image_file(output_format);
    }

    if audio_by_tool || matches!(hint, PayloadHint::Audio { .. }) {
        let content_type = match hint {
            PayloadHint::Audio {
                content_type: Some(ct),
            } => ct.clone(),
            _ => "audio/mpeg".to_string(),
        };
        return InferredFile {
            extension: "mp3",
            content_type,
        };
    }

    let content_type = match hint {
        PayloadHint::Video {
            content_type: Some(ct),
        } => ct.clone(),
        _ => "video/mp4".to_string(),
    };
    InferredFile {
        extension: "mp4",
        content_type,
    }
}

/// Extension + content type for image outputs, honoring `output_format`.
pub fn image_file(output_format: Option<&str>) -> InferredFile {
    if output_format == Some("jpeg") {
        InferredFile {
            extension: "jpg",
            content_type: "image/jpeg".to_string(),
        }
    } else {
        InferredFile {
            extension: "png",
            content_type: "image/png".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_video_by_tool() {
        assert_eq!(classify(Some("wan-pro"), None), Some(MediaKind::Video));
        assert_eq!(classify(Some("LTXV"), None), Some(MediaKind::Video));
        assert_eq!(
            classify(Some("seedance-image2video"), None),
            Some(MediaKind::Video)
        );
    }

    #[test]
    fn classify_image_by_tool() {
        assert_eq!(
            classify(Some("flux-kontext-max-multi"), None),
            Some(MediaKind::Image)
        );
        assert_eq!(classify(Some("bria-bg-remove"), None), Some(MediaKind::Image));
    }

    #[test]
    fn classify_audio_by_tool() {
        assert_eq!(
            classify(Some("cassetteai-music"), None),
            Some(MediaKind::Audio)
        );
    }

    #[test]
    fn qwen_resolves_as_video() {
        // qwen appears in both pattern lists; video wins.
        assert_eq!(classify(Some("qwen-image"), None), Some(MediaKind::Video));
    }

    #[test]
    fn classify_video_by_url_extension() {
        assert_eq!(
            classify(Some("mystery-tool"), Some("https://cdn/x.MP4")),
            Some(MediaKind::Video)
        );
        assert_eq!(
            classify(None, Some("https://cdn/clip.webm?token=abc")),
            Some(MediaKind::Video)
        );
    }

    #[test]
    fn classify_image_by_url_extension() {
        assert_eq!(
            classify(Some("mystery-tool"), Some("https://cdn/x.png")),
            Some(MediaKind::Image)
        );
    }

    #[test]
    fn classify_unknown_is_none() {
        assert_eq!(classify(Some("mystery-tool"), Some("https://cdn/x.bin")), None);
        assert_eq!(classify(None, None), None);
    }

    #[test]
    fn infer_image_from_tool() {
        let inferred = infer_output_file(Some("flux-kontext"), &PayloadHint::None, None);
        assert_eq!(inferred.extension, "png");
        assert_eq!(inferred.content_type, "image/png");
    }

    #[test]
    fn infer_image_jpeg_output_format() {
        let inferred = infer_output_file(Some("flux-kontext"), &PayloadHint::None, Some("jpeg"));
        assert_eq!(inferred.extension, "jpg");
        assert_eq!(inferred.content_type, "image/jpeg");
    }

    #[test]
    fn infer_audio_with_payload_content_type() {
        let hint = PayloadHint::Audio {
            content_type: Some("audio/wav".into()),
        };
        let inferred = infer_output_file(Some("cassetteai-music"), &hint, None);
        assert_eq!(inferred.extension, "mp3");
        assert_eq!(inferred.content_type, "audio/wav");
    }

    #[test]
    fn infer_video_uses_payload_content_type() {
        let hint = PayloadHint::Video {
            content_type: Some("video/webm".into()),
        };
        let inferred = infer_output_file(Some("wan-pro"), &hint, None);
        assert_eq!(inferred.extension, "mp4");
        assert_eq!(inferred.content_type, "video/webm");
    }

    #[test]
    fn infer_defaults_to_video() {
        let inferred = infer_output_file(Some("mystery-tool"), &PayloadHint::None, None);
        assert_eq!(inferred.extension, "mp4");
        assert_eq!(inferred.content_type, "video/mp4");
    }

    #[test]
    fn image_hint_beats_tool_heuristic() {
        // A video-looking tool with an explicit image payload stores an image.
        let inferred = infer_output_file(Some("wan-pro"), &PayloadHint::Image, None);
        assert_eq!(inferred.extension, "png");
    }
}
