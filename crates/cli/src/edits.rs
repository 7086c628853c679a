//! Image edits on generated pictures.
//!
//! Background compositing runs on both engines at once and keeps every
//! distinct result. Each edit ends with one transcript line describing
//! what came back.

use joyip_client::types::{BackgroundRequest, EditResponse, OptimizeRequest, UploadRequest};
use joyip_client::{ApiError, GenerationApi};

const NO_IMAGE_TEXT: &str = "生成失败，未返回图片URL";

/// Transcript entry produced by an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub text: String,
    pub images: Vec<String>,
}

/// Host `image` so the edit engines can fetch it.
///
/// Falls back to the original reference when the upload fails; the
/// engines accept local paths too, just more slowly.
pub async fn hosted_url(api: &dyn GenerationApi, image: &str) -> String {
    match api.upload_image(&UploadRequest::new(image)).await {
        Ok(response) => match response.image_url() {
            Some(url) => url.to_string(),
            None => {
                tracing::warn!(
                    image,
                    error = response.failure_detail().unwrap_or_default(),
                    "Upload returned no URL, using original image"
                );
                image.to_string()
            }
        },
        Err(e) => {
            tracing::warn!(image, error = %e, "Upload failed, using original image");
            image.to_string()
        }
    }
}

/// Composite `image` onto a described background with both engines.
pub async fn background(api: &dyn GenerationApi, image: &str, text: &str) -> EditOutcome {
    let request = BackgroundRequest {
        tag_img_url: hosted_url(api, image).await,
        background_text: text.to_string(),
    };
    tracing::info!(image = %request.tag_img_url, "Compositing background");

    let (jimeng, banana) = tokio::join!(
        api.run_jimeng_background(&request),
        api.run_background(&request),
    );
    combine_backgrounds(text, [jimeng, banana])
}

/// Refine the character in `image` from a keyword.
pub async fn optimize(api: &dyn GenerationApi, image: &str, keyword: &str) -> EditOutcome {
    let request = OptimizeRequest {
        image_url: hosted_url(api, image).await,
        prompt: keyword.to_string(),
    };
    tracing::info!(image = %request.image_url, "Optimizing character");

    let result = api.optimize_image(&request).await;
    match result.as_ref().map(|r| r.image_url()) {
        Ok(Some(url)) => EditOutcome {
            text: format!("已优化形象：{keyword}"),
            images: vec![url.to_string()],
        },
        _ => EditOutcome {
            text: format!("优化形象失败：{}", failure_detail(&result)),
            images: Vec::new(),
        },
    }
}

/// Keep the first image of each engine, skipping duplicates. Without any
/// image the first engine's explanation wins.
pub fn combine_backgrounds(
    text: &str,
    results: [Result<EditResponse, ApiError>; 2],
) -> EditOutcome {
    let mut images: Vec<String> = Vec::new();
    for url in results.iter().filter_map(|r| r.as_ref().ok()?.image_url()) {
        if !images.iter().any(|seen| seen == url) {
            images.push(url.to_string());
        }
    }

    if images.is_empty() {
        let detail = results
            .iter()
            .map(failure_detail)
            .find(|d| d != NO_IMAGE_TEXT)
            .unwrap_or_else(|| NO_IMAGE_TEXT.to_string());
        return EditOutcome {
            text: format!("背景生成失败：{detail}"),
            images,
        };
    }
    EditOutcome {
        text: format!("已生成背景：{text}"),
        images,
    }
}

fn failure_detail(result: &Result<EditResponse, ApiError>) -> String {
    match result {
        Ok(response) => response.failure_detail().unwrap_or(NO_IMAGE_TEXT).to_string(),
        Err(ApiError::Rejected { message, .. }) if !message.is_empty() => message.clone(),
        Err(e) => e.to_string(),
    }
}
