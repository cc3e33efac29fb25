use eframe::egui::ColorImage;

/// Fetches a preview image for the video behind `url`, if the URL is one
/// the thumbnail host understands. Blocking; run on a blocking task.
pub fn fetch_for_url(url: &str) -> Option<ColorImage> {
    let video_id = extract_video_id(url)?;
    let thumb_url = format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id);
    let resp = reqwest::blocking::get(&thumb_url).ok()?.bytes().ok()?;
    let img = image::load_from_memory(&resp).ok()?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}

/// Pulls the video id out of a watch URL (`v=` parameter) or a
/// short-link path.
fn extract_video_id(url: &str) -> Option<String> {
    if let Some(id) = url
        .split("v=")
        .nth(1)
        .and_then(|s| s.split('&').next())
        .filter(|s| !s.is_empty())
    {
        return Some(id.to_string());
    }
    url.split("youtu.be/")
        .nth(1)
        .and_then(|s| s.split(['?', '&', '/']).next())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
