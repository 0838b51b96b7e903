use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use kiln_engine::command::Image;

/// `kiln-<unix seconds>.png` in the working directory.
pub fn screenshot_path() -> PathBuf {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    PathBuf::from(format!("kiln-{secs}.png"))
}

pub fn save_png(image: Image, path: &Path) -> Result<()> {
    let (width, height) = (image.width, image.height);
    let rgb = image::RgbImage::from_raw(width, height, image.data)
        .with_context(|| format!("screenshot data does not match {width}x{height}"))?;
    rgb.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_data_is_rejected() {
        let image = Image {
            width: 4,
            height: 4,
            data: vec![0; 10],
        };
        assert!(save_png(image, Path::new("unused.png")).is_err());
    }
}
