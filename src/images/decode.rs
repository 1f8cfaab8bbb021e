use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat, ImageReader};

/// Read the pixel dimensions of an encoded image, proving the bytes decode.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("Failed to decode GIF")?;
        let mut frames = decoder.into_frames();
        if let Some(frame) = frames.next() {
            let frame = frame.context("Failed to decode GIF frame")?;
            let buf = frame.into_buffer();
            return Ok((buf.width(), buf.height()));
        }
        return Err(anyhow!("GIF has no frames"));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("Failed to guess image format")?;
    let (width, height) = reader
        .into_dimensions()
        .context("Failed to read dimensions")?;
    if width == 0 || height == 0 {
        return Err(anyhow!("Image has empty dimensions {width}x{height}"));
    }
    Ok((width, height))
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(width, height));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}
