use crate::errors::{RenderError, ShapDashError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::fs;
use std::path::Path;

/// An RGB canvas owned by the caller.
///
/// Renderers draw into a figure instead of any global state. A figure that
/// failed to render is left blank, so a partial image is never encoded.
#[derive(Debug, Clone)]
pub struct Figure {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    drawn: bool,
}

impl Figure {
    pub fn new(width: u32, height: u32) -> Self {
        Figure {
            width,
            height,
            buffer: vec![255; width as usize * height as usize * 3],
            drawn: false,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True until a render has completed successfully.
    pub fn is_blank(&self) -> bool {
        !self.drawn
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|b| *b = 255);
        self.drawn = false;
    }

    /// Raw RGB pixels, row major.
    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }

    /// Run `draw` on a fresh canvas. On error the canvas is cleared again.
    pub(crate) fn draw<F>(&mut self, draw: F) -> Result<(), RenderError>
    where
        F: FnOnce(&DrawingArea<BitMapBackend<'_>, Shift>) -> Result<(), RenderError>,
    {
        self.clear();
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidParameter(
                "figure size".to_string(),
                "a non-empty figure".to_string(),
                format!("{}x{}", self.width, self.height),
            ));
        }
        let size = (self.width, self.height);
        let res = {
            let root = BitMapBackend::with_buffer(&mut self.buffer, size).into_drawing_area();
            draw(&root).and_then(|_| root.present().map_err(|e| RenderError::Backend("figure".to_string(), e.to_string())))
        };
        match res {
            Ok(()) => {
                self.drawn = true;
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e)
            }
        }
    }

    pub fn to_png(&self) -> Result<Vec<u8>, RenderError> {
        if self.is_blank() {
            return Err(RenderError::Backend("png".to_string(), "the figure has not been rendered".to_string()));
        }
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(&self.buffer, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| RenderError::Backend("png".to_string(), e.to_string()))?;
        Ok(png)
    }

    /// The PNG as a `data:` URI, ready for an `<img src>`.
    pub fn to_data_uri(&self) -> Result<String, RenderError> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), ShapDashError> {
        let path = path.as_ref();
        let png = self.to_png()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ShapDashError::UnableToWrite(path.display().to_string(), e.to_string()))?;
        }
        fs::write(path, png).map_err(|e| ShapDashError::UnableToWrite(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

    fn filled(fig: &mut Figure) {
        fig.draw(|root| {
            root.fill(&RED).map_err(|e| RenderError::Backend("test".to_string(), e.to_string()))?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_new_figure_is_blank() {
        let fig = Figure::new(4, 3);
        assert!(fig.is_blank());
        assert_eq!(fig.pixels().len(), 36);
        assert!(fig.to_png().is_err());
    }

    #[test]
    fn test_draw_and_encode() {
        let mut fig = Figure::new(8, 6);
        filled(&mut fig);
        assert!(!fig.is_blank());
        assert_eq!(&fig.pixels()[..3], &[255, 0, 0]);
        let png = fig.to_png().unwrap();
        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert!(fig.to_data_uri().unwrap().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_failed_draw_leaves_blank_figure() {
        let mut fig = Figure::new(8, 6);
        filled(&mut fig);
        let res = fig.draw(|root| {
            root.fill(&BLUE).map_err(|e| RenderError::Backend("test".to_string(), e.to_string()))?;
            Err(RenderError::EmptyColumn("x".to_string()))
        });
        assert_eq!(res, Err(RenderError::EmptyColumn("x".to_string())));
        assert!(fig.is_blank());
        assert!(fig.pixels().iter().all(|b| *b == 255));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut fig = Figure::new(8, 6);
        filled(&mut fig);
        let path = dir.path().join("plots").join("fig.png");
        fig.save_png(&path).unwrap();
        assert_eq!(&fs::read(&path).unwrap()[..8], &PNG_SIGNATURE);
    }
}
