use std::fs;
use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, Rgb, RgbImage};
use tracing::info;

use crate::errors::{AgriVisionError, Result};

const GUTTER: u32 = 4;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Rejects a zero figure cell edge.
pub fn validate_cell_size(cell_size: u32) -> Result<u32> {
    if cell_size == 0 {
        return Err(AgriVisionError::configuration("cell size must be at least 1 pixel"));
    }
    Ok(cell_size)
}

#[derive(Debug, Clone)]
pub struct Panel {
    pub title: Option<String>,
    pub image: DynamicImage,
}

/// A row-major grid of image panels.
#[derive(Debug, Clone)]
pub struct Figure {
    rows: usize,
    cols: usize,
    panels: Vec<Panel>,
}

impl Figure {
    pub fn new(rows: usize, cols: usize, panels: Vec<Panel>) -> Result<Self> {
        if panels.len() != rows * cols {
            return Err(AgriVisionError::validation(
                "figure",
                format!(
                    "expects {} panels for a {}x{} grid, got {}",
                    rows * cols,
                    rows,
                    cols,
                    panels.len()
                ),
            ));
        }
        Ok(Self { rows, cols, panels })
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn panel(&self, row: usize, col: usize) -> Option<&Panel> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.panels.get(row * self.cols + col)
    }

    /// Composes the grid onto one canvas, each panel scaled to fit a
    /// `cell_size` square.
    pub fn render(&self, cell_size: u32) -> RgbImage {
        let width = self.cols as u32 * (cell_size + GUTTER) + GUTTER;
        let height = self.rows as u32 * (cell_size + GUTTER) + GUTTER;
        let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

        for (index, panel) in self.panels.iter().enumerate() {
            let (row, col) = ((index / self.cols) as u32, (index % self.cols) as u32);
            let tile = panel
                .image
                .resize(cell_size, cell_size, FilterType::Triangle)
                .to_rgb8();
            let x = GUTTER + col * (cell_size + GUTTER) + cell_size.saturating_sub(tile.width()) / 2;
            let y = GUTTER + row * (cell_size + GUTTER) + cell_size.saturating_sub(tile.height()) / 2;
            imageops::overlay(&mut canvas, &tile, x.into(), y.into());
        }
        canvas
    }

    /// Renders the figure and writes it as an image, creating the parent
    /// directory when needed.
    pub fn save(&self, path: &Path, cell_size: u32) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AgriVisionError::FileSystem {
                path: parent.to_path_buf(),
                operation: "output directory creation".to_string(),
                source: e,
            })?;
        }
        self.render(cell_size)
            .save(path)
            .map_err(|e| AgriVisionError::ImageProcessing {
                path: path.display().to_string(),
                operation: "figure save".to_string(),
                source: Box::new(e),
            })
    }
}

/// Sink for composed figures.
pub trait FigureViewer {
    fn show(&self, figure: &Figure) -> Result<()>;
}

/// Reports the figure layout through the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogViewer;

impl FigureViewer for LogViewer {
    fn show(&self, figure: &Figure) -> Result<()> {
        let (rows, cols) = figure.shape();
        let titles = figure
            .panels()
            .iter()
            .filter_map(|p| p.title.as_deref())
            .collect::<Vec<_>>();
        info!(rows, cols, "Figure ready: [{}]", titles.join(", "));
        Ok(())
    }
}

/// Hands `figure` to `viewer` and, when `persist_to` is set, writes it there.
pub fn present(
    figure: &Figure,
    viewer: &dyn FigureViewer,
    persist_to: Option<&Path>,
    cell_size: u32,
) -> Result<()> {
    viewer.show(figure)?;
    if let Some(path) = persist_to {
        figure.save(path, cell_size)?;
        info!("Saved figure to {}", path.display());
    }
    Ok(())
}
