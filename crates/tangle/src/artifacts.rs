use crate::config::WorkspaceConfig;
use image::RgbaImage;

/// RGBA8 image produced as a side effect of a cell call.
///
/// `as_raw()` gives the row-major `width * height * 4` bytes.
pub type Image = RgbaImage;

/// Scratch state of a single cell call.
///
/// Images pushed here belong to the call that produced them. They are stored
/// with the cell's memoized outcome, so a reused cell keeps showing them.
pub struct CallContext<'a> {
    cell: &'a str,
    config: &'a WorkspaceConfig,
    images: Vec<Image>,
}

impl<'a> CallContext<'a> {
    pub fn new(cell: &'a str, config: &'a WorkspaceConfig) -> Self {
        Self {
            cell,
            config,
            images: Vec::new(),
        }
    }

    pub fn cell(&self) -> &str {
        self.cell
    }

    pub fn config(&self) -> &WorkspaceConfig {
        self.config
    }

    pub fn push_image(&mut self, image: Image) {
        self.images.push(image);
    }

    pub fn into_images(self) -> Vec<Image> {
        self.images
    }
}
