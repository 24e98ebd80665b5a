pub mod frame;
pub mod preprocess;
pub mod source;

pub use frame::{Frame, FrameInfo};
pub use preprocess::{preprocess, preprocess_gray};
pub use source::{FrameSource, ImageSequenceSource, MemoryFrameSource};

use std::path::Path;

const PICTURE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub(crate) fn is_picture(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);
    !hidden
        && path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| PICTURE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}
