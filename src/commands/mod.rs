pub mod barrier;
pub mod command_list;
pub mod sync;

use crate::TextureHandle;

/// Attachments and clear state for one dynamic render pass.
#[derive(Debug, Clone)]
pub struct RenderPassInfo {
    pub color_attachments: Vec<TextureHandle>,
    pub depth_attachment: Option<TextureHandle>,
    pub clear_color: [f32; 4],
}

impl Default for RenderPassInfo {
    fn default() -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            clear_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}
