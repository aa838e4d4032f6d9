pub mod image_marker_renderer;
