mod tera_renderer;

pub use tera_renderer::{RenderError, TeraRenderer, TEMPLATES};
