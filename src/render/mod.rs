pub mod window;

pub use minifb::Key;
pub use window::MinifbRenderer;
