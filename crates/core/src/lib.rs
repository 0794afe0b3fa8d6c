pub mod cursor;
pub mod edge;
pub mod error;
pub mod state;
pub mod window;

pub use cursor::Cursor;
pub use edge::{Edge, Metadata};
pub use error::CoreError;
pub use state::State;
pub use window::ResultWindow;
