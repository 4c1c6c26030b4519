pub mod session;
pub mod tools;
pub mod audio;
pub mod events;

pub use events::{ClientEvent, ServerEvent};
pub use session::{Session, SessionConfigurator};
pub use tools::{GroundingFile, ToolResult, ToolSource};
