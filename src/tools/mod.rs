//! Coach commands exposed to the model as tools.

pub mod command;
pub mod registry;
pub mod tool;

pub use command::CoachCommand;
pub use registry::CommandRegistry;
pub use tool::ToolOutput;
