pub mod catalog;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod report;
pub mod results;
pub mod session;
pub mod session_log;
pub mod tools;
pub mod websocket;

pub use catalog::{Catalog, FixtureDocument};
pub use dispatch::Dispatcher;
pub use error::{AuthError, FixtureError, McpError, ToolError};
pub use protocol::*;
pub use registry::{ToolContext, ToolHandler, ToolRegistry};
pub use results::{FileResultPersistence, Outcome, ResultStore, TestResult};
pub use session::{Session, SessionManager};
pub use websocket::mcp_websocket;
