//! LLDB backend: drives `lldb` through its command prompt and scrapes the
//! thread/frame listings it prints using formats installed at startup.

pub mod models;
pub mod parser;
pub mod repl;

pub use models::CommandOutput;
pub use repl::LldbRepl;
