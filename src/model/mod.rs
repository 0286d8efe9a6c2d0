pub mod backtrace;
pub mod breakpoint;
pub mod source;

pub use backtrace::{BacktraceModel, BacktraceRow, Frame, FrameCode, NavigationTarget, Thread};
pub use breakpoint::{ApplyReport, Breakpoint, BreakpointRegistry, FunctionBreakpoint};
pub use source::SourceLocation;
