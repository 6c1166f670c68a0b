mod content_type;
mod dispatcher;
mod report;
mod task;
mod walker;

pub use dispatcher::Dispatcher;
pub use report::Printer;
