pub mod calculator;
pub mod deadline;
pub mod emitter;
pub mod envelope;
pub mod handler;
pub mod parser;
pub mod persister;
pub mod validator;

pub use deadline::Deadline;
pub use handler::{Clients, Disposition, MeasurementHandler, Outcome};
