//! Dispatch module
//!
//! Maps the four query operations (StartQuery, NextPage, CloseQuery,
//! PointLookup) onto sessions and the page builder, and accepts them either
//! as typed requests or as a positional argument list.

mod dispatcher;
mod ids;
mod types;

pub use dispatcher::Dispatcher;
pub use ids::{QueryIdGenerator, SequentialIds, UuidGenerator};
pub use types::{InvokeResponse, Operation, QueryHandle, StartQueryRequest};

#[cfg(test)]
mod tests;
