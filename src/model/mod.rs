pub mod common;
pub mod error;
pub mod operation;
pub mod pointer;
pub mod resource;
pub mod schema;

pub use common::*;
pub use error::*;
pub use operation::*;
pub use pointer::*;
pub use resource::*;
pub use schema::*;
