mod schema;
pub use schema::*;
