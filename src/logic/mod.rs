pub mod reconcile;
pub mod request_schema;

pub use reconcile::*;
pub use request_schema::*;
