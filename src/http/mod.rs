pub mod identity;
pub mod routes;

pub use routes::build_router;
