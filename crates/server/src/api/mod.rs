pub mod audit;
pub mod dispatch;
pub mod events;
pub mod governor;
pub mod handlers;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod status;

pub use routes::create_router;
