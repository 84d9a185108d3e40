pub mod connection;
pub mod entity;
pub mod normalize;
pub mod repository;

pub use connection::establish_connection;

/// Milliseconds since the Unix epoch, UTC.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
