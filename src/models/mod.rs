pub mod cache;
pub mod driver;
pub mod error;
pub mod lineup;
pub mod reference;
pub mod session;
pub mod standing;
pub mod sync;
pub mod team;
