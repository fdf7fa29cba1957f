//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_security_repository;
mod jwt_guest_token_codec;
mod postgres_security_repository;
mod tracing_grant_event_sink;

pub use in_memory_security_repository::InMemorySecurityRepository;
pub use jwt_guest_token_codec::JwtGuestTokenCodec;
pub use postgres_security_repository::{PostgresSecurityRepository, PostgresSecurityUnitOfWork};
pub use tracing_grant_event_sink::TracingGrantEventSink;
