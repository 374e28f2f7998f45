//! Testing utilities: mock transports and end-to-end request fixtures.

mod fixtures;
mod mocks;

pub use fixtures::{
    call_with_protected_delay, declarative_client_call, manual_connection_call,
    ProtectedCallReport,
};
pub use mocks::{MockConnection, MockRemoteClient, REMOTE_DELAY_UNITS, REMOTE_RESPONSE};
