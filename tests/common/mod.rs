#![allow(dead_code)]

mod mocks;

pub use mocks::MockStream;

/// Routes the library logs to the test output.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
