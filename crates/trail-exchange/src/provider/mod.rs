//! FuturesApi 구현체 모음.

pub mod mock;

pub use mock::{MockFailure, MockFuturesApi};
