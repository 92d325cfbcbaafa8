pub mod backend;

pub use backend::{ChunkReceiver, HttpTransport, Transport};
