pub mod request_reader;
pub mod writer;
