pub mod extractor;
pub mod password;
