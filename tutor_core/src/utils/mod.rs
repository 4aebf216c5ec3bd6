mod jwt;

pub use jwt::{DecodingKey, EncodingKey};
