//! Decoding response bodies into typed values

use serde::de::DeserializeOwned;

use crate::error::BoxError;
use crate::request::Request;
use crate::response::Response;
use crate::{Error, Result};

/// Turns raw body bytes into a typed value
pub trait Decoder: Send + Sync {
    /// Decode `body` as `T`. Must have no side effects.
    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> std::result::Result<T, BoxError>;
}

/// JSON decoder backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> std::result::Result<T, BoxError> {
        serde_json::from_slice(body).map_err(Into::into)
    }
}

/// A response together with its successfully decoded body
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    value: T,
    response: Response,
}

impl<T> Decoded<T> {
    /// The decoded value
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The envelope the value was decoded from
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Status code of the envelope
    pub fn status(&self) -> u16 {
        self.response.status()
    }

    /// Take the decoded value
    pub fn into_value(self) -> T {
        self.value
    }

    /// Split into value and envelope
    pub fn into_parts(self) -> (T, Response) {
        (self.value, self.response)
    }
}

/// Decode the body of `response` with `decoder`
///
/// On failure the envelope travels inside [`Error::Decode`] so callers can
/// still inspect status and raw bytes.
pub fn decode<T, D>(response: Response, decoder: &D) -> Result<Decoded<T>>
where
    T: DeserializeOwned,
    D: Decoder,
{
    match decoder.decode::<T>(response.bytes()) {
        Ok(value) => Ok(Decoded { value, response }),
        Err(source) => Err(Error::Decode {
            source,
            response: Box::new(response),
        }),
    }
}

/// A request type that knows what its response decodes to
pub trait DecodableRequest {
    /// Type the response body decodes into
    type Output: DeserializeOwned;

    /// Describe the HTTP call
    fn request(&self) -> Request;
}
